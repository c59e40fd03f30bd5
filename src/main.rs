use std::env;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use siteserver_lib::{lan_ip, Server};

/// Serve this site locally for testing.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Port to run the server on.
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Open the site automatically in your default browser.
    #[arg(long)]
    open: bool,
}

/// The site lives next to the binary; fall back to the current directory when
/// the executable path can't be determined.
fn site_root() -> PathBuf {
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let root = site_root();
    env::set_current_dir(&root)
        .with_context(|| format!("can't enter site root [{}]", root.display()))?;

    let server = Server::bind(Ipv4Addr::UNSPECIFIED.into(), args.port, &root)
        .with_context(|| format!("can't bind to port {}", args.port))?;
    let port = server.local_addr().context("no local address")?.port();

    let local_url = format!("http://localhost:{port}/");
    let lan_url = format!("http://{}:{port}/", lan_ip());

    println!("Serving site preview");
    println!("Root:  {}", root.display());
    println!("Local: {local_url}");
    println!("LAN:   {lan_url}");
    println!("Press Ctrl+C to stop.");

    if args.open {
        if let Err(err) = open::that(&local_url) {
            eprintln!("Failed to open browser: {err}. Please navigate to the URL manually.");
        }
    }

    let shutdown = server.shutdown_handle().context("no shutdown handle")?;
    ctrlc::set_handler(move || shutdown.signal()).context("can't install Ctrl+C handler")?;

    server.serve();
    println!("\nStopping server...");
    Ok(())
}
