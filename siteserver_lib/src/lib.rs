//! A local host only for previewing a static website.
//! Thread-per-connection, read-only, not meant for production traffic.

use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};

mod net;

pub use net::lan_ip;

/// A static file server bound to an address and rooted at a directory.
pub struct Server {
    listener: TcpListener,
    root: PathBuf,
    running: Arc<AtomicBool>,
}

/// Stops a [`Server`]'s accept loop from another thread (or a signal handler).
#[derive(Clone)]
pub struct Shutdown {
    wake_addr: SocketAddr,
    running: Arc<AtomicBool>,
}

impl Server {
    /// Binds the listening socket. Port 0 picks an ephemeral port.
    pub fn bind(address: IpAddr, port: u16, root: impl AsRef<Path>) -> io::Result<Server> {
        let listener = TcpListener::bind((address, port))?;
        Ok(Server {
            listener,
            root: root.as_ref().to_owned(),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for stopping the accept loop. The handle connects back to the
    /// listener to wake it, so an unspecified bind address maps to loopback.
    pub fn shutdown_handle(&self) -> io::Result<Shutdown> {
        let addr = self.listener.local_addr()?;
        let ip = match addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        Ok(Shutdown {
            wake_addr: SocketAddr::new(ip, addr.port()),
            running: Arc::clone(&self.running),
        })
    }

    /// Accepts connections until a [`Shutdown`] handle fires, serving each on
    /// its own thread. The listening socket is released when the server is
    /// dropped.
    pub fn serve(&self) {
        for stream in self.listener.incoming() {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("Failed to accept connection: {err}");
                    continue;
                }
            };
            let root = self.root.clone();
            thread::spawn(move || {
                if let Err(err) = handle_client(stream, &root) {
                    debug!("Connection ended with error: {err}");
                }
            });
        }
    }
}

impl Shutdown {
    /// Flips the shutdown flag and nudges the accept loop awake.
    pub fn signal(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = TcpStream::connect_timeout(&self.wake_addr, Duration::from_millis(100));
    }
}

fn read_header<T: Read>(stream: &mut T) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut reader = io::BufReader::new(stream);
    loop {
        // Read until end of header. A peer that closes early must not wedge
        // the handler thread, so EOF also terminates the loop.
        let read = reader.read_until(b'\n', &mut buffer)?;
        if read == 0 || buffer.ends_with(b"\r\n\r\n") {
            break;
        }
    }
    Ok(buffer)
}

enum Resolved {
    File(PathBuf),
    Listing(PathBuf, String),
    Redirect(String),
    NotFound,
}

/// Maps a request path onto the hosted directory.
fn resolve(root: &Path, raw_path: &str) -> Resolved {
    // Trim parameters from the URL.
    let path = raw_path.split('?').next().unwrap_or(raw_path);

    // Restore encoded spaces and remove any segments that refer to the parent.
    let path = path.replace("../", "").replace("%20", " ");

    if path.ends_with('/') {
        let dir = root.join(path.trim_matches('/'));
        let index = dir.join("index.html");
        if index.is_file() {
            Resolved::File(index)
        } else if dir.is_dir() {
            Resolved::Listing(dir, path)
        } else {
            Resolved::NotFound
        }
    } else {
        let target = root.join(path.trim_start_matches('/'));
        if target.is_dir() {
            Resolved::Redirect(format!("{path}/"))
        } else if target.is_file() {
            Resolved::File(target)
        } else {
            Resolved::NotFound
        }
    }
}

fn handle_client<T: Read + Write>(mut stream: T, root: &Path) -> io::Result<()> {
    let header = read_header(&mut stream)?;
    if header.is_empty() {
        return Ok(());
    }
    let request = match str::from_utf8(&header) {
        Ok(request) => request,
        Err(_) => return respond_bad_request(&mut stream),
    };

    // Split the request line into its parts.
    let mut parts = request.split_whitespace();
    let (method, raw_path) = match (parts.next(), parts.next()) {
        (Some(method), Some(path)) => (method, path),
        _ => return respond_bad_request(&mut stream),
    };
    debug!("{method} {raw_path}");

    let send_body = method != "HEAD";

    match resolve(root, raw_path) {
        Resolved::File(path) => {
            let contents = match fs::read(&path) {
                Ok(contents) => contents,
                Err(err) => {
                    warn!("Could not read file [{}]: {err}", path.display());
                    return respond_not_found(&mut stream);
                }
            };
            let content_type = mime_guess::from_path(&path).first_or_octet_stream();
            respond_ok(&mut stream, &contents, content_type.as_ref(), send_body)
        }
        Resolved::Listing(dir, request_path) => match directory_listing(&dir, &request_path) {
            Ok(page) => respond_ok(&mut stream, &page, "text/html; charset=utf-8", send_body),
            Err(err) => {
                warn!("Could not list directory [{}]: {err}", dir.display());
                respond_not_found(&mut stream)
            }
        },
        Resolved::Redirect(location) => {
            let response = format!(
                "HTTP/1.1 301 Moved Permanently\r\nLocation: {location}\r\nContent-Length: 0\r\n\r\n"
            );
            stream.write_all(response.as_bytes())?;
            stream.flush()
        }
        Resolved::NotFound => {
            warn!("Could not find a file for request path [{raw_path}]");
            respond_not_found(&mut stream)
        }
    }
}

fn respond_ok<T: Write>(
    stream: &mut T,
    contents: &[u8],
    content_type: &str,
    send_body: bool,
) -> io::Result<()> {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n",
        contents.len()
    );
    stream.write_all(response.as_bytes())?;
    if send_body {
        stream.write_all(contents)?;
    }
    stream.flush()
}

fn respond_not_found<T: Write>(stream: &mut T) -> io::Result<()> {
    stream.write_all(b"HTTP/1.1 404 NOT FOUND\r\n\r\n")?;
    stream.flush()
}

fn respond_bad_request<T: Write>(stream: &mut T) -> io::Result<()> {
    stream.write_all(b"HTTP/1.1 400 BAD REQUEST\r\n\r\n")?;
    stream.flush()
}

/// Plain listing page for a directory without an index.html.
fn directory_listing(dir: &Path, request_path: &str) -> io::Result<Vec<u8>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    let title = format!("Directory listing for {}", escape(request_path));
    let mut items = String::new();
    for name in &names {
        let name = escape(name);
        items.push_str(&format!("<li><a href=\"{name}\">{name}</a></li>\n"));
    }
    let page = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body>\n<h1>{title}</h1>\n<hr>\n<ul>\n{items}</ul>\n<hr>\n</body>\n</html>\n"
    );
    Ok(page.into_bytes())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
