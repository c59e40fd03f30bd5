use std::fs;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::Path;
use std::thread;

use siteserver_lib::{Server, Shutdown};

fn site() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
    fs::write(dir.path().join("style.css"), "body { margin: 0 }").unwrap();
    fs::create_dir(dir.path().join("js")).unwrap();
    fs::write(dir.path().join("js/app.js"), "console.log('hi')").unwrap();
    dir
}

fn start(root: &Path) -> (SocketAddr, Shutdown, thread::JoinHandle<()>) {
    let server = Server::bind(Ipv4Addr::LOCALHOST.into(), 0, root).unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_handle().unwrap();
    let handle = thread::spawn(move || server.serve());
    (addr, shutdown, handle)
}

fn get(addr: SocketAddr, path: &str) -> (String, String) {
    let mut stream = TcpStream::connect(addr).unwrap();
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
    )
    .unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    let response = String::from_utf8_lossy(&response).into_owned();
    let boundary = response.find("\r\n\r\n").unwrap();
    let body = response[boundary + 4..].to_owned();
    (response[..boundary].to_owned(), body)
}

#[test]
fn binds_an_ephemeral_port_when_asked_for_port_zero() {
    let dir = site();
    let (addr, shutdown, handle) = start(dir.path());
    assert_ne!(addr.port(), 0);
    shutdown.signal();
    handle.join().unwrap();
}

#[test]
fn serves_an_existing_file_with_its_contents() {
    let dir = site();
    let (addr, shutdown, handle) = start(dir.path());

    let (head, body) = get(addr, "/style.css");
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(head.contains("Content-Type: text/css"));
    assert_eq!(body, "body { margin: 0 }");

    let (head, body) = get(addr, "/js/app.js");
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(body, "console.log('hi')");

    shutdown.signal();
    handle.join().unwrap();
}

#[test]
fn serves_the_index_for_the_root_path() {
    let dir = site();
    let (addr, shutdown, handle) = start(dir.path());

    let (head, body) = get(addr, "/");
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(head.contains("Content-Type: text/html"));
    assert_eq!(body, "<h1>home</h1>");

    shutdown.signal();
    handle.join().unwrap();
}

#[test]
fn unknown_path_is_not_found() {
    let dir = site();
    let (addr, shutdown, handle) = start(dir.path());

    let (head, _) = get(addr, "/nope.html");
    assert!(head.starts_with("HTTP/1.1 404 NOT FOUND"));

    shutdown.signal();
    handle.join().unwrap();
}

#[test]
fn directory_listing_names_the_entries() {
    let dir = site();
    let (addr, shutdown, handle) = start(dir.path());

    let (head, body) = get(addr, "/js/");
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(body.contains("app.js"));

    shutdown.signal();
    handle.join().unwrap();
}

#[test]
fn concurrent_connections_are_both_answered() {
    let dir = site();
    let (addr, shutdown, handle) = start(dir.path());

    let first = thread::spawn(move || get(addr, "/style.css"));
    let second = thread::spawn(move || get(addr, "/js/app.js"));
    assert_eq!(first.join().unwrap().1, "body { margin: 0 }");
    assert_eq!(second.join().unwrap().1, "console.log('hi')");

    shutdown.signal();
    handle.join().unwrap();
}

#[test]
fn shutdown_stops_the_accept_loop_and_releases_the_socket() {
    let dir = site();
    let (addr, shutdown, handle) = start(dir.path());

    let (head, _) = get(addr, "/");
    assert!(head.starts_with("HTTP/1.1 200 OK"));

    shutdown.signal();
    handle.join().unwrap();

    // The listener is gone with the server, so new connections are refused.
    assert!(TcpStream::connect(addr).is_err());
}
