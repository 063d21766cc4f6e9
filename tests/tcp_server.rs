use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use espsocket::{SecondClientPolicy, TcpServer, TcpServerConfig};

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < Duration::from_secs(3) {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn local_server(policy: SecondClientPolicy) -> (TcpServer, SocketAddr) {
    let mut server = TcpServer::new(TcpServerConfig {
        bind_address: Ipv4Addr::LOCALHOST,
        port: 0,
        second_client: policy,
        ..TcpServerConfig::default()
    });
    server.start_server().unwrap();
    let addr = server.local_addr().unwrap();
    (server, addr)
}

fn receive_line(server: &mut TcpServer) -> Option<String> {
    let mut received = None;
    wait_until(|| {
        let line = server.receive();
        if line.is_empty() {
            return false;
        }
        received = Some(line);
        true
    });
    received
}

/// Reads from `peer` until EOF or a reset, i.e. the server closed it
fn closed_by_server(peer: &mut TcpStream) -> bool {
    peer.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
    let mut buf = [0u8; 64];
    wait_until(|| match peer.read(&mut buf) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) => !matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut),
    })
}

#[test]
fn scan_is_false_until_a_client_arrives() {
    let (mut server, addr) = local_server(SecondClientPolicy::Queue);
    for _ in 0..5 {
        assert!(!server.scan_client());
    }

    let _peer = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));
    assert!(server.has_client());
    assert!(server.is_connected());

    // The same connection is reported only once
    for _ in 0..5 {
        assert!(!server.scan_client());
    }
}

#[test]
fn scan_before_start_is_false() {
    let mut server = TcpServer::with_port(0);
    assert!(!server.is_listening());
    assert!(!server.scan_client());
    assert_eq!(server.local_addr(), None);
}

#[test]
fn exchanges_lines_with_held_client() {
    let (mut server, addr) = local_server(SecondClientPolicy::Queue);
    let mut peer = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));
    assert_eq!(server.client_addr(), Some(peer.local_addr().unwrap()));

    peer.write_all(b"first li").unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(server.receive(), "");
    peer.write_all(b"ne\r\nsecond\n").unwrap();

    assert_eq!(receive_line(&mut server).as_deref(), Some("first line"));
    assert_eq!(receive_line(&mut server).as_deref(), Some("second"));
    assert_eq!(server.last_received(), "second");

    assert_eq!(server.send("pong\n"), 5);
    assert_eq!(server.send_line("again"), 6);
    peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut buf = [0u8; 11];
    peer.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"pong\nagain\n");
}

#[test]
fn receive_without_data_does_not_block() {
    let (mut server, addr) = local_server(SecondClientPolicy::Queue);
    assert_eq!(server.receive(), "");

    let _peer = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));

    let started = Instant::now();
    for _ in 0..10 {
        assert_eq!(server.receive(), "");
    }
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn send_without_client_returns_zero() {
    let (mut server, _addr) = local_server(SecondClientPolicy::Queue);
    assert_eq!(server.send("nobody listening"), 0);
    assert_eq!(server.send_line(""), 0);
}

#[test]
fn stop_client_keeps_listening() {
    let (mut server, addr) = local_server(SecondClientPolicy::Queue);
    let mut first = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));

    server.stop_client();
    assert!(!server.is_connected());
    assert!(!server.has_client());
    assert_eq!(server.send("late"), 0);
    assert!(closed_by_server(&mut first));

    assert!(server.is_listening());
    let _second = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));
}

#[test]
fn peer_close_flushes_partial_line_and_frees_slot() {
    let (mut server, addr) = local_server(SecondClientPolicy::Queue);
    let mut peer = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));

    peer.write_all(b"done\nbye").unwrap();
    drop(peer);

    assert_eq!(receive_line(&mut server).as_deref(), Some("done"));
    assert_eq!(receive_line(&mut server).as_deref(), Some("bye"));
    assert!(wait_until(|| {
        server.receive();
        !server.has_client()
    }));

    let _next = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));
}

#[test]
fn scan_releases_silently_closed_client() {
    let (mut server, addr) = local_server(SecondClientPolicy::Queue);
    let first = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));
    drop(first);

    let second = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));
    assert_eq!(server.client_addr(), Some(second.local_addr().unwrap()));
}

#[test]
fn queue_policy_defers_second_client() {
    let (mut server, addr) = local_server(SecondClientPolicy::Queue);
    let first = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));

    let second = TcpStream::connect(addr).unwrap();
    for _ in 0..20 {
        assert!(!server.scan_client());
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(server.client_addr(), Some(first.local_addr().unwrap()));

    server.stop_client();
    assert!(wait_until(|| server.scan_client()));
    assert_eq!(server.client_addr(), Some(second.local_addr().unwrap()));
}

#[test]
fn refuse_policy_closes_second_client() {
    let (mut server, addr) = local_server(SecondClientPolicy::Refuse);
    let first = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));

    let mut second = TcpStream::connect(addr).unwrap();
    second.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
    let mut buf = [0u8; 8];
    assert!(wait_until(|| {
        assert!(!server.scan_client());
        match second.read(&mut buf) {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) => !matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut),
        }
    }));

    assert_eq!(server.client_addr(), Some(first.local_addr().unwrap()));
    assert!(server.is_connected());
}

#[test]
fn replace_policy_swaps_held_client() {
    let (mut server, addr) = local_server(SecondClientPolicy::Replace);
    let mut first = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));

    let second = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));
    assert_eq!(server.client_addr(), Some(second.local_addr().unwrap()));
    assert!(closed_by_server(&mut first));
}

#[test]
fn stop_server_closes_everything() {
    let (mut server, addr) = local_server(SecondClientPolicy::Queue);
    let mut peer = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));

    server.stop_server();
    assert!(!server.is_listening());
    assert!(!server.is_connected());
    assert!(!server.scan_client());
    assert!(closed_by_server(&mut peer));
}

#[test]
fn restart_rebinds() {
    let (mut server, _addr) = local_server(SecondClientPolicy::Queue);
    server.start_server().unwrap();
    let addr = server.local_addr().unwrap();
    let _peer = TcpStream::connect(addr).unwrap();
    assert!(wait_until(|| server.scan_client()));
}
