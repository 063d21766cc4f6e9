use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, TcpListener};
use std::thread;
use std::time::{Duration, Instant};

use espsocket::{ServerAddress, TcpClient, TcpClientConfig};

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

fn receive_line(client: &mut TcpClient) -> Option<String> {
    let mut received = None;
    wait_until(|| {
        let line = client.receive();
        if line.is_empty() {
            return false;
        }
        received = Some(line);
        true
    });
    received
}

#[test]
fn talks_to_a_line_server() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();

    let echo = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        writer.write_all(b"welcome\r\n").unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        writer.write_all(format!("echo {}", line).as_bytes()).unwrap();
    });

    let mut client = TcpClient::default();
    client.connect(Ipv4Addr::LOCALHOST, port).unwrap();
    assert!(client.is_connected());
    assert_eq!(client.peer_addr().map(|a| a.port()), Some(port));

    assert_eq!(receive_line(&mut client).as_deref(), Some("welcome"));
    assert_eq!(client.send_line("ping"), 5);
    assert_eq!(receive_line(&mut client).as_deref(), Some("echo ping"));
    assert_eq!(client.last_received(), "echo ping");

    echo.join().unwrap();
    assert!(wait_until(|| {
        client.receive();
        !client.is_connected()
    }));
    assert_eq!(client.send("after close"), 0);
}

#[test]
fn connects_by_hostname() {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut client = TcpClient::new(TcpClientConfig {
        connect_timeout: Duration::from_secs(2),
        ..TcpClientConfig::default()
    });
    // "localhost" may also resolve to ::1 first; the IPv4 address is tried next
    client.connect("localhost", port).unwrap();
    assert!(client.is_connected());

    let (_server_side, addr) = listener.accept().unwrap();
    assert_eq!(client.peer_addr().map(|a| a.port()), Some(port));
    assert!(addr.ip().is_loopback());
}

#[test]
fn closed_port_is_an_error() {
    let port = {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        listener.local_addr().unwrap().port()
    };

    let mut client = TcpClient::default();
    assert!(client.connect(ServerAddress::Ip(Ipv4Addr::LOCALHOST), port).is_err());
    assert!(!client.is_connected());
    assert_eq!(client.receive(), "");
}

#[test]
fn reconnect_replaces_connection() {
    let first = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let second = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let second_port = second.local_addr().unwrap().port();

    let mut client = TcpClient::default();
    client.connect("127.0.0.1", first.local_addr().unwrap().port()).unwrap();
    client.connect("127.0.0.1", second_port).unwrap();
    assert_eq!(client.peer_addr().map(|a| a.port()), Some(second_port));

    client.stop_client();
    assert!(!client.is_connected());
    assert_eq!(client.peer_addr(), None);
}
