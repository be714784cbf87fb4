use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    thread::{self, JoinHandle},
};

use torilate::{Client, ErrorKind, RequestOptions};

struct Seen {
    socks: Vec<u8>,
    http: Vec<u8>,
}

/// A SOCKS4 proxy and HTTP origin in one: every accepted connection gets the
/// SOCKS reply `status`, then (if granted) the next canned HTTP response.
fn fake_tor(status: u8, responses: Vec<&'static str>) -> (SocketAddr, JoinHandle<Vec<Seen>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = if status == 90 { responses.len() } else { 1 };

    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        let mut responses = responses.into_iter();
        for _ in 0..connections {
            let (mut stream, _) = listener.accept().unwrap();
            let socks = read_socks_request(&mut stream);
            stream.write_all(&[0, status, 0, 0, 0, 0, 0, 0]).unwrap();
            if status != 90 {
                seen.push(Seen { socks, http: vec![] });
                continue;
            }
            let http = read_http_request(&mut stream);
            stream
                .write_all(responses.next().unwrap().as_bytes())
                .unwrap();
            seen.push(Seen { socks, http });
        }
        seen
    });
    (addr, handle)
}

fn read_socks_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut req = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).unwrap();
        req.push(byte[0]);
        if req.len() > 8 && byte[0] == 0 {
            let socks4a = req[4..8] == [0, 0, 0, 1];
            let nuls = req[8..].iter().filter(|b| **b == 0).count();
            if !socks4a || nuls == 2 {
                return req;
            }
        }
    }
}

fn read_http_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut req = Vec::new();
    let mut byte = [0u8; 1];
    while !req.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).unwrap();
        req.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&req).to_string();
    let body_len = head
        .lines()
        .find_map(|l| l.strip_prefix("Content-Length: "))
        .map(|n| n.trim().parse::<usize>().unwrap())
        .unwrap_or(0);
    let mut body = vec![0u8; body_len];
    stream.read_exact(&mut body).unwrap();
    req.extend_from_slice(&body);
    req
}

#[test]
fn get_by_domain_name() {
    let (proxy, server) = fake_tor(
        90,
        vec!["HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello"],
    );

    let resp = Client::new()
        .proxy(proxy)
        .perform(&RequestOptions::get("http://example.com/"))
        .unwrap();
    assert_eq!(resp.status_code(), 200);
    assert_eq!(resp.body(), b"hello");
    assert!(!resp.is_truncated());

    let seen = server.join().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].socks,
        b"\x04\x01\x00\x50\x00\x00\x00\x01torilate\0example.com\0"
    );
    assert_eq!(
        String::from_utf8(seen[0].http.clone()).unwrap(),
        "GET / HTTP/1.1\r\nHost: example.com\r\nUser-Agent: Torilate\r\nConnection: close\r\n\r\n"
    );
}

#[test]
fn get_by_ipv4_literal() {
    let (proxy, server) = fake_tor(90, vec!["HTTP/1.0 204 No Content\r\n\r\n"]);

    let resp = Client::new()
        .proxy(proxy)
        .user_id("anon")
        .perform(&RequestOptions::get("10.1.2.3:8080/status"))
        .unwrap();
    assert_eq!(resp.status_code(), 204);

    let seen = server.join().unwrap();
    assert_eq!(seen[0].socks, b"\x04\x01\x1f\x90\x0a\x01\x02\x03anon\0");
    assert!(seen[0]
        .http
        .starts_with(b"GET /status HTTP/1.1\r\nHost: 10.1.2.3:8080\r\n"));
}

#[test]
fn post_follows_see_other_as_get() {
    let (proxy, server) = fake_tor(
        90,
        vec![
            "HTTP/1.1 303 See Other\r\nLocation: /done\r\nContent-Length: 0\r\n\r\n",
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
        ],
    );

    let opts = RequestOptions::post("http://example.com/form", "a=1")
        .header("Content-Type: application/x-www-form-urlencoded")
        .follow_redirects(5);
    let resp = Client::new().proxy(proxy).perform(&opts).unwrap();
    assert_eq!(resp.status_code(), 200);
    assert_eq!(resp.body(), b"ok");

    let seen = server.join().unwrap();
    assert_eq!(seen.len(), 2);
    let first = String::from_utf8(seen[0].http.clone()).unwrap();
    assert!(first.starts_with("POST /form HTTP/1.1\r\n"));
    assert!(first.contains("Content-Length: 3\r\n"));
    assert!(first.ends_with("\r\n\r\na=1"));

    let second = String::from_utf8(seen[1].http.clone()).unwrap();
    assert!(second.starts_with("GET /done HTTP/1.1\r\nHost: example.com\r\n"));
    assert!(!second.contains("Content-Length"));
}

#[test]
fn redirect_budget_runs_out() {
    let loop_response = "HTTP/1.1 302 Found\r\nLocation: /again\r\n\r\n";
    let (proxy, server) = fake_tor(90, vec![loop_response; 3]);

    let err = Client::new()
        .proxy(proxy)
        .perform(&RequestOptions::get("example.com").follow_redirects(2))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RedirectLimitExceeded);
    assert_eq!(err.kind().exit_code(), 17);
    assert_eq!(server.join().unwrap().len(), 3);
}

#[test]
fn proxy_refuses_destination() {
    let (proxy, server) = fake_tor(91, vec![]);

    let err = Client::new()
        .proxy(proxy)
        .perform(&RequestOptions::get("http://example.com/"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionRejected);
    assert_eq!(err.kind().exit_code(), 8);

    let seen = server.join().unwrap();
    assert!(seen[0].http.is_empty());
}

#[test]
fn small_buffer_truncates() {
    let (proxy, server) = fake_tor(
        90,
        vec!["HTTP/1.1 200 OK\r\nContent-Length: 26\r\n\r\nabcdefghijklmnopqrstuvwxyz"],
    );

    let resp = Client::new()
        .proxy(proxy)
        .response_capacity(32)
        .perform(&RequestOptions::get("example.com"))
        .unwrap();
    assert_eq!(resp.bytes_received(), 31);
    assert!(resp.is_truncated());
    server.join().unwrap();
}
