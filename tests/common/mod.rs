/// Common utilities for integration tests
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tokio::time::sleep;

use smart_proxy::server::read_request_head;

/// Find an available port
pub fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to random port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Create a simple echo server for testing
pub async fn start_echo_server(port: u16) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let listener = TokioTcpListener::bind(format!("127.0.0.1:{}", port))
            .await
            .expect("Failed to bind echo server");

        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        loop {
                            match socket.read(&mut buf).await {
                                Ok(0) => break, // Connection closed
                                Ok(n) => {
                                    if socket.write_all(&buf[..n]).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => break,
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    })
}

/// Requests observed by a fake server, as "METHOD target" lines
pub type RequestLog = Arc<Mutex<Vec<String>>>;

/// Start an HTTP origin that answers every request with a fixed response
///
/// The response carries an `X-Origin: direct` header so tests can tell the
/// origin answered rather than the fake upstream proxy.
pub async fn start_http_origin(port: u16) -> (tokio::task::JoinHandle<()>, RequestLog) {
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let log_clone = log.clone();

    let handle = tokio::spawn(async move {
        let listener = TokioTcpListener::bind(format!("127.0.0.1:{}", port))
            .await
            .expect("Failed to bind origin server");

        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let log = log_clone.clone();
                    tokio::spawn(async move {
                        let Ok(parsed) = read_request_head(&mut socket).await else {
                            return;
                        };
                        log.lock().unwrap().push(format!(
                            "{} {}",
                            parsed.head.method, parsed.head.target
                        ));

                        let body = b"hello from origin";
                        let response = format!(
                            "HTTP/1.1 200 OK\r\n\
                             Content-Type: text/plain\r\n\
                             Content-Length: {}\r\n\
                             X-Origin: direct\r\n\
                             Connection: close\r\n\
                             \r\n",
                            body.len()
                        );
                        socket.write_all(response.as_bytes()).await.ok();
                        socket.write_all(body).await.ok();
                        socket.shutdown().await.ok();
                    });
                }
                Err(_) => break,
            }
        }
    });

    (handle, log)
}

/// Start a fake upstream HTTP proxy
///
/// Understands just enough proxy semantics for the tests: the HEAD probe is
/// answered with a plain 200, CONNECT is answered with 200 Connection
/// Established followed by an echo of all tunneled bytes, and any other
/// method gets a canned response marked `X-Via: upstream`. Every request is
/// recorded in the returned log.
pub async fn start_fake_upstream(port: u16) -> (tokio::task::JoinHandle<()>, RequestLog) {
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let log_clone = log.clone();

    let handle = tokio::spawn(async move {
        let listener = TokioTcpListener::bind(format!("127.0.0.1:{}", port))
            .await
            .expect("Failed to bind fake upstream");

        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let log = log_clone.clone();
                    tokio::spawn(async move {
                        let Ok(parsed) = read_request_head(&mut socket).await else {
                            return;
                        };
                        log.lock().unwrap().push(format!(
                            "{} {}",
                            parsed.head.method, parsed.head.target
                        ));

                        match parsed.head.method.as_str() {
                            "CONNECT" => {
                                socket
                                    .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
                                    .await
                                    .ok();
                                // Echo the opaque tunnel bytes back
                                let mut buf = vec![0u8; 8192];
                                if !parsed.leftover.is_empty()
                                    && socket.write_all(&parsed.leftover).await.is_err()
                                {
                                    return;
                                }
                                loop {
                                    match socket.read(&mut buf).await {
                                        Ok(0) => break,
                                        Ok(n) => {
                                            if socket.write_all(&buf[..n]).await.is_err() {
                                                break;
                                            }
                                        }
                                        Err(_) => break,
                                    }
                                }
                            }
                            "HEAD" => {
                                socket
                                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
                                    .await
                                    .ok();
                            }
                            _ => {
                                let body = b"hello from upstream";
                                let response = format!(
                                    "HTTP/1.1 200 OK\r\n\
                                     Content-Type: text/plain\r\n\
                                     Content-Length: {}\r\n\
                                     X-Via: upstream\r\n\
                                     Connection: close\r\n\
                                     \r\n",
                                    body.len()
                                );
                                socket.write_all(response.as_bytes()).await.ok();
                                socket.write_all(body).await.ok();
                                socket.shutdown().await.ok();
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    (handle, log)
}

/// Wait for a server to accept connections
pub async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    for _ in 0..max_attempts {
        if TcpStream::connect(format!("127.0.0.1:{}", port))
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Read from the stream until it closes or `deadline` elapses
pub async fn read_until_close(stream: &mut TcpStream, deadline: Duration) -> Vec<u8> {
    let mut response = Vec::new();
    let mut buf = vec![0u8; 8192];
    let _ = tokio::time::timeout(deadline, async {
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&buf[..n]),
                Err(_) => break,
            }
        }
    })
    .await;
    response
}

/// Read exactly one tunnel-established response line pair from the stream
pub async fn read_established_response(stream: &mut TcpStream) -> String {
    let mut buf = vec![0u8; 1024];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("timed out waiting for proxy response")
        .expect("failed to read proxy response");
    String::from_utf8_lossy(&buf[..n]).into_owned()
}
