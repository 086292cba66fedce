use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Request captured by [`FakeService`].
#[derive(Debug)]
pub struct CapturedRequest {
    pub request_line: String,
    pub body: String,
}

/// One-shot HTTP responder standing in for a remote inference service.
pub struct FakeService {
    pub addr: SocketAddr,
    requests: mpsc::Receiver<CapturedRequest>,
    join: Option<JoinHandle<()>>,
}

impl FakeService {
    pub fn respond_once(status: u16, canned: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake service");
        let addr = listener.local_addr().expect("fake service addr");
        let (tx, rx) = mpsc::channel();
        let join = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut request_line = String::new();
            reader.read_line(&mut request_line).expect("request line");
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("header line");
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((k, v)) = line.split_once(':') {
                    if k.trim().eq_ignore_ascii_case("content-length") {
                        content_length = v.trim().parse().expect("content length");
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).expect("request body");

            let reason = if status == 200 { "OK" } else { "Error" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n{canned}",
                len = canned.len(),
            );
            stream
                .write_all(response.as_bytes())
                .expect("write response");
            let _ = stream.flush();
            let _ = tx.send(CapturedRequest {
                request_line: request_line.trim_end().to_string(),
                body: String::from_utf8_lossy(&body).to_string(),
            });
        });
        Self {
            addr,
            requests: rx,
            join: Some(join),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Wait for the single request the service answered.
    pub fn captured(mut self) -> CapturedRequest {
        let request = self
            .requests
            .recv_timeout(Duration::from_secs(5))
            .expect("fake service saw no request");
        if let Some(join) = self.join.take() {
            join.join().expect("fake service thread panicked");
        }
        request
    }
}
