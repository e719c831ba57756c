#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Writes a command file with the standard header followed by `rows`.
pub fn commands_csv(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "type, user, order, sum").unwrap();
    for row in rows {
        writeln!(file, "{}", row).unwrap();
    }
    file.flush().unwrap();
    file
}

/// A canned HTTP response of the accrual stub.
pub struct StubResponse {
    status: &'static str,
    headers: Vec<(&'static str, String)>,
    body: String,
}

impl StubResponse {
    pub fn json(body: &str) -> Self {
        Self {
            status: "200 OK",
            headers: vec![("Content-Type", "application/json".to_string())],
            body: body.to_string(),
        }
    }

    pub fn status(number: &str, status: &str) -> Self {
        Self::json(&format!(r#"{{"order":"{}","status":"{}"}}"#, number, status))
    }

    pub fn processed(number: &str, accrual: &str) -> Self {
        Self::json(&format!(
            r#"{{"order":"{}","status":"PROCESSED","accrual":{}}}"#,
            number, accrual
        ))
    }

    pub fn no_content() -> Self {
        Self::raw("204 No Content")
    }

    pub fn too_many_requests(retry_after: Option<&str>) -> Self {
        let mut response = Self::raw("429 Too Many Requests");
        if let Some(value) = retry_after {
            response.headers.push(("Retry-After", value.to_string()));
        }
        response
    }

    pub fn raw(status: &'static str) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    fn render(&self) -> String {
        let mut out = format!("HTTP/1.1 {}\r\n", self.status);
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.body.len(),
            self.body
        ));
        out
    }
}

/// Starts a minimal accrual service on a random local port and returns its
/// base URL. `respond` gets the order number of each `GET /api/orders/{n}`.
pub async fn spawn_accrual_stub<F>(respond: F) -> String
where
    F: Fn(&str) -> StubResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let respond = respond.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&request);
                let path = request
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or_default();
                let response = match path.strip_prefix("/api/orders/") {
                    Some(number) => (*respond)(number),
                    None => StubResponse::raw("404 Not Found"),
                };
                let _ = socket.write_all(response.render().as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", address)
}

/// An address nothing listens on.
pub fn unreachable_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", address)
}
