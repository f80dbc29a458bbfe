//! Mock HTTP `CONNECT` proxy for integration tests
//!
//! Records each handshake head, answers with a fixed status line and, when
//! that line accepts the tunnel, splices the client to the requested target.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

pub const ESTABLISHED: &str = "HTTP/1.1 200 Connection established";

pub struct MockProxy {
    addr: SocketAddr,
    shutdown: CancellationToken,
    heads: Arc<Mutex<Vec<String>>>,
}

impl MockProxy {
    /// Start the proxy, answering every handshake with `status_line`
    pub async fn start(status_line: &'static str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let heads = Arc::new(Mutex::new(Vec::new()));

        let token = shutdown.clone();
        let sink = Arc::clone(&heads);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((tcp, _)) = accepted else { break };
                        tokio::spawn(serve(tcp, status_line, Arc::clone(&sink)));
                    }
                }
            }
        });

        Ok(Self { addr, shutdown, heads })
    }

    /// Proxy URL, optionally with Basic credentials
    pub fn url(&self, credentials: Option<(&str, &str)>) -> String {
        match credentials {
            Some((user, password)) => format!("http://{user}:{password}@{}", self.addr),
            None => format!("http://{}", self.addr),
        }
    }

    /// Handshake heads received so far
    pub fn heads(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }
}

impl Drop for MockProxy {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn serve(mut client: TcpStream, status_line: &'static str, heads: Arc<Mutex<Vec<String>>>) {
    let mut head = Vec::new();
    let mut byte = [0_u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match client.read(&mut byte).await {
            Ok(1) => head.push(byte[0]),
            _ => return,
        }
    }

    let head = String::from_utf8_lossy(&head).into_owned();
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_owned);
    heads.lock().unwrap().push(head);

    if client
        .write_all(format!("{status_line}\r\n\r\n").as_bytes())
        .await
        .is_err()
    {
        return;
    }
    if status_line != ESTABLISHED {
        return;
    }

    let Some(target) = target else { return };
    let Ok(mut upstream) = TcpStream::connect(target).await else {
        return;
    };
    let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
}
