//! Mock Spark WebSocket backend for integration tests
//!
//! Accepts sockets, records the handshake query and the request frame, then
//! plays a fixed script of replies on every connection.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;

/// One scripted action after the request frame arrives
#[derive(Debug, Clone)]
pub enum Step {
    /// Send a text frame
    Send(serde_json::Value),
    /// Close the socket with a close frame
    Close,
    /// Drop the TCP connection without a close handshake
    Hangup,
    /// Stop replying for a while
    Stall(Duration),
}

/// What the mock saw on one connection
#[derive(Debug, Clone)]
pub struct Captured {
    pub query: String,
    pub frame: serde_json::Value,
}

pub struct MockSpark {
    addr: SocketAddr,
    shutdown: CancellationToken,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl MockSpark {
    /// Start the mock, replaying `script` on every connection
    pub async fn start(script: Vec<Step>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let captured = Arc::new(Mutex::new(Vec::new()));

        let token = shutdown.clone();
        let sink = Arc::clone(&captured);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((tcp, _)) = accepted else { break };
                        tokio::spawn(serve(tcp, script.clone(), Arc::clone(&sink)));
                    }
                }
            }
        });

        Ok(Self {
            addr,
            shutdown,
            captured,
        })
    }

    /// Base URL for a Spark client; the last segment selects the domain
    pub fn base_url(&self, version: &str) -> String {
        format!("ws://{}/{version}", self.addr)
    }

    pub fn captured(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }
}

impl Drop for MockSpark {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn serve(tcp: TcpStream, script: Vec<Step>, captured: Arc<Mutex<Vec<Captured>>>) {
    let mut query = String::new();
    let callback = |request: &Request, response: Response| {
        query = request.uri().query().unwrap_or_default().to_owned();
        Ok::<_, ErrorResponse>(response)
    };

    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(tcp, callback).await else {
        return;
    };

    let frame = match ws.next().await {
        Some(Ok(Message::Text(text))) => serde_json::from_str(&text).unwrap_or_default(),
        _ => return,
    };
    captured.lock().unwrap().push(Captured { query, frame });

    for step in script {
        match step {
            Step::Send(value) => {
                if ws.send(Message::Text(value.to_string())).await.is_err() {
                    return;
                }
            }
            Step::Close => {
                let _ = ws.close(None).await;
                break;
            }
            Step::Hangup => return,
            Step::Stall(duration) => tokio::time::sleep(duration).await,
        }
    }

    // drain until the client closes
    while let Some(Ok(_)) = ws.next().await {}
}

/// A successful Spark frame
pub fn frame(sid: &str, status: i64, seq: u32, content: &str) -> serde_json::Value {
    serde_json::json!({
        "header": {"code": 0, "message": "Success", "sid": sid, "status": status},
        "payload": {
            "choices": {
                "status": status,
                "seq": seq,
                "text": [{"content": content, "role": "assistant", "index": 0}]
            }
        }
    })
}

/// The final frame, with usage
pub fn final_frame(sid: &str, seq: u32, content: &str) -> serde_json::Value {
    let mut value = frame(sid, 2, seq, content);
    value["payload"]["usage"] = serde_json::json!({
        "text": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
    });
    value
}

/// A frame carrying a vendor error code
pub fn error_frame(sid: &str, code: i64, message: &str) -> serde_json::Value {
    serde_json::json!({
        "header": {"code": code, "message": message, "sid": sid, "status": 2}
    })
}
