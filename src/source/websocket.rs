// Bidirectional socket transport
//
// The diagnostics gateway speaks one text message per bus frame; binary
// messages are not part of the wire format and are skipped.

use super::{StreamTransport, TransportMessage};
use crate::types::{StreamError, StreamResult};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    url: String,
    stream: Option<WsStream>,
}

impl WebSocketTransport {
    pub fn new(url: String) -> Self {
        Self { url, stream: None }
    }
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    async fn open(&mut self) -> StreamResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        log::info!("Connecting to WebSocket: {}", self.url);

        let (ws_stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| StreamError::WebSocket(format!("Connection failed: {}", e)))?;

        log::info!("WebSocket connected");
        self.stream = Some(ws_stream);

        Ok(())
    }

    async fn next_message(&mut self) -> Option<TransportMessage> {
        let stream = self.stream.as_mut()?;

        loop {
            match stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(_)) => {
                    log::warn!("Ignoring binary WebSocket message");
                }
                Ok(Message::Close(_)) => {
                    log::info!("WebSocket closed by server");
                    return None;
                }
                // ping/pong handled by the library, raw frames unused
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Err(e) => {
                    return Some(Err(StreamError::WebSocket(e.to_string())));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
        }
    }
}
