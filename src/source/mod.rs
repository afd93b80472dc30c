// Pluggable stream transports
//
// The `StreamTransport` trait hides whether frames arrive over a
// bidirectional WebSocket or a one-way HTTP event stream. The factory
// picks an implementation from the URL scheme and the compiled-in
// backends; a URL no backend can serve is reported as unsupported and
// the connection manager gives up rather than retrying.

#[cfg(feature = "sse")]
mod sse;
#[cfg(feature = "websocket")]
mod websocket;

#[cfg(feature = "sse")]
pub use sse::EventStreamTransport;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

use crate::types::{StreamError, StreamResult};
use async_trait::async_trait;

/// One inbound text message from the transport, already decoded.
pub type TransportMessage = StreamResult<String>;

/// Trait for all stream transports
///
/// `next_message` resolves to `None` when the remote side closed the
/// stream cleanly, and to `Some(Err(..))` on a transport fault. Either
/// way the connection manager treats the transport as lost.
#[async_trait]
pub trait StreamTransport: Send {
    /// Establish the connection.
    async fn open(&mut self) -> StreamResult<()>;

    /// Receive the next inbound message.
    async fn next_message(&mut self) -> Option<TransportMessage>;

    /// Close the connection. Must be safe to call at any point.
    async fn close(&mut self);
}

impl std::fmt::Debug for dyn StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn StreamTransport")
    }
}

fn url_scheme(url: &str) -> Option<&str> {
    url.split_once("://").map(|(scheme, _)| scheme)
}

/// Create a transport for the given URL.
///
/// `ws`/`wss` demand the socket transport. `http`/`https` use the push
/// transport when it is compiled in; without it the socket transport
/// takes over with a rewritten scheme. Anything else, or a scheme whose
/// only capable backend is compiled out, is unsupported.
pub fn create_transport(url: &str) -> StreamResult<Box<dyn StreamTransport>> {
    match url_scheme(url) {
        Some("ws") | Some("wss") => {
            #[cfg(feature = "websocket")]
            {
                Ok(Box::new(WebSocketTransport::new(url.to_string())))
            }
            #[cfg(not(feature = "websocket"))]
            {
                Err(StreamError::UnsupportedTransport(url.to_string()))
            }
        }
        Some("http") | Some("https") => {
            #[cfg(feature = "sse")]
            {
                Ok(Box::new(EventStreamTransport::new(url.to_string())))
            }
            #[cfg(all(not(feature = "sse"), feature = "websocket"))]
            {
                let ws_url = url
                    .replacen("https://", "wss://", 1)
                    .replacen("http://", "ws://", 1);
                Ok(Box::new(WebSocketTransport::new(ws_url)))
            }
            #[cfg(all(not(feature = "sse"), not(feature = "websocket")))]
            {
                Err(StreamError::UnsupportedTransport(url.to_string()))
            }
        }
        _ => Err(StreamError::UnsupportedTransport(url.to_string())),
    }
}
