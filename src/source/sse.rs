// One-way push transport (text/event-stream)
//
// Consumes a server-sent-events endpoint: the response body is a long-
// lived byte stream, events are blank-line separated blocks, and only
// their `data:` lines carry frame payloads.

use super::{StreamTransport, TransportMessage};
use crate::types::{StreamError, StreamResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

pub struct EventStreamTransport {
    url: String,
    stream: Option<ByteStream>,
    // partial event text carried across chunk boundaries
    buf: String,
    // complete data payloads not yet handed out
    pending: VecDeque<String>,
}

impl EventStreamTransport {
    pub fn new(url: String) -> Self {
        Self {
            url,
            stream: None,
            buf: String::new(),
            pending: VecDeque::new(),
        }
    }

    /// Split completed event blocks out of the accumulator and queue
    /// their data payloads.
    fn drain_events(&mut self) {
        while let Some(pos) = self.buf.find("\n\n") {
            let block: String = self.buf.drain(..pos + 2).collect();
            let mut data_lines: Vec<&str> = Vec::new();
            for line in block.lines() {
                if let Some(rest) = line.strip_prefix("data:") {
                    data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
                }
            }
            if !data_lines.is_empty() {
                self.pending.push_back(data_lines.join("\n"));
            }
        }
    }
}

#[async_trait]
impl StreamTransport for EventStreamTransport {
    async fn open(&mut self) -> StreamResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        log::info!("Connecting to event stream: {}", self.url);

        let response = reqwest::Client::new()
            .get(&self.url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| StreamError::EventStream(format!("Connection failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(StreamError::EventStream(format!(
                "Endpoint returned {}",
                response.status()
            )));
        }

        log::info!("Event stream connected");
        self.stream = Some(Box::pin(response.bytes_stream()));

        Ok(())
    }

    async fn next_message(&mut self) -> Option<TransportMessage> {
        loop {
            if let Some(payload) = self.pending.pop_front() {
                return Some(Ok(payload));
            }

            let stream = self.stream.as_mut()?;
            match stream.next().await {
                Some(Ok(chunk)) => {
                    self.buf
                        .push_str(&String::from_utf8_lossy(&chunk).replace('\r', ""));
                    self.drain_events();
                }
                Some(Err(e)) => {
                    return Some(Err(StreamError::EventStream(e.to_string())));
                }
                None => {
                    log::info!("Event stream ended");
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        self.stream = None;
        self.buf.clear();
        self.pending.clear();
    }
}
