//! WebSocket transport for the payment stream

use super::{ChannelEvent, StreamChannel, StreamConnector};
use crate::error::TransportError;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// tokio-tungstenite backed [`StreamConnector`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl StreamConnector for TungsteniteConnector {
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<Box<dyn StreamChannel>, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::Connect(format!("Invalid stream URL {}: {}", url, e)))?;

        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Connect(format!("Invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Connect(format!("Invalid header value: {}", e)))?;
            request.headers_mut().insert(name, value);
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!(url, "Connected to payment stream WebSocket");
        Ok(Box::new(TungsteniteChannel { stream }))
    }
}

struct TungsteniteChannel {
    stream: WsStream,
}

#[async_trait::async_trait]
impl StreamChannel for TungsteniteChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            let event = match self.stream.next().await? {
                Ok(Message::Text(text)) => ChannelEvent::Message(text.into_bytes()),
                Ok(Message::Binary(data)) => ChannelEvent::Message(data),
                Ok(Message::Pong(data)) => ChannelEvent::Pong(data),
                // tungstenite answers server pings itself
                Ok(Message::Ping(_)) | Ok(Message::Frame(_)) => continue,
                Ok(Message::Close(frame)) => match frame {
                    Some(frame) => ChannelEvent::Closed {
                        code: Some(u16::from(frame.code)),
                        reason: frame.reason.to_string(),
                    },
                    None => ChannelEvent::Closed {
                        code: None,
                        reason: String::new(),
                    },
                },
                Err(e) => ChannelEvent::Error(e.to_string()),
            };
            return Some(event);
        }
    }

    async fn ping(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.stream
            .send(Message::Ping(payload))
            .await
            .map_err(|e| TransportError::Request(format!("Failed to send ping: {}", e)))
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.stream
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| TransportError::Request(format!("Failed to close stream: {}", e)))
    }
}
