//! tokio-tungstenite socket driver

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use resock_core::{CloseCode, Inbound, Message, SocketDriver};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to one URL with a fixed set of handshake headers
#[derive(Clone)]
pub struct TungsteniteDriver {
    url: String,
    headers: Vec<(String, String)>,
    config: Option<WebSocketConfig>,
}

impl TungsteniteDriver {
    pub(crate) fn new(
        url: String,
        headers: Vec<(String, String)>,
        config: Option<WebSocketConfig>,
    ) -> Self {
        Self {
            url,
            headers,
            config,
        }
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for TungsteniteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TungsteniteDriver")
            .field("url", &self.url)
            .field("headers", &self.headers.len())
            .finish()
    }
}

fn to_ws(message: Message) -> WsMessage {
    match message {
        Message::Text(text) => WsMessage::Text(text),
        Message::Binary(data) => WsMessage::Binary(data),
    }
}

fn close_to_inbound(frame: Option<CloseFrame<'static>>) -> Inbound {
    match frame {
        Some(frame) => Inbound::Close {
            code: Some(CloseCode(u16::from(frame.code))),
            reason: Some(frame.reason.into_owned()).filter(|r| !r.is_empty()),
        },
        None => Inbound::Close {
            code: None,
            reason: None,
        },
    }
}

#[async_trait]
impl SocketDriver for TungsteniteDriver {
    type Writer = SplitSink<Socket, WsMessage>;
    type Reader = SplitStream<Socket>;
    type Error = tungstenite::Error;

    async fn connect(&self) -> Result<(Self::Writer, Self::Reader), Self::Error> {
        let mut request = self.url.as_str().into_client_request()?;
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| tungstenite::Error::HttpFormat(e.into()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| tungstenite::Error::HttpFormat(e.into()))?;
            request.headers_mut().insert(name, value);
        }

        tracing::debug!(url = %self.url, "WebSocket handshake");
        let (stream, response) = connect_async_with_config(request, self.config.clone(), false).await?;
        tracing::debug!(url = %self.url, status = %response.status(), "WebSocket connected");

        Ok(stream.split())
    }

    async fn write(&self, writer: &mut Self::Writer, message: Message) -> Result<(), Self::Error> {
        writer.send(to_ws(message)).await
    }

    async fn close(
        &self,
        writer: &mut Self::Writer,
        code: CloseCode,
        reason: &str,
    ) -> Result<(), Self::Error> {
        let frame = CloseFrame {
            code: code.as_u16().into(),
            reason: reason.to_owned().into(),
        };
        writer.send(WsMessage::Close(Some(frame))).await
    }

    async fn read(&self, reader: &mut Self::Reader) -> Option<Result<Inbound, Self::Error>> {
        loop {
            let next = match reader.next().await? {
                Ok(WsMessage::Text(text)) => Ok(Inbound::Text(text.into_bytes())),
                Ok(WsMessage::Binary(data)) => Ok(Inbound::Binary(data)),
                Ok(WsMessage::Close(frame)) => Ok(close_to_inbound(frame)),
                // Pings are answered by tungstenite itself
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {
                    continue
                }
                Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                    return None
                }
                Err(e) => Err(e),
            };
            return Some(next);
        }
    }
}
