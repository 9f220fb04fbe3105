use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::{BoxFuture, Incoming, Transport};
use crate::config::ConnectionConfig;
use crate::error::{ConnectionErrorKind, Error, Result};

const REALTIME_PATH: &str = "/voice-live/realtime";

#[derive(Debug)]
pub struct WsStream(WebSocketStream<MaybeTlsStream<TcpStream>>);

impl futures::Stream for WsStream {
    type Item = std::result::Result<
        tokio_tungstenite::tungstenite::Message,
        tokio_tungstenite::tungstenite::Error,
    >;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.0).poll_next(cx)
    }
}

impl futures::Sink<tokio_tungstenite::tungstenite::Message> for WsStream {
    type Error = tokio_tungstenite::tungstenite::Error;

    fn poll_ready(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_ready(cx)
    }

    fn start_send(
        mut self: std::pin::Pin<&mut Self>,
        item: tokio_tungstenite::tungstenite::Message,
    ) -> std::result::Result<(), Self::Error> {
        std::pin::Pin::new(&mut self.0).start_send(item)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_close(cx)
    }
}

/// Build the realtime endpoint URL from the connection parameters.
///
/// # Errors
/// Returns an error if the configured endpoint is not a valid URL.
pub fn endpoint_url(config: &ConnectionConfig) -> Result<Url> {
    let mut url = Url::parse(&config.endpoint)?;
    if url.scheme() == "https" {
        // Url rejects cross-scheme changes for special schemes via
        // set_scheme, so rewrite textually.
        url = Url::parse(&config.endpoint.replacen("https://", "wss://", 1))?;
    }
    url.set_path(REALTIME_PATH);
    url.query_pairs_mut()
        .clear()
        .append_pair("api-version", &config.api_version)
        .append_pair("model", &config.model)
        .append_pair("api-key", &config.api_key);
    Ok(url)
}

/// Open the WebSocket connection to the Voice Live endpoint.
///
/// # Errors
/// Returns a `Connection` error with `Handshake` kind if the handshake
/// fails.
pub async fn connect(config: &ConnectionConfig) -> Result<WsStream> {
    let url = endpoint_url(config)?;
    tracing::debug!(
        endpoint = %config.endpoint,
        model = %config.model,
        api_version = %config.api_version,
        "connecting to Voice Live endpoint"
    );

    let (stream, _) = connect_async(url.as_str()).await.map_err(|err| Error::Connection {
        kind: ConnectionErrorKind::Handshake,
        message: err.to_string(),
    })?;

    tracing::info!("connected to Voice Live endpoint");
    Ok(WsStream(stream))
}

/// Map a WebSocket close code to a human-readable reason and a structured
/// retryability kind.
#[must_use]
pub fn close_reason(code: u16, raw_reason: &str) -> (String, ConnectionErrorKind) {
    match code {
        1000 => ("Normal closure".to_string(), ConnectionErrorKind::ClosedNormally),
        1006 => (
            "Connection lost abnormally (possible network or resource issue)".to_string(),
            ConnectionErrorKind::ResourceExhausted,
        ),
        1011 => (
            "Server error (insufficient resources)".to_string(),
            ConnectionErrorKind::ResourceExhausted,
        ),
        1012 => ("Service restart".to_string(), ConnectionErrorKind::ServiceRestart),
        1013 => (
            "Retry later (service overloaded)".to_string(),
            ConnectionErrorKind::ResourceExhausted,
        ),
        _ => (
            format!("Close code {code}: {raw_reason}"),
            ConnectionErrorKind::Other,
        ),
    }
}

/// Production [`Transport`] over a [`WsStream`]. Answers pings itself and
/// surfaces close frames as [`Incoming::Closed`].
pub struct WsTransport {
    stream: WsStream,
}

impl WsTransport {
    #[must_use]
    pub const fn new(stream: WsStream) -> Self {
        Self { stream }
    }
}

impl Transport for WsTransport {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.stream.send(Message::Text(text.into())).await?;
            Ok(())
        })
    }

    fn next_incoming(&mut self) -> BoxFuture<'_, Result<Option<Incoming>>> {
        Box::pin(async move {
            while let Some(msg) = self.stream.next().await {
                match msg? {
                    Message::Text(text) => return Ok(Some(Incoming::Frame(text.to_string()))),
                    Message::Close(frame) => {
                        let (code, reason) = frame.map_or((1005, String::new()), |f| {
                            (u16::from(f.code), f.reason.to_string())
                        });
                        return Ok(Some(Incoming::Closed { code, reason }));
                    }
                    Message::Ping(payload) => {
                        self.stream.send(Message::Pong(payload)).await?;
                    }
                    _ => (),
                }
            }
            Ok(None)
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "Client disconnecting".into(),
            };
            self.stream.send(Message::Close(Some(frame))).await?;
            Ok(())
        })
    }
}
