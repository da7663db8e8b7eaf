use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::config::{BackendConfig, ChannelConfig};

/// Something that can open a push connection to the backend.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PushConnection>>;
}

#[async_trait]
pub trait PushConnection: Send {
    /// Next text frame. `None` once the peer closed the connection.
    async fn next_text(&mut self) -> Option<Result<String>>;
}

/// Derive the push endpoint from the HTTP API base: `http` becomes `ws`,
/// `https` becomes `wss`, and the channel path is appended.
pub fn events_url(api_base: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(api_base).with_context(|| format!("invalid api base {api_base}"))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(anyhow!("unsupported api base scheme {other}")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot switch {api_base} to {scheme}"))?;

    let joined = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    Ok(url)
}

pub struct WsTransport {
    url: Url,
}

impl WsTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn from_config(backend: &BackendConfig, channel: &ChannelConfig) -> Result<Self> {
        Ok(Self::new(events_url(backend.base(), &channel.path)?))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self) -> Result<Box<dyn PushConnection>> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("connect {}", self.url))?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushConnection for WsConnection {
    async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes).map_err(Into::into));
                }
                Ok(Message::Close(_)) => return None,
                // ping/pong are answered by tungstenite itself
                Ok(_) => continue,
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_base_maps_to_ws() {
        let url = events_url("http://127.0.0.1:8000", "/ws/events").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8000/ws/events");
    }

    #[test]
    fn https_base_with_prefix_maps_to_wss() {
        let url = events_url("https://kiosk.example.org/api/", "ws/events").unwrap();
        assert_eq!(url.as_str(), "wss://kiosk.example.org/api/ws/events");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(events_url("ftp://host", "/ws/events").is_err());
        assert!(events_url("not a url", "/ws/events").is_err());
    }
}
