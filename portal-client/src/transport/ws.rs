//! WebSocket push channel (tokio-tungstenite).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{PushChannel, PushConnector, TransportError};

/// Opens WebSocket channels to `<base>/ws`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Connect to the push endpoint under `base_url` (`ws://` or `wss://`).
    pub fn new(base_url: &str) -> Self {
        Self {
            url: format!("{}/ws", base_url.trim_end_matches('/')),
        }
    }

    /// The full endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushConnector for WsConnector {
    async fn open(&self) -> Result<Box<dyn PushChannel>, TransportError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        tracing::debug!("push channel open: {}", self.url);
        Ok(Box::new(WsChannel { stream }))
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushChannel for WsChannel {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.stream
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        // No read timeout: the channel may sit idle for hours.
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                // Undecodable bytes fail JSON parsing later and are reported
                // as a protocol error; they must not end the channel.
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!("relay closed push channel: {:?}", frame);
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::ReceiveFailed(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("push channel close: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipportal_types::PushEvent;
    use tokio::net::TcpListener;

    #[test]
    fn endpoint_appends_ws_path() {
        assert_eq!(
            WsConnector::new("wss://relay.example").url(),
            "wss://relay.example/ws"
        );
        assert_eq!(
            WsConnector::new("ws://127.0.0.1:8000/").url(),
            "ws://127.0.0.1:8000/ws"
        );
    }

    #[tokio::test]
    async fn unreachable_relay_fails_to_open() {
        let connector = WsConnector::new("ws://127.0.0.1:9");
        assert!(matches!(
            connector.open().await,
            Err(TransportError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn undecodable_binary_frame_keeps_channel_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Binary(vec![0xff, 0xfe])).await.unwrap();
            ws.send(Message::Text(r#"{"event":"forbidden"}"#.into()))
                .await
                .unwrap();
            // Hold the socket until the client closes.
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let mut channel = WsConnector::new(&format!("ws://{}", addr))
            .open()
            .await
            .unwrap();

        let garbled = channel.next_frame().await.unwrap().unwrap();
        assert!(PushEvent::parse(&garbled).is_err());

        let next = channel.next_frame().await.unwrap().unwrap();
        assert_eq!(PushEvent::parse(&next).unwrap(), PushEvent::Forbidden);

        channel.close().await;
        server.await.unwrap();
    }
}
