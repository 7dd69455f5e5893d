// WebSocket transport: bridges a tokio-tungstenite stream to Link channels

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::transport::{Link, Transport, LINK_BUFFER};
use crate::error::{ClientError, ClientResult};

/// Opens `{base_url}/{user_id}`.
pub struct WebSocketTransport {
    base_url: String,
}

impl WebSocketTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        WebSocketTransport { base_url: base_url.into() }
    }

    fn url_for(&self, user_id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), user_id)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, user_id: &str) -> ClientResult<Link> {
        let url = self.url_for(user_id);
        info!("Opening real-time connection to {}", url);

        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Network(format!("WebSocket connect to {} failed: {}", url, e)))?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(LINK_BUFFER);
        let (in_tx, in_rx) = mpsc::channel::<String>(LINK_BUFFER);

        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = out_rx.recv() => {
                        let Some(text) = outbound else {
                            debug!("Outbound side dropped, closing socket");
                            let _ = sink.close().await;
                            break;
                        };
                        if let Err(e) = sink.send(WsMessage::text(text)).await {
                            warn!("WebSocket send error: {}", e);
                            break;
                        }
                    }
                    inbound = source.next() => {
                        match inbound {
                            Some(Ok(WsMessage::Text(text))) => {
                                if in_tx.send(text.as_str().to_owned()).await.is_err() {
                                    debug!("Inbound receiver dropped");
                                    break;
                                }
                            }
                            Some(Ok(WsMessage::Close(frame))) => {
                                info!("Server closed connection: {:?}", frame);
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!("WebSocket receive error: {}", e);
                                break;
                            }
                            None => {
                                info!("WebSocket stream ended");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(Link::new(out_tx, in_rx, Some(pump)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_user_url() {
        let transport = WebSocketTransport::new("ws://localhost:3000/ws/");
        assert_eq!(transport.url_for("u-1"), "ws://localhost:3000/ws/u-1");
    }

    #[tokio::test]
    async fn test_open_unreachable_fails() {
        let transport = WebSocketTransport::new("ws://127.0.0.1:9/ws");
        let result = transport.open("u1").await;
        assert!(matches!(result, Err(ClientError::Network(_))));
    }
}
