use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::ClientFrame;
use crate::error::{ClientError, ClientResult};

/// Capacity of each direction of a link.
pub const LINK_BUFFER: usize = 100;

/// Opens one real-time connection scoped to a user.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, user_id: &str) -> ClientResult<Link>;
}

/// One open connection: outbound and inbound text frames, plus the task
/// pumping them. Dropping the link aborts the task.
pub struct Link {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<String>,
    pump: Option<JoinHandle<()>>,
}

impl Link {
    pub fn new(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<String>, pump: Option<JoinHandle<()>>) -> Self {
        Link { outbound, inbound, pump }
    }

    /// Queue a frame without waiting. A full buffer rejects the frame.
    pub fn send(&self, frame: &ClientFrame) -> ClientResult<()> {
        let text = frame.encode()?;
        match self.outbound.try_send(text) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("Outbound buffer full, dropping {:?}", frame);
                Err(ClientError::Network("outbound buffer full".to_string()))
            }
            Err(TrySendError::Closed(_)) => Err(ClientError::ConnectionClosed),
        }
    }

    /// Next inbound frame; `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.inbound.close();
        if let Some(pump) = self.pump.take() {
            debug!("Aborting link pump task");
            pump.abort();
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.shutdown();
    }
}
