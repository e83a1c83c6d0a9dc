//! A `ResultTransport` backed by per-call `tokio::sync::oneshot` channels:
//! one rendezvous channel per return path, since a return path here is an
//! explicit, separately allocated token rather than implicit in a
//! socket's framing.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use relaybus::{BusError, BusResult, Options, ResultMessage, ResultTransport, RpcMessage};

pub struct MemoryResultTransport {
    senders: Mutex<HashMap<String, oneshot::Sender<ResultMessage>>>,
    receivers: Mutex<HashMap<String, oneshot::Receiver<ResultMessage>>>,
}

impl MemoryResultTransport {
    pub fn new() -> Self {
        MemoryResultTransport {
            senders: Mutex::new(HashMap::new()),
            receivers: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryResultTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultTransport for MemoryResultTransport {
    async fn get_return_path(&self, rpc_message: &RpcMessage) -> BusResult<String> {
        let return_path = format!("inbox-{}", rpc_message.id);
        let (tx, rx) = oneshot::channel();
        self.senders.lock().insert(return_path.clone(), tx);
        self.receivers.lock().insert(return_path.clone(), rx);
        Ok(return_path)
    }

    async fn send_result(
        &self,
        _rpc_message: &RpcMessage,
        result_message: &ResultMessage,
        return_path: &str,
    ) -> BusResult<()> {
        let sender = self.senders.lock().remove(return_path);
        match sender {
            Some(sender) => {
                // The caller may have already timed out and dropped its
                // receiver; that is not this transport's error to report.
                let _ = sender.send(result_message.clone());
                Ok(())
            }
            None => Err(BusError::TransportError(format!(
                "no pending return path '{return_path}'"
            ))),
        }
    }

    async fn receive_result(
        &self,
        _rpc_message: &RpcMessage,
        return_path: &str,
        _options: &Options,
    ) -> BusResult<ResultMessage> {
        let receiver = self.receivers.lock().remove(return_path).ok_or_else(|| {
            BusError::TransportError(format!("no pending return path '{return_path}'"))
        })?;
        receiver
            .await
            .map_err(|_| BusError::TransportError(format!("return path '{return_path}' dropped")))
    }
}
