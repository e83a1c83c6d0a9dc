//! An `RpcTransport` backed by a `tokio::sync::broadcast` channel: every
//! call is published once and every open `consume_rpcs` subscription
//! receives a copy, filtering down to the `api_name`s it was asked to
//! serve.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::trace;

use relaybus::{BusResult, Options, RpcMessage, RpcStream, RpcTransport};

/// Capacity of the broadcast channel backing this transport. Lagging
/// subscribers (ones that fall more than this many calls behind) drop
/// messages, which `consume_rpcs` surfaces as a gap in its stream rather
/// than an error — acceptable for a loopback transport used in tests.
const CHANNEL_CAPACITY: usize = 1024;

pub struct MemoryRpcTransport {
    sender: broadcast::Sender<RpcMessage>,
}

impl MemoryRpcTransport {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        MemoryRpcTransport { sender }
    }
}

impl Default for MemoryRpcTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RpcTransport for MemoryRpcTransport {
    async fn call_rpc(&self, rpc_message: &RpcMessage, _options: &Options) -> BusResult<()> {
        trace!(call = %rpc_message, "publishing RPC call");
        // A send with no active receivers is not an error here: a server
        // may start consuming after the call was published, same as any
        // other pub/sub fabric.
        let _ = self.sender.send(rpc_message.clone());
        Ok(())
    }

    async fn consume_rpcs(&self, apis: Vec<String>) -> BusResult<RpcStream> {
        let receiver = self.sender.subscribe();
        let stream = futures::stream::unfold(receiver, move |mut receiver| {
            let apis = apis.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(message) if apis.contains(&message.api_name) => {
                            return Some((message, receiver))
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
