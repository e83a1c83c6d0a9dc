//! Consumer runtime: the RPC server loop and event consumer loops, each a
//! cooperatively-cancellable background task.
//!
//! Each loop serves one message at a time and never lets a single failed
//! dispatch end the loop. One `tokio::spawn`ed task runs per consumer
//! group, since the registry model means a single process may host many
//! APIs and many distinct event listeners at once, each wanting its own
//! cancellable stream.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::BusResult;
use crate::message::{EventKey, EventMessage, ResultMessage};
use crate::registry::Registry;
use crate::transport::{EventTransport, Options, ResultTransport, RpcTransport};

/// A subscribed listener callback: takes the event, returns a future
/// resolving to success/failure. `Arc`-wrapped so one listener can be
/// shared across clones of a `BusPath` without re-registering.
pub type EventListenerFn = Arc<dyn Fn(EventMessage) -> BoxFuture<'static, BusResult<()>> + Send + Sync>;

/// Spawn the RPC server loop: consume calls directed at `apis`, dispatch
/// each to the registry, and send back a `ResultMessage` (success or
/// captured failure) via the Result Transport. A failed invocation is
/// captured and returned to the caller — it never ends the loop.
pub fn spawn_rpc_server_loop(
    registry: Arc<Registry>,
    rpc_transport: Arc<dyn RpcTransport>,
    result_transport: Arc<dyn ResultTransport>,
    apis: Vec<String>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = match rpc_transport.consume_rpcs(apis).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "failed to open RPC consumer stream");
                return;
            }
        };

        loop {
            let rpc_message = tokio::select! {
                _ = token.cancelled() => {
                    debug!("RPC server loop cancelled");
                    break;
                }
                next = stream.next() => match next {
                    Some(m) => m,
                    None => {
                        debug!("RPC consumer stream ended");
                        break;
                    }
                },
            };

            let result_message = match registry.get(&rpc_message.api_name) {
                Ok(api) => {
                    match api
                        .call(&rpc_message.procedure_name, rpc_message.kwargs.clone())
                        .await
                    {
                        Ok(value) => ResultMessage::success(rpc_message.id.clone(), value),
                        Err(e) => {
                            warn!(
                                api = %rpc_message.api_name,
                                procedure = %rpc_message.procedure_name,
                                error = %e,
                                "RPC dispatch failed"
                            );
                            ResultMessage::failure(rpc_message.id.clone(), &e)
                        }
                    }
                }
                Err(e) => {
                    warn!(api = %rpc_message.api_name, error = %e, "RPC targets unknown API");
                    ResultMessage::failure(rpc_message.id.clone(), &e)
                }
            };

            let return_path = rpc_message.return_path.clone();
            if let Err(e) = result_transport
                .send_result(&rpc_message, &result_message, &return_path)
                .await
            {
                error!(error = %e, "failed to send RPC result");
            }
        }
    })
}

/// Spawn an event consumer loop for one `(listener_name, listen_for)`
/// group: open the subscription, dispatch each matching message to
/// `listener`, and signal `consumption_complete` on success only.
pub fn spawn_event_consumer_loop(
    event_transport: Arc<dyn EventTransport>,
    listener_name: String,
    listen_for: Vec<EventKey>,
    listener: EventListenerFn,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let context = build_context(&listener_name);
        let mut stream = match event_transport.consume(listen_for.clone(), context.clone()) {
            Ok(stream) => stream,
            Err(e) => {
                error!(listener = %listener_name, error = %e, "failed to open event consumer stream");
                return;
            }
        };

        loop {
            let event_message = tokio::select! {
                _ = token.cancelled() => {
                    debug!(listener = %listener_name, "event consumer loop cancelled");
                    break;
                }
                next = stream.next() => match next {
                    Some(m) => m,
                    None => {
                        debug!(listener = %listener_name, "event consumer stream ended");
                        break;
                    }
                },
            };

            // Events outside listen_for may still be yielded; ignore them
            // silently rather than invoking the listener.
            let matches = listen_for
                .iter()
                .any(|(api, evt)| *api == event_message.api_name && *evt == event_message.event_name);
            if !matches {
                continue;
            }

            match listener(event_message.clone()).await {
                Ok(()) => {
                    if let Err(e) = event_transport
                        .consumption_complete(&event_message, &context)
                        .await
                    {
                        error!(listener = %listener_name, error = %e, "failed to ack consumption");
                    }
                }
                Err(e) => {
                    warn!(
                        listener = %listener_name,
                        event = %event_message.canonical_name(),
                        error = %e,
                        "listener failed; relying on transport redelivery"
                    );
                }
            }
        }
    })
}

fn build_context(listener_name: &str) -> Options {
    let mut context = Options::new();
    context.insert(
        "listener_name".to_string(),
        serde_json::Value::String(listener_name.to_string()),
    );
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedEvents {
        messages: Mutex<Vec<EventMessage>>,
        completed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventTransport for ScriptedEvents {
        async fn send_event(&self, _event_message: &EventMessage, _options: &Options) -> BusResult<()> {
            Ok(())
        }

        fn fetch(&self, _listen_for: Vec<EventKey>, _context: Options) -> crate::transport::EventStream {
            let messages = self.messages.lock().unwrap().clone();
            Box::pin(stream::iter(messages))
        }

        async fn consumption_complete(
            &self,
            _event_message: &EventMessage,
            _context: &Options,
        ) -> BusResult<()> {
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn non_matching_events_are_ignored() {
        let matching = EventMessage::new("auth", "logged_in", Map::new());
        let other = EventMessage::new("auth", "logged_out", Map::new());
        let completed = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(ScriptedEvents {
            messages: Mutex::new(vec![other, matching.clone()]),
            completed: completed.clone(),
        });

        let invoked = Arc::new(AtomicUsize::new(0));
        let invoked2 = invoked.clone();
        let listener: EventListenerFn = Arc::new(move |_msg| {
            invoked2.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        });

        let token = CancellationToken::new();
        let handle = spawn_event_consumer_loop(
            transport,
            "audit".to_string(),
            vec![("auth".to_string(), "logged_in".to_string())],
            listener,
            token.clone(),
        );

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        token.cancel();
        let _ = handle.await;

        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_listener_does_not_trigger_consumption_complete() {
        let matching = EventMessage::new("auth", "logged_in", Map::new());
        let completed = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(ScriptedEvents {
            messages: Mutex::new(vec![matching]),
            completed: completed.clone(),
        });

        let listener: EventListenerFn = Arc::new(|_msg| {
            Box::pin(async {
                Err(crate::error::BusError::InvalidParameters {
                    name: "x".to_string(),
                    reason: "boom".to_string(),
                })
            })
        });

        let token = CancellationToken::new();
        let handle = spawn_event_consumer_loop(
            transport,
            "audit".to_string(),
            vec![("auth".to_string(), "logged_in".to_string())],
            listener,
            token.clone(),
        );

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        token.cancel();
        let _ = handle.await;

        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_api_produces_error_result_without_killing_loop() {
        use crate::message::RpcMessage;

        struct ScriptedRpcs {
            messages: Mutex<Vec<RpcMessage>>,
        }
        #[async_trait]
        impl RpcTransport for ScriptedRpcs {
            async fn call_rpc(&self, _m: &RpcMessage, _o: &Options) -> BusResult<()> {
                Ok(())
            }
            async fn consume_rpcs(&self, _apis: Vec<String>) -> BusResult<crate::transport::RpcStream> {
                let messages = self.messages.lock().unwrap().clone();
                Ok(Box::pin(stream::iter(messages)))
            }
        }

        struct RecordingResult {
            sent: Arc<Mutex<Vec<ResultMessage>>>,
        }
        #[async_trait]
        impl ResultTransport for RecordingResult {
            async fn get_return_path(&self, _m: &RpcMessage) -> BusResult<String> {
                Ok("p".to_string())
            }
            async fn send_result(
                &self,
                _m: &RpcMessage,
                result_message: &ResultMessage,
                _return_path: &str,
            ) -> BusResult<()> {
                self.sent.lock().unwrap().push(result_message.clone());
                Ok(())
            }
            async fn receive_result(
                &self,
                _m: &RpcMessage,
                _r: &str,
                _o: &Options,
            ) -> BusResult<ResultMessage> {
                unreachable!("not exercised by this test")
            }
        }

        let mut call = RpcMessage::new("nope", "do", Map::new());
        call.return_path = "p".to_string();
        let rpcs = Arc::new(ScriptedRpcs {
            messages: Mutex::new(vec![call]),
        });
        let sent = Arc::new(Mutex::new(Vec::new()));
        let results = Arc::new(RecordingResult { sent: sent.clone() });

        let token = CancellationToken::new();
        let handle = spawn_rpc_server_loop(
            Arc::new(Registry::new()),
            rpcs,
            results,
            vec![],
            token.clone(),
        );

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        token.cancel();
        let _ = handle.await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].error);
        assert!(sent[0]
            .result
            .as_str()
            .unwrap_or_default()
            .contains("nope"));
    }
}
