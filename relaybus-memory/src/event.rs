//! An `EventTransport` backed by per-listener in-memory mailboxes.
//!
//! A listener's subscription is a durable queue it peeks rather than
//! pops, so a listener that fails to process an event sees the same
//! event again on its next poll. `consumption_complete` is what actually
//! advances the queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use relaybus::{BusResult, EventKey, EventMessage, EventStream, EventTransport, Options};

struct Mailbox {
    listen_for: Vec<EventKey>,
    queue: VecDeque<EventMessage>,
    notify: Arc<Notify>,
}

impl Mailbox {
    fn matches(&self, event_message: &EventMessage) -> bool {
        self.listen_for
            .iter()
            .any(|(api, evt)| *api == event_message.api_name && *evt == event_message.event_name)
    }
}

/// The shared fabric is kept behind its own `Arc` (independent of however
/// callers hold the transport itself) so `fetch`'s `'static` stream can
/// clone a handle to it without needing an owned `Arc<Self>` receiver.
pub struct MemoryEventTransport {
    mailboxes: Arc<Mutex<HashMap<String, Mailbox>>>,
}

impl MemoryEventTransport {
    pub fn new() -> Self {
        MemoryEventTransport {
            mailboxes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn listener_name(context: &Options) -> String {
        context
            .get("listener_name")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_default()
    }
}

impl Default for MemoryEventTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventTransport for MemoryEventTransport {
    async fn send_event(&self, event_message: &EventMessage, _options: &Options) -> BusResult<()> {
        let mut mailboxes = self.mailboxes.lock();
        for mailbox in mailboxes.values_mut() {
            if mailbox.matches(event_message) {
                mailbox.queue.push_back(event_message.clone());
                mailbox.notify.notify_one();
            }
        }
        Ok(())
    }

    /// Register a mailbox for `context`'s `listener_name` and return a
    /// stream that peeks its front element, waiting on the mailbox's
    /// `Notify` when empty. The front element is left in place until
    /// `consumption_complete` pops it, so a listener failure (which skips
    /// that call) causes the same event to be peeked again on the next
    /// poll — the redelivery semantics this transport exists to model.
    fn fetch(&self, listen_for: Vec<EventKey>, context: Options) -> EventStream {
        let name = Self::listener_name(&context);
        let notify = Arc::new(Notify::new());
        self.mailboxes.lock().insert(
            name.clone(),
            Mailbox {
                listen_for,
                queue: VecDeque::new(),
                notify: notify.clone(),
            },
        );

        let mailboxes = self.mailboxes.clone();
        // `last_yielded` tracks the id of the message handed out on the
        // previous poll. Handing out the same front message again means
        // the listener failed and didn't call `consumption_complete`; we
        // yield once before re-polling so a perpetually-failing listener
        // doesn't busy-spin the executor. First-time delivery never hits
        // this path.
        let stream = futures::stream::unfold(None::<String>, move |last_yielded| {
            let mailboxes = mailboxes.clone();
            let name = name.clone();
            let notify = notify.clone();
            async move {
                loop {
                    let front = mailboxes
                        .lock()
                        .get(&name)
                        .and_then(|mailbox| mailbox.queue.front().cloned());
                    if let Some(message) = front {
                        if last_yielded.as_deref() == Some(message.id.as_str()) {
                            tokio::task::yield_now().await;
                        }
                        let next_state = Some(message.id.clone());
                        return Some((message, next_state));
                    }
                    notify.notified().await;
                }
            }
        });
        Box::pin(stream)
    }

    async fn consumption_complete(
        &self,
        event_message: &EventMessage,
        context: &Options,
    ) -> BusResult<()> {
        let name = Self::listener_name(context);
        let mut mailboxes = self.mailboxes.lock();
        if let Some(mailbox) = mailboxes.get_mut(&name) {
            if let Some(front) = mailbox.queue.front() {
                if front.id == event_message.id {
                    mailbox.queue.pop_front();
                }
            }
        }
        Ok(())
    }
}
