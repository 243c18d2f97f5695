use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use market_core::{ClientError, MessageKind, MessageSlot, TransientMessage};
use market_logging::market_trace;

use crate::config::MessageSettings;
use crate::lock;

struct Surface {
    slot: MessageSlot,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    surface: Mutex<Surface>,
    view: watch::Sender<Option<TransientMessage>>,
}

impl Inner {
    fn expire(&self, ticket: u64) {
        let mut surface = lock(&self.surface);
        if surface.slot.expire(ticket) {
            surface.timer = None;
            self.view.send_replace(None);
        }
    }
}

/// Auto-expiring status message. At most one expiry timer is pending at a time.
///
/// Must be used from within a tokio runtime.
pub struct MessageStore {
    settings: MessageSettings,
    inner: Arc<Inner>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new(MessageSettings::default())
    }
}

impl MessageStore {
    pub fn new(settings: MessageSettings) -> Self {
        let (view, _) = watch::channel(None);
        Self {
            settings,
            inner: Arc::new(Inner {
                surface: Mutex::new(Surface {
                    slot: MessageSlot::new(),
                    timer: None,
                }),
                view,
            }),
        }
    }

    pub fn current(&self) -> Option<TransientMessage> {
        self.inner.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<TransientMessage>> {
        self.inner.view.subscribe()
    }

    pub fn show(&self, kind: MessageKind, text: impl Into<String>) {
        let deadline = Instant::now() + self.settings.ttl;
        let mut surface = lock(&self.inner.surface);
        if let Some(timer) = surface.timer.take() {
            timer.abort();
        }
        let ticket = surface.slot.show(kind, text, deadline.into_std());
        self.inner.view.send_replace(surface.slot.current().cloned());

        let inner = Arc::clone(&self.inner);
        surface.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            market_trace!("message {ticket} expired");
            inner.expire(ticket);
        }));
    }

    pub fn success(&self, text: impl Into<String>) {
        self.show(MessageKind::Success, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.show(MessageKind::Error, text);
    }

    /// Shows `err` unless it is a cancellation. Returns whether a message was shown.
    pub fn report(&self, err: &ClientError) -> bool {
        if err.is_cancelled() {
            return false;
        }
        self.error(err.to_string());
        true
    }

    pub fn clear(&self) {
        let mut surface = lock(&self.inner.surface);
        if let Some(timer) = surface.timer.take() {
            timer.abort();
        }
        surface.slot.clear();
        self.inner.view.send_replace(None);
    }

    pub fn has_pending_timer(&self) -> bool {
        lock(&self.inner.surface)
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for MessageStore {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.inner.surface).timer.take() {
            timer.abort();
        }
    }
}
