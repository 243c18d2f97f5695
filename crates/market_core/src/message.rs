use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientMessage {
    pub kind: MessageKind,
    pub text: String,
    pub expires_at: Instant,
}

/// Single message surface. Each `show` hands out a ticket; only the ticket of
/// the visible message may expire it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSlot {
    current: Option<TransientMessage>,
    ticket: u64,
}

impl MessageSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&TransientMessage> {
        self.current.as_ref()
    }

    pub fn show(&mut self, kind: MessageKind, text: impl Into<String>, expires_at: Instant) -> u64 {
        self.ticket += 1;
        self.current = Some(TransientMessage {
            kind,
            text: text.into(),
            expires_at,
        });
        self.ticket
    }

    pub fn clear(&mut self) {
        self.ticket += 1;
        self.current = None;
    }

    /// Clears the message installed under `ticket`. Returns false for a stale ticket.
    pub fn expire(&mut self, ticket: u64) -> bool {
        if ticket != self.ticket || self.current.is_none() {
            return false;
        }
        self.current = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stale_ticket_does_not_clear_newer_message() {
        let now = Instant::now();
        let mut slot = MessageSlot::new();
        let first = slot.show(MessageKind::Error, "A", now + Duration::from_secs(3));
        let second = slot.show(MessageKind::Success, "B", now + Duration::from_secs(4));

        assert!(!slot.expire(first));
        assert_eq!(slot.current().map(|m| m.text.as_str()), Some("B"));
        assert!(slot.expire(second));
        assert!(slot.current().is_none());
    }

    #[test]
    fn clear_invalidates_pending_ticket() {
        let mut slot = MessageSlot::new();
        let ticket = slot.show(MessageKind::Success, "saved", Instant::now());
        slot.clear();
        assert!(!slot.expire(ticket));
    }
}
