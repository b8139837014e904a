//! Outbound command queue.
//!
//! Buffers commands issued before a live connection exists. FIFO order is
//! preserved on flush, and both size and age are bounded so the queue can
//! never grow without limit while disconnected.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::identifiers::CorrelationId;
use crate::protocol::CommandEnvelope;

// ============================================================================
// QueuedCommand
// ============================================================================

/// One not-yet-sent command and its issue timestamp.
#[derive(Debug, Clone)]
pub(crate) struct QueuedCommand {
    /// The envelope to send on flush.
    pub envelope: CommandEnvelope,
    /// When the caller issued the command.
    pub issued: Instant,
}

impl QueuedCommand {
    /// Correlation id of the pending call this entry belongs to.
    #[inline]
    pub fn correlation_id(&self) -> CorrelationId {
        self.envelope.correlation_id
    }
}

// ============================================================================
// OutboundQueue
// ============================================================================

/// FIFO buffer for commands issued while disconnected.
///
/// Owned solely by the controller client; pushing past `max_len` evicts
/// the oldest entry so the caller can fail it with `QueueOverflow`.
#[derive(Debug)]
pub(crate) struct OutboundQueue {
    entries: VecDeque<QueuedCommand>,
    max_len: usize,
}

impl OutboundQueue {
    /// Creates an empty queue bounded to `max_len` entries.
    pub fn new(max_len: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_len,
        }
    }

    /// Appends a command, evicting and returning the oldest entry when the
    /// size bound is exceeded.
    pub fn push(&mut self, command: QueuedCommand) -> Option<QueuedCommand> {
        self.entries.push_back(command);
        if self.entries.len() > self.max_len {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Removes and returns every entry issued more than `max_age` before
    /// `now`.
    ///
    /// Entries are in issue order, so expired ones are all at the front.
    pub fn take_expired(&mut self, max_age: Duration, now: Instant) -> Vec<QueuedCommand> {
        let mut expired = Vec::new();
        while let Some(front) = self.entries.front() {
            if now.duration_since(front.issued) > max_age {
                expired.push(self.entries.pop_front().expect("front exists"));
            } else {
                break;
            }
        }
        expired
    }

    /// Removes and returns all entries in FIFO order.
    pub fn drain(&mut self) -> Vec<QueuedCommand> {
        self.entries.drain(..).collect()
    }

    /// Returns the correlation ids of all queued commands.
    pub fn correlation_ids(&self) -> Vec<CorrelationId> {
        self.entries.iter().map(QueuedCommand::correlation_id).collect()
    }

    /// Returns the number of queued commands.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;

    fn entry(url: &str) -> QueuedCommand {
        QueuedCommand {
            envelope: CommandEnvelope::new(Command::Navigate {
                url: url.to_string(),
            }),
            issued: Instant::now(),
        }
    }

    fn url_of(command: &QueuedCommand) -> String {
        match &command.envelope.command {
            Command::Navigate { url } => url.clone(),
            other => panic!("expected navigate, got {other:?}"),
        }
    }

    #[test]
    fn test_drain_preserves_fifo_order() {
        let mut queue = OutboundQueue::new(10);
        queue.push(entry("a"));
        queue.push(entry("b"));
        queue.push(entry("c"));

        let drained: Vec<_> = queue.drain().iter().map(url_of).collect();
        assert_eq!(drained, ["a", "b", "c"]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_push_evicts_oldest_at_capacity() {
        let mut queue = OutboundQueue::new(2);
        assert!(queue.push(entry("a")).is_none());
        assert!(queue.push(entry("b")).is_none());

        let evicted = queue.push(entry("c")).expect("oldest evicted");
        assert_eq!(url_of(&evicted), "a");

        let remaining: Vec<_> = queue.drain().iter().map(url_of).collect();
        assert_eq!(remaining, ["b", "c"]);
    }

    #[test]
    fn test_take_expired_removes_only_stale_front() {
        let start = Instant::now();
        let mut queue = OutboundQueue::new(10);
        queue.push(QueuedCommand {
            issued: start,
            ..entry("stale")
        });
        queue.push(QueuedCommand {
            issued: start + Duration::from_secs(100),
            ..entry("fresh")
        });

        // Evaluate at start+120s: "stale" is 120s old, "fresh" only 20s.
        let expired = queue.take_expired(
            Duration::from_secs(60),
            start + Duration::from_secs(120),
        );
        assert_eq!(expired.len(), 1);
        assert_eq!(url_of(&expired[0]), "stale");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_take_expired_empty_when_all_fresh() {
        let mut queue = OutboundQueue::new(10);
        queue.push(entry("a"));

        let expired = queue.take_expired(Duration::from_secs(60), Instant::now());
        assert!(expired.is_empty());
        assert_eq!(queue.len(), 1);
    }
}
