//! Chat message log shown by the presentation layer.

use std::collections::VecDeque;

/// Who produced a chat line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Sent by this client (local echo).
    Local,
    /// Received from another participant through the relay.
    Remote,
}

/// A single chat line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub text: String,
    pub origin: Origin,
}

impl ChatMessage {
    #[must_use]
    pub fn local(text: impl Into<String>) -> Self {
        Self { text: text.into(), origin: Origin::Local }
    }

    #[must_use]
    pub fn remote(text: impl Into<String>) -> Self {
        Self { text: text.into(), origin: Origin::Remote }
    }
}

/// Append-only, receipt-ordered message log.
///
/// Unbounded by default. With a limit, the oldest entries are evicted once
/// the log is full.
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    entries: VecDeque<ChatMessage>,
    limit: Option<usize>,
}

impl MessageLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Log holding at most `limit` messages; `None` or zero means unbounded.
    #[must_use]
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self { entries: VecDeque::new(), limit: limit.filter(|n| *n > 0) }
    }

    pub fn push(&mut self, message: ChatMessage) {
        if let Some(limit) = self.limit {
            while self.entries.len() >= limit {
                self.entries.pop_front();
            }
        }
        self.entries.push_back(message);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Newest message, the one a view scrolls to.
    #[must_use]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.entries.iter()
    }

    /// Message texts in order.
    #[must_use]
    pub fn texts(&self) -> Vec<&str> {
        self.entries.iter().map(|m| m.text.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a ChatMessage;
    type IntoIter = std::collections::vec_deque::Iter<'a, ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
