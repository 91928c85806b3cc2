use serde::Serialize;
use strum::Display;

use crate::error::MessageKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum Severity {
    Error,
    Information,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub key: MessageKey,
    pub severity: Severity,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Message {
    pub fn new(key: MessageKey, detail: Option<String>) -> Self {
        let severity = match key {
            MessageKey::ClearingNotYetDone => Severity::Information,
            _ => Severity::Error,
        };
        Self {
            key,
            severity,
            text: key.default_text().to_string(),
            detail,
        }
    }
}

/// Messages shown to the user. Each new user action starts a fresh list;
/// after the list was dismissed, background failures stay quiet until the
/// user acts again.
#[derive(Debug, Clone)]
pub struct MessageLog {
    messages: Vec<Message>,
    user_acted: bool,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            user_acted: true,
        }
    }
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_action(&mut self) {
        self.messages.clear();
        self.user_acted = true;
    }

    pub fn dismiss(&mut self) {
        self.messages.clear();
        self.user_acted = false;
    }

    pub fn report(&mut self, key: MessageKey, detail: Option<String>) {
        tracing::warn!(key = %key, detail = detail.as_deref().unwrap_or(""), "message reported");
        self.messages.push(Message::new(key, detail));
    }

    /// A failed read is reported only when it came back with a response
    /// that is not an abort, and the user acted since the last dismiss.
    pub fn report_transport(&mut self, status_text: Option<&str>, detail: Option<String>) -> bool {
        let reportable = matches!(status_text, Some(status) if status != "abort") && self.user_acted;
        if reportable {
            self.report(MessageKey::Transport, detail);
        } else {
            tracing::debug!(status = status_text.unwrap_or(""), "transport failure not reported");
        }
        reportable
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
