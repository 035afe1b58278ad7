// Chat session manager
//
// The transcript is append-only. A submission is a two-phase write:
//   1. the user turn is appended immediately, before any network I/O
//   2. exactly one assistant turn is appended when the reply resolves
// Phase 2 never touches phase 1's turn, so the user's message stays visible
// even when the assistant call fails (the reply degrades to a fixed apology).
//
// Overlapping sends are prevented by `&mut self`, not by any queue here.

use serde::Serialize;

use crate::api::{ApiClient, CHAT_FALLBACK_REPLY};

/// Canned questions offered next to the chat input
pub const SUGGESTED_QUESTIONS: [&str; 4] = [
    "How much did I spend on groceries last month?",
    "Show my top 5 expenses in January.",
    "What was my average daily spending last week?",
    "How many trees have I saved this year?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
}

/// Ordered, append-only log of chat turns
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatTranscript {
    turns: Vec<ChatTurn>,
}

impl ChatTranscript {
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    fn append(&mut self, speaker: Speaker, text: impl Into<String>) -> &ChatTurn {
        self.turns.push(ChatTurn {
            speaker,
            text: text.into(),
        });
        // Just pushed, so never empty
        &self.turns[self.turns.len() - 1]
    }

    fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Transcript plus the not-yet-submitted input
#[derive(Debug, Default)]
pub struct ChatSession {
    transcript: ChatTranscript,
    pending: String,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &ChatTranscript {
        &self.transcript
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn set_pending(&mut self, text: impl Into<String>) {
        self.pending = text.into();
    }

    /// Opening message for a fresh session. Only added to an empty transcript.
    pub fn greet(&mut self, name: &str) {
        if !self.transcript.is_empty() {
            return;
        }
        self.transcript.append(
            Speaker::Assistant,
            format!(
                "Hello {}! I'm your Eco Assistant. I can help you analyze your spending \
                 patterns and environmental impact. How can I help you today?",
                name
            ),
        );
    }

    /// Submit `text`. Returns the assistant turn, or `None` if `text` was blank.
    pub async fn send(&mut self, api: &ApiClient, text: &str) -> Option<&ChatTurn> {
        if text.trim().is_empty() {
            return None;
        }

        self.transcript.append(Speaker::User, text);
        self.pending.clear();

        let reply = api.send_chat_message(text).await;
        let reply = if reply.trim().is_empty() {
            CHAT_FALLBACK_REPLY.to_string()
        } else {
            reply
        };

        Some(self.transcript.append(Speaker::Assistant, reply))
    }

    /// Submit whatever is in the pending slot
    pub async fn submit_pending(&mut self, api: &ApiClient) -> Option<&ChatTurn> {
        let text = std::mem::take(&mut self.pending);
        self.send(api, &text).await
    }

    /// Fill the pending slot with `question` and submit it, exactly as if typed
    pub async fn suggest_question(&mut self, api: &ApiClient, question: &str) -> Option<&ChatTurn> {
        self.set_pending(question);
        self.submit_pending(api).await
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
        self.pending.clear();
    }
}
