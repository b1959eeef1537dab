//! Per-session conversation state: the mutable context the response
//! selector consults, the history shipped to the remote model, and the
//! rendered transcript.

use serde::{Deserialize, Serialize};

use crate::intent::Topic;

/// The single mutable record threaded through a session. Written only by
/// the response selector when a matched intent sets a topic; a topic, once
/// set, persists until a different topic-setting intent overwrites it.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub topic: Option<Topic>,
    pub last_intent: Option<String>,
}

/// Wire-compatible speaker role for the remote proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

/// Ordered conversation history, sent in full on each remote fallback call.
///
/// Growth is capped: the source left history unbounded for the session
/// lifetime, which is an explicit bound here instead. The cap keeps the
/// most recent turns; the wire view then opens on a user turn, since
/// hosted models can reject histories that lead with a model turn.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: Vec<HistoryTurn>,
    max_turns: usize,
}

pub const DEFAULT_MAX_HISTORY_TURNS: usize = 64;

impl ConversationHistory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns: max_turns.max(2),
        }
    }

    pub fn push(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(HistoryTurn {
            role,
            text: text.into(),
        });
        if self.turns.len() > self.max_turns {
            let skip = self.turns.len() - self.max_turns;
            self.turns.drain(..skip);
        }
    }

    pub fn turns(&self) -> &[HistoryTurn] {
        &self.turns
    }

    /// The slice shipped to the remote model: the capped tail, skipping any
    /// leading model turns left behind by the cap.
    pub fn wire_turns(&self) -> &[HistoryTurn] {
        let start = self
            .turns
            .iter()
            .position(|t| t.role == Role::User)
            .unwrap_or(self.turns.len());
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_TURNS)
    }
}

/// Who a transcript entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Cael,
}

/// One rendered message. Assistant entries start empty and grow one
/// character at a time while the typing renderer runs.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptMessage {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    pub messages: Vec<TranscriptMessage>,
}

impl Transcript {
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(TranscriptMessage {
            speaker: Speaker::User,
            text: text.into(),
        });
    }

    pub fn push_reply(&mut self, text: impl Into<String>) {
        self.messages.push(TranscriptMessage {
            speaker: Speaker::Cael,
            text: text.into(),
        });
    }

    /// Append a revealed character to the most recent assistant entry.
    pub fn append_to_reply(&mut self, ch: char) {
        if let Some(last) = self.messages.last_mut() {
            if last.speaker == Speaker::Cael {
                last.text.push(ch);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
