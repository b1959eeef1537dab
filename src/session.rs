//! Chat sessions: one per open widget instance.
//!
//! All per-visitor mutable state lives here behind a session handle. There
//! are no module-level singletons; the registry is owned by the server
//! state and handed to handlers via `web::Data`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use crate::conversation::{ConversationContext, ConversationHistory, Transcript};

#[derive(Debug)]
pub struct SessionState {
    pub context: ConversationContext,
    pub history: ConversationHistory,
    pub transcript: Transcript,
}

/// A single chat session. The busy flag serializes turns: while a render
/// is in flight, new turns are dropped rather than queued.
#[derive(Debug)]
pub struct ChatSession {
    pub id: Uuid,
    busy: AtomicBool,
    state: Mutex<SessionState>,
}

impl ChatSession {
    fn new(max_history_turns: usize, greeting: &str) -> Self {
        let mut transcript = Transcript::default();
        // The widget opens with the canned greeting already revealed.
        transcript.push_reply(greeting);
        Self {
            id: Uuid::new_v4(),
            busy: AtomicBool::new(false),
            state: Mutex::new(SessionState {
                context: ConversationContext::default(),
                history: ConversationHistory::new(max_history_turns),
                transcript,
            }),
        }
    }

    /// Claim the render slot. Returns false while another render runs.
    pub fn try_begin_render(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_render(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }

    pub fn is_rendering(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    /// Reveal one more character of the pending reply.
    pub fn append_reply_char(&self, ch: char) {
        self.state.lock().transcript.append_to_reply(ch);
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<ChatSession>>>,
    max_history_turns: usize,
    greeting: String,
}

impl SessionRegistry {
    pub fn new(max_history_turns: usize, greeting: impl Into<String>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_history_turns,
            greeting: greeting.into(),
        }
    }

    pub fn create(&self) -> Arc<ChatSession> {
        let session = Arc::new(ChatSession::new(self.max_history_turns, &self.greeting));
        self.sessions.write().insert(session.id, session.clone());
        session
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<ChatSession>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Session teardown. An in-flight render keeps its own handle and
    /// finishes (or is dropped with its stream); the session just becomes
    /// unreachable for new turns.
    pub fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().remove(&id).is_some()
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
