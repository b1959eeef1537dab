//! Typing-simulated response rendering.
//!
//! The reply is revealed one character at a time with a randomized small
//! delay, the way the widget fakes live generation. The stream doubles as
//! the HTTP response body and the writer of the session transcript; the
//! busy flag is held by an RAII guard so a dropped stream (client
//! disconnect, session teardown) can never leave a session wedged.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use actix_web::web::Bytes;
use futures::stream::Stream;
use rand::Rng;

use crate::session::ChatSession;

#[derive(Debug, Clone, Copy)]
pub struct RenderConfig {
    /// Per-character delay bounds, milliseconds.
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// One-off pause before the first character, milliseconds.
    pub think_min_ms: u64,
    pub think_max_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 15,
            max_delay_ms: 40,
            think_min_ms: 500,
            think_max_ms: 1500,
        }
    }
}

impl RenderConfig {
    /// Instant rendering, for tests and headless use.
    pub fn immediate() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            think_min_ms: 0,
            think_max_ms: 0,
        }
    }

    fn char_delay(&self) -> Duration {
        Duration::from_millis(jitter(self.min_delay_ms, self.max_delay_ms))
    }

    fn think_delay(&self) -> Duration {
        Duration::from_millis(jitter(self.think_min_ms, self.think_max_ms))
    }
}

fn jitter(min: u64, max: u64) -> u64 {
    if max <= min {
        return min;
    }
    rand::thread_rng().gen_range(min..=max)
}

/// Holds a session's render slot; releases it on drop.
pub struct RenderGuard {
    session: Arc<ChatSession>,
}

impl RenderGuard {
    /// Claim the slot, or `None` if a render is already in flight.
    pub fn acquire(session: &Arc<ChatSession>) -> Option<Self> {
        if session.try_begin_render() {
            Some(Self {
                session: session.clone(),
            })
        } else {
            None
        }
    }
}

impl Drop for RenderGuard {
    fn drop(&mut self) {
        self.session.end_render();
    }
}

struct TypingState {
    chars: Vec<char>,
    idx: usize,
    think: Option<Duration>,
    session: Arc<ChatSession>,
    config: RenderConfig,
    _guard: RenderGuard,
}

/// Build the character stream for one reply. Each yielded chunk is also
/// appended to the session transcript, so a poll of the transcript always
/// shows exactly what has been revealed so far.
pub fn typing_stream(
    text: String,
    session: Arc<ChatSession>,
    config: RenderConfig,
    guard: RenderGuard,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    let state = TypingState {
        chars: text.chars().collect(),
        idx: 0,
        think: Some(config.think_delay()),
        session,
        config,
        _guard: guard,
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.idx >= state.chars.len() {
            return None;
        }
        if let Some(pause) = state.think.take() {
            tokio::time::sleep(pause).await;
        }
        tokio::time::sleep(state.config.char_delay()).await;

        let ch = state.chars[state.idx];
        state.idx += 1;
        state.session.append_reply_char(ch);

        let mut buf = [0u8; 4];
        let bytes = Bytes::copy_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        Some((Ok::<_, Infallible>(bytes), state))
    })
}
