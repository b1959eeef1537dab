//! Context-aware response selection.

use rand::seq::SliceRandom;

use crate::conversation::ConversationContext;
use crate::intent::{Catalog, Intent};

/// Picks one response for a turn. This is the only writer of the
/// conversation context: a matched intent that declares a topic records it
/// before its pool is resolved, so the very turn that introduces a topic
/// already answers in that topic's voice.
#[derive(Debug, Default)]
pub struct ResponseSelector;

impl ResponseSelector {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a pool for the matched intent (or the fallback pool) and
    /// draw one entry uniformly at random. Always returns a non-empty
    /// string for a validated catalog.
    pub fn select(
        &self,
        catalog: &Catalog,
        matched: Option<&Intent>,
        context: &mut ConversationContext,
    ) -> String {
        let Some(intent) = matched else {
            return Self::draw(catalog.fallback());
        };

        if let Some(topic) = intent.sets_topic {
            context.topic = Some(topic);
            context.last_intent = Some(intent.name.clone());
        }

        let pool = intent.responses.resolve(context.topic);
        if pool.is_empty() {
            // Unreachable for a validated catalog; degrade to the fallback
            // pool rather than answer with nothing.
            return Self::draw(catalog.fallback());
        }
        Self::draw(pool)
    }

    fn draw(pool: &[String]) -> String {
        pool.choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default()
    }
}
