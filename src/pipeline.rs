//! Per-turn orchestration: normalize → match → select-or-fallback →
//! punctuate → hand off to the renderer.
//!
//! A turn can only start while no render is in flight; contention drops
//! the turn silently. Nothing in here ever fails a turn visibly; the
//! worst case is a generic fallback line.

use std::sync::Arc;

use crate::intent::Catalog;
use crate::normalize::normalize;
use crate::remote::RemoteClient;
use crate::render::{RenderConfig, RenderGuard};
use crate::select::ResponseSelector;
use crate::session::ChatSession;

/// Where the reply came from, for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySource {
    Intent(String),
    Remote,
    Fallback,
}

impl ReplySource {
    pub fn label(&self) -> &str {
        match self {
            ReplySource::Intent(name) => name,
            ReplySource::Remote => "remote",
            ReplySource::Fallback => "fallback",
        }
    }
}

pub enum TurnOutcome {
    /// Empty input; no turn was started.
    Ignored,
    /// A render is still in flight; the turn was dropped.
    Busy,
    /// Reply resolved. The guard keeps the session busy until the typing
    /// stream built from it is consumed or dropped.
    Reply {
        text: String,
        source: ReplySource,
        guard: RenderGuard,
    },
}

pub struct ChatEngine {
    catalog: Catalog,
    selector: ResponseSelector,
    remote: Option<RemoteClient>,
    render: RenderConfig,
}

impl ChatEngine {
    pub fn new(catalog: Catalog, remote: Option<RemoteClient>, render: RenderConfig) -> Self {
        Self {
            catalog,
            selector: ResponseSelector::new(),
            remote,
            render,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn greeting(&self) -> &str {
        self.catalog.greeting()
    }

    pub fn render_config(&self) -> RenderConfig {
        self.render
    }

    /// Run one turn against a session. Context and history mutations all
    /// happen here, under short lock scopes that never span an await.
    pub async fn run_turn(&self, session: &Arc<ChatSession>, raw: &str) -> TurnOutcome {
        let message = raw.trim();
        if message.is_empty() {
            return TurnOutcome::Ignored;
        }
        let Some(guard) = RenderGuard::acquire(session) else {
            log::debug!("session {}: turn dropped, render in flight", session.id);
            return TurnOutcome::Busy;
        };

        {
            let mut state = session.state();
            // The widget echoes the visitor's words in lowercase.
            state.transcript.push_user(message.to_lowercase());
            state
                .history
                .push(crate::conversation::Role::User, message);
        }

        let normalized = normalize(message);
        let matched = self.catalog.detect(&normalized);

        let (text, source) = match matched {
            Some(intent) => {
                let mut state = session.state();
                let text = self
                    .selector
                    .select(&self.catalog, Some(intent), &mut state.context);
                (text, ReplySource::Intent(intent.name.clone()))
            }
            None => {
                let remote_reply = match &self.remote {
                    Some(client) => {
                        let history = session.state().history.clone();
                        client.complete(&history).await
                    }
                    None => None,
                };
                match remote_reply {
                    Some(text) => (text, ReplySource::Remote),
                    None => {
                        let mut state = session.state();
                        let text = self.selector.select(&self.catalog, None, &mut state.context);
                        (text, ReplySource::Fallback)
                    }
                }
            }
        };

        let text = punctuate(text);
        {
            let mut state = session.state();
            state
                .history
                .push(crate::conversation::Role::Model, text.as_str());
            // Empty shell the renderer fills character by character.
            state.transcript.push_reply("");
        }

        log::info!(
            "session {}: '{}' answered via {}",
            session.id,
            normalized,
            source.label()
        );
        TurnOutcome::Reply {
            text,
            source,
            guard,
        }
    }
}

/// Replies always end in terminal punctuation.
pub fn punctuate(mut text: String) -> String {
    match text.chars().last() {
        Some('.') | Some('?') | Some('!') => text,
        _ => {
            text.push('.');
            text
        }
    }
}
