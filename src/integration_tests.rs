//! End-to-end turns through the whole pipeline, remote disabled.

use std::sync::Arc;

use futures::StreamExt;

use crate::intent::{Catalog, Topic};
use crate::pipeline::{punctuate, ChatEngine, ReplySource, TurnOutcome};
use crate::render::{typing_stream, RenderConfig};
use crate::session::{ChatSession, SessionRegistry};

fn engine() -> ChatEngine {
    ChatEngine::new(Catalog::builtin().unwrap(), None, RenderConfig::immediate())
}

fn registry(engine: &ChatEngine) -> SessionRegistry {
    SessionRegistry::new(16, engine.greeting())
}

fn reply_of(outcome: TurnOutcome) -> (String, ReplySource) {
    match outcome {
        TurnOutcome::Reply { text, source, .. } => (text, source),
        TurnOutcome::Ignored => panic!("turn unexpectedly ignored"),
        TurnOutcome::Busy => panic!("turn unexpectedly dropped as busy"),
    }
}

fn pool_contains(pool: &[String], reply: &str) -> bool {
    pool.iter().any(|p| punctuate(p.clone()) == reply)
}

async fn consume(engine: &ChatEngine, session: &Arc<ChatSession>, outcome: TurnOutcome) -> String {
    let (text, guard) = match outcome {
        TurnOutcome::Reply { text, guard, .. } => (text, guard),
        _ => panic!("expected a reply"),
    };
    let chunks: Vec<_> =
        typing_stream(text, session.clone(), engine.render_config(), guard)
            .collect()
            .await;
    let body: Vec<u8> = chunks
        .into_iter()
        .flat_map(|c| c.unwrap().to_vec())
        .collect();
    String::from_utf8(body).unwrap()
}

#[tokio::test]
async fn hello_matches_greeting_and_renders_punctuated() {
    let engine = engine();
    let session = registry(&engine).create();

    let outcome = engine.run_turn(&session, "hello").await;
    let (text, source) = reply_of(outcome);

    assert_eq!(source, ReplySource::Intent("greeting".into()));
    let greeting_pool = engine
        .catalog()
        .get("greeting")
        .unwrap()
        .responses
        .resolve(None)
        .to_vec();
    assert_eq!(greeting_pool.len(), 3);
    assert!(pool_contains(&greeting_pool, &text));
    assert!(matches!(text.chars().last(), Some('.') | Some('?') | Some('!')));
}

#[tokio::test]
async fn sonder_topic_steers_the_tech_stack_answer() {
    let engine = engine();
    let session = registry(&engine).create();

    let (_, source) = reply_of(engine.run_turn(&session, "tell me about sonder").await);
    assert_eq!(source, ReplySource::Intent("sonder".into()));
    {
        let state = session.state();
        assert_eq!(state.context.topic, Some(Topic::Sonder));
        assert_eq!(state.context.last_intent.as_deref(), Some("sonder"));
    }

    let (text, source) = reply_of(engine.run_turn(&session, "how was it built").await);
    assert_eq!(source, ReplySource::Intent("tech_stack".into()));
    let sonder_pool = engine
        .catalog()
        .get("tech_stack")
        .unwrap()
        .responses
        .resolve(Some(Topic::Sonder))
        .to_vec();
    assert!(
        pool_contains(&sonder_pool, &text),
        "expected a sonder-specific tech answer, got '{}'",
        text
    );
}

#[tokio::test]
async fn unmatched_input_without_remote_uses_the_fallback_pool() {
    let engine = engine();
    let session = registry(&engine).create();

    let (text, source) = reply_of(engine.run_turn(&session, "xyzzy quantum flux").await);
    assert_eq!(source, ReplySource::Fallback);
    assert!(!text.is_empty());
    assert!(pool_contains(engine.catalog().fallback(), &text));
}

#[tokio::test]
async fn empty_input_starts_no_turn() {
    let engine = engine();
    let session = registry(&engine).create();

    for input in ["", "   ", "\n\t"] {
        assert!(matches!(
            engine.run_turn(&session, input).await,
            TurnOutcome::Ignored
        ));
    }
    let state = session.state();
    // Only the seeded greeting is present.
    assert_eq!(state.transcript.len(), 1);
    assert!(state.history.is_empty());
}

#[tokio::test]
async fn second_turn_while_rendering_leaves_no_trace() {
    let engine = engine();
    let session = registry(&engine).create();

    let first = engine.run_turn(&session, "hello").await;
    let _held_guard = match first {
        TurnOutcome::Reply { guard, .. } => guard,
        _ => panic!("expected a reply"),
    };

    let before = {
        let state = session.state();
        (state.transcript.len(), state.history.len())
    };
    assert!(matches!(
        engine.run_turn(&session, "tell me about embers").await,
        TurnOutcome::Busy
    ));
    let state = session.state();
    assert_eq!((state.transcript.len(), state.history.len()), before);
    assert!(state.context.topic.is_none());
}

#[tokio::test]
async fn turns_serialize_and_recover_after_each_render() {
    let engine = engine();
    let session = registry(&engine).create();

    let rendered = consume(&engine, &session, engine.run_turn(&session, "hello").await).await;
    {
        let state = session.state();
        assert_eq!(state.transcript.messages.last().unwrap().text, rendered);
        assert!(!session.is_rendering());
    }

    // The slot is free again; the next turn is accepted.
    let (text, _) = reply_of(engine.run_turn(&session, "thanks").await);
    assert!(matches!(text.chars().last(), Some('.') | Some('?') | Some('!')));
}

#[tokio::test]
async fn every_reply_ends_with_terminal_punctuation() {
    let engine = engine();
    let session = registry(&engine).create();

    for input in [
        "hello",
        "tell me about sonder",
        "how was it built",
        "when was it created",
        "why does he build",
        "xyzzy quantum flux",
        "thanks",
        "bye",
    ] {
        let (text, _) = reply_of(engine.run_turn(&session, input).await);
        assert!(
            matches!(text.chars().last(), Some('.') | Some('?') | Some('!')),
            "'{}' produced unpunctuated reply '{}'",
            input,
            text
        );
    }
}

#[tokio::test]
async fn history_records_both_sides_of_each_turn() {
    let engine = engine();
    let session = registry(&engine).create();

    consume(&engine, &session, engine.run_turn(&session, "hello").await).await;
    consume(
        &engine,
        &session,
        engine.run_turn(&session, "tell me about embers").await,
    )
    .await;

    let state = session.state();
    assert_eq!(state.history.len(), 4);
    let wire = state.history.wire_turns();
    assert_eq!(wire[0].text, "hello");
    assert_eq!(wire[2].text, "tell me about embers");
}
