//! The intent catalog and the keyword matcher.
//!
//! Intents are declared in a JSON document (embedded by default, overridable
//! from disk) and compiled at startup. Catalog order is match priority:
//! the first intent whose any matcher fires wins, so earlier intents shadow
//! later ones on ambiguous input.

use std::collections::HashMap;
use std::fmt;

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::normalize::normalize;

/// Embedded persona catalog, parsed once at startup.
const BUILTIN_CATALOG: &str = include_str!("../data/intents.json");

/// The closed set of conversation topics. The conversation context can only
/// ever hold one of these, never an arbitrary string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Sonder,
    Embers,
}

impl Topic {
    /// Declaration order, used as the deterministic fallback order when a
    /// topical pool has neither the current topic nor a general entry.
    pub const ALL: [Topic; 2] = [Topic::Sonder, Topic::Embers];
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Sonder => write!(f, "sonder"),
            Topic::Embers => write!(f, "embers"),
        }
    }
}

/// A single trigger: a keyword or phrase compiled into a whole-word pattern.
///
/// `hi` must fire on "hi there" but never inside "this", so the raw trigger
/// is wrapped in word boundaries rather than substring-matched.
#[derive(Debug, Clone)]
pub struct Matcher {
    trigger: String,
    pattern: Regex,
}

impl Matcher {
    pub fn compile(trigger: &str) -> Result<Self> {
        let canonical = normalize(trigger);
        if canonical.is_empty() {
            bail!("matcher trigger '{}' is empty after normalization", trigger);
        }
        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(&canonical)))
            .with_context(|| format!("failed to compile matcher for '{}'", trigger))?;
        Ok(Self {
            trigger: canonical,
            pattern,
        })
    }

    /// Test against already-normalized input.
    pub fn is_match(&self, normalized: &str) -> bool {
        self.pattern.is_match(normalized)
    }

    pub fn trigger(&self) -> &str {
        &self.trigger
    }
}

/// Topic-keyed response pools with an optional general/default pool.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicalPool {
    #[serde(default)]
    pub general: Vec<String>,
    #[serde(flatten)]
    pub by_topic: HashMap<Topic, Vec<String>>,
}

/// Candidate responses for an intent. The original data is duck-typed
/// (array vs. object of arrays); here the two shapes are explicit variants.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResponsePool {
    Flat(Vec<String>),
    Topical(TopicalPool),
}

impl ResponsePool {
    /// Resolve the concrete pool for the current topic.
    ///
    /// Topical pools prefer the entry for the active topic, then the general
    /// pool, then the first topic in `Topic::ALL` order that has entries.
    /// That last step is the documented policy for catalogs that declare
    /// neither the active topic nor a general pool.
    pub fn resolve(&self, topic: Option<Topic>) -> &[String] {
        match self {
            ResponsePool::Flat(pool) => pool,
            ResponsePool::Topical(pools) => {
                if let Some(topic) = topic {
                    if let Some(pool) = pools.by_topic.get(&topic) {
                        if !pool.is_empty() {
                            return pool;
                        }
                    }
                }
                if !pools.general.is_empty() {
                    return &pools.general;
                }
                for topic in Topic::ALL {
                    if let Some(pool) = pools.by_topic.get(&topic) {
                        if !pool.is_empty() {
                            return pool;
                        }
                    }
                }
                &pools.general
            }
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            ResponsePool::Flat(pool) => pool.is_empty(),
            ResponsePool::Topical(pools) => {
                pools.general.is_empty() && pools.by_topic.values().all(|p| p.is_empty())
            }
        }
    }
}

/// Declared form of an intent, straight out of the catalog JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentSpec {
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub sets_topic: Option<Topic>,
    pub responses: ResponsePool,
}

/// Compiled intent: the declared keywords turned into whole-word matchers.
#[derive(Debug, Clone)]
pub struct Intent {
    pub name: String,
    pub matchers: Vec<Matcher>,
    pub sets_topic: Option<Topic>,
    pub responses: ResponsePool,
}

impl Intent {
    fn compile(spec: IntentSpec) -> Result<Self> {
        let matchers = spec
            .keywords
            .iter()
            .map(|k| Matcher::compile(k))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("intent '{}'", spec.name))?;
        Ok(Self {
            name: spec.name,
            matchers,
            sets_topic: spec.sets_topic,
            responses: spec.responses,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    greeting: String,
    intents: Vec<IntentSpec>,
    fallback: Vec<String>,
}

/// The ordered intent catalog plus the generic fallback pool.
#[derive(Debug, Clone)]
pub struct Catalog {
    greeting: String,
    intents: Vec<Intent>,
    fallback: Vec<String>,
}

impl Catalog {
    /// Parse and compile a catalog document.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile =
            serde_json::from_str(json).context("failed to parse intent catalog")?;
        let intents = file
            .intents
            .into_iter()
            .map(Intent::compile)
            .collect::<Result<Vec<_>>>()?;
        let catalog = Self {
            greeting: file.greeting,
            intents,
            fallback: file.fallback,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The embedded persona catalog.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_CATALOG)
    }

    fn validate(&self) -> Result<()> {
        if self.intents.is_empty() {
            bail!("catalog declares no intents");
        }
        if self.fallback.len() < 3 {
            bail!(
                "fallback pool needs at least 3 entries, found {}",
                self.fallback.len()
            );
        }
        let mut seen = std::collections::HashSet::new();
        for intent in &self.intents {
            if !seen.insert(intent.name.as_str()) {
                bail!("duplicate intent name '{}'", intent.name);
            }
            if intent.matchers.is_empty() {
                bail!("intent '{}' declares no keywords", intent.name);
            }
            if intent.responses.is_empty() {
                bail!("intent '{}' has an empty response pool", intent.name);
            }
        }
        Ok(())
    }

    /// First-match-wins scan over the catalog in declaration order.
    /// Deterministic for a fixed catalog and input; no side effects.
    pub fn detect(&self, normalized: &str) -> Option<&Intent> {
        self.intents
            .iter()
            .find(|intent| intent.matchers.iter().any(|m| m.is_match(normalized)))
    }

    pub fn get(&self, name: &str) -> Option<&Intent> {
        self.intents.iter().find(|i| i.name == name)
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    pub fn fallback(&self) -> &[String] {
        &self.fallback
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::builtin().expect("builtin catalog must compile")
    }

    #[test]
    fn builtin_catalog_compiles_and_validates() {
        let cat = catalog();
        assert!(cat.len() >= 10);
        assert!(cat.fallback().len() >= 3);
        assert!(!cat.greeting().is_empty());
    }

    #[test]
    fn whole_word_matching_does_not_fire_on_substrings() {
        let cat = catalog();
        // "hi" must not match inside "this".
        assert!(cat.detect("this is great").is_none());
        assert_eq!(cat.detect("hi there").map(|i| i.name.as_str()), Some("greeting"));
    }

    #[test]
    fn phrase_matchers_require_the_full_token_sequence() {
        let cat = catalog();
        assert_eq!(
            cat.detect("tell me more").map(|i| i.name.as_str()),
            Some("continue")
        );
        // "who are you" as a phrase fires identity, not the bare "who" of
        // about_creator further down the catalog.
        assert_eq!(
            cat.detect("who are you").map(|i| i.name.as_str()),
            Some("identity")
        );
    }

    #[test]
    fn catalog_order_resolves_ambiguity_deterministically() {
        let cat = catalog();
        // "hello" + "sonder" both present: greeting is declared first.
        let first = cat.detect("hello tell me about sonder").map(|i| i.name.clone());
        assert_eq!(first.as_deref(), Some("greeting"));
        for _ in 0..10 {
            assert_eq!(
                cat.detect("hello tell me about sonder").map(|i| i.name.clone()),
                first
            );
        }
    }

    #[test]
    fn unmatched_input_detects_nothing() {
        let cat = catalog();
        assert!(cat.detect("xyzzy quantum flux").is_none());
        assert!(cat.detect("").is_none());
    }

    #[test]
    fn pools_deserialize_both_shapes() {
        let flat: ResponsePool = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert!(matches!(flat, ResponsePool::Flat(ref p) if p.len() == 2));

        let topical: ResponsePool = serde_json::from_str(
            r#"{"sonder": ["s"], "embers": ["e"], "general": ["g"]}"#,
        )
        .unwrap();
        match topical {
            ResponsePool::Topical(p) => {
                assert_eq!(p.general, vec!["g"]);
                assert_eq!(p.by_topic[&Topic::Sonder], vec!["s"]);
            }
            ResponsePool::Flat(_) => panic!("expected topical pool"),
        }
    }

    #[test]
    fn unknown_topic_key_is_rejected_at_parse_time() {
        let result: std::result::Result<ResponsePool, _> =
            serde_json::from_str(r#"{"lighthouse": ["x"]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn validation_rejects_empty_pools_and_thin_fallbacks() {
        let doc = r#"{
            "greeting": "hi.",
            "intents": [{"name": "empty", "keywords": ["x"], "responses": []}],
            "fallback": ["a", "b", "c"]
        }"#;
        assert!(Catalog::from_json(doc).is_err());

        let doc = r#"{
            "greeting": "hi.",
            "intents": [{"name": "ok", "keywords": ["x"], "responses": ["y"]}],
            "fallback": ["only", "two"]
        }"#;
        assert!(Catalog::from_json(doc).is_err());
    }

    #[test]
    fn matcher_normalizes_its_trigger() {
        let m = Matcher::compile("  Tell  Me MORE ").unwrap();
        assert_eq!(m.trigger(), "tell me more");
        assert!(m.is_match("please tell me more now"));
        assert!(!m.is_match("tell me"));
    }
}
