use dashmap::DashMap;
use lazy_static::lazy_static;
use std::sync::Arc;
use tracing::debug;

use crate::grammar::{Grammar, GrammarDefinition, GrammarResult};

lazy_static! {
    static ref GLOBAL_REGISTRY: GrammarRegistry = GrammarRegistry::new();
}

/// Append-only map from language id to compiled grammar.
///
/// Once a language is present it is neither replaced nor evicted; a second
/// registration for the same id returns the grammar that is already resident.
/// Clones share the same underlying storage.
#[derive(Debug, Clone, Default)]
pub struct GrammarRegistry {
    grammars: Arc<DashMap<String, Arc<Grammar>>>,
    aliases: Arc<DashMap<String, String>>,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry shared by every caller of this function.
    pub fn global() -> Self {
        GLOBAL_REGISTRY.clone()
    }

    /// Registers `grammar` under `language` unless the id is already taken.
    /// Returns the resident grammar either way.
    pub fn register<S: Into<String>>(&self, language: S, grammar: Grammar) -> Arc<Grammar> {
        self.register_shared(language, Arc::new(grammar))
    }

    pub fn register_shared<S: Into<String>>(
        &self,
        language: S,
        grammar: Arc<Grammar>,
    ) -> Arc<Grammar> {
        let language = language.into();
        let entry = self.grammars.entry(language.clone()).or_insert_with(|| {
            debug!("grammar registered: {}", language);
            grammar
        });
        entry.value().clone()
    }

    pub fn register_definition<S: Into<String>>(
        &self,
        language: S,
        definition: &GrammarDefinition,
    ) -> GrammarResult<Arc<Grammar>> {
        let grammar = definition.compile(self)?;
        Ok(self.register(language, grammar))
    }

    /// Makes `alias` resolve to `language`. Existing aliases are kept.
    pub fn register_alias<A: Into<String>, L: Into<String>>(&self, alias: A, language: L) {
        self.aliases.entry(alias.into()).or_insert_with(|| language.into());
    }

    /// Looks up a grammar by id, then by alias.
    pub fn get(&self, language: &str) -> Option<Arc<Grammar>> {
        if let Some(grammar) = self.grammars.get(language) {
            return Some(grammar.value().clone());
        }
        let target = self.aliases.get(language)?.value().clone();
        self.grammars.get(&target).map(|grammar| grammar.value().clone())
    }

    pub fn contains(&self, language: &str) -> bool {
        self.get(language).is_some()
    }

    /// Registered language ids (aliases excluded), sorted.
    pub fn languages(&self) -> Vec<String> {
        let mut languages = self
            .grammars
            .iter()
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();
        languages.sort();
        languages
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }
}
