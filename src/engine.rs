//! # Tokenization Engine
//!
//! Resolves a language id to a grammar and lexes source text with it.
//!
//! ## Resolution
//!
//! 1. An empty id resolves to no grammar.
//! 2. A grammar already in the registry is returned without touching any
//!    loader or lock.
//! 3. Otherwise the first loader, in registration order, whose matcher
//!    accepts the id is run. First match wins, not best match.
//! 4. After the loader returns the registry is read again; a loader that did
//!    not register the id leaves it unresolved.
//!
//! Unresolved languages tokenize as a single plain fragment. A failing loader
//! is handled according to [`LoadFailurePolicy`].
//!
//! ## Concurrency
//!
//! Loading is the only point where `tokenize` suspends. With single-flight
//! enabled, concurrent requests for the same missing language wait on one
//! per-language lock, so the loader runs once and the waiters are served from
//! the registry.

use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::{
    InternalResult,
    config::{ConfigResult, EngineConfig, LoadFailurePolicy},
    grammar::Grammar,
    lexer::{Lexer, PatternLexer},
    loader::{LoadError, LoaderEntry},
    registry::GrammarRegistry,
    token::Token,
};

pub struct TokenizationEngine {
    registry: GrammarRegistry,
    loaders: Vec<LoaderEntry>,
    lexer: Arc<dyn Lexer>,
    config: EngineConfig,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

#[derive(Default)]
pub struct TokenizationEngineBuilder {
    registry: Option<GrammarRegistry>,
    loaders: Vec<LoaderEntry>,
    lexer: Option<Arc<dyn Lexer>>,
    config: EngineConfig,
}

impl TokenizationEngineBuilder {
    /// Shared registry to resolve against. Defaults to a private one.
    pub fn registry(mut self, registry: GrammarRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn loader(mut self, entry: LoaderEntry) -> Self {
        self.loaders.push(entry);
        self
    }

    pub fn loaders<I: IntoIterator<Item = LoaderEntry>>(mut self, entries: I) -> Self {
        self.loaders.extend(entries);
        self
    }

    pub fn lexer(mut self, lexer: Arc<dyn Lexer>) -> Self {
        self.lexer = Some(lexer);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> TokenizationEngine {
        TokenizationEngine {
            registry: self.registry.unwrap_or_default(),
            loaders: self.loaders,
            lexer: self.lexer.unwrap_or_else(|| Arc::new(PatternLexer)),
            config: self.config,
            in_flight: DashMap::new(),
        }
    }
}

impl TokenizationEngine {
    pub fn builder() -> TokenizationEngineBuilder {
        TokenizationEngineBuilder::default()
    }

    pub fn new(loaders: Vec<LoaderEntry>) -> Self {
        Self::builder().loaders(loaders).build()
    }

    /// Engine with the loaders listed in `config`, resolving against a
    /// private registry.
    pub fn from_config(config: &EngineConfig) -> ConfigResult<Self> {
        Ok(Self::builder()
            .loaders(config.loaders()?)
            .config(config.clone())
            .build())
    }

    pub fn registry(&self) -> &GrammarRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn loaders(&self) -> &[LoaderEntry] {
        &self.loaders
    }

    /// Tokenizes `source`, loading the grammar for `language` when needed.
    ///
    /// Never returns an empty stream: empty source yields one empty plain
    /// fragment. Unknown languages yield the whole source as one fragment.
    #[instrument(level = "debug", skip(self, source), fields(len = source.len()))]
    pub async fn tokenize(&self, source: &str, language: &str) -> InternalResult<Vec<Token>> {
        if source.is_empty() {
            return Ok(vec![Token::text("")]);
        }

        let grammar = self.resolve_grammar(language).await?;
        Ok(self.lex(source, grammar.as_deref()))
    }

    /// Tokenizes with resident grammars only; never loads.
    pub fn tokenize_resident(&self, source: &str, language: &str) -> Vec<Token> {
        if source.is_empty() {
            return vec![Token::text("")];
        }
        let grammar = if language.is_empty() {
            None
        } else {
            self.registry.get(language)
        };
        self.lex(source, grammar.as_deref())
    }

    fn lex(&self, source: &str, grammar: Option<&Grammar>) -> Vec<Token> {
        match grammar {
            Some(grammar) => self.lexer.lex(source, grammar),
            None => vec![Token::text(source)],
        }
    }

    /// First loader whose matcher accepts `language`.
    pub fn find_loader(&self, language: &str) -> Option<&LoaderEntry> {
        self.loaders.iter().find(|entry| entry.matches(language))
    }

    /// Whether `language` is resident or some loader claims it.
    pub fn supports(&self, language: &str) -> bool {
        !language.is_empty()
            && (self.registry.contains(language) || self.find_loader(language).is_some())
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn resolve_grammar(&self, language: &str) -> InternalResult<Option<Arc<Grammar>>> {
        if language.is_empty() {
            return Ok(None);
        }
        if let Some(grammar) = self.registry.get(language) {
            return Ok(Some(grammar));
        }

        let Some(entry) = self.find_loader(language) else {
            debug!("no loader matches {}", language);
            return Ok(None);
        };

        let result = if self.config.single_flight {
            self.load_single_flight(entry, language).await
        } else {
            self.run_loader(entry, language).await
        };

        if let Err(err) = result {
            return match self.config.load_failure {
                LoadFailurePolicy::Propagate => Err(err.into()),
                LoadFailurePolicy::Degrade => {
                    warn!("loading {} failed, using plain text: {}", language, err);
                    Ok(None)
                }
            };
        }

        let grammar = self.registry.get(language);
        if grammar.is_none() {
            warn!(
                "{} loader finished without registering {}",
                entry.loader().name(),
                language
            );
        }
        Ok(grammar)
    }

    /// Runs the loader under the per-language lock. Callers queued behind a
    /// load re-check the registry first and only load if it is still missing.
    async fn load_single_flight(&self, entry: &LoaderEntry, language: &str) -> Result<(), LoadError> {
        let lock = self
            .in_flight
            .entry(language.to_string())
            .or_default()
            .clone();
        let guard = lock.clone().lock_owned().await;

        let result = if self.registry.contains(language) {
            Ok(())
        } else {
            self.run_loader(entry, language).await
        };
        drop(guard);

        // Queued callers hold their own clone; the last one out removes the lock
        self.in_flight.remove_if(language, |_, current| {
            Arc::ptr_eq(current, &lock) && Arc::strong_count(current) == 2
        });
        result
    }

    async fn run_loader(&self, entry: &LoaderEntry, language: &str) -> Result<(), LoadError> {
        debug!("loading {} with {} loader", language, entry.loader().name());
        let load = entry.loader().load(language, &self.registry);
        match self.config.load_timeout {
            Some(timeout) => tokio::time::timeout(timeout, load)
                .await
                .map_err(|_| LoadError::Timeout {
                    language: language.to_string(),
                    timeout,
                })?,
            None => load.await,
        }
    }

    /// Resolves several languages concurrently. Returns the ones that ended
    /// up resident, in input order.
    pub async fn preload<S: AsRef<str>>(&self, languages: &[S]) -> InternalResult<Vec<String>> {
        let results = join_all(
            languages
                .iter()
                .map(|language| self.resolve_grammar(language.as_ref())),
        )
        .await;

        let mut resident = Vec::new();
        for (language, result) in languages.iter().zip(results) {
            if result?.is_some() {
                resident.push(language.as_ref().to_string());
            }
        }
        Ok(resident)
    }
}
