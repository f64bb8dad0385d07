//! # Language Loaders
//!
//! A loader makes grammars resident on demand. Loaders are listed in order;
//! each one is paired with a [`LanguageMatcher`] and the first entry whose
//! matcher accepts a language is the one asked to load it.
//!
//! Loading is a side effect: a successful [`LanguageLoader::load`] leaves the
//! grammar registered in the [`GrammarRegistry`] it was handed. Nothing is
//! returned, and a loader that succeeds without registering the requested
//! language simply leaves it unavailable.
//!
//! ## Provided loaders
//!
//! * [`FnLoader`]: any `Fn(String, GrammarRegistry) -> Future`
//! * [`DefinitionLoader`]: grammar definitions held in memory
//! * [`DirectoryLoader`]: `<root>/<language>.json` files read with `tokio::fs`
//!
//! ## Usage Example
//!
//! ```no_run
//! use grammar_dispatch::grammar::{Grammar, Pattern};
//! use grammar_dispatch::loader::{LanguageMatcher, LoadResult, LoaderEntry};
//!
//! let entry = LoaderEntry::from_fn(LanguageMatcher::from(["ts", "typescript"]), |language, registry| async move {
//!     let grammar = Grammar::builder()
//!         .rule("keyword", Pattern::new(r"\blet\b")?)
//!         .build();
//!     registry.register(language, grammar);
//!     LoadResult::Ok(())
//! });
//! ```

use async_recursion::async_recursion;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tracing::debug;

use crate::grammar::{GrammarDefinition, GrammarError};
use crate::registry::GrammarRegistry;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Invalid language id: {0:?}")]
    InvalidLanguage(String),
    #[error("Failed to read grammar for {language}: {source}")]
    Io {
        language: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid grammar definition for {language}: {source}")]
    Parse {
        language: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("No grammar definition for {0}")]
    NotFound(String),
    #[error("Grammar error: {0}")]
    Grammar(#[from] GrammarError),
    #[error("Loading {language} timed out after {timeout:?}")]
    Timeout { language: String, timeout: Duration },
    #[error("Loader failed for {language}: {message}")]
    Failed { language: String, message: String },
}

pub type LoadResult<T> = Result<T, LoadError>;

impl LoadError {
    pub fn failed<L: Into<String>, M: Into<String>>(language: L, message: M) -> Self {
        LoadError::Failed {
            language: language.into(),
            message: message.into(),
        }
    }
}

/// Which languages a loader is responsible for.
///
/// Serialized as `"*"` (any language), `"rust"` (exactly one) or
/// `["js", "javascript"]` (any of the listed ids).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MatcherRepr", into = "MatcherRepr")]
pub enum LanguageMatcher {
    Wildcard,
    Exact(String),
    OneOf(Vec<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MatcherRepr {
    One(String),
    Many(Vec<String>),
}

const WILDCARD: &str = "*";

impl From<MatcherRepr> for LanguageMatcher {
    fn from(repr: MatcherRepr) -> Self {
        match repr {
            MatcherRepr::One(name) if name == WILDCARD => LanguageMatcher::Wildcard,
            MatcherRepr::One(name) => LanguageMatcher::Exact(name),
            MatcherRepr::Many(names) => LanguageMatcher::OneOf(names),
        }
    }
}

impl From<LanguageMatcher> for MatcherRepr {
    fn from(matcher: LanguageMatcher) -> Self {
        match matcher {
            LanguageMatcher::Wildcard => MatcherRepr::One(WILDCARD.to_string()),
            LanguageMatcher::Exact(name) => MatcherRepr::One(name),
            LanguageMatcher::OneOf(names) => MatcherRepr::Many(names),
        }
    }
}

impl From<&str> for LanguageMatcher {
    fn from(name: &str) -> Self {
        MatcherRepr::One(name.to_string()).into()
    }
}

impl From<Vec<String>> for LanguageMatcher {
    fn from(names: Vec<String>) -> Self {
        LanguageMatcher::OneOf(names)
    }
}

impl<const N: usize> From<[&str; N]> for LanguageMatcher {
    fn from(names: [&str; N]) -> Self {
        LanguageMatcher::OneOf(names.iter().map(|name| name.to_string()).collect())
    }
}

impl LanguageMatcher {
    pub fn matches(&self, language: &str) -> bool {
        match self {
            LanguageMatcher::Wildcard => true,
            LanguageMatcher::Exact(name) => name == language,
            LanguageMatcher::OneOf(names) => names.iter().any(|name| name == language),
        }
    }
}

impl fmt::Display for LanguageMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LanguageMatcher::Wildcard => write!(f, "{}", WILDCARD),
            LanguageMatcher::Exact(name) => write!(f, "{}", name),
            LanguageMatcher::OneOf(names) => write!(f, "[{}]", names.join(", ")),
        }
    }
}

#[async_trait]
pub trait LanguageLoader: Send + Sync {
    /// Makes the grammar for `language` resident in `registry`.
    async fn load(&self, language: &str, registry: &GrammarRegistry) -> LoadResult<()>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "loader"
    }
}

/// Loader descriptor: a matcher plus the loader it selects.
#[derive(Clone)]
pub struct LoaderEntry {
    matcher: LanguageMatcher,
    loader: Arc<dyn LanguageLoader>,
}

impl LoaderEntry {
    pub fn new<M, L>(matcher: M, loader: L) -> Self
    where
        M: Into<LanguageMatcher>,
        L: LanguageLoader + 'static,
    {
        Self {
            matcher: matcher.into(),
            loader: Arc::new(loader),
        }
    }

    pub fn shared<M: Into<LanguageMatcher>>(matcher: M, loader: Arc<dyn LanguageLoader>) -> Self {
        Self {
            matcher: matcher.into(),
            loader,
        }
    }

    pub fn from_fn<M, F, Fut>(matcher: M, load: F) -> Self
    where
        M: Into<LanguageMatcher>,
        F: Fn(String, GrammarRegistry) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult<()>> + Send + 'static,
    {
        Self::new(matcher, FnLoader::new(load))
    }

    pub fn matcher(&self) -> &LanguageMatcher {
        &self.matcher
    }

    pub fn loader(&self) -> &Arc<dyn LanguageLoader> {
        &self.loader
    }

    pub fn matches(&self, language: &str) -> bool {
        self.matcher.matches(language)
    }
}

impl fmt::Debug for LoaderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderEntry")
            .field("matcher", &self.matcher)
            .field("loader", &self.loader.name())
            .finish()
    }
}

/// Adapts an async closure into a [`LanguageLoader`].
pub struct FnLoader<F> {
    load: F,
}

impl<F> FnLoader<F> {
    pub fn new(load: F) -> Self {
        Self { load }
    }
}

#[async_trait]
impl<F, Fut> LanguageLoader for FnLoader<F>
where
    F: Fn(String, GrammarRegistry) -> Fut + Send + Sync,
    Fut: Future<Output = LoadResult<()>> + Send + 'static,
{
    async fn load(&self, language: &str, registry: &GrammarRegistry) -> LoadResult<()> {
        (self.load)(language.to_string(), registry.clone()).await
    }

    fn name(&self) -> &str {
        "fn"
    }
}

/// Serves grammars from definitions held in memory.
///
/// Dependencies (`extends`, `inside` references) are installed first from the
/// same set of definitions. Aliases resolve to a definition and are
/// registered alongside it.
#[derive(Debug, Clone, Default)]
pub struct DefinitionLoader {
    definitions: HashMap<String, GrammarDefinition>,
    aliases: HashMap<String, String>,
}

impl DefinitionLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definition<S: Into<String>>(
        mut self,
        language: S,
        definition: GrammarDefinition,
    ) -> Self {
        self.definitions.insert(language.into(), definition);
        self
    }

    pub fn with_alias<A: Into<String>, L: Into<String>>(mut self, alias: A, language: L) -> Self {
        self.aliases.insert(alias.into(), language.into());
        self
    }

    /// Every id this loader can serve, aliases included, sorted.
    pub fn languages(&self) -> Vec<String> {
        let mut languages = self
            .definitions
            .keys()
            .chain(self.aliases.keys())
            .cloned()
            .collect::<Vec<_>>();
        languages.sort();
        languages
    }

    /// Matcher accepting exactly the ids of [`Self::languages`].
    pub fn matcher(&self) -> LanguageMatcher {
        LanguageMatcher::OneOf(self.languages())
    }

    fn install(
        &self,
        language: &str,
        registry: &GrammarRegistry,
        chain: &mut Vec<String>,
    ) -> LoadResult<()> {
        if registry.contains(language) {
            return Ok(());
        }
        let definition = self
            .definitions
            .get(language)
            .ok_or_else(|| LoadError::NotFound(language.to_string()))?;
        if chain.iter().any(|seen| seen == language) {
            return Err(LoadError::failed(language, "dependency cycle"));
        }

        chain.push(language.to_string());
        for dependency in definition.dependencies() {
            self.install_resolved(&dependency, registry, chain)?;
        }
        chain.pop();

        registry.register_definition(language, definition)?;
        Ok(())
    }

    /// Installs `language` or the definition it is an alias of, then
    /// registers the alias.
    fn install_resolved(
        &self,
        language: &str,
        registry: &GrammarRegistry,
        chain: &mut Vec<String>,
    ) -> LoadResult<()> {
        let target = self
            .aliases
            .get(language)
            .map(String::as_str)
            .unwrap_or(language);
        self.install(target, registry, chain)?;
        if target != language {
            registry.register_alias(language, target);
        }
        Ok(())
    }
}

#[async_trait]
impl LanguageLoader for DefinitionLoader {
    async fn load(&self, language: &str, registry: &GrammarRegistry) -> LoadResult<()> {
        self.install_resolved(language, registry, &mut Vec::new())
    }

    fn name(&self) -> &str {
        "definitions"
    }
}

/// Reads grammar definitions from `<root>/<language>.json`.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

const DEFINITION_EXTENSION: &str = "json";

impl DirectoryLoader {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the definition file for `language`. Ids that would leave the
    /// root directory are rejected.
    pub fn definition_path(&self, language: &str) -> LoadResult<PathBuf> {
        let file = format!("{}.{}", language, DEFINITION_EXTENSION);
        let relative = Path::new(&file);
        let single_normal_component = relative.components().count() == 1
            && matches!(relative.components().next(), Some(Component::Normal(_)));
        if language.is_empty()
            || language.contains(['/', '\\'])
            || language.contains("..")
            || !single_normal_component
        {
            return Err(LoadError::InvalidLanguage(language.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn read_definition(&self, language: &str) -> LoadResult<GrammarDefinition> {
        let path = self.definition_path(language)?;
        debug!("reading grammar definition: {}", path.display());
        let content = tokio::fs::read_to_string(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LoadError::NotFound(language.to_string())
            } else {
                LoadError::Io {
                    language: language.to_string(),
                    source,
                }
            }
        })?;
        GrammarDefinition::from_json(&content).map_err(|source| LoadError::Parse {
            language: language.to_string(),
            source,
        })
    }

    #[async_recursion]
    async fn install(
        &self,
        language: &str,
        registry: &GrammarRegistry,
        chain: &mut Vec<String>,
    ) -> LoadResult<()> {
        if registry.contains(language) {
            return Ok(());
        }
        if chain.iter().any(|seen| seen == language) {
            return Err(LoadError::failed(language, "dependency cycle"));
        }
        let definition = self.read_definition(language).await?;

        chain.push(language.to_string());
        for dependency in definition.dependencies() {
            self.install(&dependency, registry, chain).await?;
        }
        chain.pop();

        registry.register_definition(language, &definition)?;
        Ok(())
    }
}

#[async_trait]
impl LanguageLoader for DirectoryLoader {
    async fn load(&self, language: &str, registry: &GrammarRegistry) -> LoadResult<()> {
        self.install(language, registry, &mut Vec::new()).await
    }

    fn name(&self) -> &str {
        "directory"
    }
}
