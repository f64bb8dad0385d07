use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use strum::{Display, EnumString};
use thiserror::Error;

use crate::{
    builtin,
    loader::{DirectoryLoader, LanguageLoader, LanguageMatcher, LoadError, LoaderEntry},
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Built-in grammars unavailable: {0}")]
    Builtin(#[from] LoadError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// What `tokenize` does when a matching loader fails.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoadFailurePolicy {
    /// Log and fall back to plain text, like an unknown language
    #[default]
    Degrade,
    /// Return the loader error to the caller
    Propagate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub load_failure: LoadFailurePolicy,

    /// Deduplicate concurrent loads of the same language
    #[serde(default = "default_true")]
    pub single_flight: bool,

    #[serde(
        default,
        with = "optional_duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub load_timeout: Option<Duration>,

    /// Loader order is match priority
    #[serde(default)]
    pub languages: Vec<LanguageConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: LanguageMatcher,
    #[serde(flatten)]
    pub source: LoaderSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LoaderSource {
    Builtin,
    Directory { path: PathBuf },
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            load_failure: LoadFailurePolicy::default(),
            single_flight: default_true(),
            load_timeout: None,
            languages: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

// Option<Duration> as integer milliseconds
pub mod optional_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_u64(duration.as_millis() as u64),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

impl EngineConfig {
    // JSONファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Loader entries in configured order. The built-in loader is created
    /// once and shared by every `builtin` entry.
    pub fn loaders(&self) -> ConfigResult<Vec<LoaderEntry>> {
        let mut builtin: Option<Arc<dyn LanguageLoader>> = None;
        let mut entries = Vec::with_capacity(self.languages.len());

        for language in &self.languages {
            let entry = match &language.source {
                LoaderSource::Builtin => {
                    let loader = match &builtin {
                        Some(loader) => loader.clone(),
                        None => {
                            let loader: Arc<dyn LanguageLoader> = Arc::new(builtin::loader()?);
                            builtin = Some(loader.clone());
                            loader
                        }
                    };
                    LoaderEntry::shared(language.name.clone(), loader)
                }
                LoaderSource::Directory { path } => {
                    LoaderEntry::new(language.name.clone(), DirectoryLoader::new(path))
                }
            };
            entries.push(entry);
        }

        Ok(entries)
    }
}
