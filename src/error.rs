use thiserror::Error;

use crate::config::ConfigError;
use crate::loader::LoadError;

#[derive(Error, Debug)]
pub enum Error {
    // loader rejected or timed out
    #[error("Load error: {0}")]
    Load(#[from] LoadError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarError;

    #[test]
    fn test_grammar_errors_surface_as_load_errors() {
        let err: Error = LoadError::from(GrammarError::MissingDependency {
            language: "clike".to_string(),
        })
        .into();
        assert!(matches!(err, Error::Load(LoadError::Grammar(_))));
        assert_eq!(
            err.to_string(),
            "Load error: Grammar error: Grammar clike is not registered"
        );
    }
}
