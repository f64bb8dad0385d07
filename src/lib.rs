//! # grammar-dispatch: on-demand grammar loading and tokenization
//!
//! Callers hand the engine a piece of source text and a language id; the
//! engine finds the grammar for that id, loading it first if it is not yet
//! resident, and splits the text into a stream of classified tokens and plain
//! fragments.
//!
//! ## Pipeline
//!
//! ```text
//! (source, language) → Registry ──hit──────────────→ Lexer → Vec<Token>
//!                         │ miss                        ↑
//!                         └→ first matching Loader → Registry
//! ```
//!
//! ## Components
//!
//! - Engine: orchestration and fallback rules ([`engine`])
//! - Registry: shared append-only grammar table ([`registry`])
//! - Loaders: on-demand grammar sources ([`loader`], [`builtin`])
//! - Grammars: definitions and compiled rule sets ([`grammar`])
//! - Lexer: pattern matching ([`lexer`])
//! - Tokens: output model ([`token`])
//! - Configuration ([`config`]) and errors ([`error`])
//!
//! ## Fallback
//!
//! Tokenization degrades instead of failing: an empty or unknown language, a
//! language no loader claims, or a loader that does not deliver all produce
//! the source as a single plain fragment.
//!
//! ## Usage Example
//!
//! ```no_run
//! use grammar_dispatch::{TokenizationEngine, builtin, loader::LoaderEntry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = TokenizationEngine::new(vec![LoaderEntry::new(
//!     builtin::matcher(),
//!     builtin::loader()?,
//! )]);
//! let tokens = engine.tokenize("let x = 1;", "js").await?;
//! assert!(!tokens.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod config;
pub mod engine;
pub mod error;
pub mod grammar;
pub mod lexer;
pub mod loader;
pub mod registry;
pub mod token;

// Re-exports
pub use engine::TokenizationEngine;
pub use error::*;
pub use token::Token;

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        // テストの前に一度だけ実行したい処理
        // tracing_subscriberの初期化
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
