use std::fs;
use std::path::Path;

use grammar_dispatch::{
    Error, Token, TokenizationEngine,
    config::{EngineConfig, LoadFailurePolicy},
    loader::{DirectoryLoader, LoadError, LoaderEntry},
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    // tracing_subscriberの初期化
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn write_grammar(dir: &Path, language: &str, json: &str) {
    fs::write(dir.join(format!("{}.json", language)), json).unwrap();
}

/// `calc` extends `base` and re-tokenizes parenthesized groups with it.
fn grammar_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_grammar(
        dir.path(),
        "base",
        r#"{ "rules": [{ "name": "number", "patterns": "\\d+" }] }"#,
    );
    write_grammar(
        dir.path(),
        "calc",
        r#"{
            "extends": "base",
            "rules": [
                { "name": "operator", "patterns": "[+*]" },
                {
                    "name": "group",
                    "before": "number",
                    "patterns": { "pattern": "\\([^)]*\\)", "inside": "base" }
                }
            ]
        }"#,
    );
    write_grammar(dir.path(), "broken", "{ not json");
    write_grammar(
        dir.path(),
        "orphan",
        r#"{ "extends": "ghost", "rules": [] }"#,
    );
    dir
}

fn engine(dir: &TempDir, load_failure: LoadFailurePolicy) -> TokenizationEngine {
    TokenizationEngine::builder()
        .loader(LoaderEntry::new("*", DirectoryLoader::new(dir.path())))
        .config(EngineConfig {
            load_failure,
            ..Default::default()
        })
        .build()
}

#[tokio::test]
async fn test_loads_dependencies_from_directory() {
    let dir = grammar_dir();
    let engine = engine(&dir, LoadFailurePolicy::Propagate);

    let tokens = engine.tokenize("(1+2)*3", "calc").await.unwrap();
    assert_eq!(
        tokens,
        vec![
            Token::nested(
                "group",
                vec![
                    Token::text("("),
                    Token::classified("number", "1"),
                    Token::text("+"),
                    Token::classified("number", "2"),
                    Token::text(")"),
                ]
            ),
            Token::classified("operator", "*"),
            Token::classified("number", "3"),
        ]
    );
    assert_eq!(engine.registry().languages(), vec!["base", "calc"]);
    assert_eq!(
        engine.registry().get("calc").unwrap().rule_names(),
        vec!["group", "number", "operator"]
    );
}

#[tokio::test]
async fn test_missing_file_degrades_or_propagates() {
    let dir = grammar_dir();

    let degrading = engine(&dir, LoadFailurePolicy::Degrade);
    assert_eq!(
        degrading.tokenize("1+1", "missing").await.unwrap(),
        vec![Token::text("1+1")]
    );

    let propagating = engine(&dir, LoadFailurePolicy::Propagate);
    let err = propagating.tokenize("1+1", "missing").await.unwrap_err();
    assert!(matches!(err, Error::Load(LoadError::NotFound(ref language)) if language == "missing"));
}

#[tokio::test]
async fn test_missing_dependency_leaves_language_unloaded() {
    let dir = grammar_dir();
    let engine = engine(&dir, LoadFailurePolicy::Propagate);

    let err = engine.tokenize("x", "orphan").await.unwrap_err();
    assert!(matches!(err, Error::Load(LoadError::NotFound(ref language)) if language == "ghost"));
    assert!(!engine.registry().contains("orphan"));
}

#[tokio::test]
async fn test_invalid_definition_is_a_parse_error() {
    let dir = grammar_dir();
    let engine = engine(&dir, LoadFailurePolicy::Propagate);

    let err = engine.tokenize("x", "broken").await.unwrap_err();
    assert!(matches!(err, Error::Load(LoadError::Parse { ref language, .. }) if language == "broken"));
}

#[tokio::test]
async fn test_path_escaping_ids_never_reach_the_filesystem() {
    let dir = grammar_dir();
    let nested = dir.path().join("inner");
    fs::create_dir(&nested).unwrap();
    // A grammar one level above the loader root
    let engine = TokenizationEngine::builder()
        .loader(LoaderEntry::new("*", DirectoryLoader::new(&nested)))
        .config(EngineConfig {
            load_failure: LoadFailurePolicy::Propagate,
            ..Default::default()
        })
        .build();

    for language in ["../base", "inner/../base", ".."] {
        let err = engine.tokenize("1", language).await.unwrap_err();
        assert!(
            matches!(err, Error::Load(LoadError::InvalidLanguage(_))),
            "{language} was not rejected"
        );
    }
    assert!(engine.registry().is_empty());

    let degrading = TokenizationEngine::new(vec![LoaderEntry::new(
        "*",
        DirectoryLoader::new(&nested),
    )]);
    assert_eq!(
        degrading.tokenize("1", "../base").await.unwrap(),
        vec![Token::text("1")]
    );
}
