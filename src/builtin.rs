//! Grammars shipped with the crate, embedded at compile time.

use crate::grammar::GrammarDefinition;
use crate::loader::{DefinitionLoader, LanguageMatcher, LoadError, LoadResult};

const DEFINITIONS: &[(&str, &str)] = &[
    ("clike", include_str!("../grammars/clike.json")),
    ("javascript", include_str!("../grammars/javascript.json")),
    ("json", include_str!("../grammars/json.json")),
    ("rust", include_str!("../grammars/rust.json")),
];

const ALIASES: &[(&str, &str)] = &[("js", "javascript"), ("rs", "rust")];

/// Loader serving every built-in grammar and alias.
pub fn loader() -> LoadResult<DefinitionLoader> {
    let mut loader = DefinitionLoader::new();
    for (language, json) in DEFINITIONS {
        let definition =
            GrammarDefinition::from_json(json).map_err(|source| LoadError::Parse {
                language: language.to_string(),
                source,
            })?;
        loader = loader.with_definition(*language, definition);
    }
    for (alias, language) in ALIASES {
        loader = loader.with_alias(*alias, *language);
    }
    Ok(loader)
}

/// Built-in language ids and aliases, sorted.
pub fn languages() -> Vec<&'static str> {
    let mut languages = DEFINITIONS
        .iter()
        .map(|(language, _)| *language)
        .chain(ALIASES.iter().map(|(alias, _)| *alias))
        .collect::<Vec<_>>();
    languages.sort();
    languages
}

pub fn matcher() -> LanguageMatcher {
    LanguageMatcher::OneOf(languages().into_iter().map(String::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Lexer, PatternLexer};
    use crate::loader::LanguageLoader;
    use crate::registry::GrammarRegistry;
    use crate::token::{Token, stream_text};
    use pretty_assertions::assert_eq;

    async fn resident(language: &str) -> GrammarRegistry {
        let registry = GrammarRegistry::new();
        loader().unwrap().load(language, &registry).await.unwrap();
        registry
    }

    #[tokio::test]
    async fn test_every_builtin_compiles() {
        let registry = GrammarRegistry::new();
        let loader = loader().unwrap();
        for language in languages() {
            loader.load(language, &registry).await.unwrap();
            assert!(registry.contains(language), "{language} not resident");
        }
        assert_eq!(registry.languages(), vec!["clike", "javascript", "json", "rust"]);
        assert_eq!(loader.languages(), languages());
    }

    #[tokio::test]
    async fn test_javascript_extends_clike() {
        let registry = resident("js").await;
        let grammar = registry.get("javascript").unwrap();
        assert_eq!(
            grammar.rule_names(),
            vec![
                "comment",
                "template-string",
                "string",
                "class-name",
                "keyword",
                "boolean",
                "number",
                "operator",
                "punctuation",
                "constant",
            ]
        );
    }

    #[tokio::test]
    async fn test_javascript_tokens() {
        let registry = resident("javascript").await;
        let grammar = registry.get("javascript").unwrap();

        let source = "const x = 1; // one";
        let tokens = PatternLexer.lex(source, &grammar);
        assert_eq!(
            tokens,
            vec![
                Token::classified("keyword", "const"),
                Token::text(" x "),
                Token::classified("operator", "="),
                Token::text(" "),
                Token::classified("number", "1"),
                Token::classified("punctuation", ";"),
                Token::text(" "),
                Token::classified("comment", "// one"),
            ]
        );
    }

    #[tokio::test]
    async fn test_comment_after_string_with_slashes() {
        let registry = resident("js").await;
        let grammar = registry.get("js").unwrap();

        let tokens = PatternLexer.lex(r#""a // b"; // real"#, &grammar);
        assert_eq!(
            tokens,
            vec![
                Token::classified("string", "\"a // b\""),
                Token::classified("punctuation", ";"),
                Token::text(" "),
                Token::classified("comment", "// real"),
            ]
        );
    }

    #[tokio::test]
    async fn test_json_property_and_values() {
        let registry = resident("json").await;
        let grammar = registry.get("json").unwrap();

        let tokens = PatternLexer.lex(r#"{"a": null}"#, &grammar);
        assert_eq!(
            tokens,
            vec![
                Token::classified("punctuation", "{"),
                Token::nested(
                    "property",
                    vec![Token::text("\"a\""), Token::classified("operator", ":")]
                ),
                Token::text(" "),
                Token::classified("null", "null").with_alias(vec!["keyword".to_string()]),
                Token::classified("punctuation", "}"),
            ]
        );
    }

    #[tokio::test]
    async fn test_rust_source_round_trips() {
        let registry = resident("rs").await;
        let grammar = registry.get("rs").unwrap();

        let source = r#"#[derive(Debug)]
struct Span<'a> { text: &'a str } // borrowed
fn main() {
    let c = 'x';
    println!("{} /* not a comment */", 0x1F_u8);
}"#;
        let tokens = PatternLexer.lex(source, &grammar);
        assert_eq!(stream_text(&tokens), source);
        assert!(tokens.iter().any(|t| t.kind() == Some("attribute")));
        assert!(tokens.iter().any(|t| t.kind() == Some("lifetime-annotation")));
        assert!(tokens.iter().any(|t| t.kind() == Some("char")));
        assert!(
            tokens
                .iter()
                .any(|t| t.kind() == Some("string") && t.to_text().contains("/* not"))
        );
    }
}
