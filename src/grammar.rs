//! # Grammars
//!
//! A grammar is an ordered list of rules. Every rule names the token type it
//! produces and owns one or more patterns; rule order is match priority.
//!
//! Grammars are described as [`GrammarDefinition`] data (usually JSON) and
//! compiled into a [`Grammar`] against a [`GrammarRegistry`], which supplies
//! the grammars a definition extends or embeds. Compiled grammars are
//! immutable and shared as `Arc<Grammar>`.
//!
//! ## Definition format
//!
//! ```json
//! {
//!   "extends": "clike",
//!   "rules": [
//!     { "name": "keyword", "patterns": "\\b(?:let|const)\\b" },
//!     { "name": "template", "before": "string", "patterns": {
//!         "pattern": "`[^`]*`", "greedy": true, "alias": "string",
//!         "inside": { "rules": [{ "name": "punctuation", "patterns": "`" }] }
//!     }}
//!   ]
//! }
//! ```
//!
//! * `lookbehind`: the first capture group is context and is left out of the token
//! * `greedy`: the pattern is matched against the whole source and may span
//!   earlier tokens
//! * `inside`: inline definition, or the id of a registered language, used to
//!   tokenize the matched text again

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::registry::GrammarRegistry;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GrammarError {
    #[error("Invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("Grammar {language} is not registered")]
    MissingDependency { language: String },
    #[error("Rule {rule} referenced by `before` does not exist")]
    UnknownAnchor { rule: String },
}

pub type GrammarResult<T> = Result<T, GrammarError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrammarDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    #[serde(deserialize_with = "one_or_many")]
    pub patterns: Vec<PatternDefinition>,
    /// Insert position when the rule is new to an extended grammar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PatternRepr")]
pub struct PatternDefinition {
    pub pattern: String,
    pub lookbehind: bool,
    pub greedy: bool,
    pub alias: Vec<String>,
    pub inside: Option<InsideDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InsideDefinition {
    Language(String),
    Grammar(Box<GrammarDefinition>),
}

// A pattern may be written as a bare regex string.
#[derive(Deserialize)]
#[serde(untagged)]
enum PatternRepr {
    Short(String),
    Full {
        pattern: String,
        #[serde(default)]
        lookbehind: bool,
        #[serde(default)]
        greedy: bool,
        #[serde(default, deserialize_with = "one_or_many")]
        alias: Vec<String>,
        #[serde(default)]
        inside: Option<InsideDefinition>,
    },
}

impl From<PatternRepr> for PatternDefinition {
    fn from(repr: PatternRepr) -> Self {
        match repr {
            PatternRepr::Short(pattern) => PatternDefinition {
                pattern,
                lookbehind: false,
                greedy: false,
                alias: Vec::new(),
                inside: None,
            },
            PatternRepr::Full {
                pattern,
                lookbehind,
                greedy,
                alias,
                inside,
            } => PatternDefinition {
                pattern,
                lookbehind,
                greedy,
                alias,
                inside,
            },
        }
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

impl GrammarDefinition {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Languages that must be registered before this definition compiles,
    /// in order of first appearance.
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps = Vec::new();
        self.collect_dependencies(&mut deps);
        deps
    }

    fn collect_dependencies(&self, deps: &mut Vec<String>) {
        if let Some(base) = &self.extends {
            if !deps.contains(base) {
                deps.push(base.clone());
            }
        }
        for pattern in self.rules.iter().flat_map(|rule| rule.patterns.iter()) {
            match &pattern.inside {
                Some(InsideDefinition::Language(language)) => {
                    if !deps.contains(language) {
                        deps.push(language.clone());
                    }
                }
                Some(InsideDefinition::Grammar(inner)) => inner.collect_dependencies(deps),
                None => {}
            }
        }
    }

    pub fn compile(&self, registry: &GrammarRegistry) -> GrammarResult<Grammar> {
        let mut rules = match &self.extends {
            Some(base) => registry
                .get(base)
                .ok_or_else(|| GrammarError::MissingDependency {
                    language: base.clone(),
                })?
                .rules
                .clone(),
            None => Vec::new(),
        };

        for definition in &self.rules {
            let rule = definition.compile(registry)?;
            // Redefinition keeps the base rule's position
            if let Some(slot) = rules.iter_mut().find(|r| r.name == rule.name) {
                *slot = rule;
                continue;
            }
            match &definition.before {
                Some(anchor) => {
                    let index = rules.iter().position(|r| &r.name == anchor).ok_or_else(|| {
                        GrammarError::UnknownAnchor {
                            rule: anchor.clone(),
                        }
                    })?;
                    rules.insert(index, rule);
                }
                None => rules.push(rule),
            }
        }

        Ok(Grammar { rules })
    }
}

impl RuleDefinition {
    fn compile(&self, registry: &GrammarRegistry) -> GrammarResult<Rule> {
        let patterns = self
            .patterns
            .iter()
            .map(|pattern| pattern.compile(registry))
            .collect::<GrammarResult<Vec<_>>>()?;
        Ok(Rule {
            name: self.name.clone(),
            patterns,
        })
    }
}

impl PatternDefinition {
    fn compile(&self, registry: &GrammarRegistry) -> GrammarResult<Pattern> {
        let inside = match &self.inside {
            Some(InsideDefinition::Language(language)) => {
                Some(
                    registry
                        .get(language)
                        .ok_or_else(|| GrammarError::MissingDependency {
                            language: language.clone(),
                        })?,
                )
            }
            Some(InsideDefinition::Grammar(definition)) => {
                Some(Arc::new(definition.compile(registry)?))
            }
            None => None,
        };

        Ok(Pattern {
            regex: compile_regex(&self.pattern)?,
            lookbehind: self.lookbehind,
            greedy: self.greedy,
            alias: self.alias.clone(),
            inside,
        })
    }
}

fn compile_regex(pattern: &str) -> GrammarResult<Regex> {
    Regex::new(pattern).map_err(|e| GrammarError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Compiled grammar, consumed by a [`Lexer`](crate::lexer::Lexer).
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    patterns: Vec<Pattern>,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
    lookbehind: bool,
    greedy: bool,
    alias: Vec<String>,
    inside: Option<Arc<Grammar>>,
}

impl Grammar {
    pub fn builder() -> GrammarBuilder {
        GrammarBuilder::default()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Rule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }
}

impl Pattern {
    pub fn new(pattern: &str) -> GrammarResult<Self> {
        Ok(Self {
            regex: compile_regex(pattern)?,
            lookbehind: false,
            greedy: false,
            alias: Vec::new(),
            inside: None,
        })
    }

    pub fn lookbehind(mut self) -> Self {
        self.lookbehind = true;
        self
    }

    pub fn greedy(mut self) -> Self {
        self.greedy = true;
        self
    }

    pub fn alias<S: Into<String>>(mut self, alias: S) -> Self {
        self.alias.push(alias.into());
        self
    }

    pub fn inside(mut self, grammar: Arc<Grammar>) -> Self {
        self.inside = Some(grammar);
        self
    }

    pub fn is_greedy(&self) -> bool {
        self.greedy
    }

    pub fn aliases(&self) -> &[String] {
        &self.alias
    }

    pub fn inside_grammar(&self) -> Option<&Arc<Grammar>> {
        self.inside.as_ref()
    }

    /// First non-empty match starting at or after `start`, as byte offsets
    /// into `haystack`. With lookbehind the first capture group is skipped.
    pub fn find_at(&self, haystack: &str, start: usize) -> Option<(usize, usize)> {
        let mut at = start;
        while at <= haystack.len() {
            let caps = self.regex.captures_at(haystack, at)?;
            let whole = caps.get(0)?;
            let from = match (self.lookbehind, caps.get(1)) {
                (true, Some(context)) => context.end(),
                _ => whole.start(),
            };
            if whole.end() > from {
                return Some((from, whole.end()));
            }
            at = if whole.end() > at {
                whole.end()
            } else {
                let step = haystack[at..].chars().next()?.len_utf8();
                at + step
            };
        }
        None
    }
}

#[derive(Debug, Default)]
pub struct GrammarBuilder {
    rules: Vec<Rule>,
}

impl GrammarBuilder {
    /// Adds a pattern to the named rule, creating the rule at the end when new.
    pub fn rule<S: Into<String>>(mut self, name: S, pattern: Pattern) -> Self {
        let name = name.into();
        match self.rules.iter_mut().find(|rule| rule.name == name) {
            Some(rule) => rule.patterns.push(pattern),
            None => self.rules.push(Rule {
                name,
                patterns: vec![pattern],
            }),
        }
        self
    }

    pub fn build(self) -> Grammar {
        Grammar { rules: self.rules }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_definition_short_and_full_forms() {
        let definition = GrammarDefinition::from_json(
            r#"{
                "rules": [
                    { "name": "keyword", "patterns": "\\bfn\\b" },
                    { "name": "comment", "patterns": [
                        "//.*",
                        { "pattern": "(^|[^\\\\])/\\*[\\s\\S]*?\\*/", "lookbehind": true, "greedy": true, "alias": "block" }
                    ]}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(definition.rules.len(), 2);
        assert_eq!(definition.rules[0].patterns[0].pattern, "\\bfn\\b");
        let block = &definition.rules[1].patterns[1];
        assert!(block.lookbehind);
        assert!(block.greedy);
        assert_eq!(block.alias, vec!["block".to_string()]);
    }

    #[test]
    fn test_dependencies_are_collected_once() {
        let definition = GrammarDefinition::from_json(
            r#"{
                "extends": "clike",
                "rules": [
                    { "name": "script", "patterns": { "pattern": "<script>", "inside": "javascript" } },
                    { "name": "style", "patterns": { "pattern": "<style>", "inside": {
                        "extends": "clike",
                        "rules": [{ "name": "x", "patterns": { "pattern": "x", "inside": "css" } }]
                    }}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(
            definition.dependencies(),
            vec!["clike".to_string(), "javascript".to_string(), "css".to_string()]
        );
    }

    #[test]
    fn test_compile_extends_replaces_and_inserts() {
        let registry = GrammarRegistry::new();
        registry
            .register_definition(
                "base",
                &GrammarDefinition::from_json(
                    r#"{ "rules": [
                        { "name": "string", "patterns": "\"[^\"]*\"" },
                        { "name": "keyword", "patterns": "\\bif\\b" },
                        { "name": "number", "patterns": "\\d+" }
                    ]}"#,
                )
                .unwrap(),
            )
            .unwrap();

        let derived = GrammarDefinition::from_json(
            r#"{ "extends": "base", "rules": [
                { "name": "keyword", "patterns": "\\b(?:if|let)\\b" },
                { "name": "template", "patterns": "`[^`]*`", "before": "string" },
                { "name": "operator", "patterns": "[+-]" }
            ]}"#,
        )
        .unwrap()
        .compile(&registry)
        .unwrap();

        assert_eq!(
            derived.rule_names(),
            vec!["template", "string", "keyword", "number", "operator"]
        );
    }

    #[test]
    fn test_compile_errors() {
        let registry = GrammarRegistry::new();

        let missing = GrammarDefinition {
            extends: Some("nope".to_string()),
            rules: Vec::new(),
        };
        assert_eq!(
            missing.compile(&registry).unwrap_err(),
            GrammarError::MissingDependency {
                language: "nope".to_string()
            }
        );

        let bad = GrammarDefinition::from_json(r#"{ "rules": [{ "name": "x", "patterns": "(" }] }"#)
            .unwrap();
        assert!(matches!(
            bad.compile(&registry),
            Err(GrammarError::InvalidPattern { .. })
        ));

        let anchor = GrammarDefinition::from_json(
            r#"{ "rules": [{ "name": "x", "patterns": "x", "before": "y" }] }"#,
        )
        .unwrap();
        assert_eq!(
            anchor.compile(&registry).unwrap_err(),
            GrammarError::UnknownAnchor {
                rule: "y".to_string()
            }
        );
    }

    #[test]
    fn test_find_at_lookbehind_and_empty_matches() {
        let pattern = Pattern::new(r"(^|[^\\])//.*").unwrap().lookbehind();
        assert_eq!(pattern.find_at("a // b", 0), Some((2, 6)));
        assert_eq!(pattern.find_at("// b", 0), Some((0, 4)));
        assert_eq!(pattern.find_at("\\// b", 0), None);

        let optional = Pattern::new(r"x*").unwrap();
        assert_eq!(optional.find_at("abxx", 0), Some((2, 4)));
        assert_eq!(optional.find_at("ab", 0), None);
    }

    #[test]
    fn test_builder_groups_patterns_by_rule() {
        let grammar = Grammar::builder()
            .rule("comment", Pattern::new("//.*").unwrap())
            .rule("keyword", Pattern::new("fn").unwrap())
            .rule("comment", Pattern::new("#.*").unwrap())
            .build();
        assert_eq!(grammar.rule_names(), vec!["comment", "keyword"]);
        assert_eq!(grammar.rule("comment").unwrap().patterns().len(), 2);
    }
}
