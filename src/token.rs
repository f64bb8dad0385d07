//! # Token Model
//!
//! Output of a tokenization run. A stream is an ordered `Vec<Token>` in which
//! plain fragments and classified tokens alternate freely. Classified tokens
//! may carry a nested stream when their grammar re-tokenizes the matched span.
//!
//! The concatenated text of a stream always equals the source it came from,
//! see [`stream_text`].
//!
//! ## Serialized form
//!
//! ```text
//! ["let ", {"type": "keyword", "content": "fn"}, {"type": "string", "content": ["\"", ...]}]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Token {
    // Unclassified source text
    Text(String),
    Classified(ClassifiedToken),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedToken {
    /// Rule name that produced the token (e.g. `keyword`, `string`)
    #[serde(rename = "type")]
    pub kind: String,
    pub content: TokenContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alias: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenContent {
    Text(String),
    Nested(Vec<Token>),
}

impl Token {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Token::Text(text.into())
    }

    pub fn classified<K: Into<String>, S: Into<String>>(kind: K, text: S) -> Self {
        Token::Classified(ClassifiedToken {
            kind: kind.into(),
            content: TokenContent::Text(text.into()),
            alias: Vec::new(),
        })
    }

    pub fn nested<K: Into<String>>(kind: K, children: Vec<Token>) -> Self {
        Token::Classified(ClassifiedToken {
            kind: kind.into(),
            content: TokenContent::Nested(children),
            alias: Vec::new(),
        })
    }

    pub fn with_alias(mut self, alias: Vec<String>) -> Self {
        if let Token::Classified(token) = &mut self {
            token.alias = alias;
        }
        self
    }

    /// Rule name, `None` for plain fragments.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Token::Text(_) => None,
            Token::Classified(token) => Some(&token.kind),
        }
    }

    pub fn is_plain(&self) -> bool {
        matches!(self, Token::Text(_))
    }

    /// Source text covered by this token, nested content included.
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(self.text_len());
        self.write_text(&mut out);
        out
    }

    /// Byte length of the covered source text.
    pub fn text_len(&self) -> usize {
        match self {
            Token::Text(text) => text.len(),
            Token::Classified(token) => token.content.text_len(),
        }
    }

    fn write_text(&self, out: &mut String) {
        match self {
            Token::Text(text) => out.push_str(text),
            Token::Classified(token) => match &token.content {
                TokenContent::Text(text) => out.push_str(text),
                TokenContent::Nested(children) => {
                    for child in children {
                        child.write_text(out);
                    }
                }
            },
        }
    }
}

impl TokenContent {
    pub fn text_len(&self) -> usize {
        match self {
            TokenContent::Text(text) => text.len(),
            TokenContent::Nested(children) => children.iter().map(Token::text_len).sum(),
        }
    }
}

impl ClassifiedToken {
    /// Rule name followed by its aliases.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.kind.as_str()).chain(self.alias.iter().map(String::as_str))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

/// Concatenated text of a token stream.
pub fn stream_text(tokens: &[Token]) -> String {
    let mut out = String::with_capacity(tokens.iter().map(Token::text_len).sum());
    for token in tokens {
        token.write_text(&mut out);
    }
    out
}
