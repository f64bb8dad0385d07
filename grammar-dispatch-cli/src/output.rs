//! Token stream rendering for the command line.
//!
//! * `json`: the token stream as serialized by the library
//! * `tree`: one node per line, nested tokens indented under their parent
//! * `text`: one leaf per line with its byte range and class path

use clap::ValueEnum;
use grammar_dispatch::token::{ClassifiedToken, Token, TokenContent};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Tree,
    Text,
}

pub fn render(tokens: &[Token], format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(tokens),
        OutputFormat::Tree => {
            let mut out = String::new();
            write_tree(&mut out, tokens, 0);
            Ok(out)
        }
        OutputFormat::Text => {
            let mut out = String::new();
            write_leaves(&mut out, tokens, &mut Vec::new(), &mut 0);
            Ok(out)
        }
    }
}

fn label(token: &ClassifiedToken) -> String {
    if token.alias.is_empty() {
        token.kind.clone()
    } else {
        format!("{} [{}]", token.kind, token.alias.join(", "))
    }
}

fn write_tree(out: &mut String, tokens: &[Token], depth: usize) {
    let indent = "  ".repeat(depth);
    for token in tokens {
        // String への書き込みは失敗しない
        let _ = match token {
            Token::Text(text) => writeln!(out, "{}{:?}", indent, text),
            Token::Classified(classified) => match &classified.content {
                TokenContent::Text(text) => {
                    writeln!(out, "{}{} {:?}", indent, label(classified), text)
                }
                TokenContent::Nested(children) => {
                    let _ = writeln!(out, "{}{}", indent, label(classified));
                    write_tree(out, children, depth + 1);
                    Ok(())
                }
            },
        };
    }
}

fn write_leaves<'a>(
    out: &mut String,
    tokens: &'a [Token],
    path: &mut Vec<&'a str>,
    offset: &mut usize,
) {
    for token in tokens {
        let (class, text) = match token {
            Token::Text(text) => (None, text),
            Token::Classified(classified) => match &classified.content {
                TokenContent::Text(text) => (Some(classified.kind.as_str()), text),
                TokenContent::Nested(children) => {
                    path.push(&classified.kind);
                    write_leaves(out, children, path, offset);
                    path.pop();
                    continue;
                }
            },
        };

        let mut classes = path.clone();
        classes.extend(class);
        let classes = if classes.is_empty() {
            "-".to_string()
        } else {
            classes.join("/")
        };
        let end = *offset + text.len();
        let _ = writeln!(out, "{}..{}\t{}\t{:?}", offset, end, classes, text);
        *offset = end;
    }
}
