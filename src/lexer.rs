//! # Lexer
//!
//! Turns source text into a token stream given a resolved [`Grammar`].
//! The engine only decides *which* grammar applies; implementations of
//! [`Lexer`] do the matching.
//!
//! Every lexer must be deterministic and total, and the text of its output
//! stream must equal its input.

use tracing::trace;

use crate::grammar::{Grammar, Pattern};
use crate::token::Token;

pub trait Lexer: Send + Sync {
    fn lex(&self, source: &str, grammar: &Grammar) -> Vec<Token>;
}

/// Ordered-rule lexer.
///
/// The stream starts as a single plain fragment. Rules are applied in grammar
/// order; each pattern sweeps the stream once from left to right and splits
/// every plain fragment it matches into `before`, token and `after`.
///
/// Greedy patterns are searched in the whole source starting at the current
/// offset, so a match may run across tokens produced by earlier rules. Those
/// tokens are folded into the new one as long as the match starts inside a
/// plain fragment. The text they covered beyond the match is then matched
/// again by every pattern that precedes the greedy one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternLexer;

type Entry<'g> = (&'g str, &'g Pattern);

impl Lexer for PatternLexer {
    fn lex(&self, source: &str, grammar: &Grammar) -> Vec<Token> {
        if source.is_empty() {
            return Vec::new();
        }
        let patterns = grammar
            .rules()
            .iter()
            .flat_map(|rule| rule.patterns().iter().map(move |pattern| (rule.name(), pattern)))
            .collect::<Vec<_>>();

        let mut stream = vec![Token::text(source)];
        self.match_patterns(source, &mut stream, &patterns, 0, 0, &mut None);
        stream
    }
}

impl PatternLexer {
    /// Runs `patterns` in order over the nodes from `start`, which sits at
    /// byte `offset`. With a `reach`, scanning stops at that offset and the
    /// reach grows with every splice that extends past it.
    fn match_patterns(
        &self,
        source: &str,
        stream: &mut Vec<Token>,
        patterns: &[Entry<'_>],
        start: usize,
        offset: usize,
        reach: &mut Option<usize>,
    ) {
        for current in 0..patterns.len() {
            self.apply(source, stream, patterns, current, start, offset, reach);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        source: &str,
        stream: &mut Vec<Token>,
        patterns: &[Entry<'_>],
        current: usize,
        start: usize,
        offset: usize,
        reach: &mut Option<usize>,
    ) {
        let (kind, pattern) = patterns[current];
        let mut index = start;
        let mut pos = offset;

        while index < stream.len() {
            if matches!(*reach, Some(limit) if pos >= limit) {
                break;
            }
            let node_len = stream[index].text_len();
            let Token::Text(fragment) = &stream[index] else {
                pos += node_len;
                index += 1;
                continue;
            };

            if !pattern.is_greedy() {
                let Some((from, to)) = pattern.find_at(fragment, 0) else {
                    pos += node_len;
                    index += 1;
                    continue;
                };
                let text = fragment.clone();
                extend_reach(reach, pos + text.len());
                let (next_index, next_pos) =
                    self.splice(stream, index, 1, &text, (from, to), kind, pattern, pos);
                index = next_index;
                pos = next_pos;
                continue;
            }

            let Some((from, to)) = pattern.find_at(source, pos) else {
                break;
            };

            // Walk to the node holding the match start
            let mut node_start = pos;
            while index < stream.len() && from >= node_start + stream[index].text_len() {
                node_start += stream[index].text_len();
                index += 1;
            }
            if index >= stream.len() {
                break;
            }
            pos = node_start;
            if !stream[index].is_plain() {
                pos += stream[index].text_len();
                index += 1;
                continue;
            }

            // Nodes covered by the match, plus trailing plain fragments
            let mut remove = 0;
            let mut end = node_start;
            while index + remove < stream.len()
                && (end < to || stream[index + remove].is_plain())
            {
                end += stream[index + remove].text_len();
                remove += 1;
            }

            let text = &source[node_start..end];
            trace!(kind, remove, "greedy match spans {}..{}", from, to);
            extend_reach(reach, end);
            let (next_index, next_pos) = self.splice(
                stream,
                index,
                remove,
                text,
                (from - node_start, to - node_start),
                kind,
                pattern,
                pos,
            );

            if remove > 1 {
                // Earlier patterns see the text after the swallowed tokens again
                let mut nested = Some(end);
                self.match_patterns(
                    source,
                    stream,
                    &patterns[..current],
                    next_index - 1,
                    from,
                    &mut nested,
                );
                if let Some(nested) = nested {
                    extend_reach(reach, nested);
                }
            }
            index = next_index;
            pos = next_pos;
        }
    }

    /// Replaces `remove` nodes at `index` with `before`, token and `after`.
    /// Returns the index and offset of the node following the new token.
    #[allow(clippy::too_many_arguments)]
    fn splice(
        &self,
        stream: &mut Vec<Token>,
        index: usize,
        remove: usize,
        text: &str,
        (from, to): (usize, usize),
        kind: &str,
        pattern: &Pattern,
        pos: usize,
    ) -> (usize, usize) {
        let before = &text[..from];
        let matched = &text[from..to];
        let after = &text[to..];

        let token = match pattern.inside_grammar() {
            Some(inside) => Token::nested(kind, self.lex(matched, inside)),
            None => Token::classified(kind, matched),
        }
        .with_alias(pattern.aliases().to_vec());

        let mut replacement = Vec::with_capacity(3);
        if !before.is_empty() {
            replacement.push(Token::text(before));
        }
        replacement.push(token);
        if !after.is_empty() {
            replacement.push(Token::text(after));
        }
        stream.splice(index..index + remove, replacement);

        let token_index = index + usize::from(!before.is_empty());
        (token_index + 1, pos + to)
    }
}

fn extend_reach(reach: &mut Option<usize>, end: usize) {
    if let Some(limit) = reach {
        *limit = (*limit).max(end);
    }
}
