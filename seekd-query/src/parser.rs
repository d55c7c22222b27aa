//! Query-string grammar used to expand free-text parts.
//!
//! The grammar is deliberately small:
//!
//! - whitespace separates terms
//! - `"double quoted"` text is a single phrase (an unterminated quote runs to
//!   the end of the input)
//! - a leading `-` prohibits a term, a leading `+` requires it (the default)
//! - the bare uppercase keyword `OR` between two terms groups them; chains
//!   such as `a OR b OR c` collapse into one group

use crate::types::{PartKind, PartLogic, QueryPart};

/// Turns free text into structured query parts.
///
/// Implementations must never return [`PartKind::Human`] parts.
pub trait QueryStringParser: Send + Sync {
    /// Parse `text` into zero or more structured parts.
    fn parse(&self, text: &str) -> Vec<QueryPart>;
}

/// The built-in parser for the grammar described in the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleQueryParser;

impl QueryStringParser for SimpleQueryParser {
    fn parse(&self, text: &str) -> Vec<QueryPart> {
        let parts = assemble(tokenize(text));
        tracing::trace!(count = parts.len(), "parsed query string");
        parts
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Token {
    Term { logic: PartLogic, text: String },
    Or,
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut logic = PartLogic::Required;
        let mut signed = false;
        if c == '+' || c == '-' {
            chars.next();
            signed = true;
            if c == '-' {
                logic = PartLogic::Prohibited;
            }
        }

        let quoted = chars.peek() == Some(&'"');
        let text = if quoted {
            chars.next();
            let mut phrase = String::new();
            for ch in chars.by_ref() {
                if ch == '"' {
                    break;
                }
                phrase.push(ch);
            }
            phrase.split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                word.push(ch);
                chars.next();
            }
            word
        };

        if text.is_empty() {
            continue;
        }
        if !signed && !quoted && text == "OR" {
            tokens.push(Token::Or);
        } else {
            tokens.push(Token::Term { logic, text });
        }
    }

    tokens
}

fn assemble(tokens: Vec<Token>) -> Vec<QueryPart> {
    let mut parts: Vec<QueryPart> = Vec::new();
    let mut pending_or = false;
    let mut continues_group = false;

    for token in tokens {
        let (logic, text) = match token {
            Token::Or => {
                // A leading OR has nothing to join.
                pending_or = !parts.is_empty();
                continue;
            }
            Token::Term { logic, text } => (logic, text),
        };
        let part = QueryPart::text(text).with_logic(logic);

        if !pending_or {
            parts.push(part);
            continues_group = false;
            continue;
        }
        pending_or = false;

        let Some(mut previous) = parts.pop() else {
            parts.push(part);
            continue;
        };
        let member = into_member(part);

        if continues_group {
            if let PartKind::Or { parts: members } = &mut previous.kind {
                members.push(member);
                parts.push(previous);
                continue;
            }
        }
        parts.push(QueryPart::or(vec![into_member(previous), member]));
        continues_group = true;
    }

    parts
}

/// Or-group members are optional unless explicitly prohibited.
fn into_member(part: QueryPart) -> QueryPart {
    match part.logic {
        PartLogic::Prohibited => part,
        _ => part.with_logic(PartLogic::Optional),
    }
}
