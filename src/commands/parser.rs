//! Command Line Tokenizer
//!
//! Splits a shell line into tokens on whitespace. Double quotes group text into a
//! single token and are kept, so a token can be handed to a JSON parser as is:
//!
//! ```text
//! SET user {"name":"Ariz Khan"} PX 5000
//!
//!   -> ["SET", "user", "{\"name\":\"Ariz Khan\"}", "PX", "5000"]
//! ```
//!
//! Whitespace only splits outside quotes, so `{"name":"Ariz Khan"}` is one token
//! while `{"name": "Ariz Khan"}` is two. Inside quotes a backslash escapes the
//! next character.

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while tokenizing a line.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// A double quote was opened but never closed
    #[error("unterminated quote starting at byte {0}")]
    UnterminatedQuote(usize),
}

/// Result type for tokenizing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Splits `line` into tokens.
pub fn tokenize(line: &str) -> ParseResult<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote_start: Option<usize> = None;
    let mut escaped = false;

    for (pos, c) in line.char_indices() {
        if quote_start.is_some() {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                quote_start = None;
            }
            continue;
        }

        if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c == '"' {
            quote_start = Some(pos);
        }
        current.push(c);
    }

    if let Some(start) = quote_start {
        return Err(ParseError::UnterminatedQuote(start));
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    Ok(tokens)
}

/// Interprets a token as a JSON value, falling back to a plain string.
pub fn parse_value(token: &str) -> Value {
    serde_json::from_str(token).unwrap_or_else(|_| Value::String(token.to_string()))
}

/// Strips the quotes of a quoted token; other tokens are returned unchanged.
pub fn unquote(token: &str) -> String {
    if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
        if let Ok(Value::String(s)) = serde_json::from_str::<Value>(token) {
            return s;
        }
    }
    token.to_string()
}
