//! Shell Replies
//!
//! What a command answers, rendered the way redis-cli prints its replies:
//!
//! ```text
//! OK                    status
//! {"name":"Ariz"}       stored value, as JSON
//! (nil)                 missing or expired
//! (integer) 1500        number
//! (error) ERR ...       failure
//! 1) "a"                list
//! 2) "b"
//! ```

use serde_json::Value;
use std::fmt;

/// A command's answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Short status message, printed as is
    Status(String),

    /// A stored value
    Value(Value),

    /// Missing value
    Nil,

    Integer(i64),

    /// Failure message
    Error(String),

    /// Sequence of replies, printed one per line
    List(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    pub fn pong() -> Self {
        Reply::Status("PONG".to_string())
    }

    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Reply::Error(msg.into())
    }

    /// `Value` for `Some`, `Nil` for `None`.
    pub fn optional(value: Option<Value>) -> Self {
        value.map(Reply::Value).unwrap_or(Reply::Nil)
    }

    /// A list of strings.
    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Reply::List(
            items
                .into_iter()
                .map(|s| Reply::Value(Value::String(s.into())))
                .collect(),
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Value(v) => write!(f, "{}", v),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::List(items) => {
                if items.is_empty() {
                    return write!(f, "(empty list)");
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, item)?;
                }
                Ok(())
            }
        }
    }
}
