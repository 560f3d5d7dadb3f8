//! Command Module
//!
//! The command layer behind the interactive shell. A line is tokenized, executed
//! against the expiring store, and answered with a [`Reply`].
//!
//! ## Architecture
//!
//! ```text
//!   stdin line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │   tokenize()    │  (parser)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (handler)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ ExpiringStore   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### Entry Commands
//! - `SET`, `GET`, `DEL`, `PTTL`, `SHADOW`
//!
//! ### Store Commands
//! - `KEYS`, `CLEAR`, `CONFIG`, `DRIVER`
//!
//! ### Server Commands
//! - `PING`, `INFO`, `HELP`

pub mod handler;
pub mod parser;
pub mod reply;

pub use handler::CommandHandler;
pub use parser::{tokenize, ParseError};
pub use reply::Reply;
