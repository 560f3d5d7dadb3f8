//! Command Handler
//!
//! Executes shell lines against an [`ExpiringStore`].
//!
//! ## Supported Commands
//!
//! ### Entry Commands
//! - `SET key value [PX milliseconds | AT unix-milliseconds | NEVER]` - Store a value
//! - `GET key` - Read a value (purges it if expired)
//! - `DEL key [key ...]` - Remove values and their expirations; counts live keys
//! - `PTTL key` - Remaining lifetime in milliseconds
//! - `SHADOW key` - Name of the key holding the expiration
//!
//! ### Store Commands
//! - `KEYS [ALL]` - List keys; `ALL` includes expiration entries
//! - `CLEAR` - Remove everything in the namespace
//! - `CONFIG` / `CONFIG GET field` / `CONFIG EXPIRE <ms|never>`
//! - `DRIVER [name ...]` - Show or change the driver
//!
//! ### Server Commands
//! - `PING [message]`, `INFO`, `HELP`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ tokenize()  │───>│  dispatch() │───>│  cmd_*()    │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ExpiringStore          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::commands::parser::{parse_value, tokenize, unquote};
use crate::commands::reply::Reply;
use crate::config::{ConfigRequest, ConfigResponse, DefaultExpiration, StoreOptions};
use crate::storage::expiry::{shadow_key, Expiration};
use crate::storage::{ExpiringStore, StorageBackend};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

const HELP: &str = "\
SET key value [PX ms | AT unix-ms | NEVER]
GET key
DEL key [key ...]
PTTL key
SHADOW key
KEYS [ALL]
CLEAR
CONFIG | CONFIG GET field | CONFIG EXPIRE <ms|never>
DRIVER [name ...]
PING [message]
INFO
QUIT";

/// Handles shell commands by dispatching them to the store.
pub struct CommandHandler<B> {
    store: Arc<ExpiringStore<B>>,
    /// Start time for the INFO command
    start_time: Instant,
}

impl<B> Clone for CommandHandler<B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            start_time: self.start_time,
        }
    }
}

impl<B: StorageBackend> CommandHandler<B> {
    /// Creates a new command handler over `store`.
    pub fn new(store: Arc<ExpiringStore<B>>) -> Self {
        Self {
            store,
            start_time: Instant::now(),
        }
    }

    /// Executes one shell line and returns the reply to print.
    pub async fn execute(&self, line: &str) -> Reply {
        let tokens = match tokenize(line) {
            Ok(tokens) => tokens,
            Err(e) => return Reply::error(format!("ERR {}", e)),
        };

        let Some((name, args)) = tokens.split_first() else {
            return Reply::error("ERR empty command");
        };

        self.dispatch(&name.to_uppercase(), args).await
    }

    async fn dispatch(&self, cmd: &str, args: &[String]) -> Reply {
        match cmd {
            // Entry commands
            "SET" => self.cmd_set(args).await,
            "GET" => self.cmd_get(args).await,
            "DEL" => self.cmd_del(args).await,
            "PTTL" => self.cmd_pttl(args).await,
            "SHADOW" => self.cmd_shadow(args),

            // Store commands
            "KEYS" => self.cmd_keys(args).await,
            "CLEAR" => self.cmd_clear(args).await,
            "CONFIG" => self.cmd_config(args),
            "DRIVER" => self.cmd_driver(args).await,

            // Server commands
            "PING" => self.cmd_ping(args),
            "INFO" => self.cmd_info(args),
            "HELP" => Reply::status(HELP),

            _ => Reply::error(format!("ERR unknown command '{}'", cmd)),
        }
    }

    fn wrong_args(cmd: &str) -> Reply {
        Reply::error(format!(
            "ERR wrong number of arguments for '{}' command",
            cmd
        ))
    }

    // ========================================================================
    // Entry Commands
    // ========================================================================

    /// SET key value [PX milliseconds | AT unix-milliseconds | NEVER]
    async fn cmd_set(&self, args: &[String]) -> Reply {
        if args.len() < 2 {
            return Self::wrong_args("SET");
        }

        let key = unquote(&args[0]);
        let value = parse_value(&args[1]);

        let mut expires: Option<Expiration> = None;
        let mut i = 2;
        while i < args.len() {
            match args[i].to_uppercase().as_str() {
                "PX" => {
                    i += 1;
                    let ms = match args.get(i).and_then(|s| s.parse::<u64>().ok()) {
                        Some(ms) => ms,
                        None => return Reply::error("ERR invalid expire time"),
                    };
                    expires = Some(Expiration::after(Duration::from_millis(ms)));
                }
                "AT" => {
                    i += 1;
                    let ts = match args.get(i).and_then(|s| s.parse::<i64>().ok()) {
                        Some(ts) => ts,
                        None => return Reply::error("ERR invalid expire time"),
                    };
                    expires = Some(Expiration::At(ts));
                }
                "NEVER" => expires = Some(Expiration::Never),
                opt => return Reply::error(format!("ERR unknown option '{}'", opt)),
            }
            i += 1;
        }

        match self.store.set_item(&key, value, expires).await {
            Ok(()) => Reply::ok(),
            Err(e) => Reply::error(format!("ERR {}", e)),
        }
    }

    /// GET key
    async fn cmd_get(&self, args: &[String]) -> Reply {
        if args.len() != 1 {
            return Self::wrong_args("GET");
        }

        match self.store.get_item(&unquote(&args[0])).await {
            Ok(value) => Reply::optional(value),
            Err(e) => Reply::error(format!("ERR {}", e)),
        }
    }

    /// DEL key [key ...]
    ///
    /// Replies with the number of keys that held a live value.
    async fn cmd_del(&self, args: &[String]) -> Reply {
        if args.is_empty() {
            return Self::wrong_args("DEL");
        }

        let mut removed = 0;
        for key in args {
            let key = unquote(key);

            // Expired entries don't count, but their leftovers are still removed
            let existed = match self.store.get_item(&key).await {
                Ok(value) => value.is_some(),
                Err(e) => return Reply::error(format!("ERR {}", e)),
            };
            if let Err(e) = self.store.remove_item(&key).await {
                return Reply::error(format!("ERR {}", e));
            }
            if existed {
                removed += 1;
            }
        }

        Reply::Integer(removed)
    }

    /// PTTL key
    ///
    /// `-2` if the key doesn't exist (or just expired), `-1` if it never expires.
    async fn cmd_pttl(&self, args: &[String]) -> Reply {
        if args.len() != 1 {
            return Self::wrong_args("PTTL");
        }
        let key = unquote(&args[0]);

        // Reading first purges an expired entry
        match self.store.get_item(&key).await {
            Ok(Some(_)) => {}
            Ok(None) => return Reply::Integer(-2),
            Err(e) => return Reply::error(format!("ERR {}", e)),
        }

        let stored = match self.store.backend().get_item(&shadow_key(&key)).await {
            Ok(stored) => stored,
            Err(e) => return Reply::error(format!("ERR {}", e)),
        };

        match stored
            .as_ref()
            .and_then(Expiration::from_value)
            .and_then(|expires| expires.remaining())
        {
            Some(left) => Reply::Integer(i64::try_from(left.as_millis()).unwrap_or(i64::MAX)),
            None => Reply::Integer(-1),
        }
    }

    /// SHADOW key
    fn cmd_shadow(&self, args: &[String]) -> Reply {
        if args.len() != 1 {
            return Self::wrong_args("SHADOW");
        }
        Reply::status(shadow_key(&unquote(&args[0])))
    }

    // ========================================================================
    // Store Commands
    // ========================================================================

    /// KEYS [ALL]
    async fn cmd_keys(&self, args: &[String]) -> Reply {
        let show_all = match args {
            [] => false,
            [opt] if opt.eq_ignore_ascii_case("ALL") => true,
            _ => return Reply::error("ERR syntax error"),
        };

        let mut keys = match self.store.backend().keys().await {
            Ok(keys) => keys,
            Err(e) => return Reply::error(format!("ERR {}", e)),
        };
        keys.sort();

        if show_all {
            return Reply::strings(keys);
        }

        let shadows: HashSet<String> = keys.iter().map(|k| shadow_key(k)).collect();
        Reply::strings(keys.into_iter().filter(|k| !shadows.contains(k)))
    }

    /// CLEAR
    async fn cmd_clear(&self, args: &[String]) -> Reply {
        if !args.is_empty() {
            return Self::wrong_args("CLEAR");
        }

        match self.store.clear().await {
            Ok(()) => Reply::ok(),
            Err(e) => Reply::error(format!("ERR {}", e)),
        }
    }

    /// CONFIG | CONFIG GET field | CONFIG EXPIRE <ms|never>
    fn cmd_config(&self, args: &[String]) -> Reply {
        let request = match args {
            [] => ConfigRequest::Current,
            [sub, field] if sub.eq_ignore_ascii_case("GET") => ConfigRequest::Get(unquote(field)),
            [sub, ttl] if sub.eq_ignore_ascii_case("EXPIRE") => {
                match ttl.parse::<DefaultExpiration>() {
                    Ok(expiration) => ConfigRequest::Apply(
                        StoreOptions::new().with_default_expiration(expiration),
                    ),
                    Err(e) => return Reply::error(format!("ERR {}", e)),
                }
            }
            _ => return Reply::error("ERR syntax error"),
        };

        match self.store.config(request) {
            Ok(ConfigResponse::Applied) => Reply::ok(),
            Ok(ConfigResponse::Value(value)) => Reply::optional(value),
            Ok(ConfigResponse::Current(options)) => match serde_json::to_value(&options) {
                Ok(value) => Reply::Value(value),
                Err(e) => Reply::error(format!("ERR {}", e)),
            },
            Err(e) => Reply::error(format!("ERR {}", e)),
        }
    }

    /// DRIVER [name ...]
    async fn cmd_driver(&self, args: &[String]) -> Reply {
        if args.is_empty() {
            return match self.store.driver() {
                Some(name) => Reply::status(name),
                None => Reply::Nil,
            };
        }

        let names: Vec<String> = args.iter().map(|a| unquote(a)).collect();
        match self.store.set_driver(&names).await {
            Ok(()) => Reply::ok(),
            Err(e) => Reply::error(format!("ERR {}", e)),
        }
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    /// PING [message]
    fn cmd_ping(&self, args: &[String]) -> Reply {
        match args {
            [] => Reply::pong(),
            [message] => Reply::Value(parse_value(message)),
            _ => Self::wrong_args("PING"),
        }
    }

    /// INFO
    fn cmd_info(&self, _args: &[String]) -> Reply {
        let uptime = self.start_time.elapsed().as_secs();

        let field = |name: &str| match self.store.config(ConfigRequest::Get(name.to_string())) {
            Ok(ConfigResponse::Value(Some(value))) => value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
            _ => String::from("-"),
        };

        let info = format!(
            "# Server\n\
             expirykv_version:{}\n\
             uptime_in_seconds:{}\n\
             \n\
             # Storage\n\
             driver:{}\n\
             name:{}\n\
             store_name:{}\n\
             default_expiration:{}",
            crate::VERSION,
            uptime,
            self.store.driver().unwrap_or_else(|| "-".to_string()),
            field("name"),
            field("storeName"),
            self.store.default_expiration(),
        );

        Reply::status(info)
    }
}
