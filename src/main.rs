//! expirykv - Expiring Key-Value Storage
//!
//! This is the entry point for the expirykv shell.
//! It sets up the storage engine and the expiring store, then executes commands
//! read from stdin until QUIT, end of input, or Ctrl+C.

use expirykv::commands::CommandHandler;
use expirykv::config::{ConfigRequest, DefaultExpiration, StoreOptions};
use expirykv::storage::{ExpiringStore, StorageEngine};
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Shell configuration
struct Config {
    /// Database name
    name: String,
    /// Store name within the database
    store_name: String,
    /// Lifetime of entries saved without an explicit expiration
    default_expiration: DefaultExpiration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "expirykv".to_string(),
            store_name: "keyvaluepairs".to_string(),
            default_expiration: DefaultExpiration::Never,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--name" | "-n" => {
                    config.name = required_value(&args, i, "--name");
                    i += 2;
                }
                "--store-name" | "-s" => {
                    config.store_name = required_value(&args, i, "--store-name");
                    i += 2;
                }
                "--default-expiration" | "-e" => {
                    let raw = required_value(&args, i, "--default-expiration");
                    config.default_expiration = raw.parse().unwrap_or_else(|e| {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("expirykv version {}", expirykv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    fn store_options(&self) -> StoreOptions {
        StoreOptions::new()
            .with_name(&self.name)
            .with_store_name(&self.store_name)
            .with_default_expiration(self.default_expiration)
    }
}

/// Returns the value following the flag at `i`, or exits.
fn required_value(args: &[String], i: usize, flag: &str) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
expirykv - Expiring Key-Value Storage

USAGE:
    expirykv [OPTIONS]

OPTIONS:
    -n, --name <NAME>                   Database name (default: expirykv)
    -s, --store-name <NAME>             Store name (default: keyvaluepairs)
    -e, --default-expiration <MS>       Default lifetime in ms, or "never" (default: never)
    -v, --version                       Print version information
    -h, --help                          Print this help message

EXAMPLES:
    expirykv                            # Entries never expire unless told to
    expirykv -e 60000                   # Entries expire a minute after they are saved
    RUST_LOG=debug expirykv             # Verbose logging on stderr

SESSION:
    expirykv> SET token "abc123" PX 5000
    OK
    expirykv> GET token
    "abc123"
    expirykv> PTTL token
    (integer) 4210
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging; stdout belongs to the shell
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Create the storage engine and the store on top of it
    let store = Arc::new(ExpiringStore::new(StorageEngine::new()));
    store.config(ConfigRequest::Apply(config.store_options()))?;
    store.ready().await?;
    info!(
        name = %config.name,
        store_name = %config.store_name,
        default_expiration = %config.default_expiration,
        driver = store.driver().as_deref().unwrap_or("-"),
        "Store ready"
    );

    let handler = CommandHandler::new(Arc::clone(&store));

    // Set up graceful shutdown
    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping shell..."),
            Err(e) => {
                // Keep the shell running; QUIT and end of input still stop it
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        result = run_shell(handler) => result?,
        _ = shutdown => {}
    }

    let stats = store.backend().memory().stats();
    info!(
        keys = stats.keys,
        get_ops = stats.get_ops,
        set_ops = stats.set_ops,
        del_ops = stats.del_ops,
        "Shell closed"
    );
    Ok(())
}

/// Reads commands from stdin until QUIT or end of input
async fn run_shell(handler: CommandHandler<StorageEngine>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();

    loop {
        stdout.write_all(b"expirykv> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            debug!("End of input");
            break;
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("QUIT") || line.eq_ignore_ascii_case("EXIT") {
            break;
        }

        let reply = handler.execute(line).await;
        stdout.write_all(format!("{}\n", reply).as_bytes()).await?;
    }

    Ok(())
}
