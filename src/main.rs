//! Covers Cache maintenance tool
//!
//! Inspects and repairs a cover cache directory from the command line.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use covers_cache::{CacheConfig, CoverStore};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Show entry/file counts (default)
    Stats,
    /// List index keys
    Keys,
    /// Show the cached cover for a key
    Get { key: String },
    /// Copy a file into the cache under a key
    Put {
        key: String,
        url: String,
        file: PathBuf,
    },
    /// Remove a key from the index
    Rm { key: String },
    /// Reconcile index and files
    Sync,
    /// Shrink the index to its bound
    Purge,
    /// Wipe and recreate the cache
    Reset,
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"covers-cache - Inspect and repair a book cover cache

USAGE:
    covers-cache                         # Show cache statistics (default)
    covers-cache keys
    covers-cache get <key>
    covers-cache put <key> <url> <file>
    covers-cache rm <key>
    covers-cache sync
    covers-cache purge
    covers-cache reset
    covers-cache help

COMMANDS:
    stats   Entry count, file count, bytes on disk
    keys    List every key in the index
    get     Print url and local path for a key
    put     Copy a downloaded cover into the cache
    rm      Remove a key (the file is reclaimed by the next sync)
    sync    Clear references to missing files and delete orphan files
    purge   Evict low-hit entries down to COVERS_CACHE_MAXLEN, then sync
    reset   Delete every cached cover and start with an empty cache

ENVIRONMENT:
    COVERS_CACHE_DIR     Cache root (default: <user cache dir>/covers)
    COVERS_CACHE_MAXLEN  Index size bound (default: 3000)
    COVERS_CACHE_NSLOTS  Number of slot directories (default: 10)
    RUST_LOG             Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Stats);
    }

    let need = |n: usize, usage: &str| -> Result<()> {
        if args.len() < n {
            return Err(anyhow!("Usage: covers-cache {}", usage));
        }
        Ok(())
    };

    match args[1].as_str() {
        "stats" => Ok(Command::Stats),
        "keys" => Ok(Command::Keys),
        "get" => {
            need(3, "get <key>")?;
            Ok(Command::Get {
                key: args[2].clone(),
            })
        }
        "put" => {
            need(5, "put <key> <url> <file>")?;
            Ok(Command::Put {
                key: args[2].clone(),
                url: args[3].clone(),
                file: PathBuf::from(&args[4]),
            })
        }
        "rm" => {
            need(3, "rm <key>")?;
            Ok(Command::Rm {
                key: args[2].clone(),
            })
        }
        "sync" => Ok(Command::Sync),
        "purge" => Ok(Command::Purge),
        "reset" => Ok(Command::Reset),
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    let log_level = env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let config = CacheConfig::from_env().context("Invalid cache configuration")?;
    let root = config.root.clone();
    if config.root_is_unindexed() && !matches!(command, Command::Reset) {
        return Err(anyhow!(
            "{} is not empty and has no cache index; run `covers-cache reset` to take it over",
            root.display()
        ));
    }
    let mut cache = CoverStore::open(config)
        .with_context(|| format!("Failed to open cover cache at {}", root.display()))?;

    match command {
        Command::Stats => {
            let stats = cache.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Keys => {
            for key in cache.keys() {
                println!("{}", key);
            }
        }
        Command::Get { key } => match cache.lookup(&key) {
            Ok(cover) => {
                let path = cover
                    .path
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\t{}", cover.url, path);
            }
            Err(e) if e.is_not_found() => {
                eprintln!("No cover cached for {}", key);
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },
        Command::Put { key, url, file } => {
            let target = cache
                .set(&key, &url, &file)
                .with_context(|| format!("Failed to cache {}", file.display()))?;
            info!(key = %key, target = %target.display(), "Cover cached");
            println!("{}", target.display());
        }
        Command::Rm { key } => {
            cache
                .remove(&key)
                .with_context(|| format!("Failed to remove {}", key))?;
        }
        Command::Sync => {
            let report = cache.sync()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Purge => {
            let report = cache.purge()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Reset => {
            cache.make()?;
            info!(root = %root.display(), "Cover cache reset");
        }
        Command::Help => print_help(),
    }

    Ok(())
}
