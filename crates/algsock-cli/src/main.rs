//! algsum
//!
//! `sha1sum`-style checksums computed by the Linux kernel crypto API.
//! The connection is dialed once; every input gets its own hash session.

mod config;

use algsock::{Connection, Source, Transform, WriteMode};
use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tracing::{debug, error};

use config::Config;

/// Write strategy selectable on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// vmsplice + splice through a pipe
    Splice,
    /// send(MSG_MORE) directly on the socket
    Send,
}

impl From<Mode> for WriteMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Splice => WriteMode::Splice,
            Mode::Send => WriteMode::Send,
        }
    }
}

/// algsum - print checksums computed by the kernel crypto API
#[derive(Parser)]
#[command(name = "algsum")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output (implies --verbose)
    #[arg(short, long)]
    debug: bool,

    /// Configuration file path [default: ~/.config/algsock/config.toml]
    #[arg(short, long)]
    config: Option<String>,

    /// Hash algorithm (kernel name, e.g. sha256)
    #[arg(short, long)]
    algorithm: Option<String>,

    /// Write strategy
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Never use sendfile for file inputs
    #[arg(long)]
    no_sendfile: bool,

    /// List known algorithms and exit
    #[arg(long)]
    list: bool,

    /// Files to hash; `-` or nothing reads standard input
    files: Vec<String>,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    // A missing default file means defaults; a named file must exist
    let mut config = match &cli.config {
        Some(path) => {
            // Expand tilde if present
            let path = match path.strip_prefix("~/") {
                Some(stripped) => dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(stripped),
                None => PathBuf::from(path),
            };
            Config::load(&path)?
        }
        None => Config::load_or_default()?,
    };

    // Command-line flags override the file
    if let Some(algorithm) = &cli.algorithm {
        config.algorithm.clone_from(algorithm);
    }
    if let Some(mode) = cli.mode {
        config.alg.write_mode = mode.into();
    }
    if cli.no_sendfile {
        config.alg.sendfile = false;
    }

    config.validate()?;
    Ok(config)
}

/// Hash one input on a fresh session
fn checksum(conn: &Connection, input: &str) -> anyhow::Result<String> {
    let mut session = conn.session().context("failed to create hash session")?;

    let result = if input == "-" {
        let mut stdin = io::stdin().lock();
        session.read_from(Source::reader(&mut stdin))
    } else {
        let file = File::open(input).with_context(|| format!("{input}: cannot open"))?;
        session.read_from(&file)
    };
    let written = result.with_context(|| format!("{input}: failed to copy"))?;

    let digest = session.finalize().with_context(|| format!("{input}: failed to finalize"))?;
    debug!(input, written, "hashed");
    session.close()?;
    Ok(hex::encode(digest))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(io::stderr)
        .init();

    let config = load_config(&cli)?;
    let registry = config.registry();

    if cli.list {
        for name in registry.names() {
            if let Some(alg) = registry.lookup(name) {
                println!("{name}\t{}\t{}", alg.digest_size(), alg.block_size());
            }
        }
        return Ok(());
    }

    let conn = Connection::dial(&registry, Transform::hash(&config.algorithm), Some(&config.alg))
        .context("failed to dial kernel")?;

    let inputs = if cli.files.is_empty() {
        vec!["-".to_string()]
    } else {
        cli.files
    };

    let mut failed = 0;
    for input in &inputs {
        match checksum(&conn, input) {
            Ok(hex) => println!("{hex}  {input}"),
            Err(e) => {
                error!("{e:#}");
                failed += 1;
            }
        }
    }

    conn.close()?;

    if failed > 0 {
        bail!("{failed} of {} inputs failed", inputs.len());
    }
    Ok(())
}
