//! hushchat CLI - encrypt chat text for a channel and manage the outbox
//!
//! Encryption commands derive the channel key from the group passphrase
//! (PBKDF2-HMAC-SHA256) and speak the `E2EE:` envelope format. Outbox
//! commands operate on the durable queue of unacknowledged messages.

use std::error::Error as StdError;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use hushchat::config::{Config, DEFAULT_DATA_DIR};
use hushchat::kdf::DEFAULT_ITERATIONS;
use hushchat::outbox::{DEFAULT_STORAGE_KEY, DeliveryStatus, FileStorage, Outbox, PendingMessage};
use hushchat::passphrase::{PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader};
use hushchat::transport::TransportEncryptor;
use hushchat::{HushchatError, Result};

#[derive(Parser)]
#[command(name = "hushchat")]
#[command(version)]
#[command(about = "Passphrase-scoped chat encryption and a durable outbox.", long_about = None)]
struct Cli {
    /// Read passphrase from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    /// PBKDF2 iteration count; every member of a channel must use the same value
    #[arg(
        long,
        global = true,
        env = "HUSHCHAT_KDF_ITERATIONS",
        default_value_t = DEFAULT_ITERATIONS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    iterations: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a message for a channel and print the wire string
    #[command(alias = "e")]
    Encrypt {
        /// Channel name; part of the key derivation salt
        #[arg(short, long)]
        channel: String,

        /// Plaintext message
        #[arg(short, long)]
        text: String,
    },

    /// Decrypt a wire string; unmarked text is printed unchanged
    #[command(alias = "d")]
    Decrypt {
        /// Channel name; part of the key derivation salt
        #[arg(short, long)]
        channel: String,

        /// Wire string as received from the network
        #[arg(short, long)]
        wire: String,
    },

    /// Inspect or modify the queue of unacknowledged messages
    Outbox {
        #[command(flatten)]
        store: StoreArgs,

        #[command(subcommand)]
        command: OutboxCommand,
    },
}

#[derive(Args)]
struct StoreArgs {
    /// Directory holding persisted state
    #[arg(long, env = "HUSHCHAT_DATA_DIR", default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Name the outbox is stored under inside the data directory
    #[arg(long, env = "HUSHCHAT_STORAGE_KEY", default_value = DEFAULT_STORAGE_KEY)]
    storage_key: String,
}

#[derive(Subcommand)]
enum OutboxCommand {
    /// Queue a message with status `sending`; prints its id
    Enqueue {
        #[arg(short, long)]
        channel: String,

        #[arg(short, long)]
        sender: String,

        #[arg(short, long)]
        text: String,

        /// Message id; a random UUID is generated when omitted
        #[arg(long)]
        id: Option<String>,
    },

    /// Print every queued message as JSON, oldest first
    List,

    /// Set the delivery status of a message (sending, sent, failed, given_up)
    Status { id: String, status: DeliveryStatus },

    /// Count one more failed delivery attempt for a message
    Retry { id: String },

    /// Drop a message from the queue
    Remove { id: String },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", render_chain(&e));
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = Config {
        kdf_iterations: cli.iterations,
        ..Config::default()
    };
    match cli.command {
        Commands::Encrypt { channel, text } => {
            let encryptor = channel_encryptor(&config, cli.passphrase_stdin, &channel)?;
            let wire = encryptor
                .encrypt(&text)
                .map_err(|e| e.with_context("encryption failed"))?;
            print_line(&wire)
        }
        Commands::Decrypt { channel, wire } => {
            let encryptor = channel_encryptor(&config, cli.passphrase_stdin, &channel)?;
            print_line(&encryptor.decrypt(&wire))
        }
        Commands::Outbox { store, command } => {
            config.data_dir = store.data_dir;
            config.storage_key = store.storage_key;
            let outbox = config.open_outbox()?;
            run_outbox(&outbox, command)
        }
    }
}

fn run_outbox(outbox: &Outbox<FileStorage>, command: OutboxCommand) -> Result<()> {
    match command {
        OutboxCommand::Enqueue {
            channel,
            sender,
            text,
            id,
        } => {
            let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let inserted = outbox.enqueue(PendingMessage::new(id.clone(), channel, sender, text))?;
            if !inserted {
                tracing::warn!(%id, "message already queued; left unchanged");
            }
            print_line(&id)
        }
        OutboxCommand::List => {
            let messages = outbox.list()?;
            let json = serde_json::to_string_pretty(&messages).map_err(|e| {
                HushchatError::with_kind_and_source(
                    hushchat::ErrorCategory::Internal,
                    hushchat::ErrorKind::Serialization,
                    "failed to render outbox",
                    e,
                )
            })?;
            print_line(&json)
        }
        OutboxCommand::Status { id, status } => outbox.update_status(&id, status),
        OutboxCommand::Retry { id } => outbox.increment_retry(&id),
        OutboxCommand::Remove { id } => outbox.remove(&id),
    }
}

fn channel_encryptor(config: &Config, use_stdin: bool, channel: &str) -> Result<TransportEncryptor> {
    let mut reader = get_passphrase_reader(use_stdin);
    let passphrase = reader.read_passphrase()?;
    config.encryptor(&passphrase, channel)
}

fn get_passphrase_reader(use_stdin: bool) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(io::stdin())))
    } else {
        Box::new(TerminalPassphraseReader)
    }
}

fn print_line(line: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", line)
        .and_then(|()| stdout.flush())
        .map_err(|e| {
            HushchatError::with_source(
                hushchat::ErrorCategory::Internal,
                "failed to write to stdout",
                e,
            )
        })
}

/// Renders `err: cause: cause...` from the source chain.
fn render_chain(err: &HushchatError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
