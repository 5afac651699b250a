//! Desk Console
//!
//! Runs one side of the eventing core over a store file:
//!
//! - `console` (default): interactive producer. Reads commands from stdin,
//!   enqueues them for the desktop and inspects the shared store.
//! - `watch`: consumer. Polls the command queue and prints every command it
//!   drains until Ctrl+C.
//!
//! # Environment Variables
//!
//! - `DESK_STORE`: store file (same as `--store`)
//! - `RUST_LOG`: log filter (default `info`)
//! - `DESK_*`: eventing settings, see `EventingConfig`

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use desk_console::{format_command, Console, ConsoleError, Reply};
use desk_events::bus::DESKTOP_READY;
use desk_events::{EventSystem, EventingConfig};
use desk_store::{FileStore, SharedStore};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Suffix of the action log key used by `watch`, so the two processes never
/// rewrite each other's log.
const WATCH_LOG_SUFFIX: &str = ".desktop";

const PROMPT: &str = "desk> ";

/// Diagnostic console and queue watcher for the desktop eventing core
#[derive(Parser, Debug)]
#[command(name = "desk-console")]
#[command(version, about, long_about = None)]
struct Args {
    /// Store file shared by the console and the desktop
    #[arg(long, env = "DESK_STORE", default_value = "desk-store.json")]
    store: PathBuf,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Mode {
    /// Interactive producer console
    Console,

    /// Poll the command queue and print each drained command
    Watch {
        /// Poll interval in milliseconds (defaults to DESK_POLL_INTERVAL_MS or 250)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("desk-console: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<(), ConsoleError> {
    let store: SharedStore = Arc::new(FileStore::open(&args.store)?);
    let mut config = EventingConfig::from_env();

    match args.mode.unwrap_or(Mode::Console) {
        Mode::Console => run_console(EventSystem::new(store, config), &args.store).await,
        Mode::Watch { interval_ms } => {
            config.action_log_key.push_str(WATCH_LOG_SUFFIX);
            let interval = interval_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.poll_interval());
            run_watch(EventSystem::new(store, config), &args.store, interval).await
        }
    }
}

fn print_banner(title: &str, store: &std::path::Path) {
    println!("╔═══════════════════════════════════════════════════╗");
    println!("║  {:<49}║", title);
    println!("╠═══════════════════════════════════════════════════╣");
    println!("║  Store: {:<42}║", store.display());
    println!("╚═══════════════════════════════════════════════════╝");
    println!();
}

async fn run_console(system: EventSystem, store_path: &std::path::Path) -> Result<(), ConsoleError> {
    system.boot(true);
    let console = Console::new(system);
    print_banner("Desk Console (type `help`)", store_path);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", PROMPT);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match console.run_line(&line) {
            Ok(Reply::Text(text)) if text.is_empty() => {}
            Ok(Reply::Text(text)) => println!("{}", text),
            Ok(Reply::Exit) => break,
            Err(e) => println!("error: {}", e),
        }
    }

    console.system().dispatcher().system("console_closed", Value::Null);
    Ok(())
}

async fn run_watch(system: EventSystem, store_path: &std::path::Path, interval: Duration) -> Result<(), ConsoleError> {
    let bridge = system.bus().bridge_to(system.dispatcher());
    system.boot(true);

    let printer = system
        .queue()
        .on_any(|command| println!("{}", format_command(command)));
    system.queue().start_polling(interval)?;
    system.bus().emit(
        DESKTOP_READY,
        json!({ "pollIntervalMs": interval.as_millis() as u64 }),
    );

    print_banner("Desk Watch (Ctrl+C to stop)", store_path);
    tokio::signal::ctrl_c().await?;

    system.queue().stop_polling();
    printer.unsubscribe();
    bridge.unsubscribe();
    system.dispatcher().system("watch_stopped", Value::Null);
    Ok(())
}
