//! pshell - interactive multi-backend storage shell
//!
//! Mounts heterogeneous remote stores under one virtual namespace and
//! drives them from a single command loop (or a one-shot `-c` command in
//! scripts).

use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod dispatch;
mod exit_code;
mod factory;
mod local;
mod output;

use dispatch::{Dispatcher, LoopSignal};
use exit_code::ExitCode;
use factory::AdapterFactory;
use output::{OutputConfig, Printer};

/// pshell - interactive multi-backend storage shell
#[derive(Parser, Debug)]
#[command(name = "pshell")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration profile to load
    #[arg(short, long, default_value = ps_core::DEFAULT_PROFILE)]
    profile: String,

    /// Configuration file path (defaults to the user config directory)
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Run one command and exit
    #[arg(short = 'c', long = "command")]
    command: Option<String>,

    /// Transfer worker pool size (1-16)
    #[arg(long, default_value_t = ps_core::DEFAULT_WORKERS)]
    workers: usize,

    /// Answer yes to confirmation prompts
    #[arg(short = 'y', long)]
    yes: bool,

    /// Output format: structured JSON instead of human lines
    #[arg(long)]
    json: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Disable the transfer progress bar
    #[arg(long)]
    no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug logging and raw protocol detail
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let exit_code = run(cli).await;
    std::process::exit(exit_code.as_i32());
}

async fn run(cli: Cli) -> ExitCode {
    let printer = Printer::new(OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        no_progress: cli.no_progress,
        quiet: cli.quiet,
    });

    let config_manager = match &cli.config {
        Some(path) => ps_core::ConfigManager::with_path(path.clone()),
        None => match ps_core::ConfigManager::new() {
            Ok(cm) => cm,
            Err(e) => {
                printer.error(&e.to_string());
                return ExitCode::UsageError;
            }
        },
    };
    let session = ps_core::SessionManager::new(config_manager, &cli.profile);

    // materialize mounts; reconnect failures leave mounts offline
    let mut router = ps_core::MountTable::new();
    let attempts = match session.startup(&AdapterFactory, &mut router).await {
        Ok(attempts) => attempts,
        Err(e) => {
            printer.error(&e.to_string());
            return ExitCode::UsageError;
        }
    };
    for attempt in &attempts {
        if attempt.online {
            tracing::info!(mount = %attempt.prefix, "mounted");
        } else {
            printer.warn(&format!("{} is offline; run login", attempt.prefix));
        }
    }

    // a scripted command against a fully-offline profile is fatal
    if cli.command.is_some() && !attempts.is_empty() && attempts.iter().all(|a| !a.online) {
        printer.error("no mount is reachable");
        return ExitCode::NetworkError;
    }

    let mut dispatcher = match Dispatcher::new(
        router,
        session,
        printer.clone(),
        cli.workers,
        cli.yes || cli.command.is_some(),
        cli.debug,
    ) {
        Ok(d) => d,
        Err(e) => {
            printer.error(&e.to_string());
            return ExitCode::GeneralError;
        }
    };

    if let Some(line) = &cli.command {
        return match dispatcher.dispatch(line).await {
            LoopSignal::Continue(code) => code,
            LoopSignal::Quit => ExitCode::Success,
        };
    }

    interactive_loop(&mut dispatcher, &printer).await
}

async fn interactive_loop(dispatcher: &mut Dispatcher, printer: &Printer) -> ExitCode {
    use std::io::Write;

    let stdin = tokio::io::stdin();
    let mut lines = tokio::io::BufReader::new(stdin).lines();
    let mut last = ExitCode::Success;

    loop {
        print!("{}", dispatcher.prompt());
        let _ = std::io::stdout().flush();

        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => match dispatcher.dispatch(&line).await {
                        LoopSignal::Continue(code) => last = code,
                        LoopSignal::Quit => break,
                    },
                    Ok(None) => break, // EOF
                    Err(e) => {
                        printer.error(&format!("input error: {e}"));
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                // a bulk transfer handles its own interrupt; here we just
                // drop the current prompt line
                println!();
                printer.warn("interrupted (quit to leave)");
            }
        }
    }
    last
}
