// Entrypoint for the CLI application.
// - Keeps `main` small: parse flags, ask for missing inputs, build the
//   API client and hand everything to the session in `ui`.

use anyhow::{Context, Result};
use clap::Parser;
use dropbox_purge::config::{CliArgs, PurgeConfig};
use dropbox_purge::cancel::CancelToken;
use dropbox_purge::ui::{collect_inputs, run_session, TerminalPrompter};
use dropbox_purge::ApiClient;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = CliArgs::parse();
    setup_logging(args.verbose);
    let config = PurgeConfig::from_args(args);

    let mut prompter = TerminalPrompter;
    let inputs = collect_inputs(&mut prompter, &config)?;

    // Installed after the opening prompts: an interrupt during the hidden
    // token prompt keeps the default SIGINT exit, so the shell restores echo.
    let cancel = install_interrupt_handler()?;

    // API client configured by `DROPBOX_API_URL` / `DROPBOX_CONTENT_URL`
    // or the public Dropbox endpoints. See `api::ApiClient::from_env`.
    let mut api = ApiClient::from_env()?;
    api.set_token(&inputs.token);
    if !api.has_token() {
        anyhow::bail!("An access token is required");
    }

    let outcome = run_session(&api, &mut prompter, &inputs, &config, &cancel)?;
    Ok(outcome.exit_code())
}

/// First Ctrl-C stops listing or waiting and skips any deletion that has
/// not been submitted yet; a second one exits.
fn install_interrupt_handler() -> Result<CancelToken> {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_token.is_cancelled() {
            let _ = crossterm::execute!(std::io::stderr(), crossterm::cursor::Show);
            std::process::exit(130);
        }
        eprintln!("\nInterrupt received, nothing more will be sent for deletion (Ctrl-C again to quit)");
        handler_token.cancel();
    })
    .context("Failed to set signal handler")?;
    Ok(cancel)
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("dropbox_purge=debug,warn")
        } else {
            EnvFilter::new("dropbox_purge=warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
