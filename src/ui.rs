// UI layer: the interactive purge flow. Prompts go through the `Prompter`
// trait (dialoguer in the terminal), remote work goes through
// `StorageApi`, so the whole flow can be driven from tests.

use crate::api::StorageApi;
use crate::config::PurgeConfig;
use crate::cancel::CancelToken;
use crate::delete::{BatchDeleter, DeletionReport, PollOutcome};
use crate::enumerate::{EnumerationReport, Enumerator, FileRecord};
use crate::error::PurgeError;
use crate::filter::{compile_pattern, filter};
use crate::preview::{generate_preview, open_in_viewer};
use anyhow::{Context, Result};
use crossterm::style::Stylize;
use dialoguer::{Confirm, Input, Password};
use indicatif::{ProgressBar, ProgressStyle};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};

/// Source of answers for the interactive questions.
pub trait Prompter {
    fn secret(&mut self, prompt: &str) -> Result<String>;
    fn text(&mut self, prompt: &str) -> Result<String>;
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Asks on the terminal with dialoguer.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn secret(&mut self, prompt: &str) -> Result<String> {
        // `Password` hides input in terminal.
        Ok(Password::new().with_prompt(prompt).interact()?)
    }

    fn text(&mut self, prompt: &str) -> Result<String> {
        Ok(Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?)
    }

    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
    }
}

/// Answers to the three opening questions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inputs {
    pub token: String,
    pub folder: String,
    pub pattern: String,
}

/// Ask for whatever the command line did not already provide.
pub fn collect_inputs<P: Prompter>(prompter: &mut P, config: &PurgeConfig) -> Result<Inputs> {
    let token = match &config.token {
        Some(t) => t.clone(),
        None => prompter.secret("Dropbox API access token")?,
    };
    let folder = match &config.folder {
        Some(f) => f.clone(),
        None => prompter.text("Dropbox folder path")?,
    };
    let pattern = match &config.pattern {
        Some(p) => p.clone(),
        None => prompter.text("Regex for files to delete")?,
    };
    Ok(Inputs {
        token: token.trim().to_string(),
        folder,
        pattern,
    })
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    InvalidPattern,
    NoMatches,
    Declined,
    Interrupted,
    Deleted(DeletionReport),
}

impl SessionOutcome {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            SessionOutcome::NoMatches | SessionOutcome::Declined => ExitCode::SUCCESS,
            SessionOutcome::Deleted(report) if report.outcome.is_success() => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        }
    }
}

fn spinner(msg: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(msg.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

/// Run the purge: enumerate, filter, optionally preview, confirm, delete.
pub fn run_session<A, P>(
    api: &A,
    prompter: &mut P,
    inputs: &Inputs,
    config: &PurgeConfig,
    cancel: &CancelToken,
) -> Result<SessionOutcome>
where
    A: StorageApi + ?Sized,
    P: Prompter,
{
    // Pattern errors abort before anything is sent.
    let regex = match compile_pattern(&inputs.pattern) {
        Ok(re) => re,
        Err(PurgeError::InvalidPattern { pattern, source }) => {
            eprintln!("Invalid regex provided: {}", pattern);
            warn!(error = %source, "invalid pattern");
            return Ok(SessionOutcome::InvalidPattern);
        }
        Err(e) => return Err(e.into()),
    };

    let (report, matches) = list_matching(api, &inputs.folder, &regex, cancel)?;
    if cancel.is_cancelled() {
        println!("\nListing interrupted, nothing was deleted");
        return Ok(SessionOutcome::Interrupted);
    }

    println!("\n==============================\n");
    if report.branches_failed > 0 {
        println!(
            "{}",
            format!(
                "{} folder(s) could not be listed, results may be incomplete",
                report.branches_failed
            )
            .yellow()
        );
    }
    if matches.is_empty() {
        println!("No matching files found");
        return Ok(SessionOutcome::NoMatches);
    }
    println!(
        "Found {} matching files out of {} total files\n",
        matches.len(),
        report.files.len()
    );

    if prompter.confirm("Preview files before continuing?")? {
        println!("\nGenerating preview. Please be patient...");
        match generate_preview(api, &matches, &config.preview) {
            Ok(preview) => {
                println!(
                    "Preview with {} thumbnails written to {}",
                    preview.thumbnails.len(),
                    preview.html_path.display()
                );
                if config.preview.open_viewer {
                    if let Err(e) = open_in_viewer(&preview.html_path) {
                        warn!(error = %e, "could not open preview");
                    }
                }
            }
            Err(e) => println!("Preview failed: {}", e),
        }
    }

    if !prompter.confirm("Are you ready to commence deletion?")? {
        println!("Ok, then... goodbye!");
        return Ok(SessionOutcome::Declined);
    }
    if cancel.is_cancelled() {
        println!("Interrupted, nothing was deleted");
        return Ok(SessionOutcome::Interrupted);
    }

    println!("Ok, lets do this thang!");
    let report = delete_files(api, &matches, config, cancel)?;
    Ok(SessionOutcome::Deleted(report))
}

fn list_matching<A: StorageApi + ?Sized>(
    api: &A,
    folder: &str,
    regex: &regex::Regex,
    cancel: &CancelToken,
) -> Result<(EnumerationReport, Vec<FileRecord>)> {
    let spinner = spinner("Listing files...")?;
    let result = Enumerator::new(api)
        .with_cancel(cancel.clone())
        .on_file(|f| spinner.suspend(|| println!("-- {}", f.name)))
        .run_then(folder, |report| {
            let matches = filter(&report.files, regex);
            (report, matches)
        });
    spinner.finish_and_clear();
    info!(
        total = result.0.files.len(),
        matching = result.1.len(),
        "listing complete"
    );
    Ok(result)
}

fn delete_files<A: StorageApi + ?Sized>(
    api: &A,
    files: &[FileRecord],
    config: &PurgeConfig,
    cancel: &CancelToken,
) -> Result<DeletionReport> {
    let paths: Vec<String> = files.iter().map(|f| f.path_lower.clone()).collect();
    println!("Deleting files");
    let spinner = spinner("Waiting for the delete job...")?;

    let report = BatchDeleter::new(api, config.poll)
        .with_cancel(cancel.clone())
        .on_poll(|checks| {
            spinner.set_message(format!("Waiting for the delete job ({} checks)", checks))
        })
        .delete(&paths)
        .context("Failed to submit batch delete")?;
    spinner.finish_and_clear();

    match &report.outcome {
        PollOutcome::Done => println!("\n{}", "Success!".green()),
        PollOutcome::Failed(reason) => {
            eprintln!("{}", format!("Batch deletion failed: {}", reason).red())
        }
        PollOutcome::TimedOut { job_id } => eprintln!(
            "{}",
            format!("Gave up waiting for job {}, it may still finish on the server", job_id).yellow()
        ),
        PollOutcome::Cancelled { job_id: Some(job_id) } => eprintln!(
            "Stopped waiting for job {}, it may still finish on the server",
            job_id
        ),
        PollOutcome::Cancelled { job_id: None } => eprintln!("Cancelled, nothing was deleted"),
    }
    Ok(report)
}
