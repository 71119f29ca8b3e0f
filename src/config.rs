// Command-line configuration
// --------------------------
// Every value the interactive flow asks for can also be passed up front;
// prompts are only shown for the ones left out.

use crate::delete::PollConfig;
use crate::preview::PreviewOptions;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Find Dropbox files by pattern, preview them and delete them in bulk
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dropbox-purge",
    version,
    about = "Find Dropbox files by pattern, preview them and delete them in bulk",
    after_help = "EXAMPLES:\n    \
        dropbox-purge\n    \
        dropbox-purge --path /Camera\\ Uploads --pattern '\\.heic$'\n    \
        DROPBOX_ACCESS_TOKEN=sl.xxx dropbox-purge --timeout-secs 600"
)]
pub struct CliArgs {
    /// Dropbox API access token (prompted for when missing)
    #[arg(long, env = "DROPBOX_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Dropbox folder to scan, "/" for the whole account
    #[arg(long, value_name = "PATH")]
    pub path: Option<String>,

    /// Regex matched against file names
    #[arg(long, value_name = "REGEX")]
    pub pattern: Option<String>,

    /// Delay between delete job status checks
    #[arg(long, default_value = "1000", value_name = "MS")]
    pub poll_interval_ms: u64,

    /// Stop waiting for the delete job after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Directory the preview thumbnails are written to
    #[arg(long, default_value = "thumbnails", value_name = "DIR")]
    pub preview_dir: PathBuf,

    /// HTML file listing the preview thumbnails
    #[arg(long, default_value = "preview.html", value_name = "FILE")]
    pub preview_file: PathBuf,

    /// Write the preview without opening it
    #[arg(long)]
    pub no_open: bool,

    /// Debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Settings for one purge session.
#[derive(Debug, Clone)]
pub struct PurgeConfig {
    pub token: Option<String>,
    pub folder: Option<String>,
    pub pattern: Option<String>,
    pub poll: PollConfig,
    pub preview: PreviewOptions,
}

impl PurgeConfig {
    pub fn from_args(args: CliArgs) -> Self {
        Self {
            token: args.token.filter(|t| !t.trim().is_empty()),
            folder: args.path,
            pattern: args.pattern,
            poll: PollConfig {
                interval: Duration::from_millis(args.poll_interval_ms),
                deadline: args.timeout_secs.map(Duration::from_secs),
            },
            preview: PreviewOptions {
                thumbnail_dir: args.preview_dir,
                html_path: args.preview_file,
                open_viewer: !args.no_open,
            },
        }
    }
}
