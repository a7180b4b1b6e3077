use std::path::PathBuf;

use clap::Parser;
use formpost_engine::SubmissionSettings;

/// Submit survey rows from a CSV file to a web form, one request per row.
#[derive(Parser, Debug, Clone)]
#[command(name = "formpost", author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The CSV dataset. The first line holds the column headers.
    #[arg(long)]
    pub csv: PathBuf,

    /// (file path) JSON configuration with the form URL, the header mapping and value rules.
    #[arg(long)]
    pub config: PathBuf,

    /// Overrides the form URL from the configuration.
    #[arg(long)]
    pub form_url: Option<String>,

    /// Validate payloads against the mapping without sending anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Skip rows that already succeeded according to the outcome log.
    #[arg(long)]
    pub resume: bool,

    /// (file path) Append-only outcome log, one JSON record per attempt.
    #[arg(long, default_value = "submissions_log.jsonl")]
    pub log: PathBuf,

    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// (default 0) First chunk to submit; earlier chunks are left alone.
    #[arg(long, default_value_t = 0)]
    pub start_chunk: usize,

    /// Submit at most this many rows, for a trial run against the real form.
    #[arg(long)]
    pub test_rows: Option<usize>,

    #[arg(long)]
    pub delay_ms: Option<u64>,

    #[arg(long)]
    pub jitter_ms: Option<u64>,

    #[arg(long)]
    pub max_retries: Option<u32>,

    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Rows in flight at once (live mode only).
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Global request rate ceiling.
    #[arg(long)]
    pub max_rps: Option<f64>,

    /// Encoding label of the CSV (e.g. windows-1252). Detected when absent.
    #[arg(long)]
    pub encoding: Option<String>,

    /// (directory) Write the prepared chunks as CSV files plus a manifest.
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// (file path) Write the payloads of rows that failed in this run.
    #[arg(long)]
    pub failed_out: Option<PathBuf>,

    /// Check the outcome log against the dataset instead of submitting.
    /// Together with --dry-run the dry-run records are checked.
    #[arg(long)]
    pub verify: bool,

    /// (file path) Write the source rows that have no successful submission in the log.
    #[arg(long)]
    pub missing_out: Option<PathBuf>,

    /// (file path) Write the run summary, or the verification report, as JSON.
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    /// (file path) Also write the log output to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[arg(long)]
    pub verbose: bool,
}

impl Args {
    /// Command line values take precedence over the configuration file.
    pub fn apply_overrides(&self, settings: &mut SubmissionSettings) {
        if let Some(size) = self.chunk_size {
            settings.chunk_size = size;
        }
        if let Some(delay) = self.delay_ms {
            settings.delay_ms = delay;
        }
        if let Some(jitter) = self.jitter_ms {
            settings.jitter_ms = jitter;
        }
        if let Some(retries) = self.max_retries {
            settings.max_retries = retries;
        }
        if let Some(timeout) = self.timeout_secs {
            settings.timeout_secs = timeout;
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency;
        }
        if self.max_rps.is_some() {
            settings.max_requests_per_second = self.max_rps;
        }
    }
}
