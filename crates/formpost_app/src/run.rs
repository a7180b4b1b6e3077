//! Wires configuration, dataset, log and client together for one command-line run.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use formpost_core::{chunk, BuiltPayload, Chunk, Mode};
use formpost_engine::{
    export_chunks, export_failed_rows, export_source_rows, load_csv, prepare_chunks, verify,
    AtomicFileWriter, Dataset, ExportOptions, FormConfig, Orchestrator, OutcomeLog, RunOptions,
    RunReport, SubmissionClient, SubmissionContext, VerifyReport,
};
use pipeline_logging::{pipeline_debug, pipeline_info, pipeline_warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::args::Args;
use crate::progress::LoggingSink;

const PREVIEW_ROWS: usize = 5;
const PREVIEW_CHARS: usize = 140;
const REPORTED_MISMATCHES: usize = 10;

/// What one invocation produced: a submission run, a log verification, or a run followed by one.
#[derive(Debug)]
pub struct Session {
    pub report: Option<RunReport>,
    pub verification: Option<VerifyReport>,
}

impl Session {
    /// A run is clean when nothing failed or was left over; a bare verification when the log
    /// covers every row with a matching payload.
    pub fn is_clean(&self) -> bool {
        match (&self.report, &self.verification) {
            (Some(report), _) => report.summary.is_clean() && !report.cancelled,
            (None, Some(verification)) => verification.is_complete(),
            (None, None) => true,
        }
    }
}

pub async fn run(args: &Args, cancel: CancellationToken) -> Result<Session> {
    let mode = if args.dry_run { Mode::DryRun } else { Mode::Live };

    let mut config = FormConfig::load(&args.config)
        .with_context(|| format!("loading configuration {:?}", args.config))?;
    if let Some(url) = &args.form_url {
        config.form_url = url.clone();
    }
    args.apply_overrides(&mut config.submission);
    config.submission.validate()?;
    let settings = config.submission.clone();

    let mapping = config.header_mapping()?;
    if config.has_placeholders() {
        if mode == Mode::Live && !args.verify {
            bail!(
                "form URL or field identifiers still contain placeholders ({:?}); \
                 fix the configuration or use --dry-run",
                mapping.placeholder_field_ids()
            );
        }
        pipeline_warn!("Configuration still contains placeholders; nothing will be sent");
    }
    let rules = config.normalization_rules(&mapping)?;

    let dataset = load_csv(&args.csv, args.encoding.as_deref())?;
    mapping.check_headers(dataset.headers.iter().map(String::as_str))?;
    let chunks = chunk(&dataset.rows, settings.chunk_size)?;
    let (prepared, notes) = prepare_chunks(&chunks, &mapping, &rules)?;

    if let Some(dir) = &args.export_dir {
        let summary = export_chunks(dir, &prepared, &ExportOptions::default())
            .with_context(|| format!("exporting chunks to {:?}", dir))?;
        pipeline_info!(
            "Exported {} rows to {} chunk files in {:?}",
            summary.row_count,
            summary.chunk_files.len(),
            dir
        );
    }

    if args.verify {
        if !args.log.exists() {
            bail!("outcome log {:?} does not exist; nothing to verify", args.log);
        }
        let log = OutcomeLog::open(&args.log)
            .with_context(|| format!("opening outcome log {:?}", args.log))?;
        let verification = check_log(args, &log, &dataset, &prepared, mode)?;
        if let Some(path) = &args.summary_json {
            write_json(path, &verification)
                .with_context(|| format!("writing verification to {:?}", path))?;
        }
        return Ok(Session {
            report: None,
            verification: Some(verification),
        });
    }

    if mode == Mode::DryRun {
        preview(&prepared);
    }

    let log = Arc::new(
        OutcomeLog::open(&args.log).with_context(|| format!("opening outcome log {:?}", args.log))?,
    );
    let skip = args.resume.then(|| log.resume_ledger(mode));
    if let Some(ledger) = &skip {
        pipeline_info!(
            "Resuming: {} rows already succeeded in {} mode",
            ledger.succeeded().count(),
            mode
        );
    }

    let context = SubmissionContext::new(settings.client_settings())
        .map_err(|err| anyhow!("cannot build HTTP client: {err}"))?;
    pipeline_debug!("HTTP client settings: {:?}", context.settings());
    let client = SubmissionClient::new(Arc::new(context), config.form_url.clone(), mapping.schema())
        .with_record_payloads(settings.record_payloads);
    pipeline_info!("Starting {} run against {}", mode, client.form_url());
    let orchestrator =
        Orchestrator::new(client, Arc::clone(&log)).with_sink(Arc::new(LoggingSink::default()));

    let options = RunOptions {
        inter_row_delay: Duration::from_millis(settings.delay_ms),
        jitter: Duration::from_millis(settings.jitter_ms),
        retry: settings.retry_policy(),
        start_chunk: args.start_chunk,
        row_limit: args.test_rows,
        skip,
        concurrency: settings.concurrency,
        cancel,
    };
    let mut report = orchestrator.run_prepared(&prepared, mode, &options).await?;
    report.notes = notes;

    if let Some(path) = &args.failed_out {
        let failed = report.failed_rows();
        let written = export_failed_rows(path, &prepared, &failed)
            .with_context(|| format!("writing failed rows to {:?}", path))?;
        pipeline_info!("Wrote {} failed rows to {:?}", written, path);
    }
    if let Some(path) = &args.summary_json {
        write_json(path, &report.summary)
            .with_context(|| format!("writing summary to {:?}", path))?;
    }
    let verification = match &args.missing_out {
        Some(_) => Some(check_log(args, orchestrator.log(), &dataset, &prepared, mode)?),
        None => None,
    };

    Ok(Session {
        report: Some(report),
        verification,
    })
}

/// Verify the log against the prepared rows and export the rows still missing a success.
fn check_log(
    args: &Args,
    log: &OutcomeLog,
    dataset: &Dataset,
    prepared: &[Chunk<BuiltPayload>],
    mode: Mode,
) -> Result<VerifyReport> {
    let verification = verify(log, prepared, mode);
    pipeline_info!("{}", verification);
    for mismatch in verification.mismatches.iter().take(REPORTED_MISMATCHES) {
        pipeline_warn!("Payload mismatch: {:?}", mismatch);
    }
    if verification.mismatches.len() > REPORTED_MISMATCHES {
        pipeline_warn!(
            "... and {} more mismatches",
            verification.mismatches.len() - REPORTED_MISMATCHES
        );
    }

    if let Some(path) = &args.missing_out {
        let missing = verification.unsubmitted_rows();
        let written = export_source_rows(path, &dataset.headers, &dataset.rows, &missing)
            .with_context(|| format!("writing missing rows to {:?}", path))?;
        pipeline_info!("Wrote {} rows without a successful submission to {:?}", written, path);
    }
    Ok(verification)
}

fn preview(prepared: &[Chunk<BuiltPayload>]) {
    for row in prepared.iter().flat_map(|c| c.rows.iter()).take(PREVIEW_ROWS) {
        pipeline_info!("preview row {}: {}", row.row_index, row.payload.preview(PREVIEW_CHARS));
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("output path {:?} has no file name", path))?;
    AtomicFileWriter::new(dir.to_path_buf())?.write_json(filename, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use clap::Parser;
    use formpost_core::{ChunkState, OutcomeFilter, StatusKind};

    use super::*;

    const CONFIG: &str = r#"{
        "form_url": "http://127.0.0.1:9/forms/d/e/abc/formResponse",
        "mapping": { "Name": "entry.1", "Answer": "entry.2" },
        "required": ["Name"],
        "ignored": ["Timestamp"],
        "choices": { "Answer": ["Strongly Agree", "Agree"] },
        "submission": { "chunk_size": 2 }
    }"#;

    fn workspace(csv: &str, config: &str) -> (tempfile::TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("data.csv");
        let config_path = dir.path().join("form.json");
        fs::write(&csv_path, csv).unwrap();
        fs::write(&config_path, config).unwrap();
        (dir, csv_path, config_path)
    }

    fn args(dir: &Path, csv: &Path, config: &Path, extra: &[&str]) -> Args {
        let log = dir.join("log.jsonl");
        let mut argv = vec![
            "formpost".to_string(),
            "--csv".to_string(),
            csv.display().to_string(),
            "--config".to_string(),
            config.display().to_string(),
            "--log".to_string(),
            log.display().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Args::parse_from(argv)
    }

    #[tokio::test]
    async fn dry_run_validates_logs_and_exports_without_sending() {
        let (dir, csv, config) = workspace(
            "Timestamp,Name,Answer\nt,Ann,strongly agree\nt,,Agree\nt,Cy,agree\n",
            CONFIG,
        );
        let export = dir.path().join("export");
        let summary = dir.path().join("summary.json");
        let args = args(
            dir.path(),
            &csv,
            &config,
            &[
                "--dry-run",
                "--export-dir",
                &export.display().to_string(),
                "--summary-json",
                &summary.display().to_string(),
            ],
        );

        let session = run(&args, CancellationToken::new()).await.unwrap();
        assert!(!session.is_clean());
        assert!(session.verification.is_none());
        let report = session.report.unwrap();

        assert_eq!(report.mode, Mode::DryRun);
        assert_eq!(report.summary.succeeded, 2);
        assert_eq!(report.failed_rows(), vec![1]);
        assert_eq!(report.chunks[0].state, ChunkState::PartiallyFailed);
        assert_eq!(report.notes.len(), 2);
        assert!(export.join("chunk_2.csv").exists());
        assert!(export.join("manifest.json").exists());

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&summary).unwrap()).unwrap();
        assert_eq!(written["failed"], 1);

        let log = OutcomeLog::open(&args.log).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(
            log.query(&OutcomeFilter::all().kind(StatusKind::DryRunInvalid))
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn live_mode_refuses_placeholder_configuration() {
        let (dir, csv, config) = workspace(
            "Name,Answer\nAnn,Agree\n",
            &CONFIG.replace("entry.2", "entry.YOUR_ENTRY_ID"),
        );
        let args = args(dir.path(), &csv, &config, &[]);

        let err = run(&args, CancellationToken::new()).await.unwrap_err();

        assert!(err.to_string().contains("placeholders"));
        assert!(!args.log.exists());
    }

    #[tokio::test]
    async fn unmapped_column_fails_before_the_log_is_touched() {
        let (dir, csv, config) = workspace("Name,Answer,Email\nAnn,Agree,a@x\n", CONFIG);
        let args = args(dir.path(), &csv, &config, &["--dry-run"]);

        let err = run(&args, CancellationToken::new()).await.unwrap_err();

        assert!(err.to_string().contains("Email"));
        assert!(!args.log.exists());
    }

    #[tokio::test]
    async fn verify_reports_and_exports_rows_without_success() {
        let (dir, csv, config) = workspace(
            "Timestamp,Name,Answer\nt1,Ann,Agree\nt2,,Agree\nt3,Cy,agree\n",
            CONFIG,
        );
        let first = args(dir.path(), &csv, &config, &["--dry-run"]);
        run(&first, CancellationToken::new()).await.unwrap();

        let missing = dir.path().join("missing.csv");
        let report_path = dir.path().join("verify.json");
        let check = args(
            dir.path(),
            &csv,
            &config,
            &[
                "--dry-run",
                "--verify",
                "--missing-out",
                &missing.display().to_string(),
                "--summary-json",
                &report_path.display().to_string(),
            ],
        );

        let session = run(&check, CancellationToken::new()).await.unwrap();

        assert!(session.report.is_none());
        assert!(!session.is_clean());
        let verification = session.verification.unwrap();
        assert_eq!(verification.unsubmitted_rows(), vec![1]);
        assert!(verification.mismatches.is_empty());
        assert_eq!(
            fs::read_to_string(&missing).unwrap(),
            "Timestamp,Name,Answer\nt2,,Agree\n"
        );
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(written["mode"], "dry_run");
        assert_eq!(written["unsubmitted"][0]["row_index"], 1);

        // Nothing was submitted by the check itself.
        assert_eq!(OutcomeLog::open(&check.log).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn verify_needs_an_existing_log() {
        let (dir, csv, config) = workspace("Name,Answer\nAnn,Agree\n", CONFIG);
        let args = args(dir.path(), &csv, &config, &["--verify"]);

        let err = run(&args, CancellationToken::new()).await.unwrap_err();

        assert!(err.to_string().contains("does not exist"));
        assert!(!args.log.exists());
    }
}
