#![forbid(unsafe_code)]

mod output;
mod publish;
mod reference;
mod upstream;

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use output::{CliError, OutputMode, pretty_kv, render, render_error};
use pcr_ics_core::config::{Config, load_config};
use pcr_ics_core::pipeline::{
    self, RunOutcome, RunReport, RunSettings, Upstream, truncate_to_seconds,
};
use publish::{CiEvent, ci_output_line, publish};
use reference::{Reference, load_reference};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use upstream::{HttpUpstream, LocalUpstream};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "pcr-ics: versioned iCalendar feed of Princess Connect! Re:Dive (CN) events",
    long_about = None,
    after_help = "EXAMPLES:\n    # Regenerate against the published feed\n    pcr-ics\n\n    # Rebuild from scratch into a local file\n    pcr-ics --ref-calendar-path none --target ./pcr_cn.ics\n\n    # Use a snapshot already on disk\n    pcr-ics --database redive_cn.db --data-version 202101211454"
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit the run summary and errors as JSON.
    #[arg(long)]
    json: bool,

    /// Reference calendar: `none`, an http(s) URL or a local path.
    #[arg(long, value_name = "REF")]
    ref_calendar_path: Option<String>,

    /// Output path of the generated calendar.
    #[arg(long, value_name = "PATH")]
    target: Option<PathBuf>,

    /// Configuration file (default: ./pcr-ics.toml, then the user config dir).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Use this snapshot instead of downloading one (`.br` is decompressed).
    #[arg(long, value_name = "PATH", requires = "data_version")]
    database: Option<PathBuf>,

    /// Data version of the snapshot given with --database.
    #[arg(long, value_name = "VER", requires = "database")]
    data_version: Option<String>,
}

impl Cli {
    const fn output_mode(&self) -> OutputMode {
        OutputMode::from_json_flag(self.json)
    }

    fn reference(&self, config: &Config) -> Reference {
        Reference::parse(
            self.ref_calendar_path
                .as_deref()
                .unwrap_or(&config.publish.reference),
        )
    }

    fn target(&self, config: &Config) -> PathBuf {
        self.target
            .clone()
            .unwrap_or_else(|| config.publish.target.clone())
    }

    fn upstream(&self, config: &Config) -> Box<dyn Upstream> {
        match (&self.database, &self.data_version) {
            (Some(database), Some(version)) => {
                Box::new(LocalUpstream::new(database.clone(), version.clone()))
            }
            _ => Box::new(HttpUpstream::new(&config.upstream)),
        }
    }
}

/// What a run did, for the summary on stdout.
#[derive(Debug, Serialize)]
struct RunSummary {
    /// `up_to_date` or `updated`.
    status: &'static str,
    version: String,
    previous_version: Option<String>,
    target: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<RunReport>,
}

impl RunSummary {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        pretty_kv(w, "status", self.status)?;
        pretty_kv(w, "version", &self.version)?;
        pretty_kv(
            w,
            "previous",
            self.previous_version.as_deref().unwrap_or("none"),
        )?;
        pretty_kv(w, "target", self.target.display().to_string())?;
        if let Some(events) = self.events {
            pretty_kv(w, "events", events.to_string())?;
        }
        if let Some(report) = &self.report {
            let merge = &report.merge;
            pretty_kv(
                w,
                "merge",
                format!(
                    "{} created, {} updated, {} unchanged, {} dropped",
                    merge.created, merge.updated, merge.unchanged, merge.dropped_stale
                ),
            )?;
            pretty_kv(
                w,
                "window",
                format!(
                    "{} before release, {} clamped",
                    report.before_release, report.clamped
                ),
            )?;
        }
        Ok(())
    }

    fn ci_event<'a>(&'a self, github_sha: Option<&'a str>) -> CiEvent<'a> {
        if self.report.is_some() {
            CiEvent::Bumped {
                version: &self.version,
            }
        } else {
            CiEvent::UpToDate { github_sha }
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("PCR_ICS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "pcr_ics=debug,info"
        } else {
            "pcr_ics=info,warn"
        })
    });

    let format = env::var("PCR_ICS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(io::stderr))
                .init();
        }
    }
}

fn execute(cli: &Cli) -> Result<RunSummary> {
    let cwd = env::current_dir().context("failed to resolve working directory")?;
    let config = load_config(cli.config.as_deref(), &cwd)?;
    let settings = RunSettings::from_config(&config.calendar)?;
    let target = cli.target(&config);

    let previous = load_reference(&cli.reference(&config), &config.calendar)?;
    let previous_version = previous.data_version_marker.clone();

    let workdir = tempfile::Builder::new()
        .prefix("pcr-ics-")
        .tempdir()
        .context("failed to create work directory")?;
    debug!(workdir = %workdir.path().display(), "work directory ready");

    let run_timestamp = truncate_to_seconds(Utc::now());
    let upstream = cli.upstream(&config);
    let outcome = pipeline::run(
        upstream.as_ref(),
        &previous,
        &settings,
        run_timestamp,
        workdir.path(),
    )?;

    let summary = match outcome {
        RunOutcome::UpToDate { version } => RunSummary {
            status: "up_to_date",
            version,
            previous_version,
            target,
            events: None,
            bytes: None,
            report: None,
        },
        RunOutcome::Updated {
            version,
            artifact,
            report,
        } => {
            let bytes = publish(&target, &artifact)?;
            RunSummary {
                status: "updated",
                version,
                previous_version,
                target,
                events: Some(artifact.len()),
                bytes: Some(bytes),
                report: Some(report),
            }
        }
    };

    workdir
        .close()
        .context("failed to remove work directory")?;
    Ok(summary)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    info!(version = env!("CARGO_PKG_VERSION"), "pcr-ics start");

    let mode = cli.output_mode();
    let result = execute(&cli).and_then(|summary| {
        if env::var_os("GITHUB_WORKFLOW").is_some() {
            let github_sha = env::var("GITHUB_SHA").ok();
            println!("{}", ci_output_line(summary.ci_event(github_sha.as_deref())));
        }
        render(mode, &summary, |summary, w| summary.render_human(w))
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let _ = render_error(mode, &CliError::from(&err));
            ExitCode::FAILURE
        }
    }
}
