//! Run records: per-run JSON, CSV, markdown and HTML summaries.

use std::fs::File;
use std::path::{Path, PathBuf};

use askama::Template;
use devicerun_core::{EpisodeRecord, RunId};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Errors writing run records.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Aggregate metrics over a run's episodes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunMetrics {
    pub episodes: usize,

    /// Fraction of episodes that succeeded.
    pub success_rate: f64,

    /// Mean episode latency, seconds.
    pub avg_latency_sec: f64,

    /// Fraction of episodes that only succeeded after a retry.
    pub flakiness: f64,
}

impl RunMetrics {
    /// All rates are 0 for an empty run.
    pub fn from_records(records: &[EpisodeRecord]) -> Self {
        let episodes = records.len();
        if episodes == 0 {
            return Self {
                episodes,
                success_rate: 0.0,
                avg_latency_sec: 0.0,
                flakiness: 0.0,
            };
        }
        let n = episodes as f64;
        let succeeded = records.iter().filter(|r| r.result.success).count() as f64;
        let flaky = records.iter().filter(|r| r.result.flaky).count() as f64;
        let latency: f64 = records.iter().map(|r| r.result.latency_sec).sum();
        Self {
            episodes,
            success_rate: succeeded / n,
            avg_latency_sec: latency / n,
            flakiness: flaky / n,
        }
    }
}

/// Paths of the files written for one run.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub json: PathBuf,
    pub csv: PathBuf,
    pub markdown: PathBuf,
    pub html: PathBuf,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    run_id: &'a str,
    episode: usize,
    task: &'a str,
    success: bool,
    latency_sec: f64,
    attempts: u32,
    flaky: u8,
}

/// Writes run records into a results directory.
#[derive(Debug, Clone)]
pub struct RunRecorder {
    dir: PathBuf,
}

impl RunRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write every record format for `run_id`.
    pub fn write(
        &self,
        run_id: &RunId,
        records: &[EpisodeRecord],
    ) -> Result<RunArtifacts, RecordError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| RecordError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let artifacts = RunArtifacts {
            json: self.dir.join(format!("{run_id}.json")),
            csv: self.dir.join(format!("{run_id}.csv")),
            markdown: self.dir.join("report.md"),
            html: self.dir.join(format!("{run_id}.html")),
        };
        let metrics = RunMetrics::from_records(records);

        let file = create(&artifacts.json)?;
        serde_json::to_writer_pretty(file, records)?;

        let mut writer = csv::Writer::from_writer(create(&artifacts.csv)?);
        for record in records {
            writer.serialize(CsvRow {
                run_id: record.run_id.as_str(),
                episode: record.episode,
                task: &record.result.task,
                success: record.result.success,
                latency_sec: record.result.latency_sec,
                attempts: record.result.attempts,
                flaky: u8::from(record.result.flaky),
            })?;
        }
        writer.flush().map_err(|source| RecordError::Io {
            path: artifacts.csv.clone(),
            source,
        })?;

        write_text(&artifacts.markdown, &render_markdown(run_id, &metrics))?;
        write_text(&artifacts.html, &render_html(run_id, records, &metrics)?)?;

        info!(
            run_id = %run_id,
            episodes = metrics.episodes,
            success_rate = metrics.success_rate,
            dir = %self.dir.display(),
            "Run records written"
        );
        Ok(artifacts)
    }
}

fn create(path: &Path) -> Result<File, RecordError> {
    File::create(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_text(path: &Path, contents: &str) -> Result<(), RecordError> {
    std::fs::write(path, contents).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

fn render_markdown(run_id: &RunId, metrics: &RunMetrics) -> String {
    [
        "# Evaluation Report".to_string(),
        format!("- Episodes: {}", metrics.episodes),
        format!("- Success rate: {}", percent(metrics.success_rate)),
        format!("- Avg latency: {:.2}s", metrics.avg_latency_sec),
        format!("- Flakiness: {}", percent(metrics.flakiness)),
        format!("- Run ID: {run_id}"),
    ]
    .join("\n")
}

/// One table row of the HTML report.
struct HtmlRow<'a> {
    episode: usize,
    task: &'a str,
    attempts: u32,
    latency: String,
    success: bool,
}

/// HTML summary page. Askama escapes every interpolated value.
#[derive(Template)]
#[template(path = "report.html")]
struct HtmlReport<'a> {
    run_id: &'a str,
    episodes: usize,
    success_rate: String,
    avg_latency: String,
    flakiness: String,
    rows: Vec<HtmlRow<'a>>,
}

fn render_html(
    run_id: &RunId,
    records: &[EpisodeRecord],
    metrics: &RunMetrics,
) -> Result<String, RecordError> {
    let rows = records
        .iter()
        .map(|record| HtmlRow {
            episode: record.episode,
            task: &record.result.task,
            attempts: record.result.attempts,
            latency: format!("{:.2}", record.result.latency_sec),
            success: record.result.success,
        })
        .collect();
    let page = HtmlReport {
        run_id: run_id.as_str(),
        episodes: metrics.episodes,
        success_rate: percent(metrics.success_rate),
        avg_latency: format!("{:.2}", metrics.avg_latency_sec),
        flakiness: percent(metrics.flakiness),
        rows,
    };
    Ok(page.render()?)
}
