//! Load report files: detailed JSON plus a markdown summary.

use std::path::{Path, PathBuf};

use devicerun_core::LoadReport;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Paths of one load test's report files.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// Writes `load_test_<timestamp>.json` and `load_report.md`.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn write(&self, report: &LoadReport) -> Result<ReportPaths, ReportError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ReportError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let paths = ReportPaths {
            json: self.dir.join(format!("load_test_{}.json", report.timestamp)),
            markdown: self.dir.join("load_report.md"),
        };

        let json = serde_json::to_string_pretty(report)?;
        write(&paths.json, &json)?;
        write(&paths.markdown, &render_markdown(report, &paths.json))?;

        info!(
            json = %paths.json.display(),
            markdown = %paths.markdown.display(),
            "Load report written"
        );
        Ok(paths)
    }
}

fn write(path: &Path, contents: &str) -> Result<(), ReportError> {
    std::fs::write(path, contents).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Markdown summary with configuration, results and recommendations.
pub fn render_markdown(report: &LoadReport, json_path: &Path) -> String {
    let summary = &report.summary;
    let config = &report.config;
    let all_ok = report.passed();
    let percent = if summary.total_workers == 0 {
        0.0
    } else {
        summary.successful_workers as f64 / summary.total_workers as f64 * 100.0
    };
    let max_stable = if all_ok {
        config.concurrency
    } else {
        summary.successful_workers
    };
    let bottleneck = if all_ok {
        "None detected"
    } else {
        "Device connectivity or ADB timeouts"
    };
    let detail = json_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    [
        "# Load Test Report".to_string(),
        format!("**Timestamp:** {}", report.timestamp),
        format!("**Test Duration:** {:.1}s", summary.total_duration_sec),
        String::new(),
        "## Configuration".to_string(),
        format!("- Concurrency: {} workers", config.concurrency),
        format!("- Episodes per worker: {}", config.episodes_per_worker),
        format!("- Total episodes: {}", config.total_episodes),
        format!("- Prompt: '{}'", config.prompt),
        String::new(),
        "## Results".to_string(),
        format!(
            "- Successful workers: {}/{} ({:.1}%)",
            summary.successful_workers, summary.total_workers, percent
        ),
        format!("- Average worker duration: {:.1}s", summary.avg_worker_duration_sec),
        format!("- Episodes per second: {:.2}", summary.episodes_per_second),
        String::new(),
        "## Recommendations".to_string(),
        format!("- Max stable concurrency: {max_stable}"),
        "- Typical resource usage: Monitor with `docker stats` or k8s metrics".to_string(),
        format!("- Bottlenecks: {bottleneck}"),
        String::new(),
        format!("**Detailed results:** `{detail}`"),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use devicerun_core::{DeviceId, WorkerResult};

    fn report(codes: &[i32]) -> LoadReport {
        let results: Vec<WorkerResult> = codes
            .iter()
            .enumerate()
            .map(|(i, &code)| {
                let device = DeviceId::new(format!("localhost:{}", 5555 + i));
                if code == -1 {
                    WorkerResult::timed_out(i, device, 5, 300.0, 300)
                } else {
                    WorkerResult::exited(i, device, 5, 10.0, code, "", "")
                }
            })
            .collect();
        let devices = results.iter().map(|r| r.device_id.clone()).collect();
        LoadReport::build(1_700_000_000, 5, "search for load test", 600, devices, results, 20.0)
    }

    #[test]
    fn test_markdown_all_passed() {
        let md = render_markdown(&report(&[0, 0]), Path::new("results/load_test_1700000000.json"));
        assert!(md.contains("- Successful workers: 2/2 (100.0%)"));
        assert!(md.contains("- Max stable concurrency: 2"));
        assert!(md.contains("- Bottlenecks: None detected"));
        assert!(md.contains("- Episodes per second: 0.50"));
        assert!(md.ends_with("**Detailed results:** `load_test_1700000000.json`"));
    }

    #[test]
    fn test_markdown_with_failures() {
        let md = render_markdown(&report(&[0, 0, 0, -1]), Path::new("x.json"));
        assert!(md.contains("- Successful workers: 3/4 (75.0%)"));
        assert!(md.contains("- Total episodes: 15"));
        assert!(md.contains("- Max stable concurrency: 3"));
        assert!(md.contains("Device connectivity or ADB timeouts"));
    }

    #[test]
    fn test_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let report = report(&[0]);
        let paths = ReportWriter::new(dir.path()).write(&report).unwrap();

        assert_eq!(paths.json.file_name().unwrap(), "load_test_1700000000.json");
        let parsed: LoadReport =
            serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
        assert_eq!(parsed, report);
        assert!(std::fs::read_to_string(&paths.markdown)
            .unwrap()
            .starts_with("# Load Test Report"));
    }
}
