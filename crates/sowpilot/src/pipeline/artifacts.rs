//! Report and data-export artifacts written when a job completes.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::job::AnalysisJob;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Keeps only characters that are safe in a single path component.
fn path_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        s => s.to_string(),
    }
}

/// Writes `<root>/<opportunity>/<job_id>.json` and `.md`.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes both artifacts for a job whose result payload is `payload`.
    /// Returns the written paths, data export first.
    pub async fn write(
        &self,
        job: &AnalysisJob,
        payload: &Value,
    ) -> Result<Vec<String>, ArtifactError> {
        let dir = self.root.join(path_component(&job.opportunity_ref));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ArtifactError::CreateDirectory {
                path: dir.clone(),
                source: e,
            })?;

        let stem = path_component(&job.id);
        let json_path = dir.join(format!("{}.json", stem));
        let md_path = dir.join(format!("{}.md", stem));

        let export = serde_json::to_vec_pretty(payload)?;
        write_file(&json_path, &export).await?;
        write_file(&md_path, render_report(job, payload).as_bytes()).await?;

        Ok(vec![
            json_path.display().to_string(),
            md_path.display().to_string(),
        ])
    }
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), ArtifactError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| ArtifactError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
}

fn text<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Markdown summary of a job and its result payload.
pub fn render_report(job: &AnalysisJob, payload: &Value) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# {} report for {}\n",
        job.analysis_type, job.opportunity_ref
    );
    let _ = writeln!(out, "- Job: `{}`", job.id);
    let _ = writeln!(out, "- Status: {}", job.status);
    let _ = writeln!(out, "- Created: {}", job.created_at.to_rfc3339());
    if payload.get("fallback_used").and_then(Value::as_bool) == Some(true) {
        let _ = writeln!(out, "- Degraded: yes (fallback used)");
    }

    if let Some(error) = payload.get("error") {
        let _ = writeln!(out, "\n## Error\n");
        let _ = writeln!(out, "- Reason: {}", text(error, "reason").unwrap_or("unknown"));
        if let Some(message) = text(error, "message") {
            let _ = writeln!(out, "- Detail: {}", message);
        }
    }

    if let Some(req) = payload.get("requirements").filter(|r| r.is_object()) {
        let _ = writeln!(out, "\n## Requirements\n");
        for (label, key) in [
            ("Location", "location"),
            ("Check-in", "checkIn"),
            ("Check-out", "checkOut"),
            ("Headcount", "headcount"),
        ] {
            let value = match req.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => "n/a".to_string(),
            };
            let _ = writeln!(out, "- {}: {}", label, value);
        }
    }

    if let Some(hotels) = payload.get("hotels").and_then(Value::as_array) {
        let _ = writeln!(out, "\n## Recommended hotels\n");
        if hotels.is_empty() {
            let _ = writeln!(out, "No hotels matched.");
        } else {
            let _ = writeln!(out, "| # | Hotel | Distance (mi) | Rooms | Rating | Price |");
            let _ = writeln!(out, "|---|-------|---------------|-------|--------|-------|");
            for (i, entry) in hotels.iter().enumerate() {
                let hotel = &entry["hotel"];
                let distance = entry["distanceMiles"]
                    .as_f64()
                    .map(|d| format!("{:.1}", d))
                    .unwrap_or_else(|| "n/a".to_string());
                let rooms = hotel["roomCount"]
                    .as_u64()
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "n/a".to_string());
                let rating = hotel["rating"]
                    .as_f64()
                    .map(|r| format!("{:.1}", r))
                    .unwrap_or_else(|| "n/a".to_string());
                let price = match (entry["priceTotal"].as_f64(), text(entry, "priceCurrency")) {
                    (Some(total), Some(currency)) => format!("{:.2} {}", total, currency),
                    (Some(total), None) => format!("{:.2}", total),
                    _ => "n/a".to_string(),
                };
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | {} | {} | {} |",
                    i + 1,
                    text(hotel, "name").unwrap_or("?"),
                    distance,
                    rooms,
                    rating,
                    price
                );
            }
        }
    }

    if let Some(notes) = payload.get("degradations").and_then(Value::as_array) {
        if !notes.is_empty() {
            let _ = writeln!(out, "\n## Notes\n");
            for note in notes.iter().filter_map(Value::as_str) {
                let _ = writeln!(out, "- {}", note);
            }
        }
    }

    out
}
