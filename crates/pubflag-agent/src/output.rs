//! Console collaborators for the `pubflag` binary.

use std::path::PathBuf;

use async_trait::async_trait;
use pubflag_common::Mode;
use pubflag_engine::{ContentItem, ItemSource, PassReport, ReferenceRecord, Reporter, Styler};
use tracing::info;

use crate::config::OutputFormat;

/// Reads the item list from a JSON file on every pass.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ItemSource for JsonFileSource {
    async fn collect_items(&self) -> anyhow::Result<Vec<ContentItem>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        parse_items(&content)
    }
}

pub fn parse_items(content: &str) -> anyhow::Result<Vec<ContentItem>> {
    Ok(serde_json::from_str(content)?)
}

/// Prints the classified references to stdout.
pub struct ConsoleStyler {
    label: String,
    format: OutputFormat,
}

impl ConsoleStyler {
    pub fn new(label: impl Into<String>, format: OutputFormat) -> Self {
        Self { label: label.into(), format }
    }
}

impl Styler for ConsoleStyler {
    fn apply(&self, records: &[ReferenceRecord], mode: Mode) -> anyhow::Result<()> {
        let rendered = match self.format {
            OutputFormat::Text => render_text(records, mode, &self.label),
            OutputFormat::Json => serde_json::to_string_pretty(records)?,
        };
        println!("{rendered}");
        Ok(())
    }
}

/// One line per reference. Highlight mode marks confirmed references with
/// `[label]` and potential ones with `[label?]`; hide mode drops confirmed
/// references entirely.
pub fn render_text(records: &[ReferenceRecord], mode: Mode, label: &str) -> String {
    let mut lines = Vec::new();
    for record in records {
        let text = record.representative.text.split_whitespace().collect::<Vec<_>>().join(" ");
        let duplicates = match record.items.len() {
            1 => String::new(),
            n => format!(" (x{n})"),
        };
        let result = record.result;
        let line = match (mode, result.is_target_publisher, result.is_potential) {
            (Mode::Hide, true, _) => continue,
            (Mode::Highlight, true, _) => format!("[{label}] {text}{duplicates}  <{}>", result.source.as_str()),
            (_, false, true) => format!("[{label}?] {text}{duplicates}"),
            _ => format!("{text}{duplicates}"),
        };
        lines.push(line);
    }
    lines.join("\n")
}

/// Logs the pass summary.
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&self, report: &PassReport) {
        info!(
            pass_id = %report.pass_id,
            items = report.items_seen,
            references = report.records.len(),
            confirmed = report.confirmed,
            potential = report.potential,
            duration_ms = report.duration_ms,
            "Pass summary"
        );
    }
}
