//! Evaluation reports and their JSON/CSV renderings.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::dataset::{Item, ScoringMode};
use crate::core::score::ScoreTriple;
use crate::Result;

/// CSV column headers, in output order.
pub const CSV_HEADER: [&str; 7] = [
    "ID",
    "Question",
    "Ground Truth",
    "Prediction",
    "Precision",
    "Recall",
    "F1",
];

/// Outcome recorded for a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Scores are present.
    Scored,
    /// No segment carried weight, so no aggregate exists.
    Undefined,
    /// The model failed on this item and the run continued.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub evaluation_date: DateTime<Local>,
    pub total_questions: usize,
    /// Items that contributed to `overall_scores`
    pub scored_questions: usize,
    pub mode: ScoringMode,
    /// Positional weights, present for weighted runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
}

/// One dataset item paired with its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    /// 1-based position in the dataset
    pub question_id: usize,
    #[serde(flatten)]
    pub item: Item,
    pub scores: Option<ScoreTriple>,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub metadata: ReportMetadata,
    /// Mean over scored items; `None` when no item could be scored
    pub overall_scores: Option<ScoreTriple>,
    pub detailed_results: Vec<ItemResult>,
}

/// Locations of the files written by [`EvaluationReport::write_all`].
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

/// Arithmetic mean of each component, `None` for an empty slice.
pub fn mean_scores(scores: &[ScoreTriple]) -> Option<ScoreTriple> {
    if scores.is_empty() {
        return None;
    }
    let total = scores
        .iter()
        .fold(ScoreTriple::default(), |acc, s| acc.plus(*s));
    Some(total.divided(scores.len() as f64))
}

/// Fixed four-decimal rendering used in CSV cells.
pub fn format_score(value: f64) -> String {
    format!("{value:.4}")
}

impl EvaluationReport {
    /// Assembles a report, computing the overall mean from the scored items.
    pub fn new(
        evaluation_date: DateTime<Local>,
        mode: ScoringMode,
        weights: Option<Vec<f64>>,
        detailed_results: Vec<ItemResult>,
    ) -> Self {
        let scored: Vec<ScoreTriple> = detailed_results.iter().filter_map(|r| r.scores).collect();
        let metadata = ReportMetadata {
            evaluation_date,
            total_questions: detailed_results.len(),
            scored_questions: scored.len(),
            mode,
            weights,
        };
        Self {
            metadata,
            overall_scores: mean_scores(&scored),
            detailed_results,
        }
    }

    /// File stem shared by the JSON and CSV outputs, stamped with the evaluation time.
    pub fn file_stem(&self) -> String {
        let prefix = match self.metadata.mode {
            ScoringMode::Weighted => "weighted_evaluation_results",
            ScoringMode::Whole => "evaluation_results",
        };
        format!(
            "{}_{}",
            prefix,
            self.metadata.evaluation_date.format("%Y%m%d_%H%M%S")
        )
    }

    /// Reads a report previously written with [`EvaluationReport::write_json`].
    pub fn read_json(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening report {}", path.display()))?;
        let report = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing report {}", path.display()))?;
        Ok(report)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        self.write_csv_to(File::create(path)?)
    }

    /// Writes the CSV rendering; unscored items get empty score cells.
    pub fn write_csv_to<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(CSV_HEADER)?;

        for result in &self.detailed_results {
            let (p, r, f1) = match result.scores {
                Some(s) => (
                    format_score(s.precision),
                    format_score(s.recall),
                    format_score(s.f1),
                ),
                None => (String::new(), String::new(), String::new()),
            };
            let id = result.question_id.to_string();
            csv.write_record([
                id.as_str(),
                result.item.question.as_str(),
                result.item.ground_truth.as_str(),
                result.item.prediction.as_str(),
                p.as_str(),
                r.as_str(),
                f1.as_str(),
            ])?;
        }

        csv.flush()?;
        Ok(())
    }

    /// Writes `<stem>.json` and `<stem>.csv` into `dir`, creating it if needed.
    pub fn write_all(&self, dir: &Path) -> Result<ReportPaths> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Creating output directory {}", dir.display()))?;
        let stem = self.file_stem();
        let paths = ReportPaths {
            json: dir.join(format!("{stem}.json")),
            csv: dir.join(format!("{stem}.csv")),
        };
        self.write_json(&paths.json)?;
        self.write_csv(&paths.csv)?;
        Ok(paths)
    }
}
