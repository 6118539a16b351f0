//! End-to-end tests of dataset evaluation and report writing.

use std::collections::HashMap;
use std::fs;
use std::sync::Mutex;

use rust_bert_eval::core::{
    load_dataset, DatasetEvaluator, EvalError, EvaluationOptions, EvaluationReport,
    FailurePolicy, ItemStatus, ScoreTriple, ScoringMode, SegmentWeights, SimilarityScorer,
};
use rust_bert_eval::Result;

/// Deterministic stand-in for a similarity model: looks scores up by candidate text.
struct LookupScorer {
    scores: HashMap<String, ScoreTriple>,
    /// Number of pairs in each call
    calls: Mutex<Vec<usize>>,
}

impl LookupScorer {
    fn new(entries: &[(&str, ScoreTriple)]) -> Self {
        Self {
            scores: entries
                .iter()
                .map(|(text, triple)| (text.to_string(), *triple))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl SimilarityScorer for LookupScorer {
    fn score(&self, candidates: &[&str], references: &[&str]) -> Result<Vec<ScoreTriple>> {
        assert_eq!(candidates.len(), references.len());
        self.calls.lock().unwrap().push(candidates.len());
        candidates
            .iter()
            .map(|c| {
                self.scores
                    .get(*c)
                    .copied()
                    .ok_or_else(|| anyhow::anyhow!("model cannot score {c:?}"))
            })
            .collect()
    }
}

fn write_dataset(dir: &std::path::Path, json: &str) -> std::path::PathBuf {
    let path = dir.join("dataset.json");
    fs::write(&path, json).unwrap();
    path
}

const DATASET: &str = r#"[
  {"question": "Apa itu KRS?", "groundTruth": "Kartu Rencana Studi", "prediction": "perfect"},
  {"question": "Kapan UAS?", "groundTruth": "Bulan Juni", "prediction": "wrong"}
]"#;

#[test]
fn test_dataset_mean_over_items() {
    let dir = tempfile::tempdir().unwrap();
    let items = load_dataset(&write_dataset(dir.path(), DATASET)).unwrap();
    let scorer = LookupScorer::new(&[
        ("perfect", ScoreTriple::new(1.0, 1.0, 1.0)),
        ("wrong", ScoreTriple::new(0.0, 0.0, 0.0)),
    ]);

    let report = DatasetEvaluator::new(scorer, EvaluationOptions::default())
        .evaluate(items)
        .unwrap();

    assert_eq!(report.metadata.total_questions, 2);
    assert_eq!(report.overall_scores, Some(ScoreTriple::new(0.5, 0.5, 0.5)));
    assert_eq!(report.detailed_results[0].question_id, 1);
    assert_eq!(report.detailed_results[1].question_id, 2);
    assert_eq!(report.detailed_results[1].item.question, "Kapan UAS?");
}

#[test]
fn test_weighted_item_in_dataset() {
    let json = r#"[{"question": "q", "groundTruth": "g",
                    "prediction": "intro\nbody\n\nextra\nclosing\nignored"}]"#;
    let dir = tempfile::tempdir().unwrap();
    let items = load_dataset(&write_dataset(dir.path(), json)).unwrap();
    let scorer = LookupScorer::new(&[
        ("intro", ScoreTriple::new(0.0, 0.0, 0.0)),
        ("body", ScoreTriple::new(1.0, 1.0, 1.0)),
        ("extra", ScoreTriple::new(0.0, 0.0, 0.0)),
        ("closing", ScoreTriple::new(0.0, 0.0, 0.0)),
    ]);

    let report = DatasetEvaluator::new(scorer, EvaluationOptions::default())
        .evaluate(items)
        .unwrap();

    let scores = report.detailed_results[0].scores.unwrap();
    let expected = 0.6 / 0.9999;
    assert!((scores.f1 - expected).abs() < 1e-9);
    assert_eq!(
        report.metadata.weights,
        Some(SegmentWeights::default().as_slice().to_vec())
    );
}

#[test]
fn test_whole_mode_scores_full_prediction() {
    let json = r#"[{"question": "q", "groundTruth": "g", "prediction": "line one\nline two"}]"#;
    let items = rust_bert_eval::core::parse_dataset(json).unwrap();
    let scorer = LookupScorer::new(&[("line one\nline two", ScoreTriple::new(0.7, 0.8, 0.75))]);
    let options = EvaluationOptions {
        mode: ScoringMode::Whole,
        ..EvaluationOptions::default()
    };

    let report = DatasetEvaluator::new(scorer, options).evaluate(items).unwrap();

    assert_eq!(report.overall_scores, Some(ScoreTriple::new(0.7, 0.8, 0.75)));
    assert!(report.metadata.weights.is_none());
    assert!(report.file_stem().starts_with("evaluation_results_"));
}

#[test]
fn test_whole_mode_scores_dataset_in_one_call() {
    let items = rust_bert_eval::core::parse_dataset(DATASET).unwrap();
    let scorer = LookupScorer::new(&[
        ("perfect", ScoreTriple::new(1.0, 1.0, 1.0)),
        ("wrong", ScoreTriple::new(0.0, 0.0, 0.0)),
    ]);
    let options = EvaluationOptions {
        mode: ScoringMode::Whole,
        ..EvaluationOptions::default()
    };
    let evaluator = DatasetEvaluator::new(scorer, options);

    let report = evaluator.evaluate(items).unwrap();

    assert_eq!(report.overall_scores, Some(ScoreTriple::new(0.5, 0.5, 0.5)));
    assert_eq!(*evaluator.scorer().calls.lock().unwrap(), vec![2]);
}

#[test]
fn test_whole_mode_failure_is_attributed_to_its_item() {
    let items = rust_bert_eval::core::parse_dataset(DATASET).unwrap();
    let scorer = LookupScorer::new(&[("perfect", ScoreTriple::new(1.0, 1.0, 1.0))]);
    let options = EvaluationOptions {
        mode: ScoringMode::Whole,
        on_scorer_error: FailurePolicy::Skip,
        ..EvaluationOptions::default()
    };

    let report = DatasetEvaluator::new(scorer, options).evaluate(items).unwrap();

    assert_eq!(report.detailed_results[0].status, ItemStatus::Scored);
    assert_eq!(report.detailed_results[1].status, ItemStatus::Failed);
    assert_eq!(report.overall_scores, Some(ScoreTriple::new(1.0, 1.0, 1.0)));
}

#[test]
fn test_empty_prediction_is_flagged_not_averaged() {
    let json = r#"[
      {"question": "q1", "groundTruth": "g", "prediction": "perfect"},
      {"question": "q2", "groundTruth": "g", "prediction": "   \n\n"}
    ]"#;
    let items = rust_bert_eval::core::parse_dataset(json).unwrap();
    let scorer = LookupScorer::new(&[("perfect", ScoreTriple::new(0.9, 0.9, 0.9))]);

    let report = DatasetEvaluator::new(scorer, EvaluationOptions::default())
        .evaluate(items)
        .unwrap();

    let flagged = &report.detailed_results[1];
    assert_eq!(flagged.status, ItemStatus::Undefined);
    assert!(flagged.scores.is_none());
    assert!(flagged.error.is_some());
    assert_eq!(report.metadata.scored_questions, 1);
    let overall = report.overall_scores.unwrap();
    assert!((overall.precision - 0.9).abs() < 1e-12);
    assert!((overall.f1 - 0.9).abs() < 1e-12);
}

#[test]
fn test_scorer_failure_aborts_by_default() {
    let items = rust_bert_eval::core::parse_dataset(DATASET).unwrap();
    let scorer = LookupScorer::new(&[("perfect", ScoreTriple::new(1.0, 1.0, 1.0))]);

    let err = DatasetEvaluator::new(scorer, EvaluationOptions::default())
        .evaluate(items)
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<EvalError>(),
        Some(EvalError::ScorerFailure(_))
    ));
    assert!(format!("{err:#}").contains("question 2"));
}

#[test]
fn test_scorer_failure_skipped_when_configured() {
    let items = rust_bert_eval::core::parse_dataset(DATASET).unwrap();
    let scorer = LookupScorer::new(&[("perfect", ScoreTriple::new(1.0, 1.0, 1.0))]);
    let options = EvaluationOptions {
        on_scorer_error: FailurePolicy::Skip,
        ..EvaluationOptions::default()
    };

    let report = DatasetEvaluator::new(scorer, options).evaluate(items).unwrap();

    assert_eq!(report.detailed_results[1].status, ItemStatus::Failed);
    assert_eq!(report.overall_scores, Some(ScoreTriple::new(1.0, 1.0, 1.0)));
}

#[test]
fn test_parallel_matches_sequential() {
    let json: String = format!(
        "[{}]",
        (0..20)
            .map(|i| format!(
                r#"{{"question": "q{i}", "groundTruth": "g", "prediction": "p{}"}}"#,
                i % 4
            ))
            .collect::<Vec<_>>()
            .join(",")
    );
    let entries: Vec<(String, ScoreTriple)> = (0..4)
        .map(|i| (format!("p{i}"), ScoreTriple::new(i as f64 / 4.0, 0.5, 0.25)))
        .collect();
    let borrowed: Vec<(&str, ScoreTriple)> =
        entries.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    let evaluator =
        DatasetEvaluator::new(LookupScorer::new(&borrowed), EvaluationOptions::default());

    let items = rust_bert_eval::core::parse_dataset(&json).unwrap();
    let sequential = evaluator.evaluate(items.clone()).unwrap();
    let parallel = evaluator.evaluate_parallel(items).unwrap();

    assert_eq!(sequential.detailed_results, parallel.detailed_results);
    assert_eq!(sequential.overall_scores, parallel.overall_scores);
}

#[test]
fn test_reports_round_trip_through_json() {
    let dir = tempfile::tempdir().unwrap();
    let items = rust_bert_eval::core::parse_dataset(
        r#"[{"question": "Siapa rektor?", "groundTruth": "Prof. A", "prediction": "jawaban", "source": "faq"}]"#,
    )
    .unwrap();
    let scorer = LookupScorer::new(&[("jawaban", ScoreTriple::new(0.83336, 0.5, 0.625))]);
    let options = EvaluationOptions {
        mode: ScoringMode::Whole,
        ..EvaluationOptions::default()
    };

    let report = DatasetEvaluator::new(scorer, options).evaluate(items).unwrap();
    let paths = report.write_all(&dir.path().join("out")).unwrap();

    let file_name = paths.json.file_name().unwrap().to_str().unwrap().to_string();
    assert!(file_name.starts_with("evaluation_results_"));
    assert_eq!(paths.json.with_extension("csv"), paths.csv);

    let reread = EvaluationReport::read_json(&paths.json).unwrap();
    assert_eq!(reread.metadata.total_questions, 1);
    assert_eq!(reread.detailed_results[0].item, report.detailed_results[0].item);
    assert_eq!(reread.detailed_results[0].status, ItemStatus::Scored);
    assert_eq!(reread.detailed_results[0].item.extra["source"], "faq");

    let regenerated = dir.path().join("again.csv");
    reread.write_csv(&regenerated).unwrap();
    let original_csv = fs::read_to_string(&paths.csv).unwrap();
    assert_eq!(fs::read_to_string(&regenerated).unwrap(), original_csv);

    let mut reader = csv::Reader::from_path(&regenerated).unwrap();
    let row = reader.records().next().unwrap().unwrap();
    assert_eq!(&row[0], "1");
    assert_eq!(&row[1], "Siapa rektor?");
    assert_eq!(&row[4], "0.8334");
    assert_eq!(&row[5], "0.5000");
    assert_eq!(&row[6], "0.6250");
}

#[test]
fn test_malformed_dataset_fails_before_scoring() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_dataset(dir.path(), r#"[{"question": "q", "groundTruth": "g"}]"#);

    let err = load_dataset(&path).unwrap_err();

    assert!(matches!(err, EvalError::InputMalformed { .. }));
    assert!(err.to_string().contains("prediction"));
}
