use anyhow::Result;
use tracing::info;

use crate::cli::EvaluateArgs;
use crate::core::{
    load_dataset, BERTScorerBuilder, DatasetEvaluator, EvaluationOptions, EvaluationReport,
    SegmentWeights,
};

/// Command to score a dataset file and write timestamped JSON and CSV reports.
///
/// # Arguments
/// `args` - The CLI arguments structure containing:
///  - `input`: Path to the dataset JSON array.
///  - `output_dir`: Where the reports are written.
///  - `mode`: Weighted per-line scoring or whole-answer scoring.
///  - `weights`: Positional weights for weighted mode.
///  - `on_scorer_error`: Abort the run or skip items the model fails on.
///  - `model`, `model_type`, `lower_case`, `layer`, `batch_size`: model setup.
pub fn cmd_evaluate(args: EvaluateArgs) -> Result<()> {
    let options = EvaluationOptions {
        mode: args.mode.into(),
        weights: SegmentWeights::new(args.weights.clone())?,
        on_scorer_error: args.on_scorer_error.into(),
    };

    // Malformed input fails before any model is loaded
    let items = load_dataset(&args.input)?;
    info!(items = items.len(), input = %args.input.display(), "loaded dataset");

    let device = tch::Device::cuda_if_available();
    let files = args.model.resolve()?;

    let mut builder = BERTScorerBuilder::new()
        .model(args.model_type.into(), &args.model.name())
        .model_files(files)
        .lower_case(args.lower_case)
        .device(device)
        .batch_size(args.batch_size);
    if let Some(layer) = args.layer {
        builder = builder.num_layers(layer);
    }
    let scorer = builder.build()?;

    let report = DatasetEvaluator::new(scorer, options).evaluate(items)?;
    let paths = report.write_all(&args.output_dir)?;

    print_summary(&report);
    println!();
    println!("Results saved to:");
    println!("- JSON: {}", paths.json.display());
    println!("- CSV : {}", paths.csv.display());

    Ok(())
}

fn print_summary(report: &EvaluationReport) {
    let meta = &report.metadata;
    println!(
        "Scored {} of {} questions ({:?} mode)",
        meta.scored_questions, meta.total_questions, meta.mode
    );
    match report.overall_scores {
        Some(overall) => {
            println!("  Precision: {:.4}", overall.precision);
            println!("  Recall:    {:.4}", overall.recall);
            println!("  F1:        {:.4}", overall.f1);
        }
        None => println!("  No question could be scored"),
    }
}
