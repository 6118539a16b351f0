use anyhow::Result;

use crate::cli::ReportCsvArgs;
use crate::core::EvaluationReport;

/// Rewrites the CSV view of a JSON report, e.g. after editing the JSON by hand.
pub fn cmd_report_csv(args: ReportCsvArgs) -> Result<()> {
    let report = EvaluationReport::read_json(&args.report)?;
    let output = args
        .output
        .unwrap_or_else(|| args.report.with_extension("csv"));

    report.write_csv(&output)?;
    println!(
        "Wrote {} rows to {}",
        report.detailed_results.len(),
        output.display()
    );
    Ok(())
}
