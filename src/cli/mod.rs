pub mod types;
mod coherence;
mod evaluate;
mod report;

pub use types::{Cli, Command, CoherenceArgs, EvaluateArgs, ModelSource, ReportCsvArgs};
pub use coherence::cmd_coherence;
pub use evaluate::cmd_evaluate;
pub use report::cmd_report_csv;
