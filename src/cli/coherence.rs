use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::Result;

use crate::cli::CoherenceArgs;
use crate::core::{load_chat_log, score_session, CrossEncoderConfig, CrossEncoderScorer};

/// Scores each question/answer turn of one chat session with a cross-encoder,
/// giving the model the previous `window` questions as context.
pub fn cmd_coherence(args: CoherenceArgs) -> Result<()> {
    let messages = load_chat_log(&args.chatlog)?;

    let mut config = CrossEncoderConfig::new(&args.model_dir);
    config.device = tch::Device::cuda_if_available();
    let scorer = CrossEncoderScorer::new(config)?;

    let report = score_session(&scorer, &messages, &args.session, args.window)?;

    for turn in &report.turns {
        println!("Turn {}", turn.turn);
        println!("Q (Contextualized): {}", turn.contextual_question);
        println!("A: {}", turn.answer);
        println!("Contextual Coherence Score: {:.2}", turn.score);
        println!("{}", "-".repeat(40));
    }

    if let Some(path) = &args.output {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writer.flush()?;
        println!("Scores saved to {}", path.display());
    }

    Ok(())
}
