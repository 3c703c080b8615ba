pub mod events;
pub mod links;
pub mod morph;
pub mod tasks;
pub mod user;

use anyhow::Result;
use teamboard::WriteOutcome;

use crate::render::terminal;
use crate::OutputFormat;

/// Report where a write ended up
pub fn print_outcome(action: &str, outcome: WriteOutcome, format: &OutputFormat, use_color: bool) -> Result<()> {
    let target = match outcome {
        WriteOutcome::Remote => "remote",
        WriteOutcome::Local => "local",
    };
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({ "action": action, "outcome": target });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("{}", terminal::render_done(&format!("{} ({})", action, target), use_color));
        }
    }
    Ok(())
}
