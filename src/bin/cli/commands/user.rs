use anyhow::Result;

use crate::app::App;
use crate::render::terminal;
use crate::OutputFormat;

pub fn run_show(app: &App, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "displayName": app.sync.display_name(),
                "sessionId": app.sync.session_id(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            println!("{} (session {})", app.sync.display_name(), app.sync.session_id());
        }
    }
    Ok(())
}

pub fn run_set(app: &App, name: &str, use_color: bool) -> Result<()> {
    app.sync.set_display_name(name)?;
    println!("{}", terminal::render_done(&format!("Display name set to {}", name.trim()), use_color));
    Ok(())
}

/// Drop every local snapshot and start from a fresh board
pub fn run_clear(app: &App, use_color: bool) -> Result<()> {
    app.sync.clear_local_data();
    println!("{}", terminal::render_done("Local data cleared", use_color));
    Ok(())
}
