use anyhow::Result;

use teamboard::storage::{EventDraft, EventPatch};
use teamboard::CollectionKind;

use super::print_outcome;
use crate::app::App;
use crate::render::terminal;
use crate::OutputFormat;

pub fn run_list(app: &App, date: Option<&str>, format: &OutputFormat, use_color: bool) -> Result<()> {
    let model = app.sync.model();
    let events = match date {
        Some(date) => model.events_on(date),
        None => model.events_sorted(),
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        OutputFormat::Plain => {
            if events.is_empty() {
                println!("No events.");
                return Ok(());
            }
            for event in &events {
                println!("{}", terminal::render_event(event, use_color));
            }
        }
    }
    Ok(())
}

pub async fn run_add(app: &App, draft: EventDraft, format: &OutputFormat, use_color: bool) -> Result<()> {
    let outcome = app.write(app.sync.add_event(draft)).await?;
    print_outcome("Event added", outcome, format, use_color)
}

pub async fn run_edit(
    app: &App,
    id: &str,
    patch: EventPatch,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let id = app.parse_id(CollectionKind::Events, id)?;
    let outcome = app.write(app.sync.edit_event(&id, patch)).await?;
    print_outcome("Event updated", outcome, format, use_color)
}

pub async fn run_delete(app: &App, id: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let id = app.parse_id(CollectionKind::Events, id)?;
    let outcome = app.write(app.sync.delete_event(&id)).await?;
    print_outcome("Event deleted", outcome, format, use_color)
}
