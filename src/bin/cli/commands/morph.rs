use anyhow::{bail, Result};

use super::print_outcome;
use crate::app::App;
use crate::render::terminal;
use crate::OutputFormat;

pub fn run_show(app: &App, format: &OutputFormat, use_color: bool) -> Result<()> {
    let model = app.sync.model();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&model.morph_chart)?),
        OutputFormat::Plain => match &model.morph_chart {
            Some(chart) => println!("{}", terminal::render_morph_chart(chart, use_color)),
            None => println!("No morph chart saved yet."),
        },
    }
    Ok(())
}

fn split_cells(line: &str) -> Vec<String> {
    line.split(',').map(|cell| cell.trim().to_string()).collect()
}

/// Replace the chart. Header and rows are comma-separated cells.
pub async fn run_save(
    app: &App,
    header: &str,
    rows: &[String],
    notes: Option<String>,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let header = split_cells(header);
    if header.iter().all(|cell| cell.is_empty()) {
        bail!("Morph chart header is empty");
    }
    let table: Vec<Vec<String>> = rows.iter().map(|row| split_cells(row)).collect();

    let outcome = app
        .write(app.sync.save_morph_chart(header, table, notes.unwrap_or_default()))
        .await?;
    print_outcome("Morph chart saved", outcome, format, use_color)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_cells() {
        assert_eq!(split_cells("Power, Steering ,"), vec!["Power", "Steering", ""]);
    }
}
