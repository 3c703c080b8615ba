use teamboard::storage::{Event, Link, MorphChart, Task};

/// ANSI color codes
pub struct Color;

impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const STRIKETHROUGH: &str = "\x1b[9m";
    pub const GREEN: &str = "\x1b[32m";
    pub const CYAN: &str = "\x1b[36m";
}

fn paint(text: &str, color: &str, use_color: bool) -> String {
    if use_color {
        format!("{}{}{}", color, text, Color::RESET)
    } else {
        text.to_string()
    }
}

fn id_label(id: Option<&teamboard::storage::RecordId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn heading(text: &str, use_color: bool) -> String {
    paint(text, Color::BOLD, use_color)
}

/// `2025-03-14 10:00  Design review @ Lab 2  [id]`
pub fn render_event(event: &Event, use_color: bool) -> String {
    let mut line = paint(&event.date, Color::CYAN, use_color);
    if !event.time.is_empty() {
        line.push(' ');
        line.push_str(&event.time);
    }
    line.push_str("  ");
    line.push_str(&event.title);
    if !event.location.is_empty() {
        line.push_str(" @ ");
        line.push_str(&event.location);
    }
    line.push_str(&paint(&format!("  [{}]", id_label(event.id.as_ref())), Color::DIM, use_color));
    if !event.description.is_empty() {
        line.push_str("\n    ");
        line.push_str(&event.description);
    }
    line
}

pub fn render_task(task: &Task, use_color: bool) -> String {
    let id = paint(&format!("[{}]", id_label(task.id.as_ref())), Color::DIM, use_color);
    if task.completed {
        format!(
            "  [x] {}  {}",
            paint(&task.title, Color::STRIKETHROUGH, use_color),
            id
        )
    } else {
        format!("  [ ] {}  {}", task.title, id)
    }
}

pub fn render_link(link: &Link, use_color: bool) -> String {
    let mut line = format!("  {} {}", link.title, paint(&link.url, Color::CYAN, use_color));
    if let Some(file_name) = &link.file_name {
        line.push_str(&format!(" (uploaded {})", file_name));
    } else if link.is_document() {
        line.push_str(" (pdf)");
    }
    line.push_str(&paint(&format!("  [{}]", id_label(link.id.as_ref())), Color::DIM, use_color));
    line
}

/// Grid with columns padded to their widest cell
pub fn render_morph_chart(chart: &MorphChart, use_color: bool) -> String {
    let columns = chart.header.len();
    let widths: Vec<usize> = (0..columns)
        .map(|col| {
            chart
                .table
                .iter()
                .filter_map(|row| row.get(col))
                .chain(std::iter::once(&chart.header[col]))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let format_row = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect::<Vec<_>>()
            .join(" \u{2502} ")
    };

    let mut lines = vec![paint(&format_row(&chart.header), Color::BOLD, use_color)];
    lines.push(
        widths
            .iter()
            .map(|w| "\u{2500}".repeat(*w))
            .collect::<Vec<_>>()
            .join("\u{2500}\u{253c}\u{2500}"),
    );
    for row in &chart.table {
        lines.push(format_row(row));
    }
    if !chart.notes.is_empty() {
        lines.push(String::new());
        lines.push(chart.notes.clone());
    }
    lines.push(paint(
        &format!(
            "updated by {} at {}",
            chart.updated_by,
            chart.updated_at.format("%Y-%m-%d %H:%M")
        ),
        Color::DIM,
        use_color,
    ));
    lines.join("\n")
}

pub fn render_done(message: &str, use_color: bool) -> String {
    paint(message, Color::GREEN, use_color)
}
