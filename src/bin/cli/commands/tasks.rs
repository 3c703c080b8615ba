use anyhow::Result;

use teamboard::storage::{TaskCategory, TaskDraft};
use teamboard::CollectionKind;

use super::print_outcome;
use crate::app::App;
use crate::render::terminal;
use crate::OutputFormat;

pub fn run_list(app: &App, category: Option<&str>, format: &OutputFormat, use_color: bool) -> Result<()> {
    let model = app.sync.model();
    let groups = match category {
        Some(category) => {
            let category: TaskCategory = category.parse()?;
            vec![(category, model.tasks_in(category))]
        }
        None => model.tasks_by_category(),
    };

    match format {
        OutputFormat::Json => {
            let output: serde_json::Map<String, serde_json::Value> = groups
                .iter()
                .map(|(category, tasks)| Ok((category.to_string(), serde_json::to_value(tasks)?)))
                .collect::<Result<_, serde_json::Error>>()?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Plain => {
            for (category, tasks) in &groups {
                let done = tasks.iter().filter(|t| t.completed).count();
                println!(
                    "{} ({}/{})",
                    terminal::heading(category.as_str(), use_color),
                    done,
                    tasks.len()
                );
                if tasks.is_empty() {
                    println!("  (no tasks)");
                }
                for task in tasks {
                    println!("{}", terminal::render_task(task, use_color));
                }
            }
        }
    }
    Ok(())
}

pub async fn run_add(app: &App, title: &str, category: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let outcome = app.write(app.sync.add_task(TaskDraft::new(title, category))).await?;
    print_outcome("Task added", outcome, format, use_color)
}

pub async fn run_toggle(app: &App, id: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let id = app.parse_id(CollectionKind::Tasks, id)?;
    let outcome = app.write(app.sync.toggle_task(&id)).await?;
    print_outcome("Task toggled", outcome, format, use_color)
}

pub async fn run_delete(app: &App, id: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let id = app.parse_id(CollectionKind::Tasks, id)?;
    let outcome = app.write(app.sync.delete_task(&id)).await?;
    print_outcome("Task deleted", outcome, format, use_color)
}
