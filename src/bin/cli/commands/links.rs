use std::path::Path;

use anyhow::{bail, Context, Result};

use teamboard::storage::{LinkCategory, LinkDraft};
use teamboard::CollectionKind;

use super::print_outcome;
use crate::app::App;
use crate::render::terminal;
use crate::OutputFormat;

pub fn run_list(app: &App, category: Option<&str>, format: &OutputFormat, use_color: bool) -> Result<()> {
    let model = app.sync.model();
    let categories = match category {
        Some(category) => vec![category.parse::<LinkCategory>()?],
        None => LinkCategory::ALL.to_vec(),
    };

    match format {
        OutputFormat::Json => match category {
            Some(_) => {
                let links = model.links.group(categories[0]);
                println!("{}", serde_json::to_string_pretty(links)?);
            }
            None => println!("{}", serde_json::to_string_pretty(&model.links)?),
        },
        OutputFormat::Plain => {
            for category in categories {
                let links = model.links.group(category);
                println!("{}", terminal::heading(category.display_name(), use_color));
                if links.is_empty() {
                    println!("  (no links)");
                }
                for link in links {
                    println!("{}", terminal::render_link(link, use_color));
                }
            }
        }
    }
    Ok(())
}

pub async fn run_add(
    app: &App,
    title: &str,
    url: &str,
    category: &str,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let outcome = app.write(app.sync.add_link(LinkDraft::new(title, url, category))).await?;
    print_outcome("Link added", outcome, format, use_color)
}

/// Register a PDF from disk. The file is not copied; only its path and
/// name are recorded.
pub async fn run_upload(
    app: &App,
    path: &Path,
    title: Option<&str>,
    category: &str,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    if !path.is_file() {
        bail!("No such file: {}", path.display());
    }
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("File name is not valid UTF-8")?;
    let title = match title {
        Some(title) => title.to_string(),
        None => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.to_string()),
    };
    let url = path.to_string_lossy().into_owned();

    let draft = LinkDraft::new(title, url, category);
    let outcome = app.write(app.sync.add_uploaded_document(draft, file_name)).await?;
    print_outcome("Document uploaded", outcome, format, use_color)
}

pub async fn run_delete(app: &App, id: &str, format: &OutputFormat, use_color: bool) -> Result<()> {
    let id = app.parse_id(CollectionKind::Links, id)?;
    let outcome = app.write(app.sync.delete_link(&id)).await?;
    print_outcome("Link deleted", outcome, format, use_color)
}

pub fn run_reset(app: &App, use_color: bool) -> Result<()> {
    app.sync.reset_links_to_defaults()?;
    println!("{}", terminal::render_done("Links reset to defaults", use_color));
    Ok(())
}
