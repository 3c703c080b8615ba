mod app;
mod commands;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use teamboard::storage::{EventDraft, EventPatch};

#[derive(Parser)]
#[command(name = "teamboard", about = "Team dashboard: events, tasks, links and the morph chart", version)]
struct Cli {
    /// Config file (default: <config dir>/teamboard/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Work from local snapshots only, even when a remote store is configured
    #[arg(long, global = true)]
    offline: bool,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Team calendar
    #[command(subcommand)]
    Events(EventsCommand),

    /// Task board
    #[command(subcommand)]
    Tasks(TasksCommand),

    /// Resource links and documents
    #[command(subcommand)]
    Links(LinksCommand),

    /// Shared morph chart
    #[command(subcommand)]
    Morph(MorphCommand),

    /// Display name used as creator of new records
    #[command(subcommand)]
    User(UserCommand),

    /// Remove all locally stored collections
    Clear,
}

#[derive(Subcommand)]
enum EventsCommand {
    /// List events by date
    List {
        /// Only events on this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Add an event
    Add {
        title: String,
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Edit fields of an event
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Delete an event
    Delete { id: String },
}

#[derive(Subcommand)]
enum TasksCommand {
    /// List tasks grouped by category
    List {
        #[arg(long)]
        category: Option<String>,
    },

    /// Add a task
    Add {
        title: String,
        /// design, research, procurement, assembly or testing
        #[arg(long)]
        category: String,
    },

    /// Flip a task between open and done
    Toggle { id: String },

    /// Delete a task
    Delete { id: String },
}

#[derive(Subcommand)]
enum LinksCommand {
    /// List links grouped by category
    List {
        #[arg(long)]
        category: Option<String>,
    },

    /// Add a link
    Add {
        title: String,
        url: String,
        /// course, technical, communication, external or documents
        #[arg(long)]
        category: String,
    },

    /// Add a PDF from disk
    Upload {
        path: PathBuf,
        /// Title (defaults to the file name without extension)
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "documents")]
        category: String,
    },

    /// Delete a link
    Delete { id: String },

    /// Restore the built-in links
    Reset,
}

#[derive(Subcommand)]
enum MorphCommand {
    /// Print the morph chart
    Show,

    /// Replace the morph chart
    Save {
        /// Comma-separated column headers
        #[arg(long)]
        header: String,
        /// Comma-separated cells; repeat for each row
        #[arg(long = "row")]
        rows: Vec<String>,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Show the current display name
    Show,

    /// Set the display name
    Set { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && std::io::stdout().is_terminal();
    let format = &cli.format;

    let app = app::App::start(cli.config.as_deref(), cli.offline).await?;

    let result = match cli.command {
        Command::Events(subcmd) => match subcmd {
            EventsCommand::List { date } => commands::events::run_list(&app, date.as_deref(), format, use_color),
            EventsCommand::Add {
                title,
                date,
                time,
                location,
                description,
            } => {
                let draft = EventDraft {
                    time,
                    location,
                    description,
                    ..EventDraft::new(title, date)
                };
                commands::events::run_add(&app, draft, format, use_color).await
            }
            EventsCommand::Edit {
                id,
                title,
                date,
                time,
                location,
                description,
            } => {
                let patch = EventPatch {
                    title,
                    date,
                    time,
                    location,
                    description,
                };
                commands::events::run_edit(&app, &id, patch, format, use_color).await
            }
            EventsCommand::Delete { id } => commands::events::run_delete(&app, &id, format, use_color).await,
        },
        Command::Tasks(subcmd) => match subcmd {
            TasksCommand::List { category } => {
                commands::tasks::run_list(&app, category.as_deref(), format, use_color)
            }
            TasksCommand::Add { title, category } => {
                commands::tasks::run_add(&app, &title, &category, format, use_color).await
            }
            TasksCommand::Toggle { id } => commands::tasks::run_toggle(&app, &id, format, use_color).await,
            TasksCommand::Delete { id } => commands::tasks::run_delete(&app, &id, format, use_color).await,
        },
        Command::Links(subcmd) => match subcmd {
            LinksCommand::List { category } => {
                commands::links::run_list(&app, category.as_deref(), format, use_color)
            }
            LinksCommand::Add { title, url, category } => {
                commands::links::run_add(&app, &title, &url, &category, format, use_color).await
            }
            LinksCommand::Upload { path, title, category } => {
                commands::links::run_upload(&app, &path, title.as_deref(), &category, format, use_color).await
            }
            LinksCommand::Delete { id } => commands::links::run_delete(&app, &id, format, use_color).await,
            LinksCommand::Reset => commands::links::run_reset(&app, use_color),
        },
        Command::Morph(subcmd) => match subcmd {
            MorphCommand::Show => commands::morph::run_show(&app, format, use_color),
            MorphCommand::Save { header, rows, notes } => {
                commands::morph::run_save(&app, &header, &rows, notes, format, use_color).await
            }
        },
        Command::User(subcmd) => match subcmd {
            UserCommand::Show => commands::user::run_show(&app, format),
            UserCommand::Set { name } => commands::user::run_set(&app, &name, use_color),
        },
        Command::Clear => commands::user::run_clear(&app, use_color),
    };

    app.sync.shutdown();
    result
}
