//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use storygraph_core::dates::describe;
use storygraph_core::{Book, EditionInfo, Entry, Shelf, Status, StoryGraph};
use storygraph_session::{FromFragment, Pager};
use storygraph_shared::{AppConfig, SessionConfig, StoryGraphError, init_config, load_config};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Manage StoryGraph shelves and the reading journal from the terminal.
#[derive(Parser)]
#[command(
    name = "storygraph",
    version,
    about = "Read and update a StoryGraph account through its web pages.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Credentials file (overrides the config file).
    #[arg(long, env = "STORYGRAPH_CREDENTIALS", global = true)]
    pub credentials: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Log in, print the username and store the session cookie.
    Login,

    /// List the books on one of your shelves.
    Shelf {
        /// Which shelf.
        shelf: ShelfArg,
    },

    /// Browse or search the catalogue.
    Browse {
        /// Search term.
        #[arg(short, long)]
        search: Option<String>,
    },

    /// List reading journal entries.
    Journal,

    /// Show a book.
    Book {
        /// Book path, e.g. /books/<id>.
        path: String,
    },

    /// Move a book to another shelf.
    Status {
        /// Book path.
        path: String,

        /// New status.
        status: StatusArg,
    },

    /// Record reading progress.
    Progress {
        /// Book path.
        path: String,

        /// Pages read.
        #[arg(long, conflicts_with = "percent", required_unless_present = "percent")]
        pages: Option<u32>,

        /// Percentage read.
        #[arg(long)]
        percent: Option<u32>,
    },

    /// Mark a book as owned.
    Own {
        /// Book path.
        path: String,

        /// Unmark instead.
        #[arg(long)]
        remove: bool,
    },

    /// Import a book by ISBN.
    Import {
        /// ISBN-10 or ISBN-13.
        isbn: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Shelf names accepted on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum ShelfArg {
    Owned,
    ToRead,
    Current,
    Read,
}

impl From<ShelfArg> for Shelf {
    fn from(arg: ShelfArg) -> Self {
        match arg {
            ShelfArg::Owned => Self::Owned,
            ShelfArg::ToRead => Self::ToRead,
            ShelfArg::Current => Self::Current,
            ShelfArg::Read => Self::Read,
        }
    }
}

/// Status names accepted on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum StatusArg {
    None,
    ToRead,
    Current,
    Read,
    Dnf,
}

impl From<StatusArg> for Status {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::None => Self::None,
            StatusArg::ToRead => Self::ToRead,
            StatusArg::Current => Self::Current,
            StatusArg::Read => Self::Read,
            StatusArg::Dnf => Self::DidNotFinish,
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "storygraph=info",
        1 => "storygraph=debug",
        _ => "storygraph=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let credentials = cli.credentials;
    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
        command => {
            let mut sg = open(credentials).await?;
            let outcome = dispatch(&sg, command).await;
            settle(outcome, sg.save())
        }
    }
}

/// Combine a command result with the credentials save that follows it.
///
/// The command error wins; a save failure alongside it is only logged.
fn settle(outcome: Result<()>, saved: storygraph_shared::Result<()>) -> Result<()> {
    match (outcome, saved) {
        (Err(e), Err(save_err)) => {
            warn!(error = %save_err, "could not save credentials");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(()), saved) => Ok(saved?),
    }
}

async fn dispatch(sg: &StoryGraph, command: Command) -> Result<()> {
    match command {
        Command::Login => {
            println!("Logged in as {}", sg.username());
            Ok(())
        }
        Command::Shelf { shelf } => {
            let shelf = Shelf::from(shelf);
            print_books(sg.shelf(shelf), &format!("{shelf} shelf")).await
        }
        Command::Browse { search } => {
            let label = search.as_deref().map_or("browse".to_string(), |s| format!("search {s:?}"));
            print_books(sg.browse_books(search.as_deref()), &label).await
        }
        Command::Journal => cmd_journal(sg).await,
        Command::Book { path } => cmd_book(sg, &path).await,
        Command::Status { path, status } => cmd_status(sg, &path, status.into()).await,
        Command::Progress {
            path,
            pages,
            percent,
        } => cmd_progress(sg, &path, pages, percent).await,
        Command::Own { path, remove } => cmd_own(sg, &path, !remove).await,
        Command::Import { isbn } => cmd_import(sg, &isbn).await,
        Command::Config { .. } => Err(eyre!("config commands do not need a session")),
    }
}

/// Resolve settings and log in.
async fn open(credentials: Option<PathBuf>) -> Result<StoryGraph> {
    let config = load_config()?;
    let mut session_config = SessionConfig::from_app(&config)?;
    if let Some(path) = credentials {
        session_config.credentials_path = path;
    }

    info!(
        base_url = %session_config.base_url,
        credentials = %session_config.credentials_path.display(),
        "opening session"
    );

    let spinner = Spinner::new("Logging in")?;
    let sg = StoryGraph::open(&session_config).await;
    spinner.finish();
    Ok(sg?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn print_books(pager: Pager<Book>, label: &str) -> Result<()> {
    let books = drain(pager, label).await?;
    if books.is_empty() {
        println!("No books.");
    }
    for book in &books {
        let path = book.path().unwrap_or_default();
        println!("  {book}  ({path})");
    }
    Ok(())
}

async fn cmd_journal(sg: &StoryGraph) -> Result<()> {
    let entries = drain(sg.journal(), "journal").await?;
    for entry in &entries {
        println!("{}", journal_line(entry));
    }
    Ok(())
}

/// One journal row; an unreadable date shows as `?`.
fn journal_line(entry: &Entry) -> String {
    let when = match entry.when() {
        Ok(when) => describe(when.as_ref()),
        Err(e) => {
            warn!(error = %e, "journal entry without a readable date");
            "?".to_string()
        }
    };
    format!("  {when:<18} {entry}")
}

async fn cmd_book(sg: &StoryGraph, path: &str) -> Result<()> {
    let book = sg.book(path).await?;
    let info = book.info()?;

    println!();
    println!("  Title:   {}", info.title);
    if let Some(author) = &info.author {
        println!("  Author:  {author}");
    }
    if let Some(series) = &info.series {
        let number = info.series_number.as_deref().unwrap_or("?");
        println!("  Series:  {series} #{number}");
    }
    if let Some(pages) = book.pages() {
        println!("  Pages:   {pages}");
    }
    println!("  Status:  {}", book.status()?);
    println!("  Owned:   {}", if book.owned()? { "yes" } else { "no" });

    for line in metadata_lines(book.metadata().await)? {
        println!("  {line}");
    }
    println!();
    Ok(())
}

/// Edition metadata rows; a book without any prints a placeholder.
fn metadata_lines(metadata: storygraph_shared::Result<EditionInfo>) -> Result<Vec<String>> {
    match metadata {
        Ok(info) => Ok(info
            .fields
            .iter()
            .map(|(field, value)| format!("{field}: {}", value.as_deref().unwrap_or("-")))
            .collect()),
        Err(StoryGraphError::Parse { .. }) => Ok(vec!["(no edition metadata)".to_string()]),
        Err(e) => Err(e.into()),
    }
}

async fn cmd_status(sg: &StoryGraph, path: &str, status: Status) -> Result<()> {
    let mut book = sg.book(path).await?;
    book.set_status(status).await?;
    println!("{book}: {}", book.status()?);
    Ok(())
}

async fn cmd_progress(
    sg: &StoryGraph,
    path: &str,
    pages: Option<u32>,
    percent: Option<u32>,
) -> Result<()> {
    let book = sg.book(path).await?;
    match (pages, percent) {
        (Some(pages), _) => {
            book.set_pages_read(pages).await?;
            println!("{book}: {pages} pages read");
        }
        (None, Some(percent)) => {
            if percent > 100 {
                return Err(eyre!("percentage must be between 0 and 100, got {percent}"));
            }
            book.set_percent_read(percent).await?;
            println!("{book}: {percent}% read");
        }
        (None, None) => return Err(eyre!("give either --pages or --percent")),
    }
    Ok(())
}

async fn cmd_own(sg: &StoryGraph, path: &str, owned: bool) -> Result<()> {
    let mut book = sg.book(path).await?;
    book.set_owned(owned).await?;
    let state = if book.owned()? { "owned" } else { "not owned" };
    println!("{book}: {state}");
    Ok(())
}

async fn cmd_import(sg: &StoryGraph, isbn: &str) -> Result<()> {
    let book = sg.import_book(isbn).await?;
    println!("Imported {book} ({})", book.path()?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress spinner
// ---------------------------------------------------------------------------

/// Drain a pager behind a spinner.
async fn drain<T: FromFragment>(mut pager: Pager<T>, label: &str) -> Result<Vec<T>> {
    let spinner = Spinner::new(&format!("Fetching {label}"))?;
    let mut items = Vec::new();
    loop {
        match pager.next_item().await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => break,
            Err(e) => {
                spinner.finish();
                return Err(e.into());
            }
        }
        spinner.update(label, pager.pages_fetched(), items.len());
    }
    spinner.finish();
    info!(label, pages = pager.pages_fetched(), items = items.len(), "listing fetched");
    Ok(items)
}

/// CLI progress reporter using an indicatif spinner.
struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    fn new(message: &str) -> Result<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        Ok(Self { bar })
    }

    fn update(&self, label: &str, pages: usize, items: usize) {
        self.bar
            .set_message(format!("Fetching {label} [page {pages}, {items} items]"));
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
