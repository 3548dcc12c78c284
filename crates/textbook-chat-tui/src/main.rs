use anyhow::Result;
use clap::Parser;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use textbook_chat_core::{
    ChatSession, Config, FileStore, MemoryStore, ModeSelector, PointerEvents, QueryDispatcher,
    RagClient, SessionStore,
};

mod app;
mod handler;
mod tui;
mod ui;

use app::{App, Page};
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "ask-textbook")]
#[command(about = "Read the Physical AI textbook in the terminal and ask an AI assistant about it")]
struct Cli {
    /// Markdown page to read (defaults to the ROS 2 introduction)
    page: Option<PathBuf>,
    /// RAG backend base URL (overrides API_URL and the config file)
    #[arg(long)]
    api_url: Option<String>,
    /// Where session state is kept between runs
    #[arg(long)]
    session_dir: Option<PathBuf>,
    /// Keep the conversation, persona and panel state in the session directory
    /// and pick up where the last `--resume` run left off
    #[arg(long)]
    resume: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_dir = match cli.session_dir {
        Some(dir) => dir,
        None => FileStore::default_dir()?,
    };
    init_logging(&session_dir)?;
    tracing::info!("Starting ask-textbook v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not read config, using defaults");
        Config::new()
    });
    let api_url = config.resolve_api_url(cli.api_url.as_deref());
    tracing::info!(api_url = %api_url, session_dir = %session_dir.display(), "configuration loaded");

    let store = open_store(&session_dir, cli.resume);

    let page = match cli.page {
        Some(path) => Page::load(&path)?,
        None => Page::builtin(),
    };

    let client = RagClient::new(&api_url);
    let events = PointerEvents::new();
    let session = Arc::new(ChatSession::new(
        store,
        QueryDispatcher::new(Arc::new(client.clone())),
        ModeSelector::attach(&events),
    ));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut event_handler = EventHandler::new();

    let mut app = App::new(page, session, events, event_handler.sender(), api_url);
    app.check_health(client);

    let result = run(&mut terminal, &mut app, &mut event_handler).await;

    app.shutdown().await;
    drop(app);
    tui::restore()?;
    tracing::info!("ask-textbook exited");
    result
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    terminal.draw(|frame| ui::render(app, frame))?;

    while !app.should_quit {
        let Some(event) = events.next().await else {
            break;
        };
        handler::handle_event(app, event)?;
        terminal.draw(|frame| ui::render(app, frame))?;
    }

    Ok(())
}

/// Without `--resume` the session ends with the process: its directory is
/// removed when the last handle to the store drops.
fn open_store(session_dir: &Path, resume: bool) -> Arc<dyn SessionStore> {
    let store = if resume {
        FileStore::open(session_dir)
    } else {
        FileStore::ephemeral(session_dir)
    };
    match store {
        Ok(store) => {
            tracing::info!(dir = %store.dir().display(), resume, "session store opened");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "session directory unavailable, keeping this session in memory"
            );
            Arc::new(MemoryStore::new())
        }
    }
}

/// Log to a file next to the session directory; stderr belongs to the UI.
fn init_logging(session_dir: &Path) -> Result<()> {
    let log_path = session_dir.with_file_name("ask-textbook.log");
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}
