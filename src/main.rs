mod app;
mod cache;
mod config;
mod constants;
mod form;
mod gateway;
mod input;
mod model;
mod store;
mod theme;
mod ui;

use anyhow::Result;
use clap::Parser;
use ratatui::DefaultTerminal;
use ratatui::crossterm::event::{self, Event, KeyEventKind};
use std::time::Duration;
use tracing::info;

use app::App;
use config::Endpoints;
use gateway::Remote;
use store::{AuthStore, SessionStore};

// --- CLI ---

#[derive(Parser, Debug)]
#[command(author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Args {
  /// GraphQL API endpoint (overrides BB_API_URL)
  #[arg(long)]
  endpoint: Option<String>,

  /// Asset base URL (overrides BB_ASSET_URL)
  #[arg(long)]
  asset_endpoint: Option<String>,

  /// Log filter, e.g. 'bb=debug'
  #[arg(long, default_value = "bb=info")]
  log_filter: String,
}

/// Log to a file under the data dir; stdout belongs to the terminal UI.
fn init_tracing(filter: &str) -> Option<tracing_appender::non_blocking::WorkerGuard> {
  let dirs = directories::ProjectDirs::from("", "", "bb")?;
  let log_dir = dirs.data_dir().join("logs");
  std::fs::create_dir_all(&log_dir).ok()?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "bb.log"));
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
    .with_writer(writer)
    .with_ansi(false)
    .init();
  Some(guard)
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
  let args = Args::parse();
  let _guard = init_tracing(&args.log_filter);

  let default_hook = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    ratatui::restore();
    default_hook(info);
  }));

  let mut terminal = ratatui::init();
  let result = run(&mut terminal, args).await;
  ratatui::restore();
  result
}

async fn run(terminal: &mut DefaultTerminal, args: Args) -> Result<()> {
  let endpoints = Endpoints::resolve(args.endpoint, args.asset_endpoint);
  info!(api = %endpoints.api_url, assets = %endpoints.asset_url, "starting");

  let remote = Remote::new(endpoints.api_url, endpoints.asset_url);
  let mut app = App::new(remote, AuthStore::load(), SessionStore::load());
  if !app.is_locked() {
    app.bootstrap();
  }

  loop {
    app.check_pending().await?;
    app.expire_error();

    terminal.draw(|frame| ui::ui(frame, &mut app))?;

    if event::poll(Duration::from_millis(100))?
      && let Event::Key(key) = event::read()?
      && key.kind == KeyEventKind::Press
    {
      input::handle_key_event(&mut app, key)?;
    }

    if app.should_quit {
      break;
    }
  }

  app.save_session();
  Ok(())
}
