use clap::Parser;
use std::sync::Arc;
use supalab::cli::Cli;
use supalab::commands::session;
use supalab::context::AppContext;
use supalab::repl::{self, LineEditor};
use supalab::startup::load_config;
use supalab::state::SessionState;
use supalab::utils::tracing_layer::UiLayer;
use supalab::utils::ui::Ui;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let ui = Arc::new(Ui::new());

    let filter = if cli.debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::registry()
        .with(UiLayer::new(ui.clone()))
        .with(filter)
        .init();

    let config = load_config(&cli, &ui);
    let app_context = AppContext::new(ui, SessionState::new(config, cli.verbose));
    info!("Starting supalab {}", env!("CARGO_PKG_VERSION"));

    session::show_info(&app_context);
    if let Err(e) = session::connect(&app_context).await {
        app_context.handle_error("connect()", &e, false);
    }

    let editor = LineEditor::spawn(&app_context, cli.history.clone())?;
    repl::run(&app_context, &editor).await;
    Ok(())
}
