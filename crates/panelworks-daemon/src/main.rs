use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use panelworks_core::types::{ActorId, ChannelId};
use tokio::io::BufReader;
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

use panelworks_daemon::config::EngineConfig;
use panelworks_daemon::console::{self, ConsoleTransport, OutputFormat};
use panelworks_daemon::demo::CounterPanel;
use panelworks_daemon::engine::{EngineNotification, PanelEngine};
use panelworks_daemon::handle::EngineHandle;

/// Actor name the console transport reacts as.
const BOT_ACTOR: &str = "panelworks";

#[derive(Parser)]
#[command(name = "panelworks", about = "Reaction-driven message panels")]
struct Cli {
    /// Engine config file (TOML)
    #[arg(long, global = true, env = "PANELWORKS_CONFIG")]
    config: Option<PathBuf>,

    /// Minimum time between edits of one panel, overrides the config file
    #[arg(long, global = true)]
    min_render_interval_ms: Option<u64>,

    /// Scheduler tick, overrides the config file
    #[arg(long, global = true)]
    tick_interval_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run counter panels on the console (default when no subcommand given)
    Demo(DemoArgs),
    /// Print the effective engine configuration
    Config,
}

#[derive(Parser)]
struct DemoArgs {
    /// Channel the panels are posted to
    #[arg(long, default_value = "general")]
    channel: String,

    /// Panel title
    #[arg(long, default_value = "Counter")]
    title: String,

    /// Number of panels to post
    #[arg(long, default_value_t = 1)]
    panels: usize,

    /// Refresh the panel clock every N seconds
    #[arg(long)]
    refresh_secs: Option<u64>,

    /// Close a panel once its count reaches this value
    #[arg(long)]
    goal: Option<i64>,

    /// Actors whose reactions are ignored (repeatable)
    #[arg(long)]
    block: Vec<String>,

    /// Actor used for input lines that do not name one
    #[arg(long, default_value = "console-user")]
    actor: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // PANELWORKS_LOG wins over RUST_LOG; logs go to stderr so stdout stays
    // the console transport's.
    let filter = EnvFilter::try_from_env("PANELWORKS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    }
    .with_overrides(cli.min_render_interval_ms, cli.tick_interval_ms)?;

    match cli.command {
        Some(Commands::Config) => {
            print!("{}", config.to_toml()?);
        }
        Some(Commands::Demo(args)) => run_demo(config, args).await?,
        None => run_demo(config, DemoArgs::parse_from(["demo"])).await?,
    }

    Ok(())
}

async fn run_demo(config: EngineConfig, args: DemoArgs) -> anyhow::Result<()> {
    tracing::info!(
        channel = %args.channel,
        panels = args.panels,
        min_render_interval_ms = config.min_render_interval_ms,
        "starting panelworks demo"
    );

    let (events_tx, events_rx) = mpsc::channel(config.event_buffer);
    let transport = Arc::new(ConsoleTransport::new(
        tokio::io::stdout(),
        args.format,
        ActorId::from(BOT_ACTOR),
    ));
    let (mut engine, handle) = PanelEngine::new(transport.clone(), config, events_rx);

    let engine_task = tokio::spawn(async move { engine.run().await });
    tokio::spawn(log_notifications(handle.subscribe()));

    post_panels(&handle, &args).await?;

    let pump = tokio::spawn(console::pump_events(
        BufReader::new(tokio::io::stdin()),
        events_tx,
        ActorId::from(args.actor),
        transport,
    ));

    tokio::select! {
        result = pump => {
            match result {
                Ok(Ok(())) => tracing::info!("input closed, shutting down"),
                Ok(Err(e)) => tracing::warn!("console input error: {e}"),
                Err(e) => tracing::warn!("console input task failed: {e}"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    handle.shutdown();
    engine_task.await.context("engine task panicked")?;
    tracing::info!("panelworks demo stopped");
    Ok(())
}

async fn post_panels(handle: &EngineHandle, args: &DemoArgs) -> anyhow::Result<()> {
    for n in 1..=args.panels {
        let title = if args.panels > 1 {
            format!("{} #{n}", args.title)
        } else {
            args.title.clone()
        };
        let mut panel = CounterPanel::new(title);
        for actor in &args.block {
            panel = panel.block(actor.as_str());
        }
        if let Some(secs) = args.refresh_secs {
            panel = panel.refresh_every(Duration::from_secs(secs));
        }
        if let Some(goal) = args.goal {
            panel = panel.close_at(goal);
        }

        let id = handle
            .add(ChannelId::from(args.channel.as_str()), panel)
            .await
            .context("posting demo panel")?;
        tracing::info!(panel = %id, "demo panel posted");
    }
    Ok(())
}

async fn log_notifications(mut rx: broadcast::Receiver<EngineNotification>) {
    loop {
        match rx.recv().await {
            Ok(notification) => tracing::debug!(?notification, "engine notification"),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "notification log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
