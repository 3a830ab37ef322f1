use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gamechat_server::config::{DEFAULT_CONFIG_PATH, ServerConfig};
use gamechat_server::definitions::ChannelDefinitions;
use gamechat_server::engine::chat_engine::ChatEngine;
use gamechat_server::engine::registry::ChannelRegistry;
use gamechat_server::engine::scheduler::TokioScheduler;
use gamechat_server::hooks::HookGateway;

#[derive(Debug, Parser)]
#[command(name = "gamechat-server", version, about = "Game chat channel server")]
struct Cli {
    /// Server configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Channel definitions file (overrides the configuration).
    #[arg(long)]
    channels: Option<PathBuf>,

    /// Print the loaded static channels and exit.
    #[arg(long)]
    list: bool,

    /// With --list, print the channel listing as JSON.
    #[arg(long, requires = "list")]
    json: bool,

    /// Validate configuration, definitions and scripts, then exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(channels) = cli.channels {
        config.server.channels_file = channels;
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_filter)),
        )
        .init();

    let channels_file = config.server.channels_file.clone();
    let defs = ChannelDefinitions::load(&channels_file)
        .with_context(|| format!("loading channel definitions {}", channels_file.display()))?;

    let gateway = Arc::new(HookGateway::new(
        config.server.scripts_dir.clone(),
        config.script_limits(),
    ));
    let scheduler = Arc::new(TokioScheduler::new(tokio::runtime::Handle::current()));
    let registry = ChannelRegistry::new(gateway.clone(), scheduler, config.registry_settings());
    let mut engine = ChatEngine::new(registry, config.engine_settings());

    engine
        .load_definitions(&defs)
        .context("applying channel definitions")?;

    if cli.list && cli.json {
        let listing: Vec<_> = engine
            .registry()
            .static_channels()
            .map(|channel| channel.listing())
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if cli.list {
        for channel in engine.registry().static_channels() {
            println!(
                "{:>5}  {:<24} {:<8} {}",
                channel.id(),
                channel.name(),
                if channel.is_public() { "public" } else { "private" },
                channel.hooks_name()
            );
        }
        return Ok(());
    }

    if cli.check {
        for script in defs.scripts() {
            gateway
                .load_script(script)
                .with_context(|| format!("checking channel script {script}"))?;
        }
        info!(path = %channels_file.display(), "configuration ok");
        return Ok(());
    }

    info!(
        channels = engine.registry().static_channels().count(),
        scripts = %config.server.scripts_dir.display(),
        "gamechat server running"
    );

    run(&mut engine, &channels_file).await?;

    engine.shutdown();
    Ok(())
}

/// Wait for shutdown, reloading channel definitions on SIGHUP.
#[cfg(unix)]
async fn run(engine: &mut ChatEngine, channels_file: &std::path::Path) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for ctrl-c")?;
                info!("shutdown requested");
                return Ok(());
            }
            _ = hangup.recv() => {
                if let Err(e) = engine.reload_channels(channels_file) {
                    warn!(error = %e, "channel reload failed, keeping current channels");
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn run(_engine: &mut ChatEngine, _channels_file: &std::path::Path) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");
    Ok(())
}
