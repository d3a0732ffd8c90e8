use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use glimmerd::config::LoggingConfig;
use glimmerd::integrations::hass::HassClient;
use glimmerd::integrations::hermes::HermesIntegration;
use glimmerd::integrations::hermes::RumqttcClient;
use glimmerd::integrations::hermes::Topics;
use glimmerd::Config;
use glimmerd::Dispatcher;
use glimmerd::DispatcherSettings;
use glimmerd::Registry;
use tracing::error;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// glimmerd - light notifications for a voice assistant
#[derive(Parser, Debug)]
#[command(name = "glimmerd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "glimmerd.toml")]
    config: PathBuf,

    /// Designated flash light, overriding the configuration
    #[arg(long, value_name = "ENTITY")]
    flash_light: Option<String>,

    /// Validate the configuration, print a summary and exit
    #[arg(long)]
    check: bool,
}

fn init_tracing(logging: &LoggingConfig) {
    let mut targets = Targets::new().with_default(LevelFilter::from(logging.level));
    for (target, level) in &logging.overrides {
        targets = targets.with_target(target.clone(), LevelFilter::from(*level));
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(targets)
        .init();
}

fn print_summary(config: &Config) {
    println!("Configuration OK");
    println!("  MQTT broker: {}:{}", config.mqtt.broker, config.mqtt.port);
    println!("  Home Assistant: {}", config.hass.url);
    for (name, room) in &config.rooms {
        println!(
            "  Room {}: {} light(s), flash light {}",
            name,
            room.lights.len(),
            room.flash_light.as_deref().unwrap_or("none")
        );
    }
    let mut sites: Vec<_> = config.sites.iter().collect();
    sites.sort();
    for (site, room) in sites {
        println!("  Site {} -> {}", site, room);
    }
    match &config.api {
        Some(api) => println!("  API: {}:{}", api.listen, api.port),
        None => println!("  API: disabled"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(light) = &args.flash_light {
        config.apply_flash_override(light)?;
        config.validate()?;
    }

    if args.check {
        print_summary(&config);
        return Ok(());
    }

    init_tracing(&config.logging);

    info!("glimmerd starting");
    info!("Loaded config from: {}", args.config.display());

    let registry = Arc::new(Registry::from_config(&config));
    let hass = HassClient::new(&config.hass)?;
    let mut dispatcher = Dispatcher::new(
        registry.clone(),
        Arc::new(hass),
        DispatcherSettings::from_config(&config),
    );

    let hermes = HermesIntegration::new(
        RumqttcClient::new(&config.mqtt),
        &config.mqtt,
        Topics::new(&config.hermes),
    );
    dispatcher.register_integration(Box::new(hermes));

    #[cfg(feature = "api")]
    let api = config.api.clone().map(|api| {
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(glimmerd::api::serve(
            api.listen,
            api.port,
            registry.clone(),
            dispatcher.event_sender(),
            shutdown_rx,
        ));
        (shutdown_tx, handle)
    });

    info!("Press Ctrl+C to exit");
    tokio::select! {
        _ = dispatcher.run() => {}
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        },
    }

    #[cfg(feature = "api")]
    if let Some((shutdown_tx, handle)) = api {
        let _ = shutdown_tx.send(());
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("HTTP API server failed: {:#}", e),
            Err(e) => error!("HTTP API task panicked: {}", e),
        }
    }

    dispatcher.shutdown().await;
    info!("glimmerd shutdown complete");

    Ok(())
}
