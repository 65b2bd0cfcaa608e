pub mod config;
pub mod registry;
pub mod service;

use service::Service;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use switchd_core::BuildError;
use switchd_store::SettingsStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Args {
    serial: String,
    config: PathBuf,
    settings: PathBuf,
}

fn parse_args(args: &[String]) -> Result<Args, BuildError> {
    let mut serial: Option<String> = None;
    let mut config: Option<PathBuf> = None;
    let mut settings: Option<PathBuf> = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-s" | "--serial" => {
                serial = Some(
                    iter.next()
                        .ok_or_else(|| BuildError::message("--serial requires a value"))?
                        .clone(),
                );
            }
            "--config" => {
                config = Some(PathBuf::from(
                    iter.next()
                        .ok_or_else(|| BuildError::message("--config requires a value"))?,
                ));
            }
            "--settings" => {
                settings = Some(PathBuf::from(
                    iter.next()
                        .ok_or_else(|| BuildError::message("--settings requires a value"))?,
                ));
            }
            other => {
                warn!("ignoring unexpected argument {}", other);
            }
        }
    }

    let serial = serial.ok_or_else(|| BuildError::message("a serial (-s) is required"))?;
    let config = config.unwrap_or_else(|| PathBuf::from(format!("/run/io-ext/{}/pins.conf", serial)));
    let settings =
        settings.unwrap_or_else(|| PathBuf::from(format!("/var/lib/switchd/{}.json", serial)));
    Ok(Args {
        serial,
        config,
        settings,
    })
}

async fn run(args: Args) -> Result<(), BuildError> {
    let descriptors = config::parse_pins_conf(&args.config)?;
    info!(
        "configured {} channel(s) from {}",
        descriptors.len(),
        args.config.display()
    );

    let registry = registry::build(&descriptors)?;
    let store = Arc::new(Mutex::new(SettingsStore::open(&args.settings)?));

    let service = Service::new(&args.serial, registry.outputs, store);
    service.restore().await;
    debug!("device model: {}", service.snapshot_json());

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(sig) => sig,
            Err(err) => {
                error!("cannot install SIGTERM handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("got SIGINT, shutting down"),
            _ = sigterm.recv() => info!("got SIGTERM, shutting down"),
        }
        signal_cancel.cancel();
    });

    service.run(cancel).await;
    for task in registry.tasks {
        task.abort();
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchd=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args) {
        Ok(args) => {
            info!("switchd starting up for serial {}", args.serial);
            match run(args).await {
                Ok(()) => info!("switchd shut down"),
                Err(err) => error!("switchd exited with an error: {:?}", err),
            }
        }
        Err(err) => error!("cannot parse arguments: {:?}", err),
    }
}
