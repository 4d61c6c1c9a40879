//! camwatch - per-camera motion and face surveillance.
//!
//! Each configured camera runs a capture loop that detects motion (and
//! optionally faces), writes event snapshots and short clips, records
//! continuously while motion lasts, and publishes frames for live view.

pub mod camera;
pub mod capture;
pub mod commands;
pub mod config;
pub mod detection;
pub mod recorder;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Context;
use camera::{CameraEvent, CameraRegistry};
use config::AppConfig;
use recorder::ArtifactLayout;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Run every configured camera until Ctrl-C
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting camwatch v{}", env!("CARGO_PKG_VERSION"));

    ArtifactLayout::from_config(&config.paths)
        .ensure_dirs()
        .context("failed to create artifact directories")?;
    std::fs::create_dir_all(&config.paths.masks_dir).context("failed to create masks directory")?;

    let registry = Arc::new(CameraRegistry::from_config(&config)?);
    let mut events = registry.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Event log fell behind, {} events skipped", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    for camera in &config.cameras {
        let Some(mode) = camera.mode else {
            continue;
        };
        let registry = Arc::clone(&registry);
        let id = camera.id;
        let started = tokio::task::spawn_blocking(move || registry.start(id, mode)).await?;
        if let Err(e) = started {
            tracing::error!("Camera {} failed to start: {}", id, e);
        }
    }
    tracing::info!("{} camera(s) configured, press Ctrl-C to stop", registry.camera_ids().len());

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");

    let stopping = Arc::clone(&registry);
    tokio::task::spawn_blocking(move || stopping.stop_all()).await?;
    Ok(())
}

fn log_event(event: &CameraEvent) {
    match event {
        CameraEvent::EventRecorded { .. } => {}
        CameraEvent::ClipClosed { camera_id } => {
            tracing::debug!("Camera {} event clip closed", camera_id)
        }
        CameraEvent::RecordingStarted { camera_id, name } => {
            tracing::info!("Camera {} recording {}", camera_id, name)
        }
        CameraEvent::RecordingStopped { camera_id, name } => {
            tracing::info!("Camera {} finished {}", camera_id, name)
        }
    }
}
