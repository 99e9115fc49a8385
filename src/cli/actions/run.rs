use crate::{
    cli::actions::Action,
    collectors::{Connectors, build_endpoints},
    config::ExporterConfig,
    exporter::new,
};
use anyhow::{Context, Result};
use tracing::info;

/// Handle the run action
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, an endpoint cannot
/// be built or the listener cannot be bound.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Run {
            port,
            listen,
            database_config,
            metrics_config,
            settings,
        } => {
            let config = ExporterConfig::load(&database_config, &metrics_config)
                .context("Failed to load configuration")?;

            info!(
                groups = config.groups.len(),
                endpoints = config.endpoints.len(),
                "configuration loaded"
            );

            let endpoints = build_endpoints(&config, &settings, Connectors::default())?;

            new(port, listen, endpoints).await?;
        }
    }

    Ok(())
}
