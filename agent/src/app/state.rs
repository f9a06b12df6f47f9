//! Application state management

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::app::options::AppOptions;
use crate::deploy::Deployer;
use crate::errors::DeployerError;
use crate::registry::Registry;

/// Main application state
pub struct AppState {
    /// Deployment engine shared by every request
    pub deployer: Arc<Deployer>,

    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Load the application registry and build the deployment engine
    pub async fn init(options: &AppOptions) -> Result<Self, DeployerError> {
        info!("Initializing application state...");

        options.layout.setup(&options.workspaces_dir).await?;

        let registry = Registry::load(
            &options.layout.applications_file(),
            &options.workspaces_dir,
        )
        .await?;

        let deployer = Deployer::with_system(Arc::new(registry), options.deployer.clone());

        Ok(Self {
            deployer: Arc::new(deployer),
            started_at: Utc::now(),
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), DeployerError> {
        info!(
            "Shutting down application state (up since {})...",
            self.started_at.to_rfc3339()
        );
        Ok(())
    }
}
