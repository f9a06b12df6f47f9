//! Application registry
//!
//! The registry is loaded once at startup and never mutated; every component
//! receives it behind an `Arc`.

pub mod application;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::DeployerError;
use crate::filesys::file::File;
use crate::utils::redact_url;

pub use application::{validate_name, ApplicationConfig, ApplicationSpec, ArtifactKind};

/// Contents of `applications.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

/// Non-sensitive view of an application for the configuration endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationSummary {
    pub name: String,
    pub repo_url: String,
    pub branch: String,
    pub workspace_path: PathBuf,
    pub build_command: Vec<String>,
    pub artifact_path: PathBuf,
    pub artifact_kind: ArtifactKind,
    pub deploy_path: PathBuf,
    pub service_name: String,
    pub symlink: Option<PathBuf>,
}

impl From<&ApplicationSpec> for ApplicationSummary {
    fn from(spec: &ApplicationSpec) -> Self {
        Self {
            name: spec.name.clone(),
            repo_url: redact_url(&spec.repo_url),
            branch: spec.branch.clone(),
            workspace_path: spec.workspace_path.clone(),
            build_command: spec.build_command.clone(),
            artifact_path: spec.artifact_path.clone(),
            artifact_kind: spec.artifact_kind,
            deploy_path: spec.deploy_path.clone(),
            service_name: spec.service_name.clone(),
            symlink: spec.symlink.clone(),
        }
    }
}

/// Immutable application registry
#[derive(Debug, Clone, Default)]
pub struct Registry {
    apps: HashMap<String, ApplicationSpec>,
}

impl Registry {
    /// Build a registry from already validated specs
    pub fn new(specs: Vec<ApplicationSpec>) -> Result<Self, DeployerError> {
        let mut apps = HashMap::with_capacity(specs.len());
        for spec in specs {
            if apps.contains_key(&spec.name) {
                return Err(DeployerError::ConfigError(format!(
                    "duplicate application '{}'",
                    spec.name
                )));
            }
            apps.insert(spec.name.clone(), spec);
        }
        Ok(Self { apps })
    }

    /// Validate a parsed config file
    pub fn from_config(
        config: RegistryConfig,
        workspaces_dir: &Path,
    ) -> Result<Self, DeployerError> {
        let specs = config
            .applications
            .into_iter()
            .map(|app| ApplicationSpec::from_config(app, workspaces_dir))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(specs)
    }

    /// Load and validate `applications.json`
    pub async fn load(file: &File, workspaces_dir: &Path) -> Result<Self, DeployerError> {
        if !file.exists().await {
            return Err(DeployerError::ConfigError(format!(
                "registry file {} does not exist",
                file.path().display()
            )));
        }
        let config: RegistryConfig = file.read_json().await?;
        let registry = Self::from_config(config, workspaces_dir)?;
        info!(
            "Loaded {} application(s) from {}",
            registry.len(),
            file.path().display()
        );
        Ok(registry)
    }

    /// Resolve a caller-supplied name
    pub fn get(&self, name: &str) -> Result<&ApplicationSpec, DeployerError> {
        validate_name(name)?;
        self.apps
            .get(name)
            .ok_or_else(|| DeployerError::NotFound(name.to_string()))
    }

    /// Non-sensitive view of every application, sorted by name
    pub fn summaries(&self) -> Vec<ApplicationSummary> {
        let mut summaries: Vec<ApplicationSummary> =
            self.apps.values().map(ApplicationSummary::from).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}
