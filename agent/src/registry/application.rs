//! Application definitions

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::DeployerError;

const MAX_NAME_LEN: usize = 64;

/// Validate a caller-supplied application name against the allow-list
/// (ASCII alphanumerics, `-` and `_`).
pub fn validate_name(name: &str) -> Result<(), DeployerError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(DeployerError::InvalidName(format!(
            "'{}' must be 1-{} characters",
            name, MAX_NAME_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DeployerError::InvalidName(format!(
            "'{}' may only contain letters, digits, '-' and '_'",
            name
        )));
    }
    Ok(())
}

fn validate_service_name(service: &str) -> Result<(), DeployerError> {
    let valid = !service.is_empty()
        && !service.starts_with('-')
        && service
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if valid {
        Ok(())
    } else {
        Err(DeployerError::ConfigError(format!(
            "invalid service name '{}'",
            service
        )))
    }
}

/// Expected artifact format, checked by leading magic bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    #[default]
    Any,
    Jar,
    Zip,
    Elf,
}

impl ArtifactKind {
    pub fn magic(&self) -> Option<&'static [u8]> {
        match self {
            ArtifactKind::Any => None,
            ArtifactKind::Jar | ArtifactKind::Zip => Some(b"PK\x03\x04"),
            ArtifactKind::Elf => Some(b"\x7fELF"),
        }
    }
}

/// Build presets selectable with `build_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    Maven,
    Gradle,
    Cargo,
    Npm,
    Make,
}

impl BuildType {
    pub fn command(&self) -> Vec<String> {
        let argv: &[&str] = match self {
            BuildType::Maven => &["mvn", "clean", "package", "-DskipTests"],
            BuildType::Gradle => &["./gradlew", "build", "-x", "test"],
            BuildType::Cargo => &["cargo", "build", "--release"],
            BuildType::Npm => &["npm", "run", "build"],
            BuildType::Make => &["make", "build"],
        };
        argv.iter().map(|s| s.to_string()).collect()
    }
}

/// Build command as written in the config file: a whitespace separated
/// string or an argv array. Neither form is ever passed to a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildCommand {
    Line(String),
    Argv(Vec<String>),
}

impl BuildCommand {
    pub fn into_argv(self) -> Vec<String> {
        match self {
            BuildCommand::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            BuildCommand::Argv(argv) => argv,
        }
    }
}

/// Application entry as it appears in `applications.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    pub name: String,
    #[serde(alias = "git_url")]
    pub repo_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub workspace_path: Option<PathBuf>,
    #[serde(default)]
    pub build_command: Option<BuildCommand>,
    #[serde(default)]
    pub build_type: Option<BuildType>,
    pub artifact_path: PathBuf,
    #[serde(default)]
    pub artifact_kind: ArtifactKind,
    pub deploy_path: PathBuf,
    pub service_name: String,
    #[serde(default)]
    pub symlink: Option<PathBuf>,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Immutable, validated application definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationSpec {
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

impl ApplicationSpec {
    /// Validate a config entry, filling the workspace from `workspaces_dir`
    pub fn from_config(
        config: ApplicationConfig,
        workspaces_dir: &Path,
    ) -> Result<Self, DeployerError> {
        validate_name(&config.name)
            .map_err(|e| DeployerError::ConfigError(e.to_string()))?;
        let name = config.name;
        let invalid = |msg: String| DeployerError::ConfigError(format!("{}: {}", name, msg));

        if config.repo_url.trim().is_empty() {
            return Err(invalid("repo_url is empty".to_string()));
        }
        if config.branch.is_empty() || config.branch.starts_with('-') {
            return Err(invalid(format!("invalid branch '{}'", config.branch)));
        }

        let build_command = match (config.build_command, config.build_type) {
            (Some(cmd), _) => cmd.into_argv(),
            (None, Some(build_type)) => build_type.command(),
            (None, None) => Vec::new(),
        };
        if build_command.is_empty() {
            return Err(invalid(
                "either build_command or build_type is required".to_string(),
            ));
        }

        if config.artifact_path.is_absolute()
            || config
                .artifact_path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(invalid(
                "artifact_path must be relative to the workspace".to_string(),
            ));
        }
        if !config.deploy_path.is_absolute() || config.deploy_path.file_name().is_none() {
            return Err(invalid("deploy_path must be an absolute file path".to_string()));
        }
        if let Some(link) = &config.symlink {
            if !link.is_absolute() {
                return Err(invalid("symlink must be absolute".to_string()));
            }
        }
        validate_service_name(&config.service_name)
            .map_err(|e| invalid(e.to_string()))?;

        let workspace_path = config
            .workspace_path
            .unwrap_or_else(|| workspaces_dir.join(&name));

        Ok(Self {
            name,
            repo_url: config.repo_url,
            branch: config.branch,
            workspace_path,
            build_command,
            artifact_path: config.artifact_path,
            artifact_kind: config.artifact_kind,
            deploy_path: config.deploy_path,
            service_name: config.service_name,
            symlink: config.symlink,
        })
    }

    /// Artifact location inside the workspace (may still hold a glob)
    pub fn artifact_location(&self) -> PathBuf {
        self.workspace_path.join(&self.artifact_path)
    }
}
