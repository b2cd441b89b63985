//! Configuration loading for the shell.
//!
//! Layers, lowest precedence first: built-in defaults, user config, project
//! `.isaac/config.toml`, `ISAAC_*` environment variables, command-line flags.

use crate::error::ConfigError;
use directories::ProjectDirs;
use isaac_common::config::{ConfigSource, EnvParser, IsaacConfig, LayeredConfig};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project-local config, relative to the working directory.
pub const PROJECT_CONFIG: &str = ".isaac/config.toml";

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub shell: Option<String>,
    pub session_log: Option<PathBuf>,
    /// Extra config file applied after the project config.
    pub config_file: Option<PathBuf>,
}

pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "isaac", "isaac").map(|dirs| dirs.config_dir().to_path_buf())
}

pub fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Read and parse one TOML file, if it exists.
fn read_layer(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    debug!(path = %path.display(), "Loading config file");
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    match toml::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(ConfigError::from_toml_error(path, content, e)),
    }
}

/// Load every layer from the real filesystem and process environment.
pub fn load_config(cli: &CliOverrides) -> Result<LayeredConfig, ConfigError> {
    load_from(
        user_config_path().as_deref(),
        Path::new(PROJECT_CONFIG),
        &mut EnvParser::new(),
        cli,
    )
}

/// Load layers from explicit locations.
pub fn load_from(
    user_path: Option<&Path>,
    project_path: &Path,
    env: &mut EnvParser,
    cli: &CliOverrides,
) -> Result<LayeredConfig, ConfigError> {
    let mut layers = Vec::new();
    if let Some(path) = user_path
        && let Some(value) = read_layer(path)?
    {
        layers.push((ConfigSource::UserConfig, path.display().to_string(), value));
    }
    if let Some(value) = read_layer(project_path)? {
        layers.push((
            ConfigSource::ProjectConfig,
            project_path.display().to_string(),
            value,
        ));
    }
    if let Some(path) = cli.config_file.as_deref() {
        match read_layer(path)? {
            Some(value) => layers.push((ConfigSource::CommandLine, path.display().to_string(), value)),
            None => {
                return Err(ConfigError::ReadFailed {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
                });
            }
        }
    }

    let mut layered = IsaacConfig::from_layers(layers)?;
    layered.config.apply_env(env, &mut layered.sources);
    if env.has_errors() {
        return Err(ConfigError::from_env_errors(env.errors()));
    }

    if let Some(shell) = &cli.shell {
        layered.config.general.shell = shell.clone();
        layered.sources.set("general.shell", ConfigSource::CommandLine);
    }
    if let Some(path) = &cli.session_log {
        layered.config.general.session_log = Some(path.clone());
        layered
            .sources
            .set("general.session_log", ConfigSource::CommandLine);
    }
    Ok(layered)
}
