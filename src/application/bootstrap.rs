use crate::application::controller::ControllerSettings;
use crate::infrastructure::config::{ensure_default_config, load_config, InteractionConfig};
use crate::infrastructure::error::InteractionError;
use crate::infrastructure::logging::init_logging;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub log_dir: PathBuf,
    pub config: InteractionConfig,
    pub settings: ControllerSettings,
}

/// Prepares `config/` and `logs/` under `workspace_root` and loads the
/// interaction config. Pass `None` as `log_level` when the host installs its
/// own `log` backend.
pub fn bootstrap_workspace(
    workspace_root: &Path,
    log_level: Option<&str>,
) -> Result<BootstrapResult, InteractionError> {
    let config_dir = workspace_root.join("config");
    let log_dir = workspace_root.join("logs");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&log_dir)?;

    if let Some(level) = log_level {
        init_logging(level, &log_dir)?;
    }
    ensure_default_config(&config_dir)?;
    let config = load_config(&config_dir)?;
    let settings = ControllerSettings::from_config(&config)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        log_dir,
        config,
        settings,
    })
}
