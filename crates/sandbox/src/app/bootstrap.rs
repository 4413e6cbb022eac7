use std::path::PathBuf;

use rewind::{RewindConfig, RewindConfigError};
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::entities::EXT_AGE;
use super::loop_runner::SessionConfig;

const CONFIG_ENV_VAR: &str = "SANDBOX_CONFIG";

pub(crate) struct AppWiring {
    pub(crate) rewind: RewindConfig,
    pub(crate) session: SessionConfig,
}

pub(crate) fn build_app() -> Result<AppWiring, RewindConfigError> {
    init_tracing();
    info!("=== Rewind Sandbox Startup ===");

    let rewind = match config_path_from_env() {
        Some(path) => {
            info!(path = %path.display(), "rewind_config_loading");
            RewindConfig::load_from_path(&path)?
        }
        None => default_rewind_config(),
    };

    Ok(AppWiring {
        rewind,
        session: SessionConfig::default(),
    })
}

fn default_rewind_config() -> RewindConfig {
    RewindConfig {
        continuous_extension_keys: vec![EXT_AGE.to_string()],
        ..RewindConfig::default()
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV_VAR)
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
