use anyhow::Context;
use camwatch::config::AppConfig;
use std::path::PathBuf;

const CONFIG_ENV: &str = "CAMWATCH_CONFIG";
const DEFAULT_CONFIG: &str = "config.json";

fn config_path() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config_path();
    let config = AppConfig::load(&path).with_context(|| format!("failed to load config {:?}", path))?;
    camwatch::init_tracing(&config.logging.filter);
    if !path.exists() {
        tracing::warn!("No config at {:?}, running with defaults", path);
    }
    camwatch::run(config).await
}
