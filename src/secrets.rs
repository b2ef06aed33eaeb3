use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::config::{SecretBackend, SecretsConfig};

/// A parameter store that hands out decrypted values by name.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_parameter(&self, name: &str) -> Result<String>;
}

/// Reads each parameter from the environment variable of the same name.
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_parameter(&self, name: &str) -> Result<String> {
        let value = std::env::var(name)
            .with_context(|| format!("Secret parameter {} is not set", name))?;
        non_blank(name, value)
    }
}

/// Reads each parameter from a file under a mounted secrets directory
/// (e.g. Docker or Kubernetes secrets).
pub struct FileSecretStore {
    directory: PathBuf,
}

impl FileSecretStore {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        // SSM-style names ("/spicy/line/token") live below the directory.
        self.directory.join(name.trim_start_matches('/'))
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get_parameter(&self, name: &str) -> Result<String> {
        let path = self.path_for(name);
        debug!("Reading secret parameter from {}", path.display());
        let value = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read secret file: {}", path.display()))?;
        non_blank(name, value.trim().to_string())
    }
}

fn non_blank(name: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        anyhow::bail!("Secret parameter {} is empty", name);
    }
    Ok(value)
}

pub fn from_config(config: &SecretsConfig) -> Arc<dyn SecretStore> {
    match config.backend {
        SecretBackend::Env => Arc::new(EnvSecretStore),
        SecretBackend::File => Arc::new(FileSecretStore::new(config.directory.clone())),
    }
}
