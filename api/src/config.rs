use anyhow::{anyhow, Context, Result};
use prbot_auth::DEFAULT_API_BASE;
use prbot_core::RepoTarget;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3210";
const DEFAULT_WORKER_CONCURRENCY: usize = 4;
const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Process configuration, read once at startup from the environment file.
#[derive(Clone)]
pub struct Config {
    pub org_id: String,
    pub app_id: u64,
    pub cert_path: PathBuf,
    pub webhook_secret: String,
    pub repo_name: String,
    pub github_api_base: String,
    pub listen_addr: SocketAddr,
    pub worker_concurrency: usize,
    pub queue_capacity: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("org_id", &self.org_id)
            .field("app_id", &self.app_id)
            .field("cert_path", &self.cert_path)
            .field("webhook_secret", &"<redacted>")
            .field("repo_name", &self.repo_name)
            .field("github_api_base", &self.github_api_base)
            .field("listen_addr", &self.listen_addr)
            .field("worker_concurrency", &self.worker_concurrency)
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

impl Config {
    /// Loads `path`; variables already set in the process environment win
    /// over the file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    pub fn load_with(path: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = dotenvy::from_path_iter(path)
            .with_context(|| format!("Error loading {} file", path.display()))?
            .collect::<Result<HashMap<String, String>, _>>()
            .with_context(|| format!("Error parsing {} file", path.display()))?;

        Self::from_lookup(|key| env(key).or_else(|| file.get(key).cloned()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| match lookup(key) {
            Some(value) => value,
            None => {
                tracing::warn!(key, "Configuration key is not set");
                String::new()
            }
        };

        // An unparsable APP_ID is not fatal here; the zero id only fails
        // later when GitHub rejects the app JWT. App ids are positive, so a
        // negative value is treated as unparsable.
        let app_id_raw = get("APP_ID");
        let app_id = match app_id_raw.trim().parse::<u64>() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(app_id = %app_id_raw, error = %e, "APP_ID is not an integer, using 0");
                0
            }
        };

        let listen_addr = lookup("LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .context("LISTEN_ADDR must be a socket address")?;

        Ok(Self {
            org_id: get("ORG_ID"),
            app_id,
            cert_path: PathBuf::from(get("CERT_PATH")),
            webhook_secret: get("WEBHOOK_SECRET"),
            repo_name: get("REPO_NAME"),
            github_api_base: lookup("GITHUB_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            listen_addr,
            worker_concurrency: positive(&lookup, "WORKER_CONCURRENCY", DEFAULT_WORKER_CONCURRENCY)?,
            queue_capacity: positive(&lookup, "QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
        })
    }

    pub fn repo_target(&self) -> RepoTarget {
        RepoTarget::new(&self.org_id, &self.repo_name)
    }
}

fn positive(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> Result<usize> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(anyhow!("{} must be a positive integer, got {:?}", key, raw)),
    }
}
