//! Node Configuration - builder plus environment overrides

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_APP: &str = "notemind";
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Memory,
    File,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::File => "file",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Some(Backend::Memory),
            "file" | "fs" | "disk" => Some(Backend::File),
            _ => None,
        }
    }
}

/// Node configuration. Higher layers construct this.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub app: String,
    pub backend: Backend,
    /// `None` resolves to `<local data dir>/<app>/notes`.
    pub data_dir: Option<PathBuf>,
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Seed `root` when the store has none.
    pub bootstrap: bool,
    pub port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            app: DEFAULT_APP.into(),
            backend: Backend::Memory,
            data_dir: None,
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            bootstrap: true,
            port: DEFAULT_PORT,
        }
    }
}

impl NodeConfig {
    pub fn new(app: impl Into<String>) -> Self { Self { app: app.into(), ..Default::default() } }
    pub fn with_backend(mut self, backend: Backend) -> Self { self.backend = backend; self }
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self { self.data_dir = Some(dir.into()); self }
    pub fn with_file_store(self, dir: impl Into<PathBuf>) -> Self { self.with_backend(Backend::File).with_data_dir(dir) }
    pub fn with_concurrency(mut self, k: usize) -> Self { self.concurrency = k.max(1); self }
    pub fn with_max_retries(mut self, n: u32) -> Self { self.max_retries = n.max(1); self }
    pub fn with_base_delay(mut self, d: Duration) -> Self { self.base_delay = d; self }
    pub fn with_bootstrap(mut self, on: bool) -> Self { self.bootstrap = on; self }
    pub fn with_port(mut self, port: u16) -> Self { self.port = port; self }

    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join(&self.app).join("notes")
        })
    }

    /// Defaults overridden by `NOTEMIND_*` variables (after loading `.env`).
    pub fn from_env() -> Self {
        load_dotenv(".env");
        let mut config = Self::default();
        if let Some(app) = var("NOTEMIND_APP") {
            config.app = app;
        }
        if let Some(raw) = var("NOTEMIND_BACKEND") {
            match Backend::from_str(&raw) {
                Some(backend) => config.backend = backend,
                None => tracing::warn!("NOTEMIND_BACKEND='{}' not recognised, using {}", raw, config.backend.as_str()),
            }
        }
        if let Some(dir) = var("NOTEMIND_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }
        config.concurrency = parsed("NOTEMIND_CONCURRENCY", DEFAULT_CONCURRENCY).max(1);
        config.max_retries = parsed("NOTEMIND_MAX_RETRIES", DEFAULT_MAX_RETRIES).max(1);
        config.base_delay = Duration::from_millis(parsed("NOTEMIND_BASE_DELAY_MS", DEFAULT_BASE_DELAY_MS));
        config.port = parsed("NOTEMIND_PORT", DEFAULT_PORT);
        config
    }
}

fn var(key: &str) -> Option<String> { env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) }

fn parsed<T: std::str::FromStr + std::fmt::Display + Copy>(key: &str, default: T) -> T {
    match var(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("{}='{}' is invalid, using {}", key, raw, default);
            default
        }),
    }
}

/// `KEY=value` lines from `path`; variables already set win.
pub fn load_dotenv(path: &str) {
    let Ok(contents) = std::fs::read_to_string(path) else { return };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            if !value.is_empty() && env::var(key.trim()).is_err() {
                env::set_var(key.trim(), value);
            }
        }
    }
}
