#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    /// Base URL of the external inference service backing the remote
    /// stage processors. `None` disables those stages.
    pub inference_url: Option<String>,
    pub inference_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub stage_timeout_secs: u64,
    pub fast_workers: usize,
    pub slow_workers: usize,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("inference_url", &self.inference_url)
            .field("inference_timeout_secs", &self.inference_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("stage_timeout_secs", &self.stage_timeout_secs)
            .field("fast_workers", &self.fast_workers)
            .field("slow_workers", &self.slow_workers)
            .finish()
    }
}
