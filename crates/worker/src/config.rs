use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tapnow_comfyui::reconnect::ReconnectConfig;

/// Default ComfyUI HTTP endpoint.
pub const DEFAULT_COMFY_URL: &str = "http://127.0.0.1:8188";

/// Default directory holding one sub-directory per workflow template.
pub const DEFAULT_WORKFLOWS_DIR: &str = "./workflows";

/// Engine-side configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// ComfyUI HTTP base URL.
    pub comfy_url: String,
    /// ComfyUI WebSocket base URL.
    pub comfy_ws_url: String,
    /// Template root.
    pub workflows_dir: PathBuf,
    /// Wall-clock budget for one job, from submission to first output.
    pub job_timeout: Duration,
    /// How often the worker checks for outputs.
    pub poll_interval: Duration,
    /// Delay before the event listener reconnects.
    pub reconnect_interval: Duration,
}

/// Timing knobs of the worker loop.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub job_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl EngineConfig {
    /// Configuration for a ComfyUI instance at `comfy_url` with default
    /// timings. The WebSocket URL is derived from the HTTP one.
    pub fn new(comfy_url: impl Into<String>) -> Self {
        let comfy_url = comfy_url.into().trim_end_matches('/').to_string();
        let worker = WorkerConfig::default();
        Self {
            comfy_ws_url: derive_ws_url(&comfy_url),
            comfy_url,
            workflows_dir: PathBuf::from(DEFAULT_WORKFLOWS_DIR),
            job_timeout: worker.job_timeout,
            poll_interval: worker.poll_interval,
            reconnect_interval: ReconnectConfig::default().interval,
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                     |
    /// |---------------------------------|-----------------------------|
    /// | `COMFY_URL`                     | `http://127.0.0.1:8188`     |
    /// | `COMFY_WS_URL`                  | derived from `COMFY_URL`    |
    /// | `WORKFLOWS_DIR`                 | `./workflows`               |
    /// | `COMFY_JOB_TIMEOUT_SECS`        | `600`                       |
    /// | `COMFY_POLL_INTERVAL_MS`        | `500`                       |
    /// | `COMFY_RECONNECT_INTERVAL_SECS` | `5`                         |
    ///
    /// Panics on unparseable numbers so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let mut config =
            Self::new(std::env::var("COMFY_URL").unwrap_or_else(|_| DEFAULT_COMFY_URL.into()));

        if let Ok(ws_url) = std::env::var("COMFY_WS_URL") {
            let ws_url = ws_url.trim();
            if !ws_url.is_empty() {
                config.comfy_ws_url = ws_url.trim_end_matches('/').to_string();
            }
        }
        if let Ok(dir) = std::env::var("WORKFLOWS_DIR") {
            config.workflows_dir = PathBuf::from(dir);
        }

        config.job_timeout = Duration::from_secs(env_number("COMFY_JOB_TIMEOUT_SECS", 600));
        config.poll_interval = Duration::from_millis(env_number("COMFY_POLL_INTERVAL_MS", 500));
        config.reconnect_interval =
            Duration::from_secs(env_number("COMFY_RECONNECT_INTERVAL_SECS", 5));

        config
    }

    pub fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            job_timeout: self.job_timeout,
            poll_interval: self.poll_interval,
        }
    }

    pub fn reconnect(&self) -> ReconnectConfig {
        ReconnectConfig {
            interval: self.reconnect_interval,
        }
    }
}

/// `http://host` -> `ws://host`, `https://host` -> `wss://host`.
pub fn derive_ws_url(http_url: &str) -> String {
    let url = http_url.trim_end_matches('/');
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

fn env_number<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid non-negative integer")),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_follows_http_scheme() {
        assert_eq!(derive_ws_url("http://127.0.0.1:8188"), "ws://127.0.0.1:8188");
        assert_eq!(derive_ws_url("https://gpu.example.com/"), "wss://gpu.example.com");
        assert_eq!(derive_ws_url("ws://already:1"), "ws://already:1");
    }

    #[test]
    fn new_uses_default_timings() {
        let config = EngineConfig::new("http://localhost:8188/");
        assert_eq!(config.comfy_url, "http://localhost:8188");
        assert_eq!(config.comfy_ws_url, "ws://localhost:8188");
        assert_eq!(config.workflows_dir, PathBuf::from("./workflows"));
        assert_eq!(config.worker().job_timeout, Duration::from_secs(600));
        assert_eq!(config.worker().poll_interval, Duration::from_millis(500));
        assert_eq!(config.reconnect().interval, Duration::from_secs(5));
    }
}
