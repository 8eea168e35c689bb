//! Configuration loaded from the environment (spec §5, §6). Every name here
//! is one spec §6 lists verbatim; the extra deadline/timeout knobs are the
//! ambient operational surface a real HTTP service needs around them.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Central,
    Local,
}

impl StorageMode {
    fn from_env() -> Self {
        match std::env::var("MEMORY_STORAGE_MODE").as_deref() {
            Ok("local") => StorageMode::Local,
            _ => StorageMode::Central,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub storage_mode: StorageMode,
    /// Root for the `global` project; always central regardless of
    /// `storage_mode` (spec §6 "global always stays central").
    pub central_path: PathBuf,
    /// Root for non-global projects: equal to `central_path` in `Central`
    /// mode, `./.memory` under the current working directory in `Local`
    /// mode.
    pub project_path: PathBuf,
    pub api_url: Option<String>,
    pub manager_enabled: bool,
    pub personal_enabled: bool,
    pub anthropic_api_key: Option<String>,
    pub context_deadline: Duration,
    pub process_deadline: Duration,
    pub checkpoint_deadline: Duration,
    pub curator_timeout: Duration,
    pub shutdown_grace: Duration,
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key).as_deref() {
        Ok("1") | Ok("true") => true,
        Ok("0") | Ok("false") => false,
        _ => default,
    }
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

impl Config {
    pub fn from_env() -> Self {
        let storage_mode = StorageMode::from_env();

        let central_path = std::env::var("MEMORY_CENTRAL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_central_path);

        let project_path = match storage_mode {
            StorageMode::Central => central_path.clone(),
            StorageMode::Local => std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".memory"),
        };

        let port = std::env::var("MEMORY_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8765);
        let host = std::env::var("MEMORY_HOST").unwrap_or_else(|_| "localhost".to_string());

        Self {
            bind_addr: format!("{host}:{port}"),
            storage_mode,
            central_path,
            project_path,
            api_url: std::env::var("MEMORY_API_URL").ok(),
            manager_enabled: env_flag("MEMORY_MANAGER_ENABLED", true),
            personal_enabled: env_flag("MEMORY_PERSONAL_ENABLED", true),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            context_deadline: env_duration_secs("MEMORY_CONTEXT_DEADLINE_SECS", 10),
            process_deadline: env_duration_secs("MEMORY_PROCESS_DEADLINE_SECS", 10),
            checkpoint_deadline: env_duration_secs("MEMORY_CHECKPOINT_DEADLINE_SECS", 120),
            curator_timeout: env_duration_secs("MEMORY_CURATOR_TIMEOUT_SECS", 120),
            shutdown_grace: env_duration_secs("MEMORY_SHUTDOWN_GRACE_SECS", 30),
        }
    }
}

/// `$XDG_DATA_HOME/memory`, falling back to `~/.local/share/memory` (spec
/// §6). Deliberately not `directories::ProjectDirs` here — that would
/// qualify the path per-OS (e.g. `Library/Application Support` on macOS),
/// while spec §6 pins the Linux/XDG layout as the default on every platform.
fn default_central_path() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("memory");
        }
    }
    if let Some(base) = directories::BaseDirs::new() {
        return base.home_dir().join(".local").join("share").join("memory");
    }
    PathBuf::from("./memory-data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_central_path_falls_back_to_xdg_default_shape() {
        let path = default_central_path();
        assert!(path.ends_with("memory"));
    }
}
