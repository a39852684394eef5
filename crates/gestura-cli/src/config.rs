//! Configuration file handling – reads/writes `~/.gestura/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use gestura_types::GesturaError;
use gestura_types::config::{LogRotation, RuntimeConfig};

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Read from an existing file.
    File(PathBuf),
    /// The default file was missing and has just been written with defaults.
    Bootstrapped(PathBuf),
}

impl ConfigOrigin {
    pub fn path(&self) -> &Path {
        match self {
            ConfigOrigin::File(p) | ConfigOrigin::Bootstrapped(p) => p,
        }
    }
}

/// Return the path to `~/.gestura/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".gestura").join("config.toml")
}

/// Defaults written on first run: logs roll daily next to the config file
/// (`~/.gestura/logs/gestura.YYYY-MM-DD.log`).
pub(crate) fn bootstrap_defaults(config_file: &Path) -> RuntimeConfig {
    let mut cfg = RuntimeConfig::default();
    let dir = config_file.parent().unwrap_or(Path::new("."));
    cfg.logging.path = Some(dir.join("logs").join("gestura.log"));
    cfg.logging.rotation = LogRotation::Daily;
    cfg
}

fn config_error(msg: String) -> GesturaError {
    GesturaError::Config(msg)
}

/// Load the effective configuration.
///
/// With `explicit = Some(path)` the file must exist.  Without it the default
/// path is used and bootstrapped with defaults when missing.  Environment
/// overrides are applied, then the result is validated.
///
/// # Errors
///
/// [`GesturaError::Config`] for a missing explicit file, unreadable or
/// malformed TOML, or a configuration that fails validation.
pub fn resolve(explicit: Option<&Path>) -> Result<(RuntimeConfig, ConfigOrigin), GesturaError> {
    let (mut cfg, origin) = match explicit {
        Some(path) => {
            let cfg = load_from(path)?
                .ok_or_else(|| config_error(format!("config file {} does not exist", path.display())))?;
            (cfg, ConfigOrigin::File(path.to_path_buf()))
        }
        None => {
            let path = config_path();
            match load_from(&path)? {
                Some(cfg) => (cfg, ConfigOrigin::File(path)),
                None => {
                    let cfg = bootstrap_defaults(&path);
                    save_to(&cfg, &path)?;
                    (cfg, ConfigOrigin::Bootstrapped(path))
                }
            }
        }
    };
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok((cfg, origin))
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<RuntimeConfig>, GesturaError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| config_error(format!("failed to read config at {}: {e}", path.display())))?;
    let cfg: RuntimeConfig = toml::from_str(&raw)
        .map_err(|e| config_error(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

fn env_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Whether the boolean environment variable `name` is set to a truthy value.
pub fn env_flag(name: &str) -> bool {
    std::env::var(name).ok().and_then(|v| env_bool(&v)).unwrap_or(false)
}

/// Apply `GESTURA_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `GESTURA_METRICS_PATH` | `metrics.output_path` |
/// | `GESTURA_AUTH_ENABLED` | `auth.enabled` |
/// | `GESTURA_LOG_LEVEL` | `logging.level` |
/// | `GESTURA_LOG_PATH` | `logging.path` |
///
/// `GESTURA_DRY_RUN` is read by the binary itself (see [`env_flag`]).
pub fn apply_env_overrides(cfg: &mut RuntimeConfig) {
    if let Ok(v) = std::env::var("GESTURA_METRICS_PATH")
        && !v.trim().is_empty()
    {
        cfg.metrics.output_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("GESTURA_AUTH_ENABLED")
        && let Some(enabled) = env_bool(&v)
    {
        cfg.auth.enabled = enabled;
    }
    if let Ok(v) = std::env::var("GESTURA_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Ok(v) = std::env::var("GESTURA_LOG_PATH")
        && !v.trim().is_empty()
    {
        cfg.logging.path = Some(PathBuf::from(v));
    }
}

/// Save the config to a specific path, creating the parent directory.
pub(crate) fn save_to(cfg: &RuntimeConfig, path: &Path) -> Result<(), GesturaError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| config_error(format!("failed to create config directory: {e}")))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| config_error(format!("failed to set config directory permissions: {e}")))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| config_error(format!("failed to serialize config: {e}")))?;
    // The recognizer arguments may reference enrolment data: owner-only file.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| config_error(format!("failed to write config at {}: {e}", path.display())))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| config_error(format!("failed to write config at {}: {e}", path.display())))?;
    Ok(())
}

/// TOML rendering of `cfg` for `--print-config`, recognizer arguments masked.
pub fn render(cfg: &RuntimeConfig) -> Result<String, GesturaError> {
    let mut shown = cfg.clone();
    if !shown.auth.recognizer_args.is_empty() {
        shown.auth.recognizer_args = vec!["<redacted>".to_string()];
    }
    toml::to_string_pretty(&shown).map_err(|e| config_error(format!("failed to render config: {e}")))
}
