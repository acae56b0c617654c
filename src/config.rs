#![forbid(unsafe_code)]

use std::{
    collections::HashMap,
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use thiserror::Error;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DATA_ROOT: &str = "data";
pub const DEFAULT_YT_DLP_BIN: &str = "yt-dlp";
pub const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;
const EXTRACTED_SUBDIR: &str = "extracted";
const LEDGER_FILE: &str = "scraped_videos.json";
const COOKIES_FILE: &str = "cookies.txt";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid integer for {0}: {1}")]
    InvalidNumber(&'static str, String),
}

/// Everything the extractor needs to know about where it reads and writes.
///
/// Built once per process and handed to the orchestrator, so two runs with
/// different roots never share files.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub data_root: PathBuf,
    pub extracted_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub yt_dlp_bin: PathBuf,
    pub cookies_path: PathBuf,
    pub backoff_unit: Duration,
}

impl ExtractorConfig {
    /// Default layout rooted at `data_root`.
    pub fn with_root(data_root: impl Into<PathBuf>) -> Self {
        let data_root = data_root.into();
        Self {
            extracted_dir: data_root.join(EXTRACTED_SUBDIR),
            ledger_path: data_root.join(LEDGER_FILE),
            cookies_path: data_root.join(COOKIES_FILE),
            yt_dlp_bin: PathBuf::from(DEFAULT_YT_DLP_BIN),
            backoff_unit: Duration::from_millis(DEFAULT_BACKOFF_UNIT_MS),
            data_root,
        }
    }

    /// Cookies are optional; only forward them when the file is present.
    pub fn cookies(&self) -> Option<&Path> {
        self.cookies_path
            .is_file()
            .then_some(self.cookies_path.as_path())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_root: Option<PathBuf>,
    pub extracted_dir: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
    pub yt_dlp_bin: Option<PathBuf>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_config(overrides: ConfigOverrides) -> Result<ExtractorConfig, ConfigError> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_config_with_overrides(&file_vars, env_var_string, overrides)
}

fn build_config_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: ConfigOverrides,
) -> Result<ExtractorConfig, ConfigError> {
    let data_root = overrides
        .data_root
        .or_else(|| lookup_value("DATA_ROOT", file_vars, &env_lookup).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_ROOT));
    let mut config = ExtractorConfig::with_root(data_root);

    if let Some(dir) = overrides
        .extracted_dir
        .or_else(|| lookup_value("EXTRACTED_DIR", file_vars, &env_lookup).map(PathBuf::from))
    {
        config.extracted_dir = dir;
    }
    if let Some(path) = overrides
        .ledger_path
        .or_else(|| lookup_value("LEDGER_PATH", file_vars, &env_lookup).map(PathBuf::from))
    {
        config.ledger_path = path;
    }
    if let Some(bin) = overrides
        .yt_dlp_bin
        .or_else(|| lookup_value("YT_DLP_BIN", file_vars, &env_lookup).map(PathBuf::from))
    {
        config.yt_dlp_bin = bin;
    }
    if let Some(path) = lookup_value("COOKIES_PATH", file_vars, &env_lookup) {
        config.cookies_path = PathBuf::from(path);
    }
    if let Some(raw) = lookup_value("BACKOFF_UNIT_MS", file_vars, &env_lookup) {
        let millis = raw
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber("BACKOFF_UNIT_MS", raw.clone()))?;
        config.backoff_unit = Duration::from_millis(millis);
    }

    Ok(config)
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(non_blank)
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned().and_then(non_blank))
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
