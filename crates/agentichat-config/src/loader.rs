// Copyright (c) 2025-2026 The agentichat authors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Config;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Ordered list of config file locations, lowest to highest priority.
/// Later files override earlier ones; an explicit path overrides everything.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".agentichat/config.yaml"));
        paths.push(home.join(".agentichat/config.yml"));
    }
    paths.push(PathBuf::from(".agentichat/config.yaml"));
    paths.push(PathBuf::from(".agentichat/config.yml"));
    paths
}

/// Load configuration by deep-merging all discovered YAML layers, then
/// applying environment overrides (env > file > defaults).
///
/// `extra` may provide an explicit path (the `--config` CLI flag); a missing
/// explicit file is an error, missing search-path files are not.
pub fn load(extra: Option<&Path>) -> Result<Config, ConfigError> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            merge_yaml(&mut merged, read_layer(&path)?);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        merge_yaml(&mut merged, read_layer(p)?);
    }

    let mut config: Config =
        if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
            Config::default()
        } else {
            serde_yaml::from_value(merged).map_err(|source| ConfigError::Parse {
                path: PathBuf::from("<merged config>"),
                source,
            })?
        };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

fn read_layer(path: &Path) -> Result<serde_yaml::Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Apply environment overrides onto a loaded config.
///
/// `env` is injected so tests can run without touching the process
/// environment.  URL and API-key overrides apply to the default backend.
fn apply_env_overrides<F>(config: &mut Config, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = env("AGENTICHAT_DATA_DIR") {
        config.data_dir = Some(PathBuf::from(dir));
    }
    let default = config.default_backend.clone();
    if let Some(backend) = config.backends.get_mut(&default) {
        if let Some(url) = env("AGENTICHAT_BACKEND_URL") {
            backend.url = url;
        }
        if let Some(key) = env("AGENTICHAT_API_KEY") {
            backend.api_key = Some(key);
        }
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if !config.backends.is_empty() && !config.backends.contains_key(&config.default_backend) {
        return Err(ConfigError::Invalid(format!(
            "default_backend '{}' is not defined in backends",
            config.default_backend
        )));
    }
    if !(0.0..=1.0).contains(&config.compression.warning_threshold) {
        return Err(ConfigError::Invalid(format!(
            "compression.warning_threshold must be within 0..1, got {}",
            config.compression.warning_threshold
        )));
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
