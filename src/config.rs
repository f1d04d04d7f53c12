// ap-reboot - reboot access points in tagged Meraki networks
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::orchestrator::{DEFAULT_MODEL_MATCH, DEFAULT_TAG, Selection};
use anyhow::{Context, Result};
use dirs::config_dir;
use serde::Deserialize;
use std::time::Duration;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.meraki.com/api/v0";
pub const DEFAULT_INTERVAL_MS: u64 = 200;
pub const DEFAULT_LOG_LEVEL: &str = "debug";

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    pub base_url: Option<String>,
    pub interval_ms: Option<u64>,
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub reboot_tag: Option<String>,
    pub model_match: Option<String>,
    pub remove_tag: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    User,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate a config directory for the current user")]
    MissingConfigDir,
    #[error("reboot_tag must not be empty")]
    EmptyTag,
    #[error("model_match must not be empty")]
    EmptyModelMatch,
}

/// Values supplied on the command line; they win over both config files.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub interval_ms: Option<u64>,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub base_url: String,
    pub interval: Duration,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub selection: Selection,
    pub remove_tag: bool,
}

pub fn config_path(scope: Scope, cwd: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Local => Ok(cwd.join(".ap-reboot.yaml")),
        Scope::User => {
            if let Ok(custom) = env::var("AP_REBOOT_CONFIG_DIR") {
                return Ok(PathBuf::from(custom).join("config.yaml"));
            }
            let base = config_dir().ok_or(ConfigError::MissingConfigDir)?;
            Ok(base.join("ap-reboot").join("config.yaml"))
        }
    }
}

pub fn load(cwd: &Path) -> Result<Config> {
    let user = read_if_exists(&config_path(Scope::User, cwd)?)?.unwrap_or_default();
    let local = read_if_exists(&config_path(Scope::Local, cwd)?)?.unwrap_or_default();
    Ok(merge(user, local))
}

pub fn resolve(cwd: &Path, overrides: Overrides) -> Result<EffectiveConfig> {
    let merged = load(cwd)?;

    let tag = merged
        .reboot_tag
        .map(|t| t.trim().to_string())
        .unwrap_or_else(|| DEFAULT_TAG.to_string());
    if tag.is_empty() {
        return Err(ConfigError::EmptyTag.into());
    }
    let model_match = merged
        .model_match
        .unwrap_or_else(|| DEFAULT_MODEL_MATCH.to_string());
    if model_match.is_empty() {
        return Err(ConfigError::EmptyModelMatch.into());
    }

    let interval_ms = overrides
        .interval_ms
        .or(merged.interval_ms)
        .unwrap_or(DEFAULT_INTERVAL_MS);

    Ok(EffectiveConfig {
        base_url: overrides
            .base_url
            .or(merged.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        interval: Duration::from_millis(interval_ms),
        log_dir: overrides
            .log_dir
            .or(merged.log_dir)
            .unwrap_or_else(|| PathBuf::from(".")),
        log_level: merged
            .log_level
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        selection: Selection { tag, model_match },
        remove_tag: merged.remove_tag.unwrap_or(true),
    })
}

fn read_if_exists(path: &Path) -> Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let config = serde_yaml::from_str(&contents).with_context(|| format!("parsing {:?}", path))?;
    Ok(Some(config))
}

fn merge(user: Config, local: Config) -> Config {
    Config {
        base_url: local.base_url.or(user.base_url),
        interval_ms: local.interval_ms.or(user.interval_ms),
        log_dir: local.log_dir.or(user.log_dir),
        log_level: local.log_level.or(user.log_level),
        reboot_tag: local.reboot_tag.or(user.reboot_tag),
        model_match: local.model_match.or(user.model_match),
        remove_tag: local.remove_tag.or(user.remove_tag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};
    use std::{env, fs};
    use tempfile::tempdir;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn isolate(cwd: &Path) {
        unsafe {
            env::set_var("AP_REBOOT_CONFIG_DIR", cwd.join("config"));
        }
        fs::create_dir_all(cwd.join("config")).unwrap();
    }

    #[test]
    fn defaults_without_any_file() {
        let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let cwd = tempdir().unwrap();
        isolate(cwd.path());

        let effective = resolve(cwd.path(), Overrides::default()).unwrap();
        assert_eq!(effective.base_url, DEFAULT_BASE_URL);
        assert_eq!(effective.interval, Duration::from_millis(200));
        assert_eq!(effective.log_dir, PathBuf::from("."));
        assert_eq!(effective.log_level, "debug");
        assert_eq!(effective.selection, Selection::default());
        assert!(effective.remove_tag);
    }

    #[test]
    fn local_overrides_user_and_cli_overrides_both() {
        let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let cwd = tempdir().unwrap();
        isolate(cwd.path());

        fs::write(
            cwd.path().join("config").join("config.yaml"),
            "base_url: https://user.test/api/v0\ninterval_ms: 500\nlog_level: info\nremove_tag: false\n",
        )
        .unwrap();
        fs::write(
            cwd.path().join(".ap-reboot.yaml"),
            "interval_ms: 1000\nreboot_tag: nightly_reboot\n",
        )
        .unwrap();

        let effective = resolve(cwd.path(), Overrides::default()).unwrap();
        assert_eq!(effective.base_url, "https://user.test/api/v0");
        assert_eq!(effective.interval, Duration::from_millis(1000));
        assert_eq!(effective.log_level, "info");
        assert_eq!(effective.selection.tag, "nightly_reboot");
        assert_eq!(effective.selection.model_match, "MR");
        assert!(!effective.remove_tag);

        let overridden = resolve(
            cwd.path(),
            Overrides {
                base_url: Some("http://127.0.0.1:9/api/v0".into()),
                interval_ms: Some(0),
                log_dir: Some(PathBuf::from("/tmp/logs")),
            },
        )
        .unwrap();
        assert_eq!(overridden.base_url, "http://127.0.0.1:9/api/v0");
        assert_eq!(overridden.interval, Duration::ZERO);
        assert_eq!(overridden.log_dir, PathBuf::from("/tmp/logs"));
    }

    #[test]
    fn rejects_blank_tag() {
        let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let cwd = tempdir().unwrap();
        isolate(cwd.path());
        fs::write(cwd.path().join(".ap-reboot.yaml"), "reboot_tag: '  '\n").unwrap();

        let err = resolve(cwd.path(), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("reboot_tag must not be empty"));
    }

    #[test]
    fn reports_invalid_yaml() {
        let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap();
        let cwd = tempdir().unwrap();
        isolate(cwd.path());
        fs::write(cwd.path().join(".ap-reboot.yaml"), "interval_ms: [not a number\n").unwrap();

        let err = resolve(cwd.path(), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("parsing"));
    }
}
