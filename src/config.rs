use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::LogOptions;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct KrcConfig {
    pub source: Option<String>,
    pub shell: Vec<String>,
    pub command_shell: Vec<String>,
    pub container: Option<String>,
    pub logs: LogOptions,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct KrcConfigFile {
    #[serde(default)]
    shell: Option<Vec<String>>,
    #[serde(default, alias = "command-shell")]
    command_shell: Option<Vec<String>>,
    #[serde(default)]
    container: Option<String>,
    #[serde(default)]
    logs: LogsSection,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LogsSection {
    #[serde(default, alias = "tail")]
    tail_lines: Option<i64>,
    #[serde(default)]
    follow: Option<bool>,
    #[serde(default)]
    buffer_size: Option<usize>,
}

impl Default for KrcConfig {
    fn default() -> Self {
        Self {
            source: None,
            shell: vec!["/bin/bash".to_string()],
            command_shell: vec!["/bin/bash".to_string(), "-c".to_string()],
            container: None,
            logs: LogOptions::default(),
        }
    }
}

impl KrcConfig {
    pub fn load() -> Result<Self> {
        match discover_config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::parse(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.source = Some(path.display().to_string());
        Ok(config)
    }

    fn parse(raw: &str) -> Result<Self> {
        let parsed: KrcConfigFile = if raw.trim().is_empty() {
            KrcConfigFile::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        let defaults = Self::default();

        let shell = parsed
            .shell
            .filter(|argv| !argv.is_empty())
            .unwrap_or(defaults.shell);
        let command_shell = parsed
            .command_shell
            .filter(|argv| !argv.is_empty())
            .unwrap_or(defaults.command_shell);
        let logs = LogOptions {
            tail_lines: parsed
                .logs
                .tail_lines
                .unwrap_or(defaults.logs.tail_lines)
                .max(0),
            follow: parsed.logs.follow.unwrap_or(defaults.logs.follow),
            container: parsed.container.clone(),
            buffer_size: parsed
                .logs
                .buffer_size
                .unwrap_or(defaults.logs.buffer_size)
                .max(1),
        };

        Ok(Self {
            source: None,
            shell,
            command_shell,
            container: parsed.container,
            logs,
        })
    }
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KRC_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("krc.yaml"),
        PathBuf::from("krc.yml"),
        PathBuf::from(".krc.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/krc/config.yaml"),
            PathBuf::from(&home).join(".config/krc/config.yml"),
            PathBuf::from(&home).join(".krc.yaml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}
