//! Configuration module for herald-server.
//!
//! Turns the parsed command line (flags or environment variables) into
//! validated [`Settings`], loading the rule table file when one is given.

pub mod file;

use crate::Args;
use crate::config::file::RuleFile;
use chrono_tz::Tz;
use herald_core::entities::{ChannelConfig, ChannelId, RoleId};
use herald_core::rules::{RuleTable, RuleTableError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read rule file {path:?}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rule file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid rule table: {0}")]
    RuleError(#[from] RuleTableError),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Everything the process needs, validated.
#[derive(Debug)]
pub struct Settings {
    pub discord_token: String,
    pub calendar_url: Url,
    /// Zone for floating feed times.
    pub calendar_zone: Tz,
    pub state_path: PathBuf,
    pub rules: RuleTable,
    pub announce_interval: Duration,
    pub reminder_interval: Duration,
    /// Seed for runtime configuration; persisted values take precedence.
    pub defaults: ChannelConfig,
    pub mention: String,
    pub prefix: String,
}

impl Settings {
    pub fn load(args: Args) -> Result<Self, ConfigError> {
        if args.discord_token.trim().is_empty() {
            return Err(ConfigError::ValidationError("discord token is empty".to_string()));
        }
        if args.announce_interval_secs == 0 || args.reminder_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "poll intervals must be at least one second".to_string(),
            ));
        }
        if args.prefix.trim().is_empty() {
            return Err(ConfigError::ValidationError("command prefix is empty".to_string()));
        }

        let announce_channel = args
            .default_channel
            .map(|id| {
                ChannelId::new(id)
                    .ok_or_else(|| ConfigError::ValidationError("default channel id must not be 0".to_string()))
            })
            .transpose()?;
        let access_role = args
            .access_role
            .map(|id| {
                RoleId::new(id)
                    .ok_or_else(|| ConfigError::ValidationError("access role id must not be 0".to_string()))
            })
            .transpose()?;

        let calendar_zone = args.calendar_timezone.trim().parse::<Tz>().map_err(|_| {
            ConfigError::ValidationError(format!("unknown time zone {:?}", args.calendar_timezone))
        })?;

        let rules = match &args.rules {
            Some(path) => load_rules(path)?,
            None => RuleTable::builtin(),
        };

        Ok(Self {
            discord_token: args.discord_token,
            calendar_url: args.calendar_url,
            calendar_zone,
            state_path: args.state_path,
            rules,
            announce_interval: Duration::from_secs(args.announce_interval_secs),
            reminder_interval: Duration::from_secs(args.reminder_interval_secs),
            defaults: ChannelConfig {
                announce_channel,
                access_role,
                ..Default::default()
            },
            mention: args.mention.trim().to_string(),
            prefix: args.prefix.trim().to_string(),
        })
    }
}

/// Read, parse and validate a rule table file.
pub fn load_rules(path: &Path) -> Result<RuleTable, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    let file: RuleFile = toml::from_str(&content)?;
    let table = file.into_table();
    table.validate()?;
    tracing::info!(types = table.len(), path = ?path, "Loaded rule table");
    Ok(table)
}
