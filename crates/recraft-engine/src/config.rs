use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::RecraftError;

pub const DEFAULT_API_BASE: &str = "https://external.api.recraft.ai/v1";
pub const TOKEN_ENV: &str = "RECRAFT_API_TOKEN";
pub const API_BASE_ENV: &str = "RECRAFT_API_BASE";
pub const CONFIG_PATH_ENV: &str = "RECRAFT_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Bearer token. `Debug` never prints the full secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(RecraftError::configuration("API token is required"));
        }
        Ok(Self(token))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn redacted(&self) -> String {
        let chars = self.0.chars().collect::<Vec<char>>();
        if chars.len() <= 4 {
            return "***".to_string();
        }
        let suffix = chars[chars.len() - 4..].iter().collect::<String>();
        format!("***{suffix}")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.redacted()).finish()
    }
}

/// On-disk layout: an `[API]` table holding the token and an optional base URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(rename = "API", default)]
    pub api: ApiSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(
        rename = "RECRAFT_API_TOKEN",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<String>,
    #[serde(
        rename = "RECRAFT_API_BASE",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub api_base: Option<String>,
}

impl ConfigFile {
    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid Recraft config file")
    }
}

/// Everything needed to build a client, captured once at startup.
///
/// Token precedence: explicit value > config file > `RECRAFT_API_TOKEN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecraftConfig {
    pub api_base: String,
    file_token: Option<String>,
    env_token: Option<String>,
    warnings: Vec<String>,
}

impl Default for RecraftConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            file_token: None,
            env_token: None,
            warnings: Vec::new(),
        }
    }
}

impl RecraftConfig {
    /// Loads from `path`, else `RECRAFT_CONFIG`, else `./config.toml`, and
    /// snapshots the environment. A missing file or empty token is only a
    /// warning: an explicit token may still be supplied later.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| non_empty_env(CONFIG_PATH_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let file = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            Some(
                ConfigFile::parse(&raw)
                    .with_context(|| format!("failed parsing {}", path.display()))?,
            )
        } else {
            None
        };

        let mut config = Self::from_parts(
            file.as_ref(),
            non_empty_env(TOKEN_ENV),
            non_empty_env(API_BASE_ENV),
        );
        match file {
            None => config.warnings.insert(
                0,
                format!("config file not found: {}", path.display()),
            ),
            Some(ref parsed) if parsed.api.token.is_none() => config.warnings.insert(
                0,
                format!("unable to find {TOKEN_ENV} in {}", path.display()),
            ),
            Some(_) => {}
        }
        Ok(config)
    }

    /// Builds a config without touching the filesystem or the environment.
    pub fn from_parts(
        file: Option<&ConfigFile>,
        env_token: Option<String>,
        env_api_base: Option<String>,
    ) -> Self {
        let mut warnings = Vec::new();
        let file_token = file.and_then(|parsed| parsed.api.token.as_deref());
        if file_token.is_some_and(|token| token.trim().is_empty()) {
            warnings.push(format!("{TOKEN_ENV} is empty"));
        }
        let api_base = env_api_base
            .or_else(|| file.and_then(|parsed| parsed.api.api_base.clone()))
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        Self {
            api_base,
            file_token: file_token.and_then(non_empty),
            env_token: env_token.as_deref().and_then(non_empty),
            warnings,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn resolve_token(&self, explicit: Option<&str>) -> Result<Credential> {
        let token = explicit
            .and_then(non_empty)
            .or_else(|| self.file_token.clone())
            .or_else(|| self.env_token.clone())
            .unwrap_or_default();
        Credential::new(token)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().as_deref().and_then(non_empty)
}
