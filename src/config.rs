use crate::error::{Error, Result};
use crate::filter::ExclusionRules;
use crate::pipeline::Options;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gmail search query, e.g. `after: 2018/11/01 label:receipts`.
    pub query: String,
    /// Zero or negative downloads everything the query matches.
    pub limit: i64,
    pub inbox_url: String,
    pub page_token: Option<String>,
    pub workers: usize,
    pub store_workers: usize,
    pub database_url: String,
    pub credentials: String,
    pub exclude_headers_with_values: BTreeMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            query: String::new(),
            limit: 10,
            inbox_url: "https://mail.google.com/mail/".to_string(),
            page_token: None,
            workers: 200,
            store_workers: 10,
            database_url: "sqlite:mailpipe.db?mode=rwc".to_string(),
            credentials: "credentials.json".to_string(),
            exclude_headers_with_values: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Reads `settings.toml` from the working directory, or the defaults
    /// when there is none.
    pub fn load() -> Result<Self> {
        Self::load_from(SETTINGS_FILE)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid {}: {}", SETTINGS_FILE, e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.store_workers == 0 {
            return Err(Error::Config("store_workers must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn options(&self) -> Options {
        Options {
            query: self.query.clone(),
            limit: self.limit,
            inbox_url: self.inbox_url.clone(),
            page_token: self.page_token.clone().unwrap_or_default(),
            exclude: ExclusionRules::new(self.exclude_headers_with_values.clone()),
        }
    }
}
