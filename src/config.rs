use std::path::PathBuf;

use anyhow::Context;

use crate::extract::CommandExtractor;
use crate::registry::Registry;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Runtime settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: Option<String>,
    pub districts_path: Option<PathBuf>,
    pub extractor_command: Option<String>,
    pub max_connections: u32,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let max_connections = match non_empty("DASHBOARD_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("DASHBOARD_MAX_CONNECTIONS is not a number: {raw}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            districts_path: non_empty("DASHBOARD_DISTRICTS").map(PathBuf::from),
            extractor_command: non_empty("DASHBOARD_EXTRACTOR"),
            max_connections,
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }

    /// The configured district table, or the built-in one.
    pub fn registry(&self) -> anyhow::Result<Registry> {
        match &self.districts_path {
            Some(path) => Registry::from_path(path)
                .with_context(|| format!("failed to load districts from {}", path.display())),
            None => Ok(Registry::default()),
        }
    }

    pub fn extractor(&self) -> anyhow::Result<CommandExtractor> {
        self.extractor_command
            .as_deref()
            .and_then(CommandExtractor::from_command_line)
            .context("DASHBOARD_EXTRACTOR must name a PDF extraction command")
    }
}
