//! The results an interactive session is currently holding.
//!
//! A session starts [`SessionState::Empty`]. Any search that returns at
//! least one block replaces whatever was held; a search that returns nothing
//! leaves the previous results in place. Export and marking-scheme lookup
//! read from here without re-running the search.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::extract::ExtractionResult;
use crate::search::{BatchReport, SearchQuery, SearchReport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Held {
    Single {
        query: SearchQuery,
        results: Vec<ExtractionResult>,
    },
    Batch { report: BatchReport },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Empty,
    HasResults {
        captured_at: DateTime<Utc>,
        held: Held,
    },
}

impl SessionState {
    pub fn is_empty(&self) -> bool {
        matches!(self, SessionState::Empty)
    }

    pub fn held(&self) -> Option<&Held> {
        match self {
            SessionState::Empty => None,
            SessionState::HasResults { held, .. } => Some(held),
        }
    }

    /// Held extraction results in search order; empty when nothing is held.
    pub fn results(&self) -> Vec<&ExtractionResult> {
        match self.held() {
            None => Vec::new(),
            Some(Held::Single { results, .. }) => results.iter().collect(),
            Some(Held::Batch { report }) => report.sections.iter().map(|s| &s.result).collect(),
        }
    }

    /// Holds the report's results if there are any. Returns whether the state changed.
    pub fn record_search(&mut self, query: &SearchQuery, report: &SearchReport) -> bool {
        if report.is_empty() {
            return false;
        }
        *self = SessionState::HasResults {
            captured_at: Utc::now(),
            held: Held::Single {
                query: query.clone(),
                results: report.results.clone(),
            },
        };
        true
    }

    /// Holds a batch report if it has any sections. Returns whether the state changed.
    pub fn record_batch(&mut self, report: &BatchReport) -> bool {
        if report.is_empty() {
            return false;
        }
        *self = SessionState::HasResults {
            captured_at: Utc::now(),
            held: Held::Batch {
                report: report.clone(),
            },
        };
        true
    }

    /// Reads a persisted session; a missing file is an empty session.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(SessionState::Empty);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session file: {}", path.display()))?;
        Ok(())
    }
}
