//! Word and letter counts for scenes, chapters and whole projects, plus the
//! timestamped snapshot history that tracks a project's growth.
//! 場景、章節與整個專案的字數與字母統計，以及記錄專案成長的快照歷史。

use std::fs;
use std::io;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use novelist_project::{NodeKind, Project, ProjectNodeId};
use novelist_settings::storage::write_atomic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Character and word totals of a piece of text.
/// 文字的字元數與單字數。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStats {
    /// Unicode scalar values, punctuation and whitespace included.
    pub chars: usize,
    /// Maximal runs of letters and digits.
    pub words: usize,
}

impl TextStats {
    pub fn analyze(text: &str) -> Self {
        let mut stats = Self::default();
        let mut in_word = false;
        for ch in text.chars() {
            stats.chars += 1;
            let word_char = ch.is_alphanumeric();
            if word_char && !in_word {
                stats.words += 1;
            }
            in_word = word_char;
        }
        stats
    }

    pub fn combine(self, other: Self) -> Self {
        self + other
    }
}

impl Add for TextStats {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            chars: self.chars + other.chars,
            words: self.words + other.words,
        }
    }
}

impl AddAssign for TextStats {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sum for TextStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Totals of every node below `id`. Chapters contribute their name, scenes
/// their name and text. The node itself counts only when it is not a root.
pub fn subtree_stats(project: &Project, id: ProjectNodeId) -> TextStats {
    project
        .subtree(id)
        .into_iter()
        .filter_map(|node| project.node(node))
        .map(|node| match node.kind() {
            NodeKind::ProjectRoot | NodeKind::NotebookRoot => TextStats::default(),
            NodeKind::Chapter => TextStats::analyze(node.name()),
            NodeKind::Scene => TextStats::analyze(node.name()) + TextStats::analyze(node.content()),
        })
        .sum()
}

/// Totals of the manuscript; the notebook is left out.
pub fn project_stats(project: &Project) -> TextStats {
    subtree_stats(project, project.project_root())
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("cannot access statistics history at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("statistics history at {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Totals of a project at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatSnapshot {
    pub taken_at_unix: i64,
    #[serde(flatten)]
    pub stats: TextStats,
}

/// Snapshots in the order they were taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsHistory {
    #[serde(default)]
    snapshots: Vec<StatSnapshot>,
}

impl StatsHistory {
    pub fn snapshots(&self) -> &[StatSnapshot] {
        &self.snapshots
    }

    pub fn latest(&self) -> Option<&StatSnapshot> {
        self.snapshots.last()
    }

    /// True when no snapshot exists or the latest one is at least
    /// `interval_secs` older than `now_unix`.
    pub fn is_due(&self, now_unix: i64, interval_secs: u64) -> bool {
        match self.latest() {
            None => true,
            Some(latest) => {
                let elapsed = now_unix.saturating_sub(latest.taken_at_unix);
                elapsed >= 0 && elapsed as u64 >= interval_secs
            }
        }
    }

    /// Appends a snapshot; timestamps older than the latest one are clamped
    /// so the history stays ordered.
    pub fn record(&mut self, taken_at_unix: i64, stats: TextStats) -> StatSnapshot {
        let taken_at_unix = self
            .latest()
            .map_or(taken_at_unix, |latest| taken_at_unix.max(latest.taken_at_unix));
        let snapshot = StatSnapshot {
            taken_at_unix,
            stats,
        };
        self.snapshots.push(snapshot);
        snapshot
    }

    /// Records `stats` at the current time if a snapshot is due.
    pub fn record_if_due(&mut self, stats: TextStats, interval_secs: u64) -> Option<StatSnapshot> {
        let now = current_timestamp();
        if !self.is_due(now, interval_secs) {
            log::debug!("statistics snapshot skipped; interval of {interval_secs}s not elapsed");
            return None;
        }
        Some(self.record(now, stats))
    }
}

/// Snapshot history bound to the JSON file that holds it.
#[derive(Debug, Clone)]
pub struct StatsHistoryStore {
    path: PathBuf,
}

impl StatsHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the history; a missing file is an empty history.
    pub fn load(&self) -> Result<StatsHistory, StatsError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StatsError::Json {
                path: self.path.clone(),
                source,
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(StatsHistory::default()),
            Err(source) => Err(StatsError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn save(&self, history: &StatsHistory) -> Result<(), StatsError> {
        let json = serde_json::to_vec_pretty(history).map_err(|source| StatsError::Json {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &json).map_err(|source| StatsError::Io {
            path: self.path.clone(),
            source,
        })?;
        log::info!(
            "statistics history with {} snapshots saved to {}",
            history.snapshots.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
