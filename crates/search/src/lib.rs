//! Pattern matching used by the Novelist find/replace panel.
//!
//! A [`SearchQuery`] describes what the user typed and which toggles are set.
//! Compiling it yields a [`Matcher`] that finds non-overlapping, non-empty
//! matches inside a single text field and expands replacement templates for
//! regular-expression queries. Walking the project tree is left to the caller.

use std::fmt;
use std::ops::Range;

use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// Error conditions raised while preparing a query.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("search pattern cannot be empty")]
    EmptyPattern,
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

/// Determines how the search pattern is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchMode {
    #[default]
    Plain,
    Regex,
}

/// Portion of the project a search covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchScope {
    /// The scene currently open.
    Scene,
    /// Every node under the chapter holding the current scene.
    Chapter,
    /// The whole project tree followed by the notebook.
    #[default]
    Project,
}

/// Options supplied by the find panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchQuery {
    pub pattern: String,
    pub mode: SearchMode,
    pub case_sensitive: bool,
    pub scope: SearchScope,
    pub include_titles: bool,
}

impl SearchQuery {
    /// Creates a plain, case-insensitive, project-wide query over scene text.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            mode: SearchMode::Plain,
            case_sensitive: false,
            scope: SearchScope::Project,
            include_titles: false,
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_titles(mut self, include_titles: bool) -> Self {
        self.include_titles = include_titles;
        self
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if self.pattern.is_empty() {
            return Err(SearchError::EmptyPattern);
        }
        Ok(())
    }

    pub fn compile(&self) -> Result<Matcher, SearchError> {
        self.validate()?;
        let regex = build_regex(self)?;
        Ok(Matcher {
            regex,
            mode: self.mode,
        })
    }
}

/// A single match inside one text field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMatch {
    pub start: usize,
    pub end: usize,
    pub matched: String,
}

impl TextMatch {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Compiled form of a [`SearchQuery`].
#[derive(Clone, Debug)]
pub struct Matcher {
    regex: Regex,
    mode: SearchMode,
}

impl Matcher {
    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    /// Returns every non-empty match, left to right, without overlaps.
    pub fn find_all(&self, text: &str) -> Vec<TextMatch> {
        self.regex
            .find_iter(text)
            .filter(|m| !m.is_empty())
            .map(|m| TextMatch {
                start: m.start(),
                end: m.end(),
                matched: m.as_str().to_string(),
            })
            .collect()
    }

    /// Builds the text that replaces `text[range]`.
    ///
    /// Plain queries insert `replacement` literally. Regex queries expand
    /// `$1`/`${name}` references against the match at `range`, with the
    /// surrounding text as context. Returns `None` when the pattern no longer
    /// matches exactly there.
    pub fn expand(&self, text: &str, range: Range<usize>, replacement: &str) -> Option<String> {
        if self.mode == SearchMode::Plain {
            return Some(replacement.to_string());
        }
        if range.start > text.len() || !text.is_char_boundary(range.start) {
            return None;
        }
        let caps = self.regex.captures_at(text, range.start)?;
        let whole = caps.get(0)?;
        if whole.range() != range {
            return None;
        }
        let mut out = String::new();
        caps.expand(replacement, &mut out);
        Some(out)
    }
}

/// Text around a match, limited to the match's line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snippet {
    pub before: String,
    pub matched: String,
    pub after: String,
    pub clipped_before: bool,
    pub clipped_after: bool,
}

impl fmt::Display for Snippet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clipped_before {
            f.write_str("…")?;
        }
        write!(f, "{}[{}]{}", self.before, self.matched, self.after)?;
        if self.clipped_after {
            f.write_str("…")?;
        }
        Ok(())
    }
}

/// Extracts up to `radius` characters of context on each side of `range`.
///
/// Returns `None` when `range` does not lie on char boundaries of `text`.
pub fn snippet(text: &str, range: Range<usize>, radius: usize) -> Option<Snippet> {
    let matched = text.get(range.clone())?;
    let index = LineIndex::new(text);
    let line_span = index.line_span(index.line_of(range.start));

    let head = text.get(line_span.start..range.start)?;
    let head_len = head.chars().count();
    let before: String = head.chars().skip(head_len.saturating_sub(radius)).collect();

    let tail_end = range.end.max(line_span.end);
    let tail = text.get(range.end..tail_end)?;
    let after: String = tail.chars().take(radius).collect();

    Some(Snippet {
        clipped_before: head_len > radius,
        clipped_after: tail.chars().count() > radius,
        before,
        matched: matched.replace('\n', " "),
        after,
    })
}

fn build_regex(query: &SearchQuery) -> Result<Regex, SearchError> {
    let mut builder = RegexBuilder::new(&translate_pattern(query));
    builder.case_insensitive(!query.case_sensitive);
    builder.multi_line(true);
    builder
        .build()
        .map_err(|err| SearchError::InvalidPattern(err.to_string()))
}

fn translate_pattern(query: &SearchQuery) -> String {
    match query.mode {
        SearchMode::Plain => regex::escape(&query.pattern),
        SearchMode::Regex => query.pattern.clone(),
    }
}

/// Byte offsets of line starts within a text.
struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(idx, _)| idx + 1));
        Self { text, starts }
    }

    /// One-based line holding a byte offset.
    fn line_of(&self, index: usize) -> usize {
        match self.starts.binary_search(&index) {
            Ok(line_zero) => line_zero + 1,
            Err(insert) => insert.max(1),
        }
    }

    /// Byte span of a one-based line without its line terminator.
    fn line_span(&self, line: usize) -> Range<usize> {
        let zero_based = line.saturating_sub(1);
        let start = self.starts.get(zero_based).copied().unwrap_or(0);
        let end = self
            .starts
            .get(zero_based + 1)
            .copied()
            .unwrap_or(self.text.len());
        let trimmed = self.text[start..end].trim_end_matches(['\n', '\r']);
        start..start + trimmed.len()
    }
}
