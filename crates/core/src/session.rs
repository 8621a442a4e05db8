use std::fmt;
use std::ops::Range;
use std::sync::mpsc::{self, Receiver, Sender};

use novelist_project::{
    Command, EditLog, EditLogError, FieldKind, NodeKind, Project, ProjectError, ProjectNodeId,
};
use novelist_search::{Matcher, SearchError, SearchQuery, SearchScope};
use novelist_settings::{Translator, CONTEXT_FIND_WIDGET};
use thiserror::Error;

use crate::cancel::CancellationToken;

/// One match found by a scan, addressed by node, field and byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub node: ProjectNodeId,
    pub field: FieldKind,
    pub range: Range<usize>,
    pub matched: String,
    pub excluded: bool,
}

impl Occurrence {
    /// True when the live project still holds the matched text at the recorded range.
    pub fn is_live(&self, project: &Project) -> bool {
        project
            .field(self.node, self.field)
            .map_or(false, |text| text.get(self.range.clone()) == Some(self.matched.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Ready,
    Replacing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Scanning => "scanning",
            SessionState::Ready => "ready",
            SessionState::Replacing => "replacing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SearchProgress { scanned: usize, total: usize },
    SearchCompleted { matches: usize },
    SearchCancelled,
    SearchInvalidated,
}

/// Outcome of one incremental scan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    InProgress { scanned: usize, total: usize },
    Complete { matches: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceAllReport {
    pub replaced: usize,
    pub failed: usize,
}

impl ReplaceAllReport {
    /// Status line shown when some occurrences were left untouched.
    pub fn failure_message(&self, translator: &Translator) -> Option<String> {
        if self.failed == 0 {
            return None;
        }
        let count = self.failed.to_string();
        Some(format!(
            "{} {}",
            translator.tr_args(
                CONTEXT_FIND_WIDGET,
                "%1 occurrences could not be replaced.",
                &[count.as_str()]
            ),
            translator.tr(
                CONTEXT_FIND_WIDGET,
                "The project might have changed since the results were found."
            )
        ))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("search pattern cannot be empty")]
    EmptyPattern,
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("no matches")]
    NoMatches,
    #[error("no occurrence is selected")]
    NoSelection,
    #[error("occurrence {0} does not exist")]
    UnknownOccurrence(usize),
    #[error("the search scope needs an open scene")]
    NoActiveScene,
    #[error("operation requires a {expected} session, but it is {actual}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },
    #[error("the project changed while it was being scanned")]
    ScanInvalidated,
    #[error("search cancelled")]
    Cancelled,
    #[error("occurrence {0} no longer matches the project")]
    StaleOccurrence(usize),
    #[error(transparent)]
    EditLog(#[from] EditLogError),
    #[error(transparent)]
    Project(#[from] ProjectError),
}

impl From<SearchError> for SessionError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::EmptyPattern => SessionError::EmptyPattern,
            SearchError::InvalidPattern(message) => SessionError::InvalidPattern(message),
        }
    }
}

#[derive(Debug)]
struct PendingScan {
    queue: Vec<ProjectNodeId>,
    position: usize,
    revision: u64,
}

/// Find/replace state for one project view.
///
/// The session never holds on to the project; every operation that reads or
/// changes it borrows it for the duration of the call. Occurrences are
/// re-validated against the live text before they are replaced.
#[derive(Debug)]
pub struct SearchReplaceSession {
    query: Option<SearchQuery>,
    matcher: Option<Matcher>,
    occurrences: Vec<Occurrence>,
    current: Option<usize>,
    state: SessionState,
    scan: Option<PendingScan>,
    translator: Translator,
    subscribers: Vec<Sender<SessionEvent>>,
}

impl Default for SearchReplaceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchReplaceSession {
    pub fn new() -> Self {
        Self {
            query: None,
            matcher: None,
            occurrences: Vec::new(),
            current: None,
            state: SessionState::Idle,
            scan: None,
            translator: Translator::identity(),
            subscribers: Vec::new(),
        }
    }

    pub fn with_translator(mut self, translator: Translator) -> Self {
        self.translator = translator;
        self
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn query(&self) -> Option<&SearchQuery> {
        self.query.as_ref()
    }

    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Occurrence> {
        self.current.and_then(|idx| self.occurrences.get(idx))
    }

    /// Number of occurrences reachable by navigation.
    pub fn navigable_count(&self) -> usize {
        self.occurrences.iter().filter(|occ| !occ.excluded).count()
    }

    /// Runs a complete scan, checking `cancel` before every node.
    pub fn start_search(
        &mut self,
        project: &Project,
        query: SearchQuery,
        current_scene: Option<ProjectNodeId>,
        cancel: &CancellationToken,
    ) -> Result<usize, SessionError> {
        self.begin_search(project, query, current_scene)?;
        loop {
            if cancel.is_cancelled() {
                self.cancel()?;
                return Err(SessionError::Cancelled);
            }
            if let ScanStatus::Complete { matches } = self.scan_step(project, 1)? {
                return Ok(matches);
            }
        }
    }

    /// Validates `query`, resolves its scope and enters `Scanning`.
    ///
    /// Pattern and scope errors leave the session exactly as it was.
    pub fn begin_search(
        &mut self,
        project: &Project,
        query: SearchQuery,
        current_scene: Option<ProjectNodeId>,
    ) -> Result<(), SessionError> {
        if !matches!(self.state, SessionState::Idle | SessionState::Ready) {
            return Err(SessionError::InvalidState {
                expected: SessionState::Idle,
                actual: self.state,
            });
        }
        let matcher = query.compile()?;
        let queue = scope_nodes(project, query.scope, current_scene)?;
        log::debug!(
            "scanning {} nodes for {:?} ({:?} scope)",
            queue.len(),
            query.pattern,
            query.scope
        );

        self.query = Some(query);
        self.matcher = Some(matcher);
        self.occurrences.clear();
        self.current = None;
        self.scan = Some(PendingScan {
            queue,
            position: 0,
            revision: project.revision(),
        });
        self.state = SessionState::Scanning;
        Ok(())
    }

    /// Scans up to `max_nodes` further nodes.
    ///
    /// A project edited since the scan began invalidates the scan: partial
    /// results are dropped and the session returns to `Idle`.
    pub fn scan_step(
        &mut self,
        project: &Project,
        max_nodes: usize,
    ) -> Result<ScanStatus, SessionError> {
        self.expect_state(SessionState::Scanning)?;
        let Some(mut scan) = self.scan.take() else {
            return Err(SessionError::InvalidState {
                expected: SessionState::Scanning,
                actual: self.state,
            });
        };
        if project.revision() != scan.revision {
            log::warn!("project changed during scan; discarding partial results");
            self.occurrences.clear();
            self.state = SessionState::Idle;
            self.emit(SessionEvent::SearchInvalidated);
            return Err(SessionError::ScanInvalidated);
        }

        let include_titles = self.query.as_ref().map_or(false, |q| q.include_titles);
        let end = (scan.position + max_nodes.max(1)).min(scan.queue.len());
        if let Some(matcher) = &self.matcher {
            for id in &scan.queue[scan.position..end] {
                collect_node(project, *id, matcher, include_titles, &mut self.occurrences);
            }
        }
        scan.position = end;

        let total = scan.queue.len();
        self.emit(SessionEvent::SearchProgress {
            scanned: end,
            total,
        });
        if end < total {
            self.scan = Some(scan);
            return Ok(ScanStatus::InProgress {
                scanned: end,
                total,
            });
        }

        let matches = self.occurrences.len();
        self.state = SessionState::Ready;
        log::info!("search finished with {matches} occurrences in {total} nodes");
        self.emit(SessionEvent::SearchCompleted { matches });
        Ok(ScanStatus::Complete { matches })
    }

    /// Aborts a running scan and drops its partial results.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::Scanning)?;
        self.scan = None;
        self.occurrences.clear();
        self.current = None;
        self.state = SessionState::Idle;
        log::debug!("search cancelled");
        self.emit(SessionEvent::SearchCancelled);
        Ok(())
    }


    pub fn next(&mut self) -> Result<&Occurrence, SessionError> {
        self.step(true)
    }

    pub fn previous(&mut self) -> Result<&Occurrence, SessionError> {
        self.step(false)
    }

    fn step(&mut self, forward: bool) -> Result<&Occurrence, SessionError> {
        self.expect_state(SessionState::Ready)?;
        let len = self.occurrences.len();
        if len == 0 {
            return Err(SessionError::NoMatches);
        }
        let navigable = |idx: &usize| !self.occurrences[*idx].excluded;
        let found = match (self.current.filter(|i| *i < len), forward) {
            (None, true) => (0..len).find(navigable),
            (None, false) => (0..len).rev().find(navigable),
            (Some(i), true) => (i + 1..len).chain(0..=i).find(navigable),
            (Some(i), false) => (0..i).rev().chain((i..len).rev()).find(navigable),
        };
        let idx = found.ok_or(SessionError::NoMatches)?;
        self.current = Some(idx);
        Ok(&self.occurrences[idx])
    }

    pub fn exclude(&mut self, index: usize) -> Result<(), SessionError> {
        self.set_excluded(index, true)
    }

    pub fn include(&mut self, index: usize) -> Result<(), SessionError> {
        self.set_excluded(index, false)
    }

    fn set_excluded(&mut self, index: usize, excluded: bool) -> Result<(), SessionError> {
        let occurrence = self
            .occurrences
            .get_mut(index)
            .ok_or(SessionError::UnknownOccurrence(index))?;
        occurrence.excluded = excluded;
        Ok(())
    }

    /// Replaces the selected occurrence through one undoable command.
    ///
    /// Returns the edit-log label of the command.
    pub fn replace_current(
        &mut self,
        replacement: &str,
        project: &mut Project,
        log: &mut EditLog,
    ) -> Result<String, SessionError> {
        self.expect_state(SessionState::Ready)?;
        if self.occurrences.is_empty() {
            return Err(SessionError::NoMatches);
        }
        let index = self.current.ok_or(SessionError::NoSelection)?;
        let occurrence = self
            .occurrences
            .get(index)
            .cloned()
            .ok_or(SessionError::NoSelection)?;
        let Some(expanded) = self.expansion(&occurrence, replacement, project) else {
            log::warn!(
                "occurrence {index} in node {} is stale; project changed since the scan",
                occurrence.node
            );
            return Err(SessionError::StaleOccurrence(index));
        };

        self.state = SessionState::Replacing;
        let outcome = self.substitute(&occurrence, expanded, project, log);
        self.state = SessionState::Ready;
        let (label, delta) = outcome?;

        self.occurrences.remove(index);
        self.shift_after(&occurrence, delta);
        let len = self.occurrences.len();
        self.current = (index..len)
            .chain(0..index.min(len))
            .find(|idx| !self.occurrences[*idx].excluded);
        Ok(label)
    }

    /// Replaces every non-excluded occurrence, one command each.
    ///
    /// Stale occurrences are counted as failures; processed occurrences are
    /// removed either way while excluded ones remain.
    pub fn replace_all(
        &mut self,
        replacement: &str,
        project: &mut Project,
        log: &mut EditLog,
    ) -> Result<ReplaceAllReport, SessionError> {
        self.expect_state(SessionState::Ready)?;
        if self.navigable_count() == 0 {
            return Err(SessionError::NoMatches);
        }

        // Expansions are computed against the scanned text, before earlier
        // substitutions change the context around later matches.
        let expansions: Vec<Option<String>> = self
            .occurrences
            .iter()
            .map(|occ| {
                if occ.excluded {
                    None
                } else {
                    self.expansion(occ, replacement, project)
                }
            })
            .collect();

        self.state = SessionState::Replacing;
        let mut report = ReplaceAllReport::default();
        for (index, expanded) in expansions.into_iter().enumerate() {
            let occurrence = self.occurrences[index].clone();
            if occurrence.excluded {
                continue;
            }
            let Some(expanded) = expanded.filter(|_| occurrence.is_live(project)) else {
                log::warn!("skipping stale occurrence {index} in node {}", occurrence.node);
                report.failed += 1;
                continue;
            };
            match self.substitute(&occurrence, expanded, project, log) {
                Ok((_, delta)) => {
                    report.replaced += 1;
                    self.shift_after(&occurrence, delta);
                }
                Err(err) => {
                    log::warn!("could not replace occurrence {index}: {err}");
                    report.failed += 1;
                }
            }
        }
        self.occurrences.retain(|occ| occ.excluded);
        self.current = None;
        self.state = SessionState::Ready;
        log::info!(
            "replaced {} occurrences, {} failed",
            report.replaced,
            report.failed
        );
        Ok(report)
    }

    /// Status line such as `(2 of 5 matches)`.
    pub fn match_status(&self) -> String {
        let total = self.navigable_count();
        let position = self
            .current
            .filter(|idx| self.occurrences.get(*idx).map_or(false, |occ| !occ.excluded))
            .map_or(0, |idx| {
                self.occurrences[..=idx]
                    .iter()
                    .filter(|occ| !occ.excluded)
                    .count()
            });
        self.translator.tr_args(
            CONTEXT_FIND_WIDGET,
            "(%1 of %2 matches)",
            &[position.to_string().as_str(), total.to_string().as_str()],
        )
    }

    /// Message shown when the selected occurrence could not be replaced.
    pub fn stale_message(&self) -> String {
        format!(
            "{} {}",
            self.translator
                .tr(CONTEXT_FIND_WIDGET, "Unable to replace the selected occurrence."),
            self.translator.tr(
                CONTEXT_FIND_WIDGET,
                "The project might have changed since this result was found."
            )
        )
    }

    /// Replacement text for a live occurrence, or `None` when it is stale.
    fn expansion(
        &self,
        occurrence: &Occurrence,
        replacement: &str,
        project: &Project,
    ) -> Option<String> {
        if !occurrence.is_live(project) {
            return None;
        }
        let text = project.field(occurrence.node, occurrence.field).ok()?;
        match &self.matcher {
            Some(matcher) => matcher.expand(text, occurrence.range.clone(), replacement),
            None => Some(replacement.to_string()),
        }
    }

    fn substitute(
        &self,
        occurrence: &Occurrence,
        expanded: String,
        project: &mut Project,
        log: &mut EditLog,
    ) -> Result<(String, isize), SessionError> {
        let delta = expanded.len() as isize - occurrence.range.len() as isize;
        let command = Command::replace_text(
            project,
            occurrence.node,
            occurrence.field,
            occurrence.range.clone(),
            expanded,
        )?;
        let label = log.push(project, command)?;
        Ok((label, delta))
    }

    /// Moves later occurrences in the same field by the replacement's length change.
    fn shift_after(&mut self, replaced: &Occurrence, delta: isize) {
        if delta == 0 {
            return;
        }
        for occ in &mut self.occurrences {
            if occ.node == replaced.node
                && occ.field == replaced.field
                && occ.range.start >= replaced.range.end
            {
                occ.range = occ.range.start.saturating_add_signed(delta)
                    ..occ.range.end.saturating_add_signed(delta);
            }
        }
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Nodes to visit for `scope`, in depth-first pre-order.
fn scope_nodes(
    project: &Project,
    scope: SearchScope,
    current_scene: Option<ProjectNodeId>,
) -> Result<Vec<ProjectNodeId>, SessionError> {
    let active_scene = || {
        current_scene
            .and_then(|id| project.node(id))
            .filter(|node| node.kind() == NodeKind::Scene)
            .ok_or(SessionError::NoActiveScene)
    };
    match scope {
        SearchScope::Scene => Ok(vec![active_scene()?.id()]),
        SearchScope::Chapter => {
            let scene = active_scene()?;
            let parent = scene.parent().ok_or(SessionError::NoActiveScene)?;
            Ok(project.subtree(parent))
        }
        SearchScope::Project => Ok(project
            .roots()
            .iter()
            .flat_map(|root| project.subtree(*root))
            .collect()),
    }
}

fn collect_node(
    project: &Project,
    id: ProjectNodeId,
    matcher: &Matcher,
    include_titles: bool,
    out: &mut Vec<Occurrence>,
) {
    let Some(node) = project.node(id) else {
        return;
    };
    let mut fields = Vec::with_capacity(2);
    if include_titles && !node.kind().is_root() {
        fields.push(FieldKind::Title);
    }
    if node.kind() == NodeKind::Scene {
        fields.push(FieldKind::Content);
    }
    for field in fields {
        out.extend(matcher.find_all(node.field(field)).into_iter().map(|m| Occurrence {
            node: id,
            field,
            range: m.start..m.end,
            matched: m.matched,
            excluded: false,
        }));
    }
}
