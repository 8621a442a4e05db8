use novelist_core::{
    CancellationToken, ReplaceAllReport, ScanStatus, SearchReplaceSession, SessionError,
    SessionEvent, SessionState,
};
use novelist_project::{
    EditLog, FieldKind, NodeDraft, Project, ProjectNodeId, ProjectProperties,
};
use novelist_search::{SearchMode, SearchQuery, SearchScope};

struct Fixture {
    project: Project,
    chapter: ProjectNodeId,
    first: ProjectNodeId,
    nested: ProjectNodeId,
    loose: ProjectNodeId,
    note: ProjectNodeId,
}

/// Project root: chapter [first, nested chapter [nested]], loose scene.
/// Notebook: note.
fn fixture() -> Fixture {
    let mut project = Project::new(ProjectProperties::new("The cat book", "Ernie", "en_US"));
    let root = project.project_root();
    let chapter = project.insert(root, 0, NodeDraft::chapter("Chapter cat")).unwrap();
    let first = project
        .insert(chapter, 0, NodeDraft::scene("First").with_content("the cat sat"))
        .unwrap();
    let inner = project.insert(chapter, 1, NodeDraft::chapter("Inner")).unwrap();
    let nested = project
        .insert(inner, 0, NodeDraft::scene("Nested").with_content("a cat ran"))
        .unwrap();
    let loose = project
        .insert(root, 1, NodeDraft::scene("Loose").with_content("cat"))
        .unwrap();
    let note = project
        .insert(project.notebook(), 0, NodeDraft::scene("Note").with_content("cat idea"))
        .unwrap();
    Fixture {
        project,
        chapter,
        first,
        nested,
        loose,
        note,
    }
}

fn search(
    session: &mut SearchReplaceSession,
    project: &Project,
    query: SearchQuery,
    scene: Option<ProjectNodeId>,
) -> Result<usize, SessionError> {
    session.start_search(project, query, scene, &CancellationToken::new())
}

fn two_scenes(first: &str, second: &str) -> (Project, ProjectNodeId, ProjectNodeId) {
    let mut project = Project::new(ProjectProperties::new("Novel", "", "en_US"));
    let chapter = project
        .insert(project.project_root(), 0, NodeDraft::chapter("One"))
        .unwrap();
    let a = project
        .insert(chapter, 0, NodeDraft::scene("A").with_content(first))
        .unwrap();
    let b = project
        .insert(chapter, 1, NodeDraft::scene("B").with_content(second))
        .unwrap();
    (project, a, b)
}

#[test]
fn project_scope_walks_tree_then_notebook() {
    let f = fixture();
    let mut session = SearchReplaceSession::new();
    let found = search(&mut session, &f.project, SearchQuery::new("cat"), None).unwrap();
    assert_eq!(found, 4);
    let nodes: Vec<_> = session.occurrences().iter().map(|occ| occ.node).collect();
    assert_eq!(nodes, vec![f.first, f.nested, f.loose, f.note]);
    assert!(session
        .occurrences()
        .iter()
        .all(|occ| occ.field == FieldKind::Content));
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.current_index(), None);
}

#[test]
fn chapter_scope_uses_parent_of_current_scene() {
    let f = fixture();
    let mut session = SearchReplaceSession::new();
    let query = SearchQuery::new("cat").with_scope(SearchScope::Chapter);

    assert_eq!(search(&mut session, &f.project, query.clone(), Some(f.first)), Ok(2));
    assert_eq!(search(&mut session, &f.project, query.clone(), Some(f.nested)), Ok(1));
    // A scene directly below the project root searches the whole project tree.
    assert_eq!(search(&mut session, &f.project, query, Some(f.loose)), Ok(3));
}

#[test]
fn scene_scope_needs_an_open_scene() {
    let f = fixture();
    let mut session = SearchReplaceSession::new();
    let query = SearchQuery::new("cat").with_scope(SearchScope::Scene);
    assert_eq!(search(&mut session, &f.project, query.clone(), Some(f.note)), Ok(1));
    assert_eq!(
        search(&mut session, &f.project, query.clone(), None),
        Err(SessionError::NoActiveScene)
    );
    assert_eq!(
        search(&mut session, &f.project, query, Some(f.chapter)),
        Err(SessionError::NoActiveScene)
    );
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn titles_come_before_content_and_roots_are_skipped() {
    let f = fixture();
    let mut session = SearchReplaceSession::new();
    let query = SearchQuery::new("cat").with_titles(true);
    assert_eq!(search(&mut session, &f.project, query, None), Ok(5));
    let first = &session.occurrences()[0];
    assert_eq!(first.node, f.chapter);
    assert_eq!(first.field, FieldKind::Title);
    assert_eq!(first.range, 8..11);
}

#[test]
fn next_cycles_through_matches_in_two_scenes() {
    let (project, a, b) = two_scenes("a cat", "the cat");
    let mut session = SearchReplaceSession::new();
    assert_eq!(search(&mut session, &project, SearchQuery::new("cat"), None), Ok(2));

    assert_eq!(session.next().unwrap().node, a);
    assert_eq!(session.match_status(), "(1 of 2 matches)");
    assert_eq!(session.next().unwrap().node, b);
    assert_eq!(session.next().unwrap().node, a);
    assert_eq!(session.previous().unwrap().node, b);
}

#[test]
fn exclusion_hides_from_navigation_and_replace_all() {
    let (mut project, a, b) = two_scenes("cat", "cat");
    let mut session = SearchReplaceSession::new();
    let mut log = EditLog::new();
    search(&mut session, &project, SearchQuery::new("cat"), None).unwrap();

    session.exclude(0).unwrap();
    assert_eq!(session.next().unwrap().node, b);
    assert_eq!(session.next().unwrap().node, b);
    assert_eq!(session.occurrences().len(), 2);

    let report = session.replace_all("dog", &mut project, &mut log).unwrap();
    assert_eq!(report, ReplaceAllReport { replaced: 1, failed: 0 });
    assert_eq!(project.field(a, FieldKind::Content).unwrap(), "cat");
    assert_eq!(project.field(b, FieldKind::Content).unwrap(), "dog");
    assert_eq!(session.occurrences().len(), 1);
    assert!(session.occurrences()[0].excluded);

    session.include(0).unwrap();
    assert_eq!(session.next().unwrap().node, a);
}

#[test]
fn replace_current_pushes_one_command() {
    let (mut project, a, _) = two_scenes("a cat", "the cat");
    let mut session = SearchReplaceSession::new();
    let mut log = EditLog::new();
    search(&mut session, &project, SearchQuery::new("cat"), None).unwrap();
    session.next().unwrap();

    let label = session.replace_current("dog", &mut project, &mut log).unwrap();
    assert_eq!(label, "inserting \"dog\"");
    assert_eq!(log.len(), 1);
    assert_eq!(project.field(a, FieldKind::Content).unwrap(), "a dog");
    assert_eq!(session.occurrences().len(), 1);
    assert_eq!(session.current_index(), Some(0));
    assert_eq!(session.match_status(), "(1 of 1 matches)");

    log.undo(&mut project).unwrap();
    assert_eq!(project.field(a, FieldKind::Content).unwrap(), "a cat");
}

#[test]
fn replace_current_shifts_later_offsets_in_same_field() {
    let (mut project, a, _) = two_scenes("cat and cat", "");
    let mut session = SearchReplaceSession::new();
    let mut log = EditLog::new();
    search(&mut session, &project, SearchQuery::new("cat"), None).unwrap();
    session.next().unwrap();

    session.replace_current("tiger", &mut project, &mut log).unwrap();
    let text = project.field(a, FieldKind::Content).unwrap().to_string();
    assert_eq!(text, "tiger and cat");
    let remaining = &session.occurrences()[0];
    assert_eq!(remaining.range, 10..13);
    assert_eq!(&text[remaining.range.clone()], "cat");

    session.replace_current("lion", &mut project, &mut log).unwrap();
    assert_eq!(project.field(a, FieldKind::Content).unwrap(), "tiger and lion");
    assert_eq!(session.current_index(), None);
    assert_eq!(log.len(), 2);
}

#[test]
fn stale_occurrence_is_reported_without_changes() {
    let (mut project, a, _) = two_scenes("the cat", "");
    let mut session = SearchReplaceSession::new();
    let mut log = EditLog::new();
    search(&mut session, &project, SearchQuery::new("cat"), None).unwrap();
    session.next().unwrap();

    project
        .replace_in_field(a, FieldKind::Content, 0..3, "a")
        .unwrap();
    assert_eq!(
        session.replace_current("dog", &mut project, &mut log),
        Err(SessionError::StaleOccurrence(0))
    );
    assert_eq!(project.field(a, FieldKind::Content).unwrap(), "a cat");
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.occurrences().len(), 1);
    assert!(log.is_empty());
}

#[test]
fn replace_all_counts_stale_occurrences() {
    let (mut project, a, _) = two_scenes("cat cat cat", "");
    let mut session = SearchReplaceSession::new();
    let mut log = EditLog::new();
    search(&mut session, &project, SearchQuery::new("cat"), None).unwrap();
    assert_eq!(session.occurrences().len(), 3);

    project
        .replace_in_field(a, FieldKind::Content, 4..7, "cow")
        .unwrap();
    let report = session.replace_all("dogs", &mut project, &mut log).unwrap();
    assert_eq!(report, ReplaceAllReport { replaced: 2, failed: 1 });
    assert_eq!(log.len(), 2);
    assert_eq!(project.field(a, FieldKind::Content).unwrap(), "dogs cow dogs");
    assert!(session.occurrences().is_empty());
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(
        report.failure_message(session.translator()).as_deref(),
        Some("1 occurrences could not be replaced. The project might have changed since the results were found.")
    );

    log.undo(&mut project).unwrap();
    log.undo(&mut project).unwrap();
    assert_eq!(project.field(a, FieldKind::Content).unwrap(), "cat cow cat");
}

#[test]
fn cancelled_scan_returns_to_idle() {
    let f = fixture();
    let mut session = SearchReplaceSession::new();
    let events = session.subscribe();
    let token = CancellationToken::new();
    token.cancel();

    let result = session.start_search(&f.project, SearchQuery::new("cat"), None, &token);
    assert_eq!(result, Err(SessionError::Cancelled));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.occurrences().is_empty());
    assert!(events.try_iter().any(|event| event == SessionEvent::SearchCancelled));
}

#[test]
fn cancel_midway_discards_partial_results() {
    let f = fixture();
    let mut session = SearchReplaceSession::new();
    let events = session.subscribe();
    session
        .begin_search(&f.project, SearchQuery::new("cat"), None)
        .unwrap();
    // project root, chapter, first scene
    assert!(matches!(
        session.scan_step(&f.project, 3),
        Ok(ScanStatus::InProgress { scanned: 3, .. })
    ));
    assert_eq!(session.occurrences().len(), 1);

    session.cancel().unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.occurrences().is_empty());
    assert_eq!(session.current_index(), None);
    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(received.last(), Some(&SessionEvent::SearchCancelled));
    assert!(!received
        .iter()
        .any(|event| matches!(event, SessionEvent::SearchCompleted { .. })));

    assert!(matches!(
        session.scan_step(&f.project, 1),
        Err(SessionError::InvalidState {
            expected: SessionState::Scanning,
            actual: SessionState::Idle
        })
    ));
    assert!(matches!(
        session.cancel(),
        Err(SessionError::InvalidState { .. })
    ));
}

#[test]
fn token_cancelled_from_another_thread_stops_the_next_scan() {
    let f = fixture();
    let mut session = SearchReplaceSession::new();
    let token = CancellationToken::new();
    let remote = token.clone();
    std::thread::spawn(move || remote.cancel()).join().unwrap();

    let result = session.start_search(&f.project, SearchQuery::new("cat"), None, &token);
    assert_eq!(result, Err(SessionError::Cancelled));
    assert!(session.occurrences().is_empty());
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn regex_groups_expand_against_the_scanned_text() {
    let (mut project, a, _) = two_scenes("axx", "");
    let mut session = SearchReplaceSession::new();
    let mut log = EditLog::new();
    let query = SearchQuery::new(r"\B(x)").with_mode(SearchMode::Regex);
    assert_eq!(search(&mut session, &project, query, None), Ok(2));

    let report = session.replace_all("[$1]-", &mut project, &mut log).unwrap();
    assert_eq!(report, ReplaceAllReport { replaced: 2, failed: 0 });
    assert_eq!(project.field(a, FieldKind::Content).unwrap(), "a[x]-[x]-");
}

#[test]
fn replace_current_refuses_a_match_its_context_no_longer_supports() {
    let (mut project, a, _) = two_scenes("axx", "");
    let mut session = SearchReplaceSession::new();
    let mut log = EditLog::new();
    let query = SearchQuery::new(r"\B(x)").with_mode(SearchMode::Regex);
    search(&mut session, &project, query, None).unwrap();
    session.next().unwrap();

    session.replace_current("[$1]-", &mut project, &mut log).unwrap();
    assert_eq!(project.field(a, FieldKind::Content).unwrap(), "a[x]-x");
    assert_eq!(
        session.replace_current("[$1]-", &mut project, &mut log),
        Err(SessionError::StaleOccurrence(0))
    );
    assert_eq!(project.field(a, FieldKind::Content).unwrap(), "a[x]-x");
    assert_eq!(log.len(), 1);
}

#[test]
fn editing_during_a_stepwise_scan_invalidates_it() {
    let mut f = fixture();
    let mut session = SearchReplaceSession::new();
    let events = session.subscribe();
    session
        .begin_search(&f.project, SearchQuery::new("cat"), None)
        .unwrap();
    assert!(matches!(
        session.scan_step(&f.project, 2),
        Ok(ScanStatus::InProgress { scanned: 2, .. })
    ));

    f.project.rename(f.first, "Renamed").unwrap();
    assert_eq!(
        session.scan_step(&f.project, 2),
        Err(SessionError::ScanInvalidated)
    );
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.occurrences().is_empty());
    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(received.last(), Some(&SessionEvent::SearchInvalidated));

    assert_eq!(search(&mut session, &f.project, SearchQuery::new("cat"), None), Ok(4));
}

#[test]
fn stepwise_scan_reports_progress_then_completion() {
    let f = fixture();
    let mut session = SearchReplaceSession::new();
    let events = session.subscribe();
    session
        .begin_search(&f.project, SearchQuery::new("cat"), None)
        .unwrap();
    assert_eq!(session.state(), SessionState::Scanning);
    assert!(matches!(
        session.next(),
        Err(SessionError::InvalidState {
            expected: SessionState::Ready,
            actual: SessionState::Scanning
        })
    ));

    let total = f.project.len();
    let status = session.scan_step(&f.project, total).unwrap();
    assert_eq!(status, ScanStatus::Complete { matches: 4 });
    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            SessionEvent::SearchProgress {
                scanned: total,
                total
            },
            SessionEvent::SearchCompleted { matches: 4 },
        ]
    );
}
