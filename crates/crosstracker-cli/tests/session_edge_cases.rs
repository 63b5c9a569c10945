//! Integration tests for the CLI session over a database file.

use crosstracker::{Page, QueryReport, TqlError};
use crosstracker_cli::demo::{self, ARTIFACT_COUNT};
use crosstracker_cli::{render_report, OutputFormat, ScopeArgs, TrackerSession};

// ─────────────────────── helpers ───────────────────────

/// Open a session on a fresh database file holding the demo data.
fn demo_session(dir: &tempfile::TempDir) -> TrackerSession {
    let path = dir.path().join("data").join("tracker.db");
    let session = TrackerSession::open(path.to_str().unwrap(), Default::default()).unwrap();
    demo::seed(session.connection()).unwrap();
    session
}

fn demo_scope() -> ScopeArgs {
    ScopeArgs {
        project: Some("demo".to_string()),
        trackers: Vec::new(),
    }
}

/// Run a query in the demo project as `user`.
fn query(session: &TrackerSession, user: Option<&str>, tql: &str) -> Result<QueryReport, TqlError> {
    let scope = session.scope(&demo_scope()).unwrap();
    let user = session.user(user)?;
    session.query(tql, &scope, &user, Page::default())
}

// ─────────────────────── queries ───────────────────────

#[test]
fn test_demo_data_is_queryable() {
    let dir = tempfile::tempdir().unwrap();
    let session = demo_session(&dir);

    let all = query(&session, Some("alice"), "SELECT @pretty_title FROM @project = 'self'").unwrap();
    assert_eq!(all.total_size, ARTIFACT_COUNT);

    let open = query(
        &session,
        Some("alice"),
        "SELECT @title FROM @project = 'self' WHERE @status = OPEN()",
    )
    .unwrap();
    assert_eq!(open.total_size, 4);

    let mine = query(
        &session,
        Some("alice"),
        "SELECT @id FROM @project = 'self' WHERE @assigned_to = MYSELF()",
    )
    .unwrap();
    assert_eq!(mine.total_size, 3);

    let children = query(&session, Some("bob"), "SELECT @id FROM @project = 'self' WHERE WITH PARENT").unwrap();
    assert_eq!(children.total_size, 1);
}

#[test]
fn test_effort_spans_int_and_float_fields() {
    let dir = tempfile::tempdir().unwrap();
    let session = demo_session(&dir);

    let report = query(
        &session,
        Some("alice"),
        "SELECT effort FROM @project = 'self' WHERE effort >= 4 ORDER BY effort DESC",
    )
    .unwrap();
    let json = serde_json::to_value(&report.artifacts).unwrap();
    let efforts: Vec<f64> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["effort"]["value"].as_f64().unwrap())
        .collect();
    assert_eq!(efforts, vec![6.5, 5.0, 4.0]);
}

#[test]
fn test_table_output() {
    let dir = tempfile::tempdir().unwrap();
    let session = demo_session(&dir);
    let report = query(
        &session,
        Some("alice"),
        "SELECT @title, @status FROM @project = 'self' WHERE @title = 'slow'",
    )
    .unwrap();
    let table = render_report(&report, OutputFormat::Table).unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("@artifact"));
    assert!(lines[2].contains("Slow dashboard"));
    assert!(lines[2].ends_with("Open"));
    assert_eq!(lines[3], "1 of 1 artifact(s)");
}

// ─────────────────────── errors ───────────────────────

#[test]
fn test_anonymous_cannot_see_demo_trackers() {
    let dir = tempfile::tempdir().unwrap();
    let session = demo_session(&dir);
    let result = query(&session, None, "SELECT @id FROM @project = 'self'");
    match result {
        Err(TqlError::Invalid(faults)) => {
            assert_eq!(faults.iter().map(|f| f.code()).collect::<Vec<_>>(), vec!["no_tracker_in_scope"]);
        }
        other => panic!("expected faults, got {other:?}"),
    }
}

#[test]
fn test_unknown_user() {
    let dir = tempfile::tempdir().unwrap();
    let session = demo_session(&dir);
    assert!(matches!(session.user(Some("mallory")), Err(TqlError::NotFound(_))));
}

#[test]
fn test_unknown_project_scope() {
    let dir = tempfile::tempdir().unwrap();
    let session = demo_session(&dir);
    let error = session
        .scope(&ScopeArgs {
            project: Some("elsewhere".to_string()),
            trackers: Vec::new(),
        })
        .unwrap_err();
    assert!(error.to_string().contains("elsewhere"));
}

// ─────────────────────── persistence ───────────────────────

#[test]
fn test_saved_queries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("tracker.db");
    let uuid = {
        let session = demo_session(&dir);
        let alice = session.user(Some("alice")).unwrap();
        let widget = demo::project_widget(session.connection()).unwrap();
        session
            .save(
                widget,
                "SELECT @title FROM @project = 'self' WHERE @status != OPEN()",
                "Closed",
                "Everything done",
                &alice,
            )
            .unwrap()
            .uuid
    };

    let session = TrackerSession::open(path.to_str().unwrap(), Default::default()).unwrap();
    let alice = session.user(Some("alice")).unwrap();
    let report = session.run(&uuid, &alice, Page::new(1, 0)).unwrap();
    assert_eq!(report.total_size, 2);
    assert_eq!(report.artifacts.len(), 1);

    let widget = demo::project_widget(session.connection()).unwrap();
    let saved = session.list(widget).unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].description, "Everything done");
}
