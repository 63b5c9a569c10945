//! Demo data for `crosstracker init --demo`: project `demo` with a bug
//! tracker and a story tracker, two users and a project widget.

use rusqlite::{Connection, OptionalExtension};

use crosstracker::model::{ListWidget, UGROUP_REGISTERED};
use crosstracker::{FieldId, TqlResult, TrackerDatabaseBuilder, TrackerId, UserId, WidgetId};

/// Artifacts created by [`seed`].
pub const ARTIFACT_COUNT: usize = 6;

const DAY: i64 = 86_400;
const START: i64 = 1_704_067_200; // 2024-01-01T00:00:00Z

struct DemoTracker {
    id: TrackerId,
    title: FieldId,
    status: FieldId,
    assigned_to: FieldId,
    effort: FieldId,
    open: i64,
    closed: i64,
}

/// Populate an empty database.
pub fn seed(conn: &Connection) -> TqlResult<()> {
    let builder = TrackerDatabaseBuilder::new(conn);
    let project = builder.build_project("demo")?;
    let alice = builder.build_user("alice", "Alice Anderson", "alice@example.com")?;
    let bob = builder.build_user("bob", "Bob Brown", "bob@example.com")?;
    builder.add_user_to_project_members(alice, project)?;
    builder.add_user_to_project_admins(bob, project)?;

    let bugs = demo_tracker(&builder, project, "Bug", "fiesta-red", false)?;
    let stories = demo_tracker(&builder, project, "Story", "deep-blue", true)?;
    let due_date = builder.build_date_field(bugs.id, "due_date", false)?;
    builder.grant_read_permission_on_field(due_date, UGROUP_REGISTERED)?;

    let rows: [(&DemoTracker, &str, bool, UserId, i64); ARTIFACT_COUNT] = [
        (&bugs, "Crash when saving a report", true, alice, 3),
        (&bugs, "Typo in the login page", false, bob, 1),
        (&bugs, "Slow dashboard", true, bob, 5),
        (&bugs, "Export ignores filters", true, alice, 2),
        (&stories, "As a user I can export reports", true, alice, 8),
        (&stories, "As an admin I can archive projects", false, bob, 13),
    ];
    let mut artifacts = Vec::new();
    for (day, (tracker, title, open, assignee, effort)) in (0_i64..).zip(rows) {
        let submitted_on = START + day * DAY;
        let artifact = builder.build_artifact_submitted(tracker.id, alice, submitted_on)?;
        let changeset = builder.build_changeset_at(artifact, assignee, submitted_on + DAY / 2)?;
        builder.build_text_value(changeset, tracker.title, title, "text")?;
        let status = if open { tracker.open } else { tracker.closed };
        builder.build_list_value(changeset, tracker.status, status)?;
        builder.build_list_value(changeset, tracker.assigned_to, assignee)?;
        if tracker.id == stories.id {
            builder.build_float_value(changeset, tracker.effort, effort as f64 / 2.0)?;
        } else {
            builder.build_int_value(changeset, tracker.effort, effort)?;
            builder.build_date_value(changeset, due_date, submitted_on + 30 * DAY)?;
        }
        artifacts.push(artifact);
    }
    builder.build_parent_link(artifacts[4], artifacts[3])?;
    builder.build_artifact_link(artifacts[0], artifacts[2], "_covered_by")?;

    builder.build_project_widget(project)?;
    tracing::info!("Seeded demo project with {ARTIFACT_COUNT} artifacts");
    Ok(())
}

fn demo_tracker(
    builder: &TrackerDatabaseBuilder<'_>,
    project: i64,
    name: &str,
    color: &str,
    float_effort: bool,
) -> TqlResult<DemoTracker> {
    let id = builder.build_tracker(project, name, color)?;
    builder.set_view_permission_on_tracker(id, UGROUP_REGISTERED)?;
    let title = builder.build_string_field(id, "title")?;
    builder.build_title_semantic(id, title)?;
    let status = builder.build_static_list_field(id, "status", ListWidget::SelectBox)?;
    let values = builder.build_open_and_closed_values_for_field(status, id, &["Open"], &["Closed"])?;
    let assigned_to = builder.build_user_list_field(id, "assigned_to", ListWidget::SelectBox)?;
    builder.build_contributor_semantic(id, assigned_to)?;
    let effort = if float_effort {
        builder.build_float_field(id, "effort")?
    } else {
        builder.build_int_field(id, "effort")?
    };
    for field in [title, status, assigned_to, effort] {
        builder.grant_read_permission_on_field(field, UGROUP_REGISTERED)?;
    }
    Ok(DemoTracker {
        id,
        title,
        status,
        assigned_to,
        effort,
        open: values.open[0],
        closed: values.closed[0],
    })
}

/// The widget of the demo project, if seeded.
pub fn project_widget(conn: &Connection) -> TqlResult<WidgetId> {
    let widget = conn
        .query_row(
            "SELECT w.id FROM plugin_crosstracker_widget AS w
             INNER JOIN project AS p ON p.id = w.project_id
             WHERE p.short_name = 'demo'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    widget.ok_or_else(|| crosstracker::TqlError::NotFound("demo widget".to_string()))
}
