//! SQLite storage of the tracker/changeset schema the engine queries.
//!
//! [`SCHEMA`] creates the tables; [`TrackerDatabaseBuilder`] populates them
//! row by row (used by the test suites and by `crosstracker init --demo`).

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};

use crate::model::{
    FieldKind, ListBind, ListWidget, UGROUP_ANONYMOUS, UGROUP_PROJECT_ADMIN,
    UGROUP_PROJECT_MEMBERS, UGROUP_REGISTERED,
};
use crate::types::{
    ArtifactId, BindValueId, ChangesetId, FieldId, ProjectId, TrackerId, TqlResult, UgroupId,
    UserId,
};

/// DDL of every table read by the engine.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS project (
    id INTEGER PRIMARY KEY,
    short_name TEXT NOT NULL UNIQUE,
    public_name TEXT NOT NULL,
    icon TEXT NOT NULL DEFAULT '',
    is_public INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS project_aggregation (
    parent_project_id INTEGER NOT NULL,
    child_project_id INTEGER NOT NULL,
    PRIMARY KEY (parent_project_id, child_project_id)
);
CREATE TABLE IF NOT EXISTS user (
    id INTEGER PRIMARY KEY,
    user_name TEXT NOT NULL UNIQUE,
    real_name TEXT NOT NULL,
    email TEXT NOT NULL DEFAULT '',
    avatar_url TEXT NOT NULL DEFAULT '',
    is_site_admin INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS project_member (
    project_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    is_admin INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (project_id, user_id)
);
CREATE TABLE IF NOT EXISTS ugroup (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    project_id INTEGER
);
CREATE TABLE IF NOT EXISTS ugroup_user (
    ugroup_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    PRIMARY KEY (ugroup_id, user_id)
);
CREATE TABLE IF NOT EXISTS tracker (
    id INTEGER PRIMARY KEY,
    group_id INTEGER NOT NULL,
    item_name TEXT NOT NULL,
    name TEXT NOT NULL,
    color TEXT NOT NULL DEFAULT 'inca-silver',
    deletion_date INTEGER
);
CREATE TABLE IF NOT EXISTS tracker_permission (
    tracker_id INTEGER NOT NULL,
    ugroup_id INTEGER NOT NULL,
    PRIMARY KEY (tracker_id, ugroup_id)
);
CREATE TABLE IF NOT EXISTS tracker_field (
    id INTEGER PRIMARY KEY,
    tracker_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    label TEXT NOT NULL,
    formElement_type TEXT NOT NULL,
    bind_type TEXT,
    display_time INTEGER NOT NULL DEFAULT 0,
    use_it INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_tracker_field_tracker ON tracker_field (tracker_id, name);
CREATE TABLE IF NOT EXISTS tracker_field_permission (
    field_id INTEGER NOT NULL,
    ugroup_id INTEGER NOT NULL,
    PRIMARY KEY (field_id, ugroup_id)
);
CREATE TABLE IF NOT EXISTS tracker_field_list_bind_static_value (
    id INTEGER PRIMARY KEY,
    field_id INTEGER NOT NULL,
    label TEXT NOT NULL,
    rank INTEGER NOT NULL DEFAULT 0,
    color TEXT,
    is_hidden INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS tracker_field_openlist_value (
    id INTEGER PRIMARY KEY,
    field_id INTEGER NOT NULL,
    label TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS tracker_semantic_title (
    tracker_id INTEGER PRIMARY KEY,
    field_id INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS tracker_semantic_description (
    tracker_id INTEGER PRIMARY KEY,
    field_id INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS tracker_semantic_status (
    tracker_id INTEGER NOT NULL,
    field_id INTEGER NOT NULL,
    open_value_id INTEGER NOT NULL,
    PRIMARY KEY (tracker_id, field_id, open_value_id)
);
CREATE TABLE IF NOT EXISTS tracker_semantic_contributor (
    tracker_id INTEGER PRIMARY KEY,
    field_id INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS tracker_artifact (
    id INTEGER PRIMARY KEY,
    tracker_id INTEGER NOT NULL,
    last_changeset_id INTEGER,
    submitted_by INTEGER NOT NULL,
    submitted_on INTEGER NOT NULL,
    use_artifact_permissions INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_tracker_artifact_tracker ON tracker_artifact (tracker_id);
CREATE TABLE IF NOT EXISTS artifact_permission (
    artifact_id INTEGER NOT NULL,
    ugroup_id INTEGER NOT NULL,
    PRIMARY KEY (artifact_id, ugroup_id)
);
CREATE TABLE IF NOT EXISTS tracker_changeset (
    id INTEGER PRIMARY KEY,
    artifact_id INTEGER NOT NULL,
    submitted_by INTEGER,
    submitted_on INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS tracker_changeset_value (
    id INTEGER PRIMARY KEY,
    changeset_id INTEGER NOT NULL,
    field_id INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_changeset_value ON tracker_changeset_value (changeset_id, field_id);
CREATE TABLE IF NOT EXISTS tracker_changeset_value_date (
    changeset_value_id INTEGER PRIMARY KEY,
    value INTEGER
);
CREATE TABLE IF NOT EXISTS tracker_changeset_value_int (
    changeset_value_id INTEGER PRIMARY KEY,
    value INTEGER
);
CREATE TABLE IF NOT EXISTS tracker_changeset_value_float (
    changeset_value_id INTEGER PRIMARY KEY,
    value REAL
);
CREATE TABLE IF NOT EXISTS tracker_changeset_value_text (
    changeset_value_id INTEGER PRIMARY KEY,
    value TEXT NOT NULL,
    body_format TEXT NOT NULL DEFAULT 'text'
);
CREATE TABLE IF NOT EXISTS tracker_changeset_value_list (
    changeset_value_id INTEGER NOT NULL,
    bindvalue_id INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS tracker_changeset_value_openlist (
    changeset_value_id INTEGER NOT NULL,
    bindvalue_id INTEGER,
    openvalue_id INTEGER
);
CREATE TABLE IF NOT EXISTS tracker_artifact_link (
    source_artifact_id INTEGER NOT NULL,
    target_artifact_id INTEGER NOT NULL,
    nature TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (source_artifact_id, target_artifact_id)
);
CREATE TABLE IF NOT EXISTS plugin_crosstracker_widget (
    id INTEGER PRIMARY KEY,
    project_id INTEGER,
    user_id INTEGER
);
CREATE TABLE IF NOT EXISTS plugin_crosstracker_query (
    id TEXT PRIMARY KEY,
    widget_id INTEGER NOT NULL,
    query TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT ''
);
";

/// Nature of a parent → child artifact link.
pub const NATURE_IS_CHILD: &str = "_is_child";

/// Create the schema and the dynamic user groups.
pub fn initialize(conn: &Connection) -> TqlResult<()> {
    conn.execute_batch(SCHEMA)?;
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO ugroup (id, name, project_id) VALUES (?1, ?2, NULL)")?;
    for (id, name) in [
        (UGROUP_ANONYMOUS, "Anonymous"),
        (UGROUP_REGISTERED, "Registered users"),
        (UGROUP_PROJECT_MEMBERS, "Project members"),
        (UGROUP_PROJECT_ADMIN, "Project administrators"),
    ] {
        stmt.execute(params![id, name])?;
    }
    tracing::debug!("Tracker schema initialized");
    Ok(())
}

/// Open (or create) a database file and make sure the schema exists.
pub fn open(path: &std::path::Path) -> TqlResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    initialize(&conn)?;
    Ok(conn)
}

/// An in-memory database with the schema created.
pub fn open_in_memory() -> TqlResult<Connection> {
    let conn = Connection::open_in_memory()?;
    initialize(&conn)?;
    Ok(conn)
}

/// Bind value ids created for a status field.
#[derive(Debug, Clone, Default)]
pub struct OpenAndClosedValues {
    pub open: Vec<BindValueId>,
    pub closed: Vec<BindValueId>,
}

/// Populates a tracker database row by row.
pub struct TrackerDatabaseBuilder<'c> {
    conn: &'c Connection,
}

const DEFAULT_SUBMITTED_ON: i64 = 1_700_000_000;

impl<'c> TrackerDatabaseBuilder<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // ── Projects and users ──

    pub fn build_project(&self, short_name: &str) -> TqlResult<ProjectId> {
        self.insert_project(short_name, true)
    }

    pub fn build_private_project(&self, short_name: &str) -> TqlResult<ProjectId> {
        self.insert_project(short_name, false)
    }

    fn insert_project(&self, short_name: &str, is_public: bool) -> TqlResult<ProjectId> {
        self.conn.execute(
            "INSERT INTO project (short_name, public_name, icon, is_public) VALUES (?1, ?2, '', ?3)",
            params![short_name, short_name, is_public],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_project_icon(&self, project_id: ProjectId, icon: &str) -> TqlResult<()> {
        self.conn.execute(
            "UPDATE project SET icon = ?1 WHERE id = ?2",
            params![icon, project_id],
        )?;
        Ok(())
    }

    pub fn aggregate_project(&self, parent: ProjectId, child: ProjectId) -> TqlResult<()> {
        self.conn.execute(
            "INSERT INTO project_aggregation (parent_project_id, child_project_id) VALUES (?1, ?2)",
            params![parent, child],
        )?;
        Ok(())
    }

    pub fn build_user(&self, user_name: &str, real_name: &str, email: &str) -> TqlResult<UserId> {
        self.conn.execute(
            "INSERT INTO user (user_name, real_name, email, avatar_url) VALUES (?1, ?2, ?3, ?4)",
            params![
                user_name,
                real_name,
                email,
                format!("https://example.com/users/{user_name}/avatar.png")
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn build_site_admin(&self, user_name: &str, real_name: &str) -> TqlResult<UserId> {
        let id = self.build_user(user_name, real_name, "")?;
        self.conn
            .execute("UPDATE user SET is_site_admin = 1 WHERE id = ?1", params![id])?;
        Ok(id)
    }

    pub fn add_user_to_project_members(&self, user_id: UserId, project_id: ProjectId) -> TqlResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO project_member (project_id, user_id, is_admin) VALUES (?1, ?2, 0)",
            params![project_id, user_id],
        )?;
        Ok(())
    }

    pub fn add_user_to_project_admins(&self, user_id: UserId, project_id: ProjectId) -> TqlResult<()> {
        self.conn.execute(
            "INSERT INTO project_member (project_id, user_id, is_admin) VALUES (?1, ?2, 1)
             ON CONFLICT (project_id, user_id) DO UPDATE SET is_admin = 1",
            params![project_id, user_id],
        )?;
        Ok(())
    }

    pub fn build_static_ugroup(&self, project_id: ProjectId, name: &str) -> TqlResult<UgroupId> {
        let next: i64 = self.conn.query_row(
            "SELECT MAX(101, COALESCE(MAX(id), 0) + 1) FROM ugroup",
            [],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO ugroup (id, name, project_id) VALUES (?1, ?2, ?3)",
            params![next, name, project_id],
        )?;
        Ok(next)
    }

    pub fn add_user_to_ugroup(&self, user_id: UserId, ugroup_id: UgroupId) -> TqlResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO ugroup_user (ugroup_id, user_id) VALUES (?1, ?2)",
            params![ugroup_id, user_id],
        )?;
        Ok(())
    }

    // ── Trackers and fields ──

    pub fn build_tracker(&self, project_id: ProjectId, name: &str, color: &str) -> TqlResult<TrackerId> {
        self.conn.execute(
            "INSERT INTO tracker (group_id, item_name, name, color) VALUES (?1, ?2, ?3, ?4)",
            params![project_id, name.to_lowercase(), name, color],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn delete_tracker(&self, tracker_id: TrackerId) -> TqlResult<()> {
        self.conn.execute(
            "UPDATE tracker SET deletion_date = ?1 WHERE id = ?2",
            params![DEFAULT_SUBMITTED_ON, tracker_id],
        )?;
        Ok(())
    }

    pub fn set_view_permission_on_tracker(&self, tracker_id: TrackerId, ugroup_id: UgroupId) -> TqlResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO tracker_permission (tracker_id, ugroup_id) VALUES (?1, ?2)",
            params![tracker_id, ugroup_id],
        )?;
        Ok(())
    }

    /// Insert a field of any queryable kind.
    pub fn build_field(&self, tracker_id: TrackerId, name: &str, kind: FieldKind) -> TqlResult<FieldId> {
        let (bind, display_time) = match kind {
            FieldKind::Date { with_time } => (None, with_time),
            FieldKind::List { bind, .. } => (Some(bind.code()), false),
            _ => (None, false),
        };
        self.conn.execute(
            "INSERT INTO tracker_field (tracker_id, name, label, formElement_type, bind_type, display_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![tracker_id, name, name, kind.type_code(), bind, display_time],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn build_date_field(&self, tracker_id: TrackerId, name: &str, with_time: bool) -> TqlResult<FieldId> {
        self.build_field(tracker_id, name, FieldKind::Date { with_time })
    }

    pub fn build_int_field(&self, tracker_id: TrackerId, name: &str) -> TqlResult<FieldId> {
        self.build_field(tracker_id, name, FieldKind::Int)
    }

    pub fn build_float_field(&self, tracker_id: TrackerId, name: &str) -> TqlResult<FieldId> {
        self.build_field(tracker_id, name, FieldKind::Float)
    }

    pub fn build_string_field(&self, tracker_id: TrackerId, name: &str) -> TqlResult<FieldId> {
        self.build_field(tracker_id, name, FieldKind::String)
    }

    pub fn build_text_field(&self, tracker_id: TrackerId, name: &str) -> TqlResult<FieldId> {
        self.build_field(tracker_id, name, FieldKind::Text)
    }

    pub fn build_static_list_field(&self, tracker_id: TrackerId, name: &str, widget: ListWidget) -> TqlResult<FieldId> {
        self.build_field(
            tracker_id,
            name,
            FieldKind::List {
                widget,
                bind: ListBind::Static,
            },
        )
    }

    pub fn build_user_list_field(&self, tracker_id: TrackerId, name: &str, widget: ListWidget) -> TqlResult<FieldId> {
        self.build_field(
            tracker_id,
            name,
            FieldKind::List {
                widget,
                bind: ListBind::Users,
            },
        )
    }

    pub fn build_user_group_list_field(&self, tracker_id: TrackerId, name: &str, widget: ListWidget) -> TqlResult<FieldId> {
        self.build_field(
            tracker_id,
            name,
            FieldKind::List {
                widget,
                bind: ListBind::UserGroups,
            },
        )
    }

    pub fn grant_read_permission_on_field(&self, field_id: FieldId, ugroup_id: UgroupId) -> TqlResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO tracker_field_permission (field_id, ugroup_id) VALUES (?1, ?2)",
            params![field_id, ugroup_id],
        )?;
        Ok(())
    }

    /// Create static values in order; ranks follow the slice order.
    pub fn build_values_for_static_list_field(
        &self,
        field_id: FieldId,
        labels: &[&str],
    ) -> TqlResult<HashMap<String, BindValueId>> {
        let mut ids = HashMap::new();
        for (rank, label) in labels.iter().enumerate() {
            self.conn.execute(
                "INSERT INTO tracker_field_list_bind_static_value (field_id, label, rank) VALUES (?1, ?2, ?3)",
                params![field_id, label, rank as i64],
            )?;
            ids.insert(label.to_string(), self.conn.last_insert_rowid());
        }
        Ok(ids)
    }

    pub fn set_static_value_color(&self, bind_value_id: BindValueId, color: &str) -> TqlResult<()> {
        self.conn.execute(
            "UPDATE tracker_field_list_bind_static_value SET color = ?1 WHERE id = ?2",
            params![color, bind_value_id],
        )?;
        Ok(())
    }

    /// Create values typed by users in an open list.
    pub fn build_values_for_static_open_list_field(
        &self,
        field_id: FieldId,
        labels: &[&str],
    ) -> TqlResult<HashMap<String, i64>> {
        let mut ids = HashMap::new();
        for label in labels {
            self.conn.execute(
                "INSERT INTO tracker_field_openlist_value (field_id, label) VALUES (?1, ?2)",
                params![field_id, label],
            )?;
            ids.insert(label.to_string(), self.conn.last_insert_rowid());
        }
        Ok(ids)
    }

    /// Create values for a status field and declare the open ones in the status semantic.
    pub fn build_open_and_closed_values_for_field(
        &self,
        field_id: FieldId,
        tracker_id: TrackerId,
        open: &[&str],
        closed: &[&str],
    ) -> TqlResult<OpenAndClosedValues> {
        let all: Vec<&str> = open.iter().chain(closed.iter()).copied().collect();
        let ids = self.build_values_for_static_list_field(field_id, &all)?;
        let values = OpenAndClosedValues {
            open: open.iter().filter_map(|l| ids.get(*l).copied()).collect(),
            closed: closed.iter().filter_map(|l| ids.get(*l).copied()).collect(),
        };
        self.build_status_semantic(tracker_id, field_id, &values.open)?;
        Ok(values)
    }

    // ── Semantics ──

    pub fn build_title_semantic(&self, tracker_id: TrackerId, field_id: FieldId) -> TqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tracker_semantic_title (tracker_id, field_id) VALUES (?1, ?2)",
            params![tracker_id, field_id],
        )?;
        Ok(())
    }

    pub fn build_description_semantic(&self, tracker_id: TrackerId, field_id: FieldId) -> TqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tracker_semantic_description (tracker_id, field_id) VALUES (?1, ?2)",
            params![tracker_id, field_id],
        )?;
        Ok(())
    }

    pub fn build_contributor_semantic(&self, tracker_id: TrackerId, field_id: FieldId) -> TqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tracker_semantic_contributor (tracker_id, field_id) VALUES (?1, ?2)",
            params![tracker_id, field_id],
        )?;
        Ok(())
    }

    pub fn build_status_semantic(
        &self,
        tracker_id: TrackerId,
        field_id: FieldId,
        open_value_ids: &[BindValueId],
    ) -> TqlResult<()> {
        for open_value_id in open_value_ids {
            self.conn.execute(
                "INSERT OR IGNORE INTO tracker_semantic_status (tracker_id, field_id, open_value_id) VALUES (?1, ?2, ?3)",
                params![tracker_id, field_id, open_value_id],
            )?;
        }
        Ok(())
    }

    // ── Artifacts and changesets ──

    pub fn build_artifact(&self, tracker_id: TrackerId) -> TqlResult<ArtifactId> {
        self.build_artifact_submitted(tracker_id, 0, DEFAULT_SUBMITTED_ON)
    }

    pub fn build_artifact_submitted(
        &self,
        tracker_id: TrackerId,
        submitted_by: UserId,
        submitted_on: i64,
    ) -> TqlResult<ArtifactId> {
        self.conn.execute(
            "INSERT INTO tracker_artifact (tracker_id, submitted_by, submitted_on) VALUES (?1, ?2, ?3)",
            params![tracker_id, submitted_by, submitted_on],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// A changeset submitted by the artifact submitter, becoming the last one.
    pub fn build_last_changeset(&self, artifact_id: ArtifactId) -> TqlResult<ChangesetId> {
        let (submitted_by, submitted_on): (i64, i64) = self.conn.query_row(
            "SELECT submitted_by, submitted_on FROM tracker_artifact WHERE id = ?1",
            params![artifact_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        self.build_changeset_at(artifact_id, submitted_by, submitted_on)
    }

    pub fn build_changeset_at(
        &self,
        artifact_id: ArtifactId,
        submitted_by: UserId,
        submitted_on: i64,
    ) -> TqlResult<ChangesetId> {
        self.conn.execute(
            "INSERT INTO tracker_changeset (artifact_id, submitted_by, submitted_on) VALUES (?1, ?2, ?3)",
            params![artifact_id, submitted_by, submitted_on],
        )?;
        let changeset_id = self.conn.last_insert_rowid();
        self.conn.execute(
            "UPDATE tracker_artifact SET last_changeset_id = ?1 WHERE id = ?2",
            params![changeset_id, artifact_id],
        )?;
        Ok(changeset_id)
    }

    fn changeset_value(&self, changeset_id: ChangesetId, field_id: FieldId) -> TqlResult<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM tracker_changeset_value WHERE changeset_id = ?1 AND field_id = ?2",
                params![changeset_id, field_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO tracker_changeset_value (changeset_id, field_id) VALUES (?1, ?2)",
            params![changeset_id, field_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn build_date_value(&self, changeset_id: ChangesetId, field_id: FieldId, timestamp: i64) -> TqlResult<()> {
        let value_id = self.changeset_value(changeset_id, field_id)?;
        self.conn.execute(
            "INSERT INTO tracker_changeset_value_date (changeset_value_id, value) VALUES (?1, ?2)",
            params![value_id, timestamp],
        )?;
        Ok(())
    }

    pub fn build_int_value(&self, changeset_id: ChangesetId, field_id: FieldId, value: i64) -> TqlResult<()> {
        let value_id = self.changeset_value(changeset_id, field_id)?;
        self.conn.execute(
            "INSERT INTO tracker_changeset_value_int (changeset_value_id, value) VALUES (?1, ?2)",
            params![value_id, value],
        )?;
        Ok(())
    }

    pub fn build_float_value(&self, changeset_id: ChangesetId, field_id: FieldId, value: f64) -> TqlResult<()> {
        let value_id = self.changeset_value(changeset_id, field_id)?;
        self.conn.execute(
            "INSERT INTO tracker_changeset_value_float (changeset_value_id, value) VALUES (?1, ?2)",
            params![value_id, value],
        )?;
        Ok(())
    }

    /// `format` is one of `text`, `html` or `commonmark`.
    pub fn build_text_value(
        &self,
        changeset_id: ChangesetId,
        field_id: FieldId,
        value: &str,
        format: &str,
    ) -> TqlResult<()> {
        let value_id = self.changeset_value(changeset_id, field_id)?;
        self.conn.execute(
            "INSERT INTO tracker_changeset_value_text (changeset_value_id, value, body_format) VALUES (?1, ?2, ?3)",
            params![value_id, value, format],
        )?;
        Ok(())
    }

    /// Select a bound value (static value id, user id or ugroup id).
    pub fn build_list_value(
        &self,
        changeset_id: ChangesetId,
        field_id: FieldId,
        bind_value_id: BindValueId,
    ) -> TqlResult<()> {
        let value_id = self.changeset_value(changeset_id, field_id)?;
        self.conn.execute(
            "INSERT INTO tracker_changeset_value_list (changeset_value_id, bindvalue_id) VALUES (?1, ?2)",
            params![value_id, bind_value_id],
        )?;
        Ok(())
    }

    /// Select a value of an open list: either a typed open value or a bound one.
    pub fn build_open_value(
        &self,
        changeset_id: ChangesetId,
        field_id: FieldId,
        id: i64,
        is_open_value: bool,
    ) -> TqlResult<()> {
        let value_id = self.changeset_value(changeset_id, field_id)?;
        let (bind_value, open_value) = if is_open_value {
            (None, Some(id))
        } else {
            (Some(id), None)
        };
        self.conn.execute(
            "INSERT INTO tracker_changeset_value_openlist (changeset_value_id, bindvalue_id, openvalue_id) VALUES (?1, ?2, ?3)",
            params![value_id, bind_value, open_value],
        )?;
        Ok(())
    }

    /// Restrict an artifact to the given groups.
    pub fn set_artifact_permissions(&self, artifact_id: ArtifactId, ugroups: &[UgroupId]) -> TqlResult<()> {
        self.conn.execute(
            "UPDATE tracker_artifact SET use_artifact_permissions = 1 WHERE id = ?1",
            params![artifact_id],
        )?;
        for ugroup_id in ugroups {
            self.conn.execute(
                "INSERT OR IGNORE INTO artifact_permission (artifact_id, ugroup_id) VALUES (?1, ?2)",
                params![artifact_id, ugroup_id],
            )?;
        }
        Ok(())
    }

    pub fn build_artifact_link(&self, source: ArtifactId, target: ArtifactId, nature: &str) -> TqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tracker_artifact_link (source_artifact_id, target_artifact_id, nature) VALUES (?1, ?2, ?3)",
            params![source, target, nature],
        )?;
        Ok(())
    }

    /// `parent` becomes the parent of `child`.
    pub fn build_parent_link(&self, parent: ArtifactId, child: ArtifactId) -> TqlResult<()> {
        self.build_artifact_link(parent, child, NATURE_IS_CHILD)
    }

    // ── Widgets ──

    pub fn build_project_widget(&self, project_id: ProjectId) -> TqlResult<i64> {
        self.conn.execute(
            "INSERT INTO plugin_crosstracker_widget (project_id, user_id) VALUES (?1, NULL)",
            params![project_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn build_user_widget(&self, user_id: UserId) -> TqlResult<i64> {
        self.conn.execute(
            "INSERT INTO plugin_crosstracker_widget (project_id, user_id) VALUES (NULL, ?1)",
            params![user_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let conn = open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM ugroup", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 4);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tracker.db");
        open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_multiple_list_values_share_changeset_value() {
        let conn = open_in_memory().unwrap();
        let builder = TrackerDatabaseBuilder::new(&conn);
        let project = builder.build_project("acme").unwrap();
        let tracker = builder.build_tracker(project, "Bug", "fiesta-red").unwrap();
        let field = builder
            .build_static_list_field(tracker, "os", ListWidget::MultiSelectBox)
            .unwrap();
        let values = builder
            .build_values_for_static_list_field(field, &["Linux", "BSD"])
            .unwrap();
        let artifact = builder.build_artifact(tracker).unwrap();
        let changeset = builder.build_last_changeset(artifact).unwrap();
        builder.build_list_value(changeset, field, values["Linux"]).unwrap();
        builder.build_list_value(changeset, field, values["BSD"]).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM tracker_changeset_value", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        let last: i64 = conn
            .query_row(
                "SELECT last_changeset_id FROM tracker_artifact WHERE id = ?1",
                params![artifact],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(last, changeset);
    }

    #[test]
    fn test_static_ugroups_start_above_threshold() {
        let conn = open_in_memory().unwrap();
        let builder = TrackerDatabaseBuilder::new(&conn);
        let project = builder.build_project("acme").unwrap();
        let first = builder.build_static_ugroup(project, "Developers").unwrap();
        let second = builder.build_static_ugroup(project, "Testers").unwrap();
        assert_eq!(first, 101);
        assert_eq!(second, 102);
    }
}
