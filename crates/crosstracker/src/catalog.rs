//! Loading of the host model (projects, trackers, users) from the store.

use std::collections::BTreeMap;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::model::{
    FieldKind, Membership, Project, StatusSemantic, Tracker, TrackerField, User,
};
use crate::types::{FieldId, ProjectId, TrackerId, TqlResult, UserId};

/// Read access to the host model used during validation.
pub trait TrackerCatalog {
    fn project(&self, id: ProjectId) -> TqlResult<Option<Project>>;

    fn project_by_short_name(&self, short_name: &str) -> TqlResult<Option<Project>>;

    /// Projects aggregated under a program project.
    fn aggregated_projects(&self, parent: ProjectId) -> TqlResult<Vec<Project>>;

    /// Non-deleted trackers of the given projects, ordered by id.
    fn trackers_of_projects(&self, project_ids: &[ProjectId]) -> TqlResult<Vec<Tracker>>;

    fn tracker(&self, id: TrackerId) -> TqlResult<Option<Tracker>>;

    fn user(&self, id: UserId) -> TqlResult<Option<User>>;

    fn user_by_name(&self, user_name: &str) -> TqlResult<Option<User>>;
}

/// [`TrackerCatalog`] backed by the SQLite store.
pub struct SqliteCatalog<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteCatalog<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn fields_of(&self, tracker_id: TrackerId) -> TqlResult<Vec<TrackerField>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, label, formElement_type, bind_type, display_time
             FROM tracker_field WHERE tracker_id = ?1 AND use_it = 1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![tracker_id], |row| {
            Ok((
                row.get::<_, FieldId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, bool>(5)?,
            ))
        })?;

        let mut fields = Vec::new();
        for row in rows {
            let (id, name, label, type_code, bind, display_time) = row?;
            // Unsupported field types (files, links, ...) are not queryable.
            let Some(kind) = FieldKind::from_storage(&type_code, bind.as_deref(), display_time)
            else {
                continue;
            };
            fields.push(TrackerField {
                id,
                tracker_id,
                name,
                label,
                kind,
                read_ugroups: self.ids(
                    "SELECT ugroup_id FROM tracker_field_permission WHERE field_id = ?1 ORDER BY ugroup_id",
                    id,
                )?,
            });
        }
        Ok(fields)
    }

    fn ids(&self, sql: &str, key: i64) -> TqlResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let ids = stmt
            .query_map(params![key], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn semantic_field(&self, table: &str, tracker_id: TrackerId) -> TqlResult<Option<FieldId>> {
        let sql = format!("SELECT field_id FROM {table} WHERE tracker_id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![tracker_id], |row| row.get(0))
            .optional()?)
    }

    fn status_semantic(&self, tracker_id: TrackerId) -> TqlResult<Option<StatusSemantic>> {
        let mut stmt = self.conn.prepare(
            "SELECT field_id, open_value_id FROM tracker_semantic_status
             WHERE tracker_id = ?1 ORDER BY open_value_id",
        )?;
        let rows = stmt
            .query_map(params![tracker_id], |row| {
                Ok((row.get::<_, FieldId>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let Some((field_id, _)) = rows.first().copied() else {
            return Ok(None);
        };
        Ok(Some(StatusSemantic {
            field_id,
            open_value_ids: rows
                .into_iter()
                .filter(|(f, _)| *f == field_id)
                .map(|(_, v)| v)
                .collect(),
        }))
    }

    fn complete_tracker(
        &self,
        project: Project,
        (id, item_name, name, color): (TrackerId, String, String, String),
    ) -> TqlResult<Tracker> {
        let fields = self.fields_of(id)?;
        let status = self.status_semantic(id)?;
        let title_field = self.semantic_field("tracker_semantic_title", id)?;
        let description_field = self.semantic_field("tracker_semantic_description", id)?;
        let contributor_field = self.semantic_field("tracker_semantic_contributor", id)?;
        Ok(Tracker {
            id,
            project,
            item_name,
            name,
            color,
            fields,
            view_ugroups: self.ids(
                "SELECT ugroup_id FROM tracker_permission WHERE tracker_id = ?1 ORDER BY ugroup_id",
                id,
            )?,
            title_field,
            description_field,
            status,
            contributor_field,
        })
    }

    fn memberships(&self, user_id: UserId) -> TqlResult<BTreeMap<ProjectId, Membership>> {
        let mut memberships: BTreeMap<ProjectId, Membership> = BTreeMap::new();

        let mut stmt = self
            .conn
            .prepare("SELECT project_id, is_admin FROM project_member WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((row.get::<_, ProjectId>(0)?, row.get::<_, bool>(1)?))
        })?;
        for row in rows {
            let (project_id, is_admin) = row?;
            let membership = memberships.entry(project_id).or_default();
            membership.is_member = true;
            membership.is_admin = is_admin;
        }

        let mut stmt = self.conn.prepare(
            "SELECT ugroup.project_id, ugroup.id FROM ugroup_user
             JOIN ugroup ON ugroup.id = ugroup_user.ugroup_id
             WHERE ugroup_user.user_id = ?1 AND ugroup.project_id IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((row.get::<_, ProjectId>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (project_id, ugroup_id) = row?;
            memberships
                .entry(project_id)
                .or_default()
                .static_ugroups
                .insert(ugroup_id);
        }
        Ok(memberships)
    }

    fn load_user(&self, row: Option<(UserId, String, String, String, String, bool)>) -> TqlResult<Option<User>> {
        let Some((id, user_name, real_name, email, avatar_url, is_site_admin)) = row else {
            return Ok(None);
        };
        Ok(Some(User {
            id,
            user_name,
            real_name,
            email,
            avatar_url,
            is_site_admin,
            memberships: self.memberships(id)?,
        }))
    }
}

const PROJECT_COLUMNS: &str = "id, short_name, public_name, icon, is_public";
const USER_COLUMNS: &str = "id, user_name, real_name, email, avatar_url, is_site_admin";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        short_name: row.get(1)?,
        public_name: row.get(2)?,
        icon: row.get(3)?,
        is_public: row.get(4)?,
    })
}

fn user_row(row: &Row<'_>) -> rusqlite::Result<(UserId, String, String, String, String, bool)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

impl TrackerCatalog for SqliteCatalog<'_> {
    fn project(&self, id: ProjectId) -> TqlResult<Option<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM project WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], project_from_row)
            .optional()?)
    }

    fn project_by_short_name(&self, short_name: &str) -> TqlResult<Option<Project>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM project WHERE short_name = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![short_name], project_from_row)
            .optional()?)
    }

    fn aggregated_projects(&self, parent: ProjectId) -> TqlResult<Vec<Project>> {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM project
             WHERE id IN (SELECT child_project_id FROM project_aggregation WHERE parent_project_id = ?1)
             ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let projects = stmt
            .query_map(params![parent], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    fn trackers_of_projects(&self, project_ids: &[ProjectId]) -> TqlResult<Vec<Tracker>> {
        if project_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; project_ids.len()].join(", ");
        let sql = format!(
            "SELECT id, group_id, item_name, name, color FROM tracker
             WHERE deletion_date IS NULL AND group_id IN ({placeholders}) ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(project_ids.iter()), |row| {
                Ok((
                    row.get::<_, ProjectId>(1)?,
                    (
                        row.get::<_, TrackerId>(0)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut projects: BTreeMap<ProjectId, Project> = BTreeMap::new();
        let mut trackers = Vec::with_capacity(rows.len());
        for (project_id, tracker_row) in rows {
            let project = match projects.get(&project_id) {
                Some(p) => p.clone(),
                None => {
                    let Some(p) = self.project(project_id)? else {
                        continue;
                    };
                    projects.insert(project_id, p.clone());
                    p
                }
            };
            trackers.push(self.complete_tracker(project, tracker_row)?);
        }
        Ok(trackers)
    }

    fn tracker(&self, id: TrackerId) -> TqlResult<Option<Tracker>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, group_id, item_name, name, color FROM tracker
                 WHERE id = ?1 AND deletion_date IS NULL",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, ProjectId>(1)?,
                        (
                            row.get::<_, TrackerId>(0)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ),
                    ))
                },
            )
            .optional()?;
        let Some((project_id, tracker_row)) = row else {
            return Ok(None);
        };
        let Some(project) = self.project(project_id)? else {
            return Ok(None);
        };
        Ok(Some(self.complete_tracker(project, tracker_row)?))
    }

    fn user(&self, id: UserId) -> TqlResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM user WHERE id = ?1");
        let row = self.conn.query_row(&sql, params![id], user_row).optional()?;
        self.load_user(row)
    }

    fn user_by_name(&self, user_name: &str) -> TqlResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM user WHERE user_name = ?1");
        let row = self
            .conn
            .query_row(&sql, params![user_name], user_row)
            .optional()?;
        self.load_user(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ListWidget, UGROUP_PROJECT_MEMBERS, UGROUP_REGISTERED};
    use crate::store::{open_in_memory, TrackerDatabaseBuilder};

    #[test]
    fn test_load_tracker_with_semantics() {
        let conn = open_in_memory().unwrap();
        let builder = TrackerDatabaseBuilder::new(&conn);
        let project = builder.build_project("acme").unwrap();
        let tracker_id = builder.build_tracker(project, "Bug", "fiesta-red").unwrap();
        builder
            .set_view_permission_on_tracker(tracker_id, UGROUP_REGISTERED)
            .unwrap();
        let title = builder.build_string_field(tracker_id, "summary").unwrap();
        builder
            .grant_read_permission_on_field(title, UGROUP_PROJECT_MEMBERS)
            .unwrap();
        let status = builder
            .build_static_list_field(tracker_id, "status", ListWidget::SelectBox)
            .unwrap();
        let values = builder
            .build_open_and_closed_values_for_field(status, tracker_id, &["New"], &["Done"])
            .unwrap();
        builder.build_title_semantic(tracker_id, title).unwrap();

        let catalog = SqliteCatalog::new(&conn);
        let tracker = catalog.tracker(tracker_id).unwrap().unwrap();
        assert_eq!(tracker.item_name, "bug");
        assert_eq!(tracker.project.short_name, "acme");
        assert_eq!(tracker.fields.len(), 2);
        assert_eq!(tracker.title_field, Some(title));
        assert_eq!(tracker.view_ugroups, vec![UGROUP_REGISTERED]);
        let semantic = tracker.status.unwrap();
        assert_eq!(semantic.field_id, status);
        assert_eq!(semantic.open_value_ids, values.open);
    }

    #[test]
    fn test_deleted_tracker_is_skipped() {
        let conn = open_in_memory().unwrap();
        let builder = TrackerDatabaseBuilder::new(&conn);
        let project = builder.build_project("acme").unwrap();
        let kept = builder.build_tracker(project, "Bug", "fiesta-red").unwrap();
        let deleted = builder.build_tracker(project, "Task", "acid-green").unwrap();
        builder.delete_tracker(deleted).unwrap();

        let catalog = SqliteCatalog::new(&conn);
        let trackers = catalog.trackers_of_projects(&[project]).unwrap();
        assert_eq!(trackers.iter().map(|t| t.id).collect::<Vec<_>>(), vec![kept]);
        assert!(catalog.tracker(deleted).unwrap().is_none());
    }

    #[test]
    fn test_load_user_memberships() {
        let conn = open_in_memory().unwrap();
        let builder = TrackerDatabaseBuilder::new(&conn);
        let project = builder.build_project("acme").unwrap();
        let alice = builder.build_user("alice", "Alice Doe", "alice@example.com").unwrap();
        builder.add_user_to_project_admins(alice, project).unwrap();
        let developers = builder.build_static_ugroup(project, "Developers").unwrap();
        builder.add_user_to_ugroup(alice, developers).unwrap();

        let catalog = SqliteCatalog::new(&conn);
        let user = catalog.user_by_name("alice").unwrap().unwrap();
        assert!(user.is_admin_of(project));
        assert!(user.ugroups_in(project).contains(&developers));
        assert!(catalog.user_by_name("bob").unwrap().is_none());
    }

    #[test]
    fn test_aggregated_projects() {
        let conn = open_in_memory().unwrap();
        let builder = TrackerDatabaseBuilder::new(&conn);
        let program = builder.build_project("program").unwrap();
        let team_a = builder.build_project("team-a").unwrap();
        let team_b = builder.build_project("team-b").unwrap();
        builder.aggregate_project(program, team_b).unwrap();
        builder.aggregate_project(program, team_a).unwrap();

        let catalog = SqliteCatalog::new(&conn);
        let ids: Vec<_> = catalog
            .aggregated_projects(program)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![team_a, team_b]);
    }
}
