//! Saved queries attached to dashboard widgets.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ProjectId, TqlError, TqlResult, UserId};
use crate::validation::QueryScope;

pub type WidgetId = i64;

/// A TQL query saved in a widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossTrackerQuery {
    pub uuid: Uuid,
    pub query: String,
    pub title: String,
    pub description: String,
    pub widget_id: WidgetId,
}

impl CrossTrackerQuery {
    /// New query with a time ordered identifier.
    pub fn from_tql_query_and_widget_id(query: &str, title: &str, description: &str, widget_id: WidgetId) -> Self {
        Self {
            uuid: Uuid::now_v7(),
            query: query.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            widget_id,
        }
    }
}

/// Dashboard a widget lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetOwner {
    Project(ProjectId),
    User(UserId),
}

impl WidgetOwner {
    /// Scope of queries of the widget: project dashboards give `'self'` a
    /// meaning, user dashboards do not.
    pub fn scope(&self) -> QueryScope {
        match self {
            WidgetOwner::Project(project_id) => QueryScope::project(*project_id),
            WidgetOwner::User(_) => QueryScope::default(),
        }
    }
}

/// Storage of saved queries.
pub struct QueryRepository<'c> {
    conn: &'c Connection,
}

impl<'c> QueryRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Insert or update a query.
    pub fn save(&self, query: &CrossTrackerQuery) -> TqlResult<()> {
        if self.widget_owner(query.widget_id)?.is_none() {
            return Err(TqlError::NotFound(format!("widget {}", query.widget_id)));
        }
        self.conn.execute(
            "INSERT INTO plugin_crosstracker_query (id, widget_id, query, title, description)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (id) DO UPDATE SET
                widget_id = excluded.widget_id,
                query = excluded.query,
                title = excluded.title,
                description = excluded.description",
            params![
                query.uuid.to_string(),
                query.widget_id,
                query.query,
                query.title,
                query.description
            ],
        )?;
        tracing::debug!("Saved query {} in widget {}", query.uuid, query.widget_id);
        Ok(())
    }

    pub fn find(&self, uuid: &Uuid) -> TqlResult<Option<CrossTrackerQuery>> {
        let query = self
            .conn
            .query_row(
                "SELECT id, widget_id, query, title, description FROM plugin_crosstracker_query WHERE id = ?1",
                params![uuid.to_string()],
                query_row,
            )
            .optional()?;
        Ok(query)
    }

    /// Queries of a widget, oldest first.
    pub fn list_by_widget(&self, widget_id: WidgetId) -> TqlResult<Vec<CrossTrackerQuery>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, widget_id, query, title, description FROM plugin_crosstracker_query
             WHERE widget_id = ?1 ORDER BY id",
        )?;
        let queries = stmt
            .query_map(params![widget_id], query_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(queries)
    }

    /// Whether a query was deleted.
    pub fn delete(&self, uuid: &Uuid) -> TqlResult<bool> {
        let deleted = self.conn.execute(
            "DELETE FROM plugin_crosstracker_query WHERE id = ?1",
            params![uuid.to_string()],
        )?;
        Ok(deleted > 0)
    }

    pub fn widget_owner(&self, widget_id: WidgetId) -> TqlResult<Option<WidgetOwner>> {
        let row: Option<(Option<ProjectId>, Option<UserId>)> = self
            .conn
            .query_row(
                "SELECT project_id, user_id FROM plugin_crosstracker_widget WHERE id = ?1",
                params![widget_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(match row {
            Some((Some(project_id), _)) => Some(WidgetOwner::Project(project_id)),
            Some((None, Some(user_id))) => Some(WidgetOwner::User(user_id)),
            _ => None,
        })
    }
}

fn query_row(row: &Row<'_>) -> rusqlite::Result<CrossTrackerQuery> {
    let id: String = row.get(0)?;
    let uuid = Uuid::parse_str(&id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    Ok(CrossTrackerQuery {
        uuid,
        widget_id: row.get(1)?,
        query: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{open_in_memory, TrackerDatabaseBuilder};

    #[test]
    fn test_save_find_and_delete() {
        let conn = open_in_memory().unwrap();
        let builder = TrackerDatabaseBuilder::new(&conn);
        let project = builder.build_project("acme").unwrap();
        let widget = builder.build_project_widget(project).unwrap();
        let repository = QueryRepository::new(&conn);

        let mut query = CrossTrackerQuery::from_tql_query_and_widget_id(
            "SELECT @id FROM @project = 'self' WHERE @id >= 1",
            "All",
            "",
            widget,
        );
        repository.save(&query).unwrap();
        assert_eq!(repository.find(&query.uuid).unwrap(), Some(query.clone()));

        query.title = "Everything".to_string();
        repository.save(&query).unwrap();
        assert_eq!(repository.list_by_widget(widget).unwrap(), vec![query.clone()]);

        assert!(repository.delete(&query.uuid).unwrap());
        assert!(!repository.delete(&query.uuid).unwrap());
        assert_eq!(repository.find(&query.uuid).unwrap(), None);
    }

    #[test]
    fn test_saving_in_unknown_widget_fails() {
        let conn = open_in_memory().unwrap();
        let query = CrossTrackerQuery::from_tql_query_and_widget_id("SELECT @id", "", "", 999);
        assert!(matches!(
            QueryRepository::new(&conn).save(&query),
            Err(TqlError::NotFound(_))
        ));
    }

    #[test]
    fn test_widget_scope() {
        let conn = open_in_memory().unwrap();
        let builder = TrackerDatabaseBuilder::new(&conn);
        let project = builder.build_project("acme").unwrap();
        let user = builder.build_user("alice", "Alice", "alice@example.com").unwrap();
        let project_widget = builder.build_project_widget(project).unwrap();
        let user_widget = builder.build_user_widget(user).unwrap();
        let repository = QueryRepository::new(&conn);

        let owner = repository.widget_owner(project_widget).unwrap().unwrap();
        assert_eq!(owner.scope(), QueryScope::project(project));
        let owner = repository.widget_owner(user_widget).unwrap().unwrap();
        assert_eq!(owner, WidgetOwner::User(user));
        assert_eq!(owner.scope().project_id, None);
    }
}
