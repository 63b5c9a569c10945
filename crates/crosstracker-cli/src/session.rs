//! A CLI session: one tracker database, the engine configuration and the
//! operations the commands run against them.

use std::path::Path;

use rusqlite::Connection;
use uuid::Uuid;

use crosstracker::model::User;
use crosstracker::{
    store, CrossTrackerEngine, CrossTrackerQuery, EngineConfig, Explanation, Page, ProjectId,
    QueryReport, QueryRepository, QueryScope, SqliteCatalog, TqlResult, TrackerCatalog,
    TrackerId, WidgetId,
};

/// Where a query runs: a project dashboard or an explicit list of trackers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeArgs {
    /// Short name of the project `'self'` refers to.
    pub project: Option<String>,
    pub trackers: Vec<TrackerId>,
}

pub struct TrackerSession {
    conn: Connection,
    config: EngineConfig,
    path: String,
}

impl TrackerSession {
    /// Open (and create if needed) the database at `path`.
    pub fn open(path: &str, config: EngineConfig) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = store::open(Path::new(path))?;
        tracing::debug!("Opened tracker database {path}");
        Ok(Self {
            conn,
            config,
            path: path.to_string(),
        })
    }

    /// A session over an existing connection.
    pub fn with_connection(conn: Connection, config: EngineConfig) -> Self {
        Self {
            conn,
            config,
            path: ":memory:".to_string(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn engine(&self) -> CrossTrackerEngine<'_> {
        CrossTrackerEngine::new(&self.conn, self.config.clone())
    }

    /// The user running queries; `None` is anonymous.
    pub fn user(&self, user_name: Option<&str>) -> TqlResult<User> {
        self.engine().user(user_name)
    }

    pub fn scope(&self, args: &ScopeArgs) -> anyhow::Result<QueryScope> {
        let project_id = match &args.project {
            Some(name) => Some(self.project_id(name)?),
            None => None,
        };
        Ok(QueryScope {
            project_id,
            tracker_ids: args.trackers.clone(),
        })
    }

    fn project_id(&self, short_name: &str) -> anyhow::Result<ProjectId> {
        SqliteCatalog::new(&self.conn)
            .project_by_short_name(short_name)?
            .map(|project| project.id)
            .ok_or_else(|| anyhow::anyhow!("Unknown project '{short_name}'"))
    }

    pub fn query(&self, tql: &str, scope: &QueryScope, user: &User, page: Page) -> TqlResult<QueryReport> {
        self.engine().execute(tql, scope, user, page)
    }

    pub fn explain(&self, tql: &str, scope: &QueryScope, user: &User, page: Page) -> TqlResult<Explanation> {
        self.engine().explain(tql, scope, user, page)
    }

    /// Check a query, returning the trackers it spans.
    pub fn validate(&self, tql: &str, scope: &QueryScope, user: &User) -> TqlResult<Vec<TrackerId>> {
        let validated = self.engine().validate(tql, scope, user)?;
        Ok(validated.trackers.iter().map(|t| t.id).collect())
    }

    /// Save a query in a widget once it validates in the widget scope.
    pub fn save(
        &self,
        widget_id: WidgetId,
        tql: &str,
        title: &str,
        description: &str,
        user: &User,
    ) -> anyhow::Result<CrossTrackerQuery> {
        let repository = QueryRepository::new(&self.conn);
        let owner = repository
            .widget_owner(widget_id)?
            .ok_or_else(|| anyhow::anyhow!("Unknown widget {widget_id}"))?;
        self.engine().validate(tql, &owner.scope(), user)?;
        let query = CrossTrackerQuery::from_tql_query_and_widget_id(tql, title, description, widget_id);
        repository.save(&query)?;
        tracing::info!("Saved query {} in widget {widget_id}", query.uuid);
        Ok(query)
    }

    pub fn list(&self, widget_id: WidgetId) -> TqlResult<Vec<CrossTrackerQuery>> {
        QueryRepository::new(&self.conn).list_by_widget(widget_id)
    }

    pub fn run(&self, uuid: &Uuid, user: &User, page: Page) -> TqlResult<QueryReport> {
        self.engine().execute_saved(uuid, user, page)
    }

    pub fn delete(&self, uuid: &Uuid) -> TqlResult<bool> {
        QueryRepository::new(&self.conn).delete(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> TrackerSession {
        let conn = store::open_in_memory().unwrap();
        crate::demo::seed(&conn).unwrap();
        TrackerSession::with_connection(conn, EngineConfig::default())
    }

    #[test]
    fn test_scope_resolves_project_name() {
        let session = session();
        let scope = session
            .scope(&ScopeArgs {
                project: Some("demo".to_string()),
                trackers: Vec::new(),
            })
            .unwrap();
        assert!(scope.project_id.is_some());
        assert!(session
            .scope(&ScopeArgs {
                project: Some("nope".to_string()),
                trackers: Vec::new(),
            })
            .is_err());
    }

    #[test]
    fn test_save_validates_in_widget_scope() {
        let session = session();
        let alice = session.user(Some("alice")).unwrap();
        let widget = crate::demo::project_widget(session.connection()).unwrap();

        let saved = session
            .save(widget, "SELECT @title FROM @project = 'self'", "All", "", &alice)
            .unwrap();
        assert_eq!(session.list(widget).unwrap(), vec![saved.clone()]);

        let report = session.run(&saved.uuid, &alice, Page::default()).unwrap();
        assert_eq!(report.total_size, crate::demo::ARTIFACT_COUNT);

        assert!(session
            .save(widget, "SELECT @title FROM @project = 'self' WHERE @id BETWEEN(5, 1)", "", "", &alice)
            .is_err());
        assert!(session.delete(&saved.uuid).unwrap());
    }
}
