//! The query engine: parse, validate, compile and run TQL queries.
//!
//! Each call captures one `now` instant so `NOW()` means the same thing to
//! validation and to SQL compilation.

use chrono::{DateTime, FixedOffset, Utc};
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use uuid::Uuid;

use crate::builder::assembly::QueryExplanation;
use crate::builder::{compile, BuildContext, CompiledQuery};
use crate::catalog::{SqliteCatalog, TrackerCatalog};
use crate::config::EngineConfig;
use crate::model::User;
use crate::query::QueryRepository;
use crate::result::{build_report, QueryReport};
use crate::tql;
use crate::types::{ArtifactId, TqlError, TqlResult};
use crate::validation::{validate, QueryScope, ValidatedQuery};

/// Requested page of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Page {
    /// `None` uses the configured default.
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }
}

/// Explanation of how a query runs: the trackers in scope and its SQL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub tracker_ids: Vec<i64>,
    pub limit: usize,
    pub offset: usize,
    pub statements: QueryExplanation,
}

pub struct CrossTrackerEngine<'c> {
    conn: &'c Connection,
    config: EngineConfig,
}

impl<'c> CrossTrackerEngine<'c> {
    pub fn new(conn: &'c Connection, config: EngineConfig) -> Self {
        Self { conn, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The current instant in the platform timezone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.config.timezone())
    }

    /// Look a user up by name; `None` is the anonymous user.
    pub fn user(&self, user_name: Option<&str>) -> TqlResult<User> {
        match user_name {
            None => Ok(User::anonymous()),
            Some(name) => SqliteCatalog::new(self.conn)
                .user_by_name(name)?
                .ok_or_else(|| TqlError::NotFound(format!("user '{name}'"))),
        }
    }

    pub fn validate(&self, tql: &str, scope: &QueryScope, user: &User) -> TqlResult<ValidatedQuery> {
        self.validate_at(tql, scope, user, self.now())
    }

    pub fn validate_at(
        &self,
        tql: &str,
        scope: &QueryScope,
        user: &User,
        now: DateTime<FixedOffset>,
    ) -> TqlResult<ValidatedQuery> {
        let query = tql::parse(tql)?;
        let catalog = SqliteCatalog::new(self.conn);
        validate(&query, scope, user, &catalog, &self.config, now)
    }

    pub fn explain(&self, tql: &str, scope: &QueryScope, user: &User, page: Page) -> TqlResult<Explanation> {
        let now = self.now();
        let validated = self.validate_at(tql, scope, user, now)?;
        let limit = self.config.clamp_limit(page.limit);
        let compiled = self.compile(&validated, user, now, limit, page.offset)?;
        Ok(Explanation {
            tracker_ids: validated.trackers.iter().map(|t| t.id).collect(),
            limit,
            offset: page.offset,
            statements: compiled.explain(),
        })
    }

    pub fn execute(&self, tql: &str, scope: &QueryScope, user: &User, page: Page) -> TqlResult<QueryReport> {
        self.execute_at(tql, scope, user, page, self.now())
    }

    /// Run a query as if it were `now`.
    pub fn execute_at(
        &self,
        tql: &str,
        scope: &QueryScope,
        user: &User,
        page: Page,
        now: DateTime<FixedOffset>,
    ) -> TqlResult<QueryReport> {
        let validated = self.validate_at(tql, scope, user, now)?;
        let limit = self.config.clamp_limit(page.limit);
        let compiled = self.compile(&validated, user, now, limit, page.offset)?;

        let total_size = self.count(&compiled)?;
        let artifact_ids = self.page_ids(&compiled)?;
        let report = build_report(self.conn, &compiled, &artifact_ids, total_size, &self.config)?;

        tracing::info!(
            "Query over {} tracker(s) matched {} artifact(s), returned {}",
            validated.trackers.len(),
            total_size,
            artifact_ids.len()
        );
        Ok(report)
    }

    /// Run a saved query in the scope of its widget.
    pub fn execute_saved(&self, uuid: &Uuid, user: &User, page: Page) -> TqlResult<QueryReport> {
        let repository = QueryRepository::new(self.conn);
        let query = repository
            .find(uuid)?
            .ok_or_else(|| TqlError::NotFound(format!("query {uuid}")))?;
        let owner = repository
            .widget_owner(query.widget_id)?
            .ok_or_else(|| TqlError::NotFound(format!("widget {}", query.widget_id)))?;
        tracing::debug!("Running saved query {uuid} of widget {}", query.widget_id);
        self.execute(&query.query, &owner.scope(), user, page)
    }

    fn compile(
        &self,
        validated: &ValidatedQuery,
        user: &User,
        now: DateTime<FixedOffset>,
        limit: usize,
        offset: usize,
    ) -> TqlResult<CompiledQuery> {
        let ctx = BuildContext {
            trackers: &validated.trackers,
            user,
            tz: self.config.timezone(),
            now,
        };
        compile(validated, &ctx, limit, offset)
    }

    fn count(&self, compiled: &CompiledQuery) -> TqlResult<usize> {
        let count: i64 = self.conn.query_row(
            &compiled.count.sql,
            params_from_iter(compiled.count.parameters.iter()),
            |row| row.get(0),
        )?;
        usize::try_from(count).map_err(|_| TqlError::Internal(format!("negative count {count}")))
    }

    fn page_ids(&self, compiled: &CompiledQuery) -> TqlResult<Vec<ArtifactId>> {
        let mut stmt = self.conn.prepare(&compiled.ids.sql)?;
        let ids = stmt
            .query_map(params_from_iter(compiled.ids.parameters.iter()), |row| row.get(0))?
            .collect::<Result<Vec<ArtifactId>, _>>()?;
        Ok(ids)
    }
}
