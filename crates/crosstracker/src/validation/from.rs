//! Resolution of the `FROM` clause into the trackers a query spans.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::Fault;
use crate::catalog::TrackerCatalog;
use crate::config::EngineConfig;
use crate::model::{Project, Tracker, User};
use crate::tql::{FromClause, FromOperand, FromSubject};
use crate::types::{ProjectId, TqlResult, TrackerId};

const PROJECT_SELF: &str = "self";
const PROJECT_AGGREGATED: &str = "aggregated";

/// Where a query runs: the project of its widget and the trackers picked
/// explicitly when the query has no `FROM`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryScope {
    pub project_id: Option<ProjectId>,
    pub tracker_ids: Vec<TrackerId>,
}

impl QueryScope {
    pub fn project(project_id: ProjectId) -> Self {
        Self {
            project_id: Some(project_id),
            tracker_ids: Vec::new(),
        }
    }

    pub fn trackers(tracker_ids: Vec<TrackerId>) -> Self {
        Self {
            project_id: None,
            tracker_ids,
        }
    }
}

/// Outcome of `FROM` resolution: the visible trackers, or why there are none.
pub type TrackersOrFaults = Result<Vec<Tracker>, Vec<Fault>>;

pub fn resolve_trackers(
    from: Option<&FromClause>,
    scope: &QueryScope,
    user: &User,
    catalog: &dyn TrackerCatalog,
    config: &EngineConfig,
) -> TqlResult<TrackersOrFaults> {
    let candidates = match from {
        None => {
            if scope.tracker_ids.is_empty() {
                return Ok(Err(vec![Fault::MissingFrom]));
            }
            let mut trackers = Vec::new();
            for id in &scope.tracker_ids {
                if let Some(tracker) = catalog.tracker(*id)? {
                    trackers.push(tracker);
                }
            }
            trackers
        }
        Some(from) => match trackers_from_clause(from, scope, user, catalog)? {
            Ok(trackers) => trackers,
            Err(faults) => return Ok(Err(faults)),
        },
    };

    let mut seen = BTreeSet::new();
    let trackers: Vec<Tracker> = candidates
        .into_iter()
        .filter(|t| seen.insert(t.id) && user.can_view_tracker(t))
        .collect();

    if trackers.is_empty() {
        return Ok(Err(vec![Fault::NoTrackerInScope]));
    }
    if let Some(max) = config.max_trackers {
        if trackers.len() > max {
            return Ok(Err(vec![Fault::TooManyTrackers {
                count: trackers.len(),
                max,
            }]));
        }
    }

    tracing::debug!(
        "FROM resolved to {} tracker(s): {:?}",
        trackers.len(),
        trackers.iter().map(|t| t.id).collect::<Vec<_>>()
    );
    Ok(Ok(trackers))
}

fn trackers_from_clause(
    from: &FromClause,
    scope: &QueryScope,
    user: &User,
    catalog: &dyn TrackerCatalog,
) -> TqlResult<TrackersOrFaults> {
    let mut faults = Vec::new();

    let mut project_condition = None;
    let mut tracker_condition = None;
    for condition in &from.conditions {
        let slot = if condition.subject.is_project() {
            &mut project_condition
        } else {
            &mut tracker_condition
        };
        if slot.is_some() {
            faults.push(Fault::DuplicatedFromCondition {
                subject: condition.subject.to_string(),
            });
        } else {
            *slot = Some(condition);
        }
    }
    if !faults.is_empty() {
        return Ok(Err(faults));
    }

    let mut projects = Vec::new();
    match project_condition {
        None => keep(self_project(scope, catalog)?, &mut projects, &mut faults),
        Some(condition) if condition.subject == FromSubject::Project => {
            for value in condition.operand.values() {
                match value.to_lowercase().as_str() {
                    PROJECT_SELF => keep(self_project(scope, catalog)?, &mut projects, &mut faults),
                    PROJECT_AGGREGATED => keep(
                        aggregated_projects(scope, catalog)?,
                        &mut projects,
                        &mut faults,
                    ),
                    _ => faults.push(Fault::InvalidProjectValue {
                        value: value.clone(),
                    }),
                }
            }
        }
        Some(condition) => {
            for name in condition.operand.values() {
                // Unknown names are ignored like inaccessible ones.
                if let Some(project) = catalog.project_by_short_name(name)? {
                    projects.push(project);
                }
            }
        }
    }
    if !faults.is_empty() {
        return Ok(Err(faults));
    }

    let project_ids: Vec<ProjectId> = projects
        .iter()
        .filter(|p| user.can_access_project(p))
        .map(|p| p.id)
        .collect();
    let mut trackers = catalog.trackers_of_projects(&project_ids)?;

    if let Some(condition) = tracker_condition {
        let names = match &condition.operand {
            FromOperand::Equal(name) => vec![name.as_str()],
            FromOperand::In(names) => names.iter().map(String::as_str).collect(),
        };
        trackers.retain(|t| names.iter().any(|n| t.item_name.eq_ignore_ascii_case(n)));
    }

    Ok(Ok(trackers))
}

type ProjectsOrFault = Result<Vec<Project>, Fault>;

fn keep(result: ProjectsOrFault, projects: &mut Vec<Project>, faults: &mut Vec<Fault>) {
    match result {
        Ok(found) => projects.extend(found),
        Err(fault) => faults.push(fault),
    }
}

fn self_project(scope: &QueryScope, catalog: &dyn TrackerCatalog) -> TqlResult<ProjectsOrFault> {
    let Some(project_id) = scope.project_id else {
        return Ok(Err(Fault::ProjectContextRequired {
            value: PROJECT_SELF.to_string(),
        }));
    };
    Ok(Ok(catalog.project(project_id)?.into_iter().collect()))
}

fn aggregated_projects(scope: &QueryScope, catalog: &dyn TrackerCatalog) -> TqlResult<ProjectsOrFault> {
    let Some(project_id) = scope.project_id else {
        return Ok(Err(Fault::ProjectContextRequired {
            value: PROJECT_AGGREGATED.to_string(),
        }));
    };
    Ok(Ok(catalog.aggregated_projects(project_id)?))
}
