//! Artifact level permissions.
//!
//! Trackers are already filtered by what the user can see. Artifacts of
//! those trackers stay visible unless they carry their own permissions, in
//! which case the user needs one of the listed groups, or to administer the
//! project.

use std::collections::BTreeMap;

use rusqlite::types::Value as SqlValue;

use super::{integers, placeholders, BuildContext};
use crate::types::{ProjectId, TrackerId};

/// Visibility condition on `artifact` and its parameters.
pub fn condition(ctx: &BuildContext<'_>) -> (String, Vec<SqlValue>) {
    if ctx.user.is_site_admin {
        return ("1 = 1".to_string(), Vec::new());
    }

    let mut by_project: BTreeMap<ProjectId, Vec<TrackerId>> = BTreeMap::new();
    for tracker in ctx.trackers {
        by_project.entry(tracker.project.id).or_default().push(tracker.id);
    }

    let mut alternatives = vec!["artifact.use_artifact_permissions = 0".to_string()];
    let mut parameters = Vec::new();

    let administered: Vec<TrackerId> = by_project
        .iter()
        .filter(|(project_id, _)| ctx.user.is_admin_of(**project_id))
        .flat_map(|(_, trackers)| trackers.iter().copied())
        .collect();
    if !administered.is_empty() {
        alternatives.push(format!(
            "artifact.tracker_id IN ({})",
            placeholders(administered.len())
        ));
        parameters.extend(integers(administered));
    }

    for (project_id, trackers) in &by_project {
        if ctx.user.is_admin_of(*project_id) {
            continue;
        }
        let ugroups = ctx.user.ugroups_in(*project_id);
        alternatives.push(format!(
            "(artifact.tracker_id IN ({}) AND EXISTS (SELECT 1 FROM artifact_permission AS permission WHERE permission.artifact_id = artifact.id AND permission.ugroup_id IN ({})))",
            placeholders(trackers.len()),
            placeholders(ugroups.len())
        ));
        parameters.extend(integers(trackers.iter().copied()));
        parameters.extend(integers(ugroups));
    }

    (format!("({})", alternatives.join(" OR ")), parameters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Membership, Project, Tracker, User};
    use chrono::{FixedOffset, TimeZone};

    fn tracker(id: TrackerId, project_id: ProjectId) -> Tracker {
        Tracker {
            id,
            project: Project {
                id: project_id,
                short_name: format!("p{project_id}"),
                public_name: format!("P{project_id}"),
                icon: String::new(),
                is_public: true,
            },
            item_name: format!("t{id}"),
            name: format!("T{id}"),
            color: "inca-silver".to_string(),
            fields: Vec::new(),
            view_ugroups: vec![1],
            title_field: None,
            description_field: None,
            status: None,
            contributor_field: None,
        }
    }

    fn ctx<'a>(trackers: &'a [Tracker], user: &'a User) -> BuildContext<'a> {
        let tz = FixedOffset::east_opt(0).unwrap();
        BuildContext {
            trackers,
            user,
            tz,
            now: tz.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_site_admin_sees_everything() {
        let mut user = User::anonymous();
        user.id = 1;
        user.is_site_admin = true;
        let trackers = vec![tracker(10, 101)];
        assert_eq!(condition(&ctx(&trackers, &user)).0, "1 = 1");
    }

    #[test]
    fn test_project_admin_bypasses_artifact_permissions() {
        let mut user = User::anonymous();
        user.id = 2;
        user.memberships.insert(
            101,
            Membership {
                is_member: true,
                is_admin: true,
                ..Default::default()
            },
        );
        let trackers = vec![tracker(10, 101), tracker(20, 102)];
        let (sql, params) = condition(&ctx(&trackers, &user));
        assert!(sql.contains("artifact.tracker_id IN (?)"));
        // Admin tracker, then tracker 20 with groups anonymous and registered.
        assert_eq!(params, integers([10, 20, 1, 2]));
    }
}
