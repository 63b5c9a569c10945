//! Artifact link conditions.

use rusqlite::types::Value as SqlValue;

use super::{Aliases, ParametrizedFromWhere};
use crate::store::NATURE_IS_CHILD;
use crate::tql::{Relationship, RelationshipKind, RelationshipTarget};

/// `EXISTS` over `tracker_artifact_link`, negated for `WITHOUT`/`IS NOT`.
///
/// A parent links to its children with the `_is_child` nature, so
/// `WITH PARENT` looks for links targeting the artifact.
pub fn from_where(relationship: &Relationship, aliases: &mut Aliases) -> ParametrizedFromWhere {
    let link = aliases.next("ArtifactLink");
    let other = format!("{link}_other");

    let (this_side, other_side) = match relationship.kind {
        RelationshipKind::WithParent
        | RelationshipKind::WithoutParent
        | RelationshipKind::LinkedFrom
        | RelationshipKind::NotLinkedFrom => ("target_artifact_id", "source_artifact_id"),
        RelationshipKind::WithChildren
        | RelationshipKind::WithoutChildren
        | RelationshipKind::LinkedTo
        | RelationshipKind::NotLinkedTo => ("source_artifact_id", "target_artifact_id"),
    };
    let nature = if relationship.kind.is_link() {
        relationship.link_type.clone()
    } else {
        Some(NATURE_IS_CHILD.to_string())
    };

    let mut predicates = vec![format!("{link}.{this_side} = artifact.id")];
    let mut parameters = Vec::new();
    if let Some(nature) = nature {
        predicates.push(format!("{link}.nature = ?"));
        parameters.push(SqlValue::Text(nature));
    }
    match &relationship.target {
        RelationshipTarget::Any => {}
        RelationshipTarget::Artifact(id) => {
            predicates.push(format!("{other}.id = ?"));
            parameters.push(SqlValue::Integer(*id));
        }
        RelationshipTarget::Tracker(name) => {
            predicates.push(format!(
                "{other}.tracker_id IN (SELECT t.id FROM tracker AS t WHERE t.item_name = ? COLLATE NOCASE AND t.deletion_date IS NULL)"
            ));
            parameters.push(SqlValue::Text(name.clone()));
        }
    }

    let exists = format!(
        "EXISTS (SELECT 1 FROM tracker_artifact_link AS {link}
    INNER JOIN tracker_artifact AS {other} ON {other}.id = {link}.{other_side}
    WHERE {})",
        predicates.join(" AND ")
    );
    let condition = if relationship.kind.is_negated() {
        format!("NOT {exists}")
    } else {
        exists
    };
    ParametrizedFromWhere::condition(condition, parameters)
}
