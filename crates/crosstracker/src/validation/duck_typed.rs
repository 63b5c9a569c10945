//! Duck typing: one field name resolved across every tracker in scope.
//!
//! `due_date` may be a date field in one tracker and a datetime field in
//! another; both unify into [`DuckType::Date`]. A name whose readable fields
//! do not unify into a single type is rejected.

use serde::Serialize;

use super::Fault;
use crate::model::{FieldKind, ListBind, Tracker, User};
use crate::types::{FieldId, TrackerId};

/// Unified type of a field name across trackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuckType {
    Date,
    Numeric,
    Text,
    StaticList,
    UserList,
    UserGroupList,
}

impl DuckType {
    pub fn of(kind: &FieldKind) -> Self {
        match kind {
            FieldKind::Date { .. } => DuckType::Date,
            FieldKind::Int | FieldKind::Float => DuckType::Numeric,
            FieldKind::String | FieldKind::Text => DuckType::Text,
            FieldKind::List { bind, .. } => match bind {
                ListBind::Static => DuckType::StaticList,
                ListBind::Users => DuckType::UserList,
                ListBind::UserGroups => DuckType::UserGroupList,
            },
        }
    }

    /// Type of the result column.
    pub fn column_type(&self) -> &'static str {
        match self {
            DuckType::Date => "date",
            DuckType::Numeric => "numeric",
            DuckType::Text => "text",
            DuckType::StaticList => "list_static",
            DuckType::UserList => "list_user",
            DuckType::UserGroupList => "list_user_group",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            DuckType::StaticList | DuckType::UserList | DuckType::UserGroupList
        )
    }
}

/// A field of one tracker the user can read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedField {
    pub tracker_id: TrackerId,
    pub field_id: FieldId,
    pub kind: FieldKind,
}

/// A field name resolved across the trackers in scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuckTypedField {
    pub name: String,
    pub duck_type: DuckType,
    /// Readable fields, in tracker order.
    pub fields: Vec<ResolvedField>,
}

impl DuckTypedField {
    /// Resolve `name` against `trackers`, keeping only fields `user` can read.
    pub fn resolve(name: &str, trackers: &[Tracker], user: &User) -> Result<Self, Fault> {
        let fields: Vec<ResolvedField> = trackers
            .iter()
            .filter_map(|tracker| {
                let field = tracker.field_by_name(name)?;
                user.can_read_field(tracker, field).then(|| ResolvedField {
                    tracker_id: tracker.id,
                    field_id: field.id,
                    kind: field.kind,
                })
            })
            .collect();

        let Some(first) = fields.first() else {
            return Err(Fault::FieldNotFound {
                name: name.to_string(),
            });
        };
        let duck_type = DuckType::of(&first.kind);
        if fields.iter().any(|f| DuckType::of(&f.kind) != duck_type) {
            return Err(Fault::IncompatibleFieldTypes {
                name: name.to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            duck_type,
            fields,
        })
    }

    /// Build from semantic fields already checked for readability.
    pub fn from_semantic(name: &str, duck_type: DuckType, fields: Vec<ResolvedField>) -> Self {
        Self {
            name: name.to_string(),
            duck_type,
            fields,
        }
    }

    pub fn field_ids(&self) -> Vec<FieldId> {
        self.fields.iter().map(|f| f.field_id).collect()
    }

    /// Whether at least one underlying field keeps the time of day.
    pub fn with_time(&self) -> bool {
        self.fields
            .iter()
            .any(|f| matches!(f.kind, FieldKind::Date { with_time: true }))
    }

    /// Whether at least one underlying field holds several values.
    pub fn is_multiple(&self) -> bool {
        self.fields.iter().any(|f| f.kind.is_multiple())
    }
}

/// Readable semantic fields of the trackers, using `pick` to find the field id.
pub fn semantic_fields(
    trackers: &[Tracker],
    user: &User,
    pick: impl Fn(&Tracker) -> Option<FieldId>,
) -> Vec<ResolvedField> {
    trackers
        .iter()
        .filter_map(|tracker| {
            let field = user.readable_field(tracker, pick(tracker))?;
            Some(ResolvedField {
                tracker_id: tracker.id,
                field_id: field.id,
                kind: field.kind,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ListWidget, Membership, Project, TrackerField, UGROUP_PROJECT_ADMIN, UGROUP_REGISTERED,
    };
    use std::collections::BTreeMap;

    fn tracker(id: TrackerId, fields: Vec<(FieldId, &str, FieldKind)>) -> Tracker {
        Tracker {
            id,
            project: Project {
                id: 101,
                short_name: "acme".to_string(),
                public_name: "Acme".to_string(),
                icon: String::new(),
                is_public: true,
            },
            item_name: format!("t{id}"),
            name: format!("T{id}"),
            color: "inca-silver".to_string(),
            fields: fields
                .into_iter()
                .map(|(fid, name, kind)| TrackerField {
                    id: fid,
                    tracker_id: id,
                    name: name.to_string(),
                    label: name.to_string(),
                    kind,
                    read_ugroups: if name == "secret" {
                        vec![UGROUP_PROJECT_ADMIN]
                    } else {
                        vec![UGROUP_REGISTERED]
                    },
                })
                .collect(),
            view_ugroups: vec![UGROUP_REGISTERED],
            title_field: None,
            description_field: None,
            status: None,
            contributor_field: None,
        }
    }

    fn user() -> User {
        User {
            id: 200,
            user_name: "bob".to_string(),
            real_name: "Bob".to_string(),
            email: String::new(),
            avatar_url: String::new(),
            is_site_admin: false,
            memberships: BTreeMap::from([(101, Membership::default())]),
        }
    }

    #[test]
    fn test_date_and_datetime_unify() {
        let trackers = vec![
            tracker(1, vec![(10, "due_date", FieldKind::Date { with_time: false })]),
            tracker(2, vec![(20, "due_date", FieldKind::Date { with_time: true })]),
            tracker(3, vec![]),
        ];
        let field = DuckTypedField::resolve("due_date", &trackers, &user()).unwrap();
        assert_eq!(field.duck_type, DuckType::Date);
        assert_eq!(field.field_ids(), vec![10, 20]);
        assert!(field.with_time());
    }

    #[test]
    fn test_int_and_float_unify() {
        let trackers = vec![
            tracker(1, vec![(10, "effort", FieldKind::Int)]),
            tracker(2, vec![(20, "effort", FieldKind::Float)]),
        ];
        let field = DuckTypedField::resolve("effort", &trackers, &user()).unwrap();
        assert_eq!(field.duck_type, DuckType::Numeric);
    }

    #[test]
    fn test_incompatible_types() {
        let trackers = vec![
            tracker(1, vec![(10, "effort", FieldKind::Int)]),
            tracker(2, vec![(20, "effort", FieldKind::String)]),
        ];
        assert_eq!(
            DuckTypedField::resolve("effort", &trackers, &user()),
            Err(Fault::IncompatibleFieldTypes {
                name: "effort".to_string()
            })
        );
    }

    #[test]
    fn test_unreadable_field_is_not_found() {
        let trackers = vec![tracker(1, vec![(10, "secret", FieldKind::Int)])];
        assert_eq!(
            DuckTypedField::resolve("secret", &trackers, &user()),
            Err(Fault::FieldNotFound {
                name: "secret".to_string()
            })
        );
    }

    #[test]
    fn test_admin_reads_fields_of_every_type() {
        let trackers = vec![
            tracker(1, vec![(10, "secret", FieldKind::String)]),
            tracker(2, vec![(20, "secret", FieldKind::Int)]),
        ];
        let mut u = user();
        u.memberships.insert(
            101,
            Membership {
                is_admin: true,
                ..Default::default()
            },
        );
        assert!(DuckTypedField::resolve("secret", &trackers, &u).is_err());
    }

    #[test]
    fn test_multiple_values() {
        let trackers = vec![tracker(
            1,
            vec![(
                10,
                "os",
                FieldKind::List {
                    widget: ListWidget::Checkbox,
                    bind: ListBind::Static,
                },
            )],
        )];
        let field = DuckTypedField::resolve("os", &trackers, &user()).unwrap();
        assert_eq!(field.duck_type, DuckType::StaticList);
        assert!(field.is_multiple());
    }
}
