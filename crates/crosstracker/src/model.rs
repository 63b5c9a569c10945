//! Host object model: projects, trackers, fields, semantics and users.
//!
//! The engine never mutates these; they are loaded by the [`crate::catalog`]
//! and used to resolve names and permissions during validation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{BindValueId, FieldId, ProjectId, TrackerId, UgroupId, UserId};

pub const UGROUP_ANONYMOUS: UgroupId = 1;
pub const UGROUP_REGISTERED: UgroupId = 2;
pub const UGROUP_PROJECT_MEMBERS: UgroupId = 3;
pub const UGROUP_PROJECT_ADMIN: UgroupId = 4;

/// Static user groups start above this id.
pub const UGROUP_STATIC_THRESHOLD: UgroupId = 100;

pub const ANONYMOUS_USER_ID: UserId = 0;

/// A project owning trackers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub short_name: String,
    pub public_name: String,
    pub icon: String,
    pub is_public: bool,
}

/// Presentation of a list field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListWidget {
    SelectBox,
    MultiSelectBox,
    Checkbox,
    Radio,
    OpenList,
}

impl ListWidget {
    /// Whether an artifact may hold more than one value.
    pub fn is_multiple(&self) -> bool {
        matches!(
            self,
            ListWidget::MultiSelectBox | ListWidget::Checkbox | ListWidget::OpenList
        )
    }

    pub fn type_code(&self) -> &'static str {
        match self {
            ListWidget::SelectBox => "sb",
            ListWidget::MultiSelectBox => "msb",
            ListWidget::Checkbox => "cb",
            ListWidget::Radio => "rb",
            ListWidget::OpenList => "tbl",
        }
    }
}

/// What the values of a list field are bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListBind {
    Static,
    Users,
    UserGroups,
}

impl ListBind {
    pub fn code(&self) -> &'static str {
        match self {
            ListBind::Static => "static",
            ListBind::Users => "users",
            ListBind::UserGroups => "ugroups",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "static" => Some(ListBind::Static),
            "users" => Some(ListBind::Users),
            "ugroups" => Some(ListBind::UserGroups),
            _ => None,
        }
    }
}

/// Type of a tracker field, as far as querying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Date { with_time: bool },
    Int,
    Float,
    String,
    Text,
    List { widget: ListWidget, bind: ListBind },
}

impl FieldKind {
    /// Build a kind from the stored form element type.
    ///
    /// Returns `None` for field types the engine cannot query (artifact links,
    /// files, computed values, ...).
    pub fn from_storage(type_code: &str, bind: Option<&str>, display_time: bool) -> Option<Self> {
        let widget = match type_code {
            "date" => {
                return Some(FieldKind::Date {
                    with_time: display_time,
                })
            }
            "int" => return Some(FieldKind::Int),
            "float" => return Some(FieldKind::Float),
            "string" => return Some(FieldKind::String),
            "text" => return Some(FieldKind::Text),
            "sb" => ListWidget::SelectBox,
            "msb" => ListWidget::MultiSelectBox,
            "cb" => ListWidget::Checkbox,
            "rb" => ListWidget::Radio,
            "tbl" => ListWidget::OpenList,
            _ => return None,
        };
        let bind = ListBind::from_code(bind.unwrap_or("static"))?;
        Some(FieldKind::List { widget, bind })
    }

    pub fn type_code(&self) -> &'static str {
        match self {
            FieldKind::Date { .. } => "date",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::Text => "text",
            FieldKind::List { widget, .. } => widget.type_code(),
        }
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self, FieldKind::List { widget, .. } if widget.is_multiple())
    }
}

/// A field of a tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerField {
    pub id: FieldId,
    pub tracker_id: TrackerId,
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    /// Groups allowed to read the field.
    pub read_ugroups: Vec<UgroupId>,
}

/// The status semantic: which values of which field mean "open".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSemantic {
    pub field_id: FieldId,
    pub open_value_ids: Vec<BindValueId>,
}

/// A tracker with its fields and semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tracker {
    pub id: TrackerId,
    pub project: Project,
    /// Short name, used by `@tracker.name` in FROM.
    pub item_name: String,
    pub name: String,
    pub color: String,
    pub fields: Vec<TrackerField>,
    /// Groups with full view access.
    pub view_ugroups: Vec<UgroupId>,
    pub title_field: Option<FieldId>,
    pub description_field: Option<FieldId>,
    pub status: Option<StatusSemantic>,
    pub contributor_field: Option<FieldId>,
}

impl Tracker {
    pub fn field(&self, id: FieldId) -> Option<&TrackerField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&TrackerField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// What a user is in one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub is_member: bool,
    pub is_admin: bool,
    pub static_ugroups: BTreeSet<UgroupId>,
}

/// The user running a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub user_name: String,
    pub real_name: String,
    pub email: String,
    pub avatar_url: String,
    pub is_site_admin: bool,
    pub memberships: BTreeMap<ProjectId, Membership>,
}

impl User {
    pub fn anonymous() -> Self {
        Self {
            id: ANONYMOUS_USER_ID,
            user_name: String::new(),
            real_name: String::new(),
            email: String::new(),
            avatar_url: String::new(),
            is_site_admin: false,
            memberships: BTreeMap::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == ANONYMOUS_USER_ID
    }

    pub fn is_member_of(&self, project_id: ProjectId) -> bool {
        self.memberships
            .get(&project_id)
            .is_some_and(|m| m.is_member || m.is_admin)
    }

    pub fn is_admin_of(&self, project_id: ProjectId) -> bool {
        self.is_site_admin
            || self
                .memberships
                .get(&project_id)
                .is_some_and(|m| m.is_admin)
    }

    /// Every group the user belongs to in the context of a project.
    pub fn ugroups_in(&self, project_id: ProjectId) -> BTreeSet<UgroupId> {
        let mut ugroups = BTreeSet::from([UGROUP_ANONYMOUS]);
        if self.is_anonymous() {
            return ugroups;
        }
        ugroups.insert(UGROUP_REGISTERED);
        if let Some(membership) = self.memberships.get(&project_id) {
            if membership.is_member || membership.is_admin {
                ugroups.insert(UGROUP_PROJECT_MEMBERS);
            }
            if membership.is_admin {
                ugroups.insert(UGROUP_PROJECT_ADMIN);
            }
            ugroups.extend(membership.static_ugroups.iter().copied());
        }
        ugroups
    }

    pub fn can_access_project(&self, project: &Project) -> bool {
        self.is_site_admin || project.is_public || self.is_member_of(project.id)
    }

    pub fn can_view_tracker(&self, tracker: &Tracker) -> bool {
        if !self.can_access_project(&tracker.project) {
            return false;
        }
        if self.is_admin_of(tracker.project.id) {
            return true;
        }
        let ugroups = self.ugroups_in(tracker.project.id);
        tracker.view_ugroups.iter().any(|g| ugroups.contains(g))
    }

    pub fn can_read_field(&self, tracker: &Tracker, field: &TrackerField) -> bool {
        if !self.can_view_tracker(tracker) {
            return false;
        }
        if self.is_admin_of(tracker.project.id) {
            return true;
        }
        let ugroups = self.ugroups_in(tracker.project.id);
        field.read_ugroups.iter().any(|g| ugroups.contains(g))
    }

    /// Readable field of a tracker by id.
    pub fn readable_field<'t>(
        &self,
        tracker: &'t Tracker,
        field_id: Option<FieldId>,
    ) -> Option<&'t TrackerField> {
        let field = tracker.field(field_id?)?;
        self.can_read_field(tracker, field).then_some(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(is_public: bool) -> Project {
        Project {
            id: 101,
            short_name: "acme".to_string(),
            public_name: "Acme".to_string(),
            icon: String::new(),
            is_public,
        }
    }

    fn tracker(project: Project) -> Tracker {
        Tracker {
            id: 1,
            project,
            item_name: "bug".to_string(),
            name: "Bugs".to_string(),
            color: "fiesta-red".to_string(),
            fields: vec![TrackerField {
                id: 10,
                tracker_id: 1,
                name: "summary".to_string(),
                label: "Summary".to_string(),
                kind: FieldKind::String,
                read_ugroups: vec![UGROUP_PROJECT_MEMBERS],
            }],
            view_ugroups: vec![UGROUP_REGISTERED],
            title_field: Some(10),
            description_field: None,
            status: None,
            contributor_field: None,
        }
    }

    fn user(memberships: BTreeMap<ProjectId, Membership>) -> User {
        User {
            id: 120,
            user_name: "alice".to_string(),
            real_name: "Alice".to_string(),
            email: String::new(),
            avatar_url: String::new(),
            is_site_admin: false,
            memberships,
        }
    }

    #[test]
    fn test_field_kind_from_storage() {
        assert_eq!(
            FieldKind::from_storage("date", None, true),
            Some(FieldKind::Date { with_time: true })
        );
        assert_eq!(
            FieldKind::from_storage("msb", Some("users"), false),
            Some(FieldKind::List {
                widget: ListWidget::MultiSelectBox,
                bind: ListBind::Users
            })
        );
        assert_eq!(FieldKind::from_storage("art_link", None, false), None);
        assert_eq!(FieldKind::from_storage("sb", Some("weird"), false), None);
    }

    #[test]
    fn test_anonymous_user_groups() {
        let anonymous = User::anonymous();
        assert!(anonymous.is_anonymous());
        assert_eq!(anonymous.ugroups_in(101), BTreeSet::from([UGROUP_ANONYMOUS]));
    }

    #[test]
    fn test_registered_user_can_view_but_not_read_member_field() {
        let t = tracker(project(true));
        let u = user(BTreeMap::new());
        assert!(u.can_view_tracker(&t));
        assert!(!u.can_read_field(&t, &t.fields[0]));
    }

    #[test]
    fn test_member_reads_field() {
        let t = tracker(project(true));
        let u = user(BTreeMap::from([(
            101,
            Membership {
                is_member: true,
                ..Default::default()
            },
        )]));
        assert!(u.can_read_field(&t, &t.fields[0]));
        assert_eq!(u.readable_field(&t, Some(10)).map(|f| f.id), Some(10));
    }

    #[test]
    fn test_private_project_hidden_from_non_members() {
        let t = tracker(project(false));
        let u = user(BTreeMap::new());
        assert!(!u.can_view_tracker(&t));
    }

    #[test]
    fn test_project_admin_bypasses_permissions() {
        let mut t = tracker(project(false));
        t.view_ugroups.clear();
        let u = user(BTreeMap::from([(
            101,
            Membership {
                is_admin: true,
                ..Default::default()
            },
        )]));
        assert!(u.can_view_tracker(&t));
        assert!(u.can_read_field(&t, &t.fields[0]));
    }
}
