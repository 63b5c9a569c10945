//! `@metadata` names and where each one may be used.

use serde::{Deserialize, Serialize};

use super::Clause;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metadata {
    Id,
    Title,
    Description,
    Status,
    AssignedTo,
    SubmittedOn,
    LastUpdateDate,
    SubmittedBy,
    LastUpdateBy,
    ProjectName,
    TrackerName,
    PrettyTitle,
    Artifact,
}

impl Metadata {
    pub const ALL: [Metadata; 13] = [
        Metadata::Id,
        Metadata::Title,
        Metadata::Description,
        Metadata::Status,
        Metadata::AssignedTo,
        Metadata::SubmittedOn,
        Metadata::LastUpdateDate,
        Metadata::SubmittedBy,
        Metadata::LastUpdateBy,
        Metadata::ProjectName,
        Metadata::TrackerName,
        Metadata::PrettyTitle,
        Metadata::Artifact,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// Name without the leading `@`.
    pub fn name(&self) -> &'static str {
        match self {
            Metadata::Id => "id",
            Metadata::Title => "title",
            Metadata::Description => "description",
            Metadata::Status => "status",
            Metadata::AssignedTo => "assigned_to",
            Metadata::SubmittedOn => "submitted_on",
            Metadata::LastUpdateDate => "last_update_date",
            Metadata::SubmittedBy => "submitted_by",
            Metadata::LastUpdateBy => "last_update_by",
            Metadata::ProjectName => "project.name",
            Metadata::TrackerName => "tracker.name",
            Metadata::PrettyTitle => "pretty_title",
            Metadata::Artifact => "artifact",
        }
    }

    pub fn is_allowed_in(&self, clause: Clause) -> bool {
        match clause {
            Clause::Select => true,
            Clause::Where => !matches!(
                self,
                Metadata::ProjectName
                    | Metadata::TrackerName
                    | Metadata::PrettyTitle
                    | Metadata::Artifact
            ),
            Clause::OrderBy => !matches!(
                self,
                Metadata::ProjectName
                    | Metadata::TrackerName
                    | Metadata::PrettyTitle
                    | Metadata::Artifact
            ),
        }
    }

    /// Type of the result column.
    pub fn column_type(&self) -> &'static str {
        match self {
            Metadata::Id => "numeric",
            Metadata::Title | Metadata::Description => "text",
            Metadata::Status => "list_static",
            Metadata::AssignedTo => "list_user",
            Metadata::SubmittedOn | Metadata::LastUpdateDate => "date",
            Metadata::SubmittedBy | Metadata::LastUpdateBy => "user",
            Metadata::ProjectName => "project",
            Metadata::TrackerName => "tracker",
            Metadata::PrettyTitle => "pretty_title",
            Metadata::Artifact => "artifact",
        }
    }
}

impl std::fmt::Display for Metadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for metadata in Metadata::ALL {
            assert_eq!(Metadata::from_name(metadata.name()), Some(metadata));
        }
        assert_eq!(Metadata::from_name("status.name"), None);
    }

    #[test]
    fn test_usage_restrictions() {
        assert!(Metadata::PrettyTitle.is_allowed_in(Clause::Select));
        assert!(!Metadata::PrettyTitle.is_allowed_in(Clause::Where));
        assert!(!Metadata::ProjectName.is_allowed_in(Clause::OrderBy));
        assert!(Metadata::LastUpdateBy.is_allowed_in(Clause::OrderBy));
        assert!(Metadata::Status.is_allowed_in(Clause::Where));
    }
}
