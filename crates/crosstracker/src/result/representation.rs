//! JSON representations of selected values.

use serde::Serialize;

use crate::config::EngineConfig;
use crate::types::{ArtifactId, UserId};

const DEFAULT_AVATAR: &str = "/themes/common/images/avatar_default.png";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NumericValue {
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticListValue {
    pub label: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserGroupValue {
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRepresentation {
    pub display_name: String,
    pub avatar_url: String,
    pub user_url: Option<String>,
    pub is_anonymous: bool,
}

impl UserRepresentation {
    /// A registered user, or an anonymous one known only by `label` (an
    /// email typed in an open list) when `id` is missing.
    pub fn build(
        id: Option<UserId>,
        user_name: Option<&str>,
        real_name: Option<&str>,
        avatar_url: Option<&str>,
        label: Option<&str>,
        config: &EngineConfig,
    ) -> Self {
        match (id, user_name) {
            (Some(id), Some(user_name)) if id != 0 => Self {
                display_name: config
                    .user_display_format
                    .display(user_name, real_name.unwrap_or_default()),
                avatar_url: avatar_url
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}{DEFAULT_AVATAR}", config.base_uri)),
                user_url: Some(format!("{}/users/{user_name}", config.base_uri)),
                is_anonymous: false,
            },
            _ => Self::anonymous(label, config),
        }
    }

    pub fn anonymous(label: Option<&str>, config: &EngineConfig) -> Self {
        Self {
            display_name: label.unwrap_or("Anonymous user").to_string(),
            avatar_url: format!("{}{DEFAULT_AVATAR}", config.base_uri),
            user_url: None,
            is_anonymous: true,
        }
    }
}

/// Value of one column for one artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ValueRepresentation {
    Artifact {
        id: ArtifactId,
        uri: String,
    },
    Date {
        value: Option<String>,
        with_time: bool,
    },
    Numeric {
        value: Option<NumericValue>,
    },
    Text {
        value: Option<String>,
        format: String,
    },
    StaticList {
        value: Vec<StaticListValue>,
    },
    UserList {
        value: Vec<UserRepresentation>,
    },
    UserGroupList {
        value: Vec<UserGroupValue>,
    },
    User(UserRepresentation),
    PrettyTitle {
        tracker_name: String,
        color: String,
        artifact_id: ArtifactId,
        title: String,
    },
    Project {
        name: String,
        icon: String,
    },
    Tracker {
        name: String,
        color: String,
    },
}

impl ValueRepresentation {
    pub fn artifact(id: ArtifactId, config: &EngineConfig) -> Self {
        ValueRepresentation::Artifact {
            id,
            uri: format!("{}/plugins/tracker/?aid={id}", config.base_uri),
        }
    }

    pub fn empty_text() -> Self {
        ValueRepresentation::Text {
            value: None,
            format: "text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig {
            base_uri: "https://tuleap.example.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_registered_user() {
        let user = UserRepresentation::build(
            Some(102),
            Some("jeaneude"),
            Some("Jean Eude"),
            Some(""),
            None,
            &config(),
        );
        assert_eq!(user.display_name, "Jean Eude (jeaneude)");
        assert_eq!(user.user_url.as_deref(), Some("https://tuleap.example.com/users/jeaneude"));
        assert_eq!(
            user.avatar_url,
            "https://tuleap.example.com/themes/common/images/avatar_default.png"
        );
        assert!(!user.is_anonymous);
    }

    #[test]
    fn test_email_only_user_is_anonymous() {
        let user = UserRepresentation::build(None, None, None, None, Some("alice@example.com"), &config());
        assert_eq!(user.display_name, "alice@example.com");
        assert!(user.is_anonymous);
        assert!(user.user_url.is_none());
    }

    #[test]
    fn test_untagged_serialization() {
        let json = serde_json::to_value(ValueRepresentation::artifact(12, &config())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "id": 12, "uri": "https://tuleap.example.com/plugins/tracker/?aid=12" })
        );
        let json = serde_json::to_value(ValueRepresentation::Numeric {
            value: Some(NumericValue::Float(2.5)),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "value": 2.5 }));
    }
}
