use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserAction {
    Created,
    Updated,
    Deleted,
}

impl UserAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserAction::Created => "created",
            UserAction::Updated => "updated",
            UserAction::Deleted => "deleted",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(UserAction::Created),
            "updated" => Some(UserAction::Updated),
            "deleted" => Some(UserAction::Deleted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityAction {
    Updated,
    Deleted,
}

impl IdentityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityAction::Updated => "updated",
            IdentityAction::Deleted => "deleted",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "updated" => Some(IdentityAction::Updated),
            "deleted" => Some(IdentityAction::Deleted),
            _ => None,
        }
    }
}

/// A recognized event subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    User {
        user_id: String,
        action: UserAction,
    },
    Identity {
        service_account_id: String,
        action: IdentityAction,
    },
}

impl Subject {
    pub fn user(user_id: impl Into<String>, action: UserAction) -> Self {
        Subject::User {
            user_id: user_id.into(),
            action,
        }
    }

    pub fn identity(service_account_id: impl Into<String>, action: IdentityAction) -> Self {
        Subject::Identity {
            service_account_id: service_account_id.into(),
            action,
        }
    }

    /// Parse a concrete subject. Anything this version doesn't know about
    /// yields `None`.
    pub fn parse(subject: &str) -> Option<Self> {
        let tokens: Vec<&str> = subject.split('.').collect();
        let [service, category, id, action] = tokens.as_slice() else {
            return None;
        };
        if *service != "auth" || id.is_empty() || *id == "*" || *id == ">" {
            return None;
        }

        match *category {
            "user" => UserAction::parse(action).map(|action| Subject::user(*id, action)),
            "identity" => {
                IdentityAction::parse(action).map(|action| Subject::identity(*id, action))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::User { user_id, action } => {
                write!(f, "auth.user.{}.{}", user_id, action.as_str())
            }
            Subject::Identity {
                service_account_id,
                action,
            } => write!(
                f,
                "auth.identity.{}.{}",
                service_account_id,
                action.as_str()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_subjects() {
        assert_eq!(
            Subject::parse("auth.user.u1.created"),
            Some(Subject::user("u1", UserAction::Created))
        );
        assert_eq!(
            Subject::parse("auth.identity.sa1.deleted"),
            Some(Subject::identity("sa1", IdentityAction::Deleted))
        );
    }

    #[test]
    fn test_display_matches_parse() {
        let subject = Subject::identity("sa1", IdentityAction::Updated);
        assert_eq!(subject.to_string(), "auth.identity.sa1.updated");
        assert_eq!(Subject::parse(&subject.to_string()), Some(subject));
    }

    #[test]
    fn test_unknown_shapes_are_none() {
        for subject in [
            "auth.identity.sa1.created",
            "auth.user.u1.suspended",
            "auth.group.g1.updated",
            "billing.user.u1.created",
            "auth.user.u1",
            "auth.user.u1.created.extra",
            "auth.user..created",
            "",
        ] {
            assert_eq!(Subject::parse(subject), None, "{subject}");
        }
    }
}
