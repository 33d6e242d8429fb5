use serde::{Deserialize, Serialize};

/// The user record returned by `/auth/login`, `/auth/register` and `/auth/me`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

impl User {
    /// Construct a new User with optional company and roles.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
        company: Option<String>,
        roles: Option<Vec<String>>,
    ) -> Self {
        User {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            company,
            roles: roles.unwrap_or_default(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_without_optional_fields() {
        let user: User =
            serde_json::from_str(r#"{"id":"u1","name":"Ann","email":"ann@example.com"}"#)
                .unwrap();
        assert_eq!(user.company, None);
        assert!(user.roles.is_empty());
        assert!(!user.has_role("admin"));
    }

    #[test]
    fn omits_empty_optionals_when_serialized() {
        let user = User::new("u1", "Ann", "ann@example.com", None, None);
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("company").is_none());
        assert!(json.get("roles").is_none());
    }
}
