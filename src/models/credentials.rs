//! Login and registration input, validated locally before any request is sent.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

const REQUIRED: &str = "required";
const MISMATCH: &str = "mismatch";
const TOO_SHORT: &str = "too_short";

pub const MIN_PASSWORD_LENGTH: usize = 6;

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(REQUIRED));
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone, Validate)]
pub struct LoginCredentials {
    #[validate(custom(function = "not_blank"))]
    pub email: String,
    #[validate(custom(function = "not_blank"))]
    pub password: String,
}

impl LoginCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        LoginCredentials {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// The registration form as a user fills it in, including the confirmation
/// field that never leaves the client.
#[derive(Debug, Clone, Default, Validate)]
pub struct RegistrationForm {
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    #[validate(custom(function = "not_blank"))]
    pub email: String,
    #[validate(
        custom(function = "not_blank"),
        length(min = 6, code = "too_short")
    )]
    pub password: String,
    #[validate(
        custom(function = "not_blank"),
        must_match(other = "password", code = "mismatch")
    )]
    pub confirm_password: String,
    pub company: Option<String>,
}

impl RegistrationForm {
    /// Validate the form and produce the body posted to `/auth/register`.
    pub fn into_register_data(self) -> Result<RegisterData, ValidationErrors> {
        self.validate()?;
        Ok(RegisterData {
            name: self.name,
            email: self.email,
            password: self.password,
            company: self.company.filter(|c| !c.trim().is_empty()),
        })
    }
}

/// Body of `POST /auth/register`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterData {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

/// Collapse validation errors into the single message shown to the user.
/// Missing fields win over mismatched passwords, which win over length.
pub fn describe(errors: &ValidationErrors) -> String {
    let codes: Vec<String> = errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .map(|e| e.code.to_string())
        .collect();
    let has = |code: &str| codes.iter().any(|c| c == code);

    if has(REQUIRED) {
        "All fields are required".to_string()
    } else if has(MISMATCH) {
        "Passwords do not match".to_string()
    } else if has(TOO_SHORT) {
        format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH)
    } else {
        "Invalid input".to_string()
    }
}
