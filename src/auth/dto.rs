use serde::Deserialize;

use crate::error::FieldError;
use crate::users::dto::check_length;

/// Request body for `POST /auth/new-password`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPasswordRequest {
    pub new_password: String,
    pub recovery_code: String,
}

impl NewPasswordRequest {
    /// Shape checks; the recovery code is checked against the store separately.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        check_length(&mut errors, "newPassword", &self.new_password, 6, 20);
        errors
    }
}
