use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        confirmation::{find_usable_confirmation, INVALID_CODE_MESSAGE},
        dto::NewPasswordRequest,
    },
    error::{ApiError, FieldError},
    state::AppState,
    users::services::UsersService,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/auth/new-password", post(new_password))
}

fn invalid_code() -> FieldError {
    FieldError::new("recoveryCode", INVALID_CODE_MESSAGE)
}

/// Consumes a recovery code, then sets the new password.
#[instrument(skip(state, payload))]
pub async fn new_password(
    State(state): State<AppState>,
    Json(payload): Json<NewPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let mut errors = payload.validate();

    let record =
        find_usable_confirmation(state.confirmations.as_ref(), payload.recovery_code.trim())
            .await?;
    if record.is_none() {
        warn!("recovery code rejected");
        errors.push(invalid_code());
    }

    let record = match record {
        Some(r) if errors.is_empty() => r,
        _ => return Err(ApiError::Validation(errors)),
    };

    // The code is claimed before the password changes; a concurrent request
    // holding the same code loses here.
    if !state.confirmations.mark_confirmed(record.user_id).await? {
        warn!(user_id = %record.user_id, "recovery code already consumed");
        return Err(ApiError::Validation(vec![invalid_code()]));
    }

    let service = UsersService::from_ref(&state);
    if !service
        .update_user_password(record.user_id, &payload.new_password)
        .await?
    {
        return Err(ApiError::NotFound);
    }

    info!(user_id = %record.user_id, "password recovered");
    Ok(StatusCode::NO_CONTENT)
}
