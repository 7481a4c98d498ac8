use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    auth::extractors::SuperAdmin,
    error::{ApiError, FieldError},
    state::AppState,
    users::{
        dto::{BanUserRequest, CreateUserRequest, Paginated, UserView, UsersQuery},
        services::{CreateUserInput, UsersService},
    },
};

pub fn sa_routes() -> Router<AppState> {
    Router::new()
        .route("/sa/users", get(list_users).post(create_user))
        .route("/sa/users/:user_id/ban", put(update_ban_status))
        .route("/sa/users/:user_id", delete(delete_user))
}

/// Unparseable ids cannot match a row.
fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound)
}

#[instrument(skip(_admin, service))]
pub async fn list_users(
    _admin: SuperAdmin,
    State(service): State<UsersService>,
    Query(query): Query<UsersQuery>,
) -> Result<Json<Paginated<UserView>>, ApiError> {
    Ok(Json(service.list_users(&query).await?))
}

#[instrument(skip(_admin, service, payload))]
pub async fn create_user(
    _admin: SuperAdmin,
    State(service): State<UsersService>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserView>), ApiError> {
    let mut errors = payload.validate();
    if !errors.is_empty() {
        warn!(?errors, "create user rejected");
        return Err(ApiError::Validation(errors));
    }

    let login = payload.login.trim().to_string();
    let email = payload.email.trim().to_lowercase();
    if let Some(existing) = service.find_conflicting_user(&login, &email).await? {
        if existing.login == login {
            errors.push(FieldError::new("login", "login already exists"));
        }
        if existing.email == email {
            errors.push(FieldError::new("email", "email already exists"));
        }
        warn!(?errors, "create user conflict");
        return Err(ApiError::Validation(errors));
    }

    let created = service
        .create_user(CreateUserInput {
            login,
            email,
            password: payload.password,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UserView::new(created.user, created.ban_info)),
    ))
}

#[instrument(skip(_admin, service, payload))]
pub async fn update_ban_status(
    _admin: SuperAdmin,
    State(service): State<UsersService>,
    Path(user_id): Path<String>,
    Json(payload): Json<BanUserRequest>,
) -> Result<StatusCode, ApiError> {
    let errors = payload.validate();
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    let user_id = parse_user_id(&user_id)?;

    let reason = payload.ban_reason.map(|r| r.trim().to_string());
    if !service
        .update_ban_status(user_id, payload.is_banned, reason)
        .await?
    {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(_admin, service))]
pub async fn delete_user(
    _admin: SuperAdmin,
    State(service): State<UsersService>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user_id = parse_user_id(&user_id)?;
    if !service.delete_user(user_id).await? {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}
