use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_salt: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string, salted with password_salt
    pub created_at: OffsetDateTime,
}

/// Administrative ban state, one row per user.
///
/// `ban_reason` and `ban_date` are set exactly when `is_banned` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BanInfo {
    pub user_id: Uuid,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub ban_date: Option<OffsetDateTime>,
    pub blog_id: Option<String>, // legacy, never written
}

impl BanInfo {
    pub fn not_banned(user_id: Uuid) -> Self {
        Self {
            user_id,
            is_banned: false,
            ban_reason: None,
            ban_date: None,
            blog_id: None,
        }
    }
}

/// Email confirmation / password recovery state, one row per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EmailConfirmation {
    pub user_id: Uuid,
    pub confirmation_code: Option<String>,
    pub expiration_date: Option<OffsetDateTime>,
    pub is_confirmed: bool,
}

impl EmailConfirmation {
    /// Accounts created by a super admin skip email verification.
    pub fn pre_confirmed(user_id: Uuid) -> Self {
        Self {
            user_id,
            confirmation_code: None,
            expiration_date: None,
            is_confirmed: true,
        }
    }
}

/// Joined row used by the listing query.
#[derive(Debug, Clone, FromRow)]
pub struct UserWithBanInfoRow {
    pub id: Uuid,
    pub login: String,
    pub email: String,
    pub password_salt: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub ban_date: Option<OffsetDateTime>,
    pub blog_id: Option<String>,
}

impl From<UserWithBanInfoRow> for (User, BanInfo) {
    fn from(r: UserWithBanInfoRow) -> Self {
        let ban_info = BanInfo {
            user_id: r.id,
            is_banned: r.is_banned,
            ban_reason: r.ban_reason,
            ban_date: r.ban_date,
            blog_id: r.blog_id,
        };
        let user = User {
            id: r.id,
            login: r.login,
            email: r.email,
            password_salt: r.password_salt,
            password_hash: r.password_hash,
            created_at: r.created_at,
        };
        (user, ban_info)
    }
}
