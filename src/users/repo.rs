use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::dto::UsersQuery;
use crate::users::repo_types::{BanInfo, EmailConfirmation, User, UserWithBanInfoRow};

/// A user insert collided with an existing login or email.
#[derive(Debug, thiserror::Error)]
#[error("{field} already exists")]
pub struct UniqueViolation {
    pub field: &'static str,
}

#[async_trait]
pub trait UsersRepository: Send + Sync {
    /// Fails with [`UniqueViolation`] when the login or email is taken.
    async fn create(&self, user: User) -> anyhow::Result<User>;
    async fn update_password(&self, user_id: Uuid, salt: &str, hash: &str)
        -> anyhow::Result<bool>;
    async fn delete_by_id(&self, user_id: Uuid) -> anyhow::Result<bool>;
    /// Any user holding either the login or the email.
    async fn find_by_login_or_email(&self, login: &str, email: &str)
        -> anyhow::Result<Option<User>>;
    /// One page of users joined with their ban info, plus the total match count.
    async fn list_with_ban_info(
        &self,
        query: &UsersQuery,
    ) -> anyhow::Result<(Vec<(User, BanInfo)>, i64)>;
}

#[async_trait]
pub trait BanInfoRepository: Send + Sync {
    async fn create(&self, ban_info: BanInfo) -> anyhow::Result<BanInfo>;
    async fn update_ban_status(
        &self,
        user_id: Uuid,
        is_banned: bool,
        ban_reason: Option<String>,
        ban_date: Option<OffsetDateTime>,
    ) -> anyhow::Result<bool>;
    async fn delete_by_id(&self, user_id: Uuid) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait EmailConfirmationRepository: Send + Sync {
    async fn create(&self, confirmation: EmailConfirmation)
        -> anyhow::Result<EmailConfirmation>;
    /// Resolves `token` as a confirmation code, falling back to a user id.
    async fn find_by_code_or_id(&self, token: &str) -> anyhow::Result<Option<EmailConfirmation>>;
    /// Flips `is_confirmed` from false to true. `false` when the row is
    /// missing or was already confirmed, so only one caller can win.
    async fn mark_confirmed(&self, user_id: Uuid) -> anyhow::Result<bool>;
    async fn delete_by_id(&self, user_id: Uuid) -> anyhow::Result<bool>;
}

// ---- Postgres ----

#[derive(Clone)]
pub struct PgUsersRepository {
    db: PgPool,
}

impl PgUsersRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const USER_FILTER: &str = r#"
    WHERE (($1::text IS NULL AND $2::text IS NULL)
           OR ($1::text IS NOT NULL AND u.login ILIKE '%' || $1 || '%')
           OR ($2::text IS NOT NULL AND u.email ILIKE '%' || $2 || '%'))
      AND ($3::bool IS NULL OR b.is_banned = $3)
"#;

#[async_trait]
impl UsersRepository for PgUsersRepository {
    async fn create(&self, user: User) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, login, email, password_salt, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, login, email, password_salt, password_hash, created_at
            "#,
        )
        .bind(user.id)
        .bind(&user.login)
        .bind(&user.email)
        .bind(&user.password_salt)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .fetch_one(&self.db)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                let field = match db.constraint() {
                    Some("users_email_key") => "email",
                    _ => "login",
                };
                anyhow::Error::new(UniqueViolation { field })
            }
            _ => anyhow::Error::new(err).context("insert user"),
        })?;
        Ok(user)
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        salt: &str,
        hash: &str,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"UPDATE users SET password_salt = $2, password_hash = $3 WHERE id = $1"#,
        )
        .bind(user_id)
        .bind(salt)
        .bind(hash)
        .execute(&self.db)
        .await
        .context("update user password")?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_by_id(&self, user_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_by_login_or_email(
        &self,
        login: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, login, email, password_salt, password_hash, created_at
            FROM users
            WHERE login = $1 OR email = $2
            LIMIT 1
            "#,
        )
        .bind(login)
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by login or email")?;
        Ok(user)
    }

    async fn list_with_ban_info(
        &self,
        query: &UsersQuery,
    ) -> anyhow::Result<(Vec<(User, BanInfo)>, i64)> {
        // sort column and direction come from closed enums
        let sql = format!(
            r#"
            SELECT u.id, u.login, u.email, u.password_salt, u.password_hash, u.created_at,
                   b.is_banned, b.ban_reason, b.ban_date, b.blog_id
            FROM users u
            JOIN ban_info b ON b.user_id = u.id
            {USER_FILTER}
            ORDER BY {column} {dir}, u.id {dir}
            LIMIT $4 OFFSET $5
            "#,
            column = query.sort_by.column(),
            dir = query.sort_direction.sql(),
        );
        let rows = sqlx::query_as::<_, UserWithBanInfoRow>(&sql)
            .bind(query.login_term())
            .bind(query.email_term())
            .bind(query.ban_status.is_banned())
            .bind(query.limit())
            .bind(query.offset())
            .fetch_all(&self.db)
            .await
            .context("list users")?;

        let count_sql = format!(
            r#"
            SELECT COUNT(*)
            FROM users u
            JOIN ban_info b ON b.user_id = u.id
            {USER_FILTER}
            "#
        );
        let (total,): (i64,) = sqlx::query_as(&count_sql)
            .bind(query.login_term())
            .bind(query.email_term())
            .bind(query.ban_status.is_banned())
            .fetch_one(&self.db)
            .await
            .context("count users")?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }
}

#[derive(Clone)]
pub struct PgBanInfoRepository {
    db: PgPool,
}

impl PgBanInfoRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BanInfoRepository for PgBanInfoRepository {
    async fn create(&self, ban_info: BanInfo) -> anyhow::Result<BanInfo> {
        let row = sqlx::query_as::<_, BanInfo>(
            r#"
            INSERT INTO ban_info (user_id, is_banned, ban_reason, ban_date, blog_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING user_id, is_banned, ban_reason, ban_date, blog_id
            "#,
        )
        .bind(ban_info.user_id)
        .bind(ban_info.is_banned)
        .bind(&ban_info.ban_reason)
        .bind(ban_info.ban_date)
        .bind(&ban_info.blog_id)
        .fetch_one(&self.db)
        .await
        .context("insert ban info")?;
        Ok(row)
    }

    async fn update_ban_status(
        &self,
        user_id: Uuid,
        is_banned: bool,
        ban_reason: Option<String>,
        ban_date: Option<OffsetDateTime>,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE ban_info
               SET is_banned = $2, ban_reason = $3, ban_date = $4
             WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(is_banned)
        .bind(ban_reason)
        .bind(ban_date)
        .execute(&self.db)
        .await
        .context("update ban status")?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_by_id(&self, user_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(r#"DELETE FROM ban_info WHERE user_id = $1"#)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("delete ban info")?;
        Ok(res.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgEmailConfirmationRepository {
    db: PgPool,
}

impl PgEmailConfirmationRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EmailConfirmationRepository for PgEmailConfirmationRepository {
    async fn create(
        &self,
        confirmation: EmailConfirmation,
    ) -> anyhow::Result<EmailConfirmation> {
        let row = sqlx::query_as::<_, EmailConfirmation>(
            r#"
            INSERT INTO email_confirmation (user_id, confirmation_code, expiration_date, is_confirmed)
            VALUES ($1, $2, $3, $4)
            RETURNING user_id, confirmation_code, expiration_date, is_confirmed
            "#,
        )
        .bind(confirmation.user_id)
        .bind(&confirmation.confirmation_code)
        .bind(confirmation.expiration_date)
        .bind(confirmation.is_confirmed)
        .fetch_one(&self.db)
        .await
        .context("insert email confirmation")?;
        Ok(row)
    }

    async fn find_by_code_or_id(&self, token: &str) -> anyhow::Result<Option<EmailConfirmation>> {
        let by_code = sqlx::query_as::<_, EmailConfirmation>(
            r#"
            SELECT user_id, confirmation_code, expiration_date, is_confirmed
            FROM email_confirmation
            WHERE confirmation_code = $1
            LIMIT 1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await
        .context("find email confirmation by code")?;
        if by_code.is_some() {
            return Ok(by_code);
        }

        let Ok(user_id) = Uuid::parse_str(token) else {
            return Ok(None);
        };
        let by_id = sqlx::query_as::<_, EmailConfirmation>(
            r#"
            SELECT user_id, confirmation_code, expiration_date, is_confirmed
            FROM email_confirmation
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("find email confirmation by id")?;
        Ok(by_id)
    }

    async fn mark_confirmed(&self, user_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE email_confirmation
               SET is_confirmed = TRUE
             WHERE user_id = $1 AND is_confirmed = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&self.db)
        .await
        .context("mark email confirmation confirmed")?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_by_id(&self, user_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(r#"DELETE FROM email_confirmation WHERE user_id = $1"#)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("delete email confirmation")?;
        Ok(res.rows_affected() > 0)
    }
}
