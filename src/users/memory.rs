use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::dto::{SortBy, SortDirection, UsersQuery};
use crate::users::repo::{
    BanInfoRepository, EmailConfirmationRepository, UniqueViolation, UsersRepository,
};
use crate::users::repo_types::{BanInfo, EmailConfirmation, User};

/// Process-local stand-in for the three Postgres tables.
#[derive(Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    ban_info: RwLock<HashMap<Uuid, BanInfo>>,
    confirmations: RwLock<HashMap<Uuid, EmailConfirmation>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user(&self, user_id: Uuid) -> Option<User> {
        self.users.read().await.get(&user_id).cloned()
    }

    pub async fn ban_info(&self, user_id: Uuid) -> Option<BanInfo> {
        self.ban_info.read().await.get(&user_id).cloned()
    }

    pub async fn confirmation(&self, user_id: Uuid) -> Option<EmailConfirmation> {
        self.confirmations.read().await.get(&user_id).cloned()
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches(query: &UsersQuery, user: &User, ban_info: &BanInfo) -> bool {
    let by_term = match (query.login_term(), query.email_term()) {
        (None, None) => true,
        (login, email) => {
            login.is_some_and(|t| contains_ci(&user.login, t))
                || email.is_some_and(|t| contains_ci(&user.email, t))
        }
    };
    let by_ban = query
        .ban_status
        .is_banned()
        .map_or(true, |banned| ban_info.is_banned == banned);
    by_term && by_ban
}

fn compare(sort_by: SortBy, a: &User, b: &User) -> Ordering {
    let ord = match sort_by {
        SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
        SortBy::Login => a.login.cmp(&b.login),
        SortBy::Email => a.email.cmp(&b.email),
    };
    ord.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl UsersRepository for InMemoryStore {
    async fn create(&self, user: User) -> anyhow::Result<User> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            anyhow::bail!("duplicate user id {}", user.id);
        }
        for existing in users.values() {
            if existing.login == user.login {
                return Err(UniqueViolation { field: "login" }.into());
            }
            if existing.email == user.email {
                return Err(UniqueViolation { field: "email" }.into());
            }
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_password(
        &self,
        user_id: Uuid,
        salt: &str,
        hash: &str,
    ) -> anyhow::Result<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&user_id) else {
            return Ok(false);
        };
        user.password_salt = salt.to_string();
        user.password_hash = hash.to_string();
        Ok(true)
    }

    async fn delete_by_id(&self, user_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.users.write().await.remove(&user_id).is_some())
    }

    async fn find_by_login_or_email(
        &self,
        login: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.login == login || u.email == email)
            .cloned())
    }

    async fn list_with_ban_info(
        &self,
        query: &UsersQuery,
    ) -> anyhow::Result<(Vec<(User, BanInfo)>, i64)> {
        let users = self.users.read().await;
        let ban_info = self.ban_info.read().await;

        let mut rows: Vec<(User, BanInfo)> = users
            .values()
            .filter_map(|u| ban_info.get(&u.id).map(|b| (u.clone(), b.clone())))
            .filter(|(u, b)| matches(query, u, b))
            .collect();
        rows.sort_by(|(a, _), (b, _)| {
            let ord = compare(query.sort_by, a, b);
            match query.sort_direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });

        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl BanInfoRepository for InMemoryStore {
    async fn create(&self, ban_info: BanInfo) -> anyhow::Result<BanInfo> {
        self.ban_info
            .write()
            .await
            .insert(ban_info.user_id, ban_info.clone());
        Ok(ban_info)
    }

    async fn update_ban_status(
        &self,
        user_id: Uuid,
        is_banned: bool,
        ban_reason: Option<String>,
        ban_date: Option<OffsetDateTime>,
    ) -> anyhow::Result<bool> {
        let mut all = self.ban_info.write().await;
        let Some(row) = all.get_mut(&user_id) else {
            return Ok(false);
        };
        row.is_banned = is_banned;
        row.ban_reason = ban_reason;
        row.ban_date = ban_date;
        Ok(true)
    }

    async fn delete_by_id(&self, user_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.ban_info.write().await.remove(&user_id).is_some())
    }
}

#[async_trait]
impl EmailConfirmationRepository for InMemoryStore {
    async fn create(
        &self,
        confirmation: EmailConfirmation,
    ) -> anyhow::Result<EmailConfirmation> {
        self.confirmations
            .write()
            .await
            .insert(confirmation.user_id, confirmation.clone());
        Ok(confirmation)
    }

    async fn find_by_code_or_id(&self, token: &str) -> anyhow::Result<Option<EmailConfirmation>> {
        let all = self.confirmations.read().await;
        if let Some(found) = all
            .values()
            .find(|c| c.confirmation_code.as_deref() == Some(token))
        {
            return Ok(Some(found.clone()));
        }
        Ok(Uuid::parse_str(token)
            .ok()
            .and_then(|id| all.get(&id).cloned()))
    }

    async fn mark_confirmed(&self, user_id: Uuid) -> anyhow::Result<bool> {
        let mut all = self.confirmations.write().await;
        match all.get_mut(&user_id) {
            Some(row) if !row.is_confirmed => {
                row.is_confirmed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_by_id(&self, user_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.confirmations.write().await.remove(&user_id).is_some())
    }
}
