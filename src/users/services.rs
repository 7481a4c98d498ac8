use std::sync::Arc;

use axum::extract::FromRef;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::state::AppState;
use crate::users::dto::{Paginated, UserView, UsersQuery};
use crate::users::repo::{BanInfoRepository, EmailConfirmationRepository, UsersRepository};
use crate::users::repo_types::{BanInfo, EmailConfirmation, User};

/// Validated input of [`UsersService::create_user`].
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub login: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct CreatedUser {
    pub user: User,
    pub ban_info: BanInfo,
}

/// Create, ban and delete rules over the users, ban info and email
/// confirmation stores.
#[derive(Clone)]
pub struct UsersService {
    users: Arc<dyn UsersRepository>,
    ban_info: Arc<dyn BanInfoRepository>,
    confirmations: Arc<dyn EmailConfirmationRepository>,
}

impl FromRef<AppState> for UsersService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(
            state.users.clone(),
            state.ban_info.clone(),
            state.confirmations.clone(),
        )
    }
}

impl UsersService {
    pub fn new(
        users: Arc<dyn UsersRepository>,
        ban_info: Arc<dyn BanInfoRepository>,
        confirmations: Arc<dyn EmailConfirmationRepository>,
    ) -> Self {
        Self {
            users,
            ban_info,
            confirmations,
        }
    }

    /// Writes the user, its ban info and a pre-confirmed email confirmation.
    ///
    /// When a dependent write fails, the rows already written are deleted
    /// best-effort and the original error is returned.
    pub async fn create_user(&self, input: CreateUserInput) -> anyhow::Result<CreatedUser> {
        let salted = hash_password(&input.password)?;
        let user_id = Uuid::new_v4();

        let user = User {
            id: user_id,
            login: input.login,
            email: input.email,
            password_salt: salted.salt,
            password_hash: salted.hash,
            created_at: OffsetDateTime::now_utc(),
        };

        let user = self.users.create(user).await?;

        let ban_info = match self.ban_info.create(BanInfo::not_banned(user_id)).await {
            Ok(b) => b,
            Err(e) => {
                self.compensate_create(user_id, false).await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .confirmations
            .create(EmailConfirmation::pre_confirmed(user_id))
            .await
        {
            self.compensate_create(user_id, true).await;
            return Err(e);
        }

        info!(user_id = %user.id, login = %user.login, "user created");
        Ok(CreatedUser { user, ban_info })
    }

    async fn compensate_create(&self, user_id: Uuid, ban_info_written: bool) {
        warn!(%user_id, "user creation failed part-way; rolling back");
        if ban_info_written {
            if let Err(e) = self.ban_info.delete_by_id(user_id).await {
                error!(error = %e, %user_id, "rollback of ban info failed");
            }
        }
        if let Err(e) = self.users.delete_by_id(user_id).await {
            error!(error = %e, %user_id, "rollback of user failed");
        }
    }

    pub async fn update_user_password(
        &self,
        user_id: Uuid,
        new_password: &str,
    ) -> anyhow::Result<bool> {
        let salted = hash_password(new_password)?;
        let updated = self
            .users
            .update_password(user_id, &salted.salt, &salted.hash)
            .await?;
        if updated {
            info!(%user_id, "password updated");
        } else {
            warn!(%user_id, "password update: user not found");
        }
        Ok(updated)
    }

    /// `false` when the user has no ban info row.
    pub async fn update_ban_status(
        &self,
        user_id: Uuid,
        is_banned: bool,
        ban_reason: Option<String>,
    ) -> anyhow::Result<bool> {
        let (ban_reason, ban_date) = if is_banned {
            (ban_reason, Some(OffsetDateTime::now_utc()))
        } else {
            (None, None)
        };

        let updated = self
            .ban_info
            .update_ban_status(user_id, is_banned, ban_reason, ban_date)
            .await?;
        if updated {
            info!(%user_id, is_banned, "ban status updated");
        } else {
            warn!(%user_id, "ban status update: user not found");
        }
        Ok(updated)
    }

    /// Returns whether the user existed. Ban info and email confirmation are
    /// deleted either way.
    pub async fn delete_user(&self, user_id: Uuid) -> anyhow::Result<bool> {
        let user_deleted = self.users.delete_by_id(user_id).await?;
        self.ban_info.delete_by_id(user_id).await?;
        self.confirmations.delete_by_id(user_id).await?;

        if user_deleted {
            info!(%user_id, "user deleted");
        } else {
            warn!(%user_id, "delete: user not found");
        }
        Ok(user_deleted)
    }

    pub async fn list_users(&self, query: &UsersQuery) -> anyhow::Result<Paginated<UserView>> {
        let (rows, total) = self.users.list_with_ban_info(query).await?;
        let items = rows
            .into_iter()
            .map(|(user, ban_info)| UserView::new(user, ban_info))
            .collect();
        Ok(Paginated::new(query, total, items))
    }

    /// Existing user holding `login` or `email`, if any.
    pub async fn find_conflicting_user(
        &self,
        login: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        self.users.find_by_login_or_email(login, email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::verify_password;
    use crate::users::memory::InMemoryStore;
    use crate::users::repo::UniqueViolation;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service(store: &Arc<InMemoryStore>) -> UsersService {
        UsersService::new(store.clone(), store.clone(), store.clone())
    }

    fn alice() -> CreateUserInput {
        CreateUserInput {
            login: "alice".into(),
            email: "a@x.com".into(),
            password: "Secret1".into(),
        }
    }

    #[tokio::test]
    async fn create_user_writes_all_three_records() {
        let store = Arc::new(InMemoryStore::new());
        let created = service(&store).create_user(alice()).await.unwrap();
        let id = created.user.id;

        assert_eq!(created.ban_info.user_id, id);
        assert!(!created.ban_info.is_banned);
        assert_eq!(created.ban_info.ban_reason, None);
        assert_eq!(created.ban_info.ban_date, None);
        assert_eq!(created.ban_info.blog_id, None);

        let stored = store.user(id).await.unwrap();
        assert_eq!(stored.login, "alice");
        assert_eq!(stored.email, "a@x.com");
        assert!(verify_password("Secret1", &stored.password_hash).unwrap());

        let confirmation = store.confirmation(id).await.unwrap();
        assert!(confirmation.is_confirmed);
        assert_eq!(confirmation.confirmation_code, None);
        assert_eq!(confirmation.expiration_date, None);

        assert_eq!(store.ban_info(id).await, Some(created.ban_info));
    }

    #[tokio::test]
    async fn ban_then_unban() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        let id = svc.create_user(alice()).await.unwrap().user.id;

        assert!(svc
            .update_ban_status(id, true, Some("spam".into()))
            .await
            .unwrap());
        let ban = store.ban_info(id).await.unwrap();
        assert!(ban.is_banned);
        assert_eq!(ban.ban_reason.as_deref(), Some("spam"));
        assert!(ban.ban_date.is_some());

        assert!(svc
            .update_ban_status(id, false, Some("ignored".into()))
            .await
            .unwrap());
        let ban = store.ban_info(id).await.unwrap();
        assert!(!ban.is_banned);
        assert_eq!(ban.ban_reason, None);
        assert_eq!(ban.ban_date, None);
    }

    #[tokio::test]
    async fn ban_unknown_user_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let found = service(&store)
            .update_ban_status(Uuid::new_v4(), true, Some("spam".into()))
            .await
            .unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn update_password_replaces_salt_and_hash() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        let id = svc.create_user(alice()).await.unwrap().user.id;
        let before = store.user(id).await.unwrap();

        assert!(svc.update_user_password(id, "NewPass9").await.unwrap());
        let after = store.user(id).await.unwrap();
        assert_ne!(before.password_salt, after.password_salt);
        assert!(verify_password("NewPass9", &after.password_hash).unwrap());
        assert!(!verify_password("Secret1", &after.password_hash).unwrap());

        assert!(!svc
            .update_user_password(Uuid::new_v4(), "NewPass9")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn delete_removes_all_records() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        let id = svc.create_user(alice()).await.unwrap().user.id;

        assert!(svc.delete_user(id).await.unwrap());
        assert!(store.user(id).await.is_none());
        assert!(store.ban_info(id).await.is_none());
        assert!(store.confirmation(id).await.is_none());
        assert!(!svc.delete_user(id).await.unwrap());
    }

    #[tokio::test]
    async fn delete_missing_user_still_cleans_dependents() {
        let store = Arc::new(InMemoryStore::new());
        let orphan = Uuid::new_v4();
        BanInfoRepository::create(store.as_ref(), BanInfo::not_banned(orphan))
            .await
            .unwrap();
        EmailConfirmationRepository::create(store.as_ref(), EmailConfirmation::pre_confirmed(orphan))
            .await
            .unwrap();

        assert!(!service(&store).delete_user(orphan).await.unwrap());
        assert!(store.ban_info(orphan).await.is_none());
        assert!(store.confirmation(orphan).await.is_none());
    }

    /// Confirmation store whose writes always fail.
    #[derive(Default)]
    struct BrokenConfirmations {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmailConfirmationRepository for BrokenConfirmations {
        async fn create(&self, _c: EmailConfirmation) -> anyhow::Result<EmailConfirmation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("connection reset")
        }
        async fn find_by_code_or_id(&self, _t: &str) -> anyhow::Result<Option<EmailConfirmation>> {
            Ok(None)
        }
        async fn mark_confirmed(&self, _id: Uuid) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn delete_by_id(&self, _id: Uuid) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn failed_confirmation_write_rolls_back_user_and_ban_info() {
        let store = Arc::new(InMemoryStore::new());
        let broken = Arc::new(BrokenConfirmations::default());
        let svc = UsersService::new(store.clone(), store.clone(), broken.clone());

        let err = svc.create_user(alice()).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);

        let (rows, total) = store
            .list_with_ban_info(&UsersQuery::default())
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);
        assert!(store
            .find_by_login_or_email("alice", "a@x.com")
            .await
            .unwrap()
            .is_none());
    }

    /// Ban info store whose writes always fail.
    struct BrokenBanInfo;

    #[async_trait]
    impl BanInfoRepository for BrokenBanInfo {
        async fn create(&self, _b: BanInfo) -> anyhow::Result<BanInfo> {
            anyhow::bail!("disk full")
        }
        async fn update_ban_status(
            &self,
            _id: Uuid,
            _is_banned: bool,
            _reason: Option<String>,
            _date: Option<OffsetDateTime>,
        ) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn delete_by_id(&self, _id: Uuid) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn failed_ban_info_write_rolls_back_user_and_skips_confirmation() {
        let store = Arc::new(InMemoryStore::new());
        let confirmations = Arc::new(BrokenConfirmations::default());
        let svc = UsersService::new(store.clone(), Arc::new(BrokenBanInfo), confirmations.clone());

        let err = svc.create_user(alice()).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(confirmations.calls.load(Ordering::SeqCst), 0);
        assert!(store
            .find_by_login_or_email("alice", "a@x.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_create_fails_without_side_effects() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        let first = svc.create_user(alice()).await.unwrap().user.id;

        let err = svc.create_user(alice()).await.unwrap_err();
        assert_eq!(err.downcast_ref::<UniqueViolation>().unwrap().field, "login");

        let (rows, total) = store
            .list_with_ban_info(&UsersQuery::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].0.id, first);
    }

    #[tokio::test]
    async fn list_maps_rows_to_views() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        svc.create_user(alice()).await.unwrap();

        let page = svc.list_users(&UsersQuery::default()).await.unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.pages_count, 1);
        assert_eq!(page.items[0].login, "alice");
        assert!(!page.items[0].ban_info.is_banned);
    }
}
