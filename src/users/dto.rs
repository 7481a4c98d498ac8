use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::FieldError;
use crate::users::repo_types::{BanInfo, User};

lazy_static! {
    static ref LOGIN_RE: Regex = Regex::new(r"^[a-zA-Z0-9_-]*$").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"^[\w.-]+@([\w-]+\.)+[\w-]{2,4}$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Checks `value` is between `min` and `max` characters, inclusive.
pub(crate) fn check_length(
    errors: &mut Vec<FieldError>,
    field: &str,
    value: &str,
    min: usize,
    max: usize,
) -> bool {
    let len = value.chars().count();
    if len < min || len > max {
        errors.push(FieldError::new(
            field,
            format!("{field} must be between {min} and {max} characters"),
        ));
        return false;
    }
    true
}

/// Request body for `POST /sa/users`.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub login: String,
    pub email: String,
    pub password: String,
}

impl CreateUserRequest {
    /// Shape checks only; uniqueness is checked against the store by the handler.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if check_length(&mut errors, "login", self.login.trim(), 3, 10)
            && !LOGIN_RE.is_match(self.login.trim())
        {
            errors.push(FieldError::new("login", "login has invalid characters"));
        }
        check_length(&mut errors, "password", &self.password, 6, 20);
        if !is_valid_email(self.email.trim()) {
            errors.push(FieldError::new("email", "email is invalid"));
        }
        errors
    }
}

/// Request body for `PUT /sa/users/:userId/ban`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanUserRequest {
    pub is_banned: bool,
    #[serde(default)]
    pub ban_reason: Option<String>,
}

impl BanUserRequest {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.is_banned {
            match self.ban_reason.as_deref().map(str::trim) {
                Some(reason) if !reason.is_empty() => {}
                _ => errors.push(FieldError::new(
                    "banReason",
                    "banReason is required when banning",
                )),
            }
        }
        errors
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    #[default]
    CreatedAt,
    Login,
    Email,
}

impl SortBy {
    pub fn column(self) -> &'static str {
        match self {
            SortBy::CreatedAt => "u.created_at",
            SortBy::Login => "u.login",
            SortBy::Email => "u.email",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BanStatusFilter {
    #[default]
    All,
    Banned,
    NotBanned,
}

impl BanStatusFilter {
    pub fn is_banned(self) -> Option<bool> {
        match self {
            BanStatusFilter::All => None,
            BanStatusFilter::Banned => Some(true),
            BanStatusFilter::NotBanned => Some(false),
        }
    }
}

/// Query string of `GET /sa/users`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsersQuery {
    #[serde(default = "default_page_number")]
    pub page_number: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub sort_direction: SortDirection,
    pub search_login_term: Option<String>,
    pub search_email_term: Option<String>,
    #[serde(default)]
    pub ban_status: BanStatusFilter,
}

fn default_page_number() -> i64 {
    1
}
fn default_page_size() -> i64 {
    10
}

impl Default for UsersQuery {
    fn default() -> Self {
        Self {
            page_number: default_page_number(),
            page_size: default_page_size(),
            sort_by: SortBy::default(),
            sort_direction: SortDirection::default(),
            search_login_term: None,
            search_email_term: None,
            ban_status: BanStatusFilter::default(),
        }
    }
}

impl UsersQuery {
    /// Capped so that `offset` stays in range for any page size.
    pub fn page(&self) -> i64 {
        self.page_number.clamp(1, i64::MAX / 100)
    }

    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    /// Search terms with blanks dropped.
    pub fn login_term(&self) -> Option<&str> {
        self.search_login_term
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn email_term(&self) -> Option<&str> {
        self.search_email_term
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BanInfoView {
    pub is_banned: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ban_date: Option<OffsetDateTime>,
    pub ban_reason: Option<String>,
}

/// Public part of a user returned to the super admin.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub login: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub ban_info: BanInfoView,
}

impl UserView {
    pub fn new(user: User, ban_info: BanInfo) -> Self {
        Self {
            id: user.id,
            login: user.login,
            email: user.email,
            created_at: user.created_at,
            ban_info: BanInfoView {
                is_banned: ban_info.is_banned,
                ban_date: ban_info.ban_date,
                ban_reason: ban_info.ban_reason,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub pages_count: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_count: i64,
    pub items: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(query: &UsersQuery, total_count: i64, items: Vec<T>) -> Self {
        let page_size = query.limit();
        Self {
            pages_count: (total_count + page_size - 1) / page_size,
            page: query.page(),
            page_size,
            total_count,
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(login: &str, email: &str, password: &str) -> CreateUserRequest {
        CreateUserRequest {
            login: login.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn create_user_accepts_valid_payload() {
        assert!(create("alice", "a@x.com", "Secret1").validate().is_empty());
    }

    #[test]
    fn create_user_reports_each_bad_field() {
        let errors = create("al", "not-an-email", "123").validate();
        assert_eq!(fields(&errors), vec!["login", "password", "email"]);
    }

    #[test]
    fn create_user_rejects_login_characters() {
        let errors = create("al ice!", "a@x.com", "Secret1").validate();
        assert_eq!(fields(&errors), vec!["login"]);
    }

    #[test]
    fn password_bounds_are_inclusive() {
        assert!(create("alice", "a@x.com", "123456").validate().is_empty());
        assert!(create("alice", "a@x.com", &"p".repeat(20)).validate().is_empty());
        assert_eq!(
            fields(&create("alice", "a@x.com", &"p".repeat(21)).validate()),
            vec!["password"]
        );
    }

    #[test]
    fn ban_requires_reason_only_when_banning() {
        let ban = BanUserRequest {
            is_banned: true,
            ban_reason: None,
        };
        assert_eq!(fields(&ban.validate()), vec!["banReason"]);

        let ban = BanUserRequest {
            is_banned: true,
            ban_reason: Some("   ".into()),
        };
        assert_eq!(fields(&ban.validate()), vec!["banReason"]);

        let ban = BanUserRequest {
            is_banned: true,
            ban_reason: Some("spam".into()),
        };
        assert!(ban.validate().is_empty());

        let unban = BanUserRequest {
            is_banned: false,
            ban_reason: None,
        };
        assert!(unban.validate().is_empty());
    }

    #[test]
    fn query_defaults_and_clamping() {
        let q: UsersQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.page(), 1);
        assert_eq!(q.limit(), 10);
        assert_eq!(q.offset(), 0);
        assert_eq!(q.sort_by, SortBy::CreatedAt);
        assert_eq!(q.sort_direction, SortDirection::Desc);
        assert_eq!(q.ban_status.is_banned(), None);

        let q: UsersQuery = serde_json::from_str(
            r#"{"pageNumber":3,"pageSize":500,"sortBy":"login","sortDirection":"asc","banStatus":"notBanned","searchLoginTerm":"  "}"#,
        )
        .unwrap();
        assert_eq!(q.limit(), 100);
        assert_eq!(q.offset(), 200);
        assert_eq!(q.sort_by.column(), "u.login");
        assert_eq!(q.sort_direction.sql(), "ASC");
        assert_eq!(q.ban_status.is_banned(), Some(false));
        assert_eq!(q.login_term(), None);
    }

    #[test]
    fn huge_page_number_does_not_overflow_offset() {
        let q: UsersQuery =
            serde_json::from_str(r#"{"pageNumber":9223372036854775807,"pageSize":100}"#).unwrap();
        assert!(q.offset() > 0);
        assert_eq!(q.page(), i64::MAX / 100);

        let q = UsersQuery {
            page_number: i64::MIN,
            ..UsersQuery::default()
        };
        assert_eq!(q.page(), 1);
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn paginated_rounds_pages_up() {
        let q = UsersQuery {
            page_size: 3,
            ..UsersQuery::default()
        };
        let page: Paginated<u8> = Paginated::new(&q, 7, vec![]);
        assert_eq!(page.pages_count, 3);
        let empty: Paginated<u8> = Paginated::new(&q, 0, vec![]);
        assert_eq!(empty.pages_count, 0);
    }

    #[test]
    fn user_view_hides_password_fields() {
        let id = Uuid::new_v4();
        let user = User {
            id,
            login: "alice".into(),
            email: "a@x.com".into(),
            password_salt: "salt".into(),
            password_hash: "hash".into(),
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_value(UserView::new(user, BanInfo::not_banned(id))).unwrap();
        assert_eq!(json["login"], "alice");
        assert_eq!(json["banInfo"]["isBanned"], false);
        assert!(json["banInfo"]["banDate"].is_null());
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password_salt").is_none());
        assert!(json["createdAt"].is_string());
    }
}
