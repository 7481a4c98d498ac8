use time::OffsetDateTime;
use tracing::debug;

use crate::users::repo::EmailConfirmationRepository;
use crate::users::repo_types::EmailConfirmation;

pub const INVALID_CODE_MESSAGE: &str = "Confirmation code is not valid";

/// A code is usable once, and only strictly before its expiration date.
pub fn is_confirmation_valid(record: Option<&EmailConfirmation>, now: OffsetDateTime) -> bool {
    let Some(record) = record else {
        return false;
    };
    if record.is_confirmed {
        return false;
    }
    match record.expiration_date {
        Some(expires) => now < expires,
        None => false,
    }
}

/// The record behind `code`, when it can still be used.
pub async fn find_usable_confirmation(
    repo: &dyn EmailConfirmationRepository,
    code: &str,
) -> anyhow::Result<Option<EmailConfirmation>> {
    let record = repo.find_by_code_or_id(code).await?;
    let valid = is_confirmation_valid(record.as_ref(), OffsetDateTime::now_utc());
    debug!(found = record.is_some(), valid, "confirmation code checked");
    Ok(record.filter(|_| valid))
}

pub async fn is_confirmation_code_valid(
    repo: &dyn EmailConfirmationRepository,
    code: &str,
) -> anyhow::Result<bool> {
    Ok(find_usable_confirmation(repo, code).await?.is_some())
}
