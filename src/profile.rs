use crate::auth::TelegramUser;
use crate::error::LedgerResult;
use crate::schemas::UserProfile;
use crate::store::ExpenseStore;
use chrono::Utc;
use tracing::info;

fn display_name(user: &TelegramUser) -> String {
    let full_name = [user.first_name.as_deref(), user.last_name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if full_name.is_empty() {
        user.username.clone()
    } else {
        full_name
    }
}

/// Returns the stored profile of a logged-in user, creating it the first
/// time the user is seen.
pub async fn ensure_profile(
    store: &dyn ExpenseStore,
    user: &TelegramUser,
) -> LedgerResult<UserProfile> {
    if let Some(profile) = store.get_profile(&user.username).await? {
        return Ok(profile);
    }
    let profile = UserProfile {
        id: user.username.clone(),
        display_name: display_name(user),
        avatar_url: user.photo_url.clone(),
        created_at: Utc::now(),
    };
    store.insert_profile(profile.clone()).await?;
    info!(user_id = %profile.id, "created profile on first login");
    Ok(profile)
}
