//! Display-name lookups.

use std::sync::Arc;
use tracing::warn;

use crate::tracker::line::Platform;

/// Name used when the platform can't tell us who someone is.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Where the user was seen; decides which profile endpoint applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileContext {
    Direct,
    Group(String),
    Room(String),
}

pub struct ProfileResolver {
    platform: Arc<dyn Platform>,
}

impl ProfileResolver {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Look up a display name. Never fails: errors fall back to [`UNKNOWN_NAME`].
    pub async fn resolve(&self, context: &ProfileContext, user_id: &str) -> String {
        let result = match context {
            ProfileContext::Direct => self.platform.get_profile(user_id).await,
            ProfileContext::Group(group_id) => {
                self.platform.get_group_member_profile(group_id, user_id).await
            }
            ProfileContext::Room(room_id) => {
                self.platform.get_room_member_profile(room_id, user_id).await
            }
        };

        match result {
            Ok(profile) => profile.display_name,
            Err(e) => {
                warn!("Profile lookup failed for {} ({:?}): {}", user_id, context, e);
                UNKNOWN_NAME.to_string()
            }
        }
    }
}
