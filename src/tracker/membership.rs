//! Group membership backfill and join/leave bookkeeping.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::tracker::database::Database;
use crate::tracker::line::{Error, Platform};
use crate::tracker::profile::{ProfileContext, ProfileResolver};

/// Retry and pacing for calls made while scanning a group.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Total tries per call, including the first.
    pub attempts: u32,
    /// Wait between failed tries.
    pub backoff: Duration,
    /// Wait between consecutive profile fetches.
    pub fetch_delay: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(2),
            fetch_delay: Duration::from_millis(200),
        }
    }
}

async fn with_retry<T, F, Fut>(policy: &SyncPolicy, what: &str, mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, e);
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => {
                warn!("{} failed (attempt {}/{}), giving up: {}", what, attempt, attempts, e);
                return Err(e);
            }
        }
    }
}

pub struct MembershipSync {
    database: Arc<Database>,
    platform: Arc<dyn Platform>,
    resolver: Arc<ProfileResolver>,
    bot_user_id: Option<String>,
    policy: SyncPolicy,
}

impl MembershipSync {
    pub fn new(
        database: Arc<Database>,
        platform: Arc<dyn Platform>,
        resolver: Arc<ProfileResolver>,
        bot_user_id: Option<String>,
        policy: SyncPolicy,
    ) -> Self {
        Self { database, platform, resolver, bot_user_id, policy }
    }

    fn is_bot(&self, user_id: &str) -> bool {
        self.bot_user_id.as_deref() == Some(user_id)
    }

    /// Every member ID in the group, following continuation pages.
    async fn fetch_member_ids(&self, group_id: &str) -> Result<Vec<String>, Error> {
        let mut ids = Vec::new();
        let mut start: Option<String> = None;
        loop {
            let page = with_retry(&self.policy, "Member ID fetch", || {
                self.platform.get_group_member_ids(group_id, start.as_deref())
            })
            .await?;
            ids.extend(page.member_ids);
            match page.next {
                Some(next) => start = Some(next),
                None => return Ok(ids),
            }
        }
    }

    /// Scan the whole group and record every member except the bot. Names of
    /// tracked members are refreshed; no one is marked active. Returns how
    /// many members were recorded.
    pub async fn initialize_group(&self, group_id: &str) -> usize {
        let ids = match self.fetch_member_ids(group_id).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Could not list members of group {}: {}", group_id, e);
                return 0;
            }
        };
        info!("🔄 Initializing group {} ({} member IDs)", group_id, ids.len());

        let mut recorded = 0;
        let mut first = true;
        for user_id in ids.iter().filter(|id| !self.is_bot(id)) {
            if !first {
                tokio::time::sleep(self.policy.fetch_delay).await;
            }
            first = false;

            let profile = with_retry(&self.policy, "Member profile fetch", || {
                self.platform.get_group_member_profile(group_id, user_id)
            })
            .await;

            let profile = match profile {
                Ok(p) => p,
                Err(e) => {
                    warn!("Skipping member {} of group {}: {}", user_id, group_id, e);
                    continue;
                }
            };

            match self.database.upsert(user_id, Some(group_id), &profile.display_name, false) {
                Ok(()) => recorded += 1,
                Err(e) => warn!("Failed to record member {}: {}", user_id, e),
            }
        }

        info!("✅ Group {} initialized: {} member(s) recorded", group_id, recorded);
        recorded
    }

    pub async fn on_member_joined(&self, group_id: &str, member_ids: &[String]) {
        let context = ProfileContext::Group(group_id.to_string());
        for user_id in member_ids.iter().filter(|id| !self.is_bot(id)) {
            let name = self.resolver.resolve(&context, user_id).await;
            info!("👋 Member joined {}: {} ({})", group_id, name, user_id);
            if let Err(e) = self.database.upsert(user_id, Some(group_id), &name, false) {
                warn!("Failed to record joined member {}: {}", user_id, e);
            }
        }
    }

    pub async fn on_member_left(&self, group_id: &str, member_ids: &[String]) {
        for user_id in member_ids {
            info!("👋 Member left {}: {}", group_id, user_id);
            if let Err(e) = self.database.remove(user_id, Some(group_id)) {
                warn!("Failed to remove member {}: {}", user_id, e);
            }
        }
    }
}
