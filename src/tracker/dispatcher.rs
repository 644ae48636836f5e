//! Routes parsed webhook events to the tracker components.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::tracker::commands::{CommandProcessor, ReportSettings};
use crate::tracker::database::Database;
use crate::tracker::event::{Event, MessageContent, Source};
use crate::tracker::line::Platform;
use crate::tracker::membership::{MembershipSync, SyncPolicy};
use crate::tracker::profile::ProfileResolver;

/// Everything the dispatcher needs besides storage and the platform.
#[derive(Debug, Clone, Default)]
pub struct TrackerConfig {
    /// The bot's own LINE user ID, never tracked as a member.
    pub bot_user_id: Option<String>,
    pub sync: SyncPolicy,
    pub report: ReportSettings,
}

pub struct Dispatcher {
    database: Arc<Database>,
    platform: Arc<dyn Platform>,
    resolver: Arc<ProfileResolver>,
    membership: Arc<MembershipSync>,
    commands: CommandProcessor,
}

impl Dispatcher {
    pub fn new(database: Arc<Database>, platform: Arc<dyn Platform>, config: TrackerConfig) -> Self {
        let resolver = Arc::new(ProfileResolver::new(platform.clone()));
        let membership = Arc::new(MembershipSync::new(
            database.clone(),
            platform.clone(),
            resolver.clone(),
            config.bot_user_id,
            config.sync,
        ));
        let commands = CommandProcessor::new(database.clone(), membership.clone(), config.report);

        Self { database, platform, resolver, membership, commands }
    }

    /// Handle a verified batch, one event at a time. Failures are logged per
    /// event and never stop the rest of the batch.
    pub async fn dispatch(&self, events: Vec<Event>) {
        if events.is_empty() {
            debug!("Empty event batch");
            return;
        }
        info!("📨 Processing {} event(s)", events.len());

        for event in events {
            match event {
                Event::Message { reply_token, source, message } => {
                    self.handle_message(reply_token.as_deref(), &source, message).await;
                }
                Event::Join { source, .. } => self.handle_join(&source).await,
                Event::MemberJoined { source, joined } => {
                    if let Some(group_id) = source.group_id() {
                        self.membership.on_member_joined(group_id, &joined.user_ids()).await;
                    }
                }
                Event::MemberLeft { source, left } => {
                    if let Some(group_id) = source.group_id() {
                        self.membership.on_member_left(group_id, &left.user_ids()).await;
                    }
                }
                Event::Unknown => debug!("Ignoring unhandled event type"),
            }
        }
    }

    async fn handle_message(&self, reply_token: Option<&str>, source: &Source, message: MessageContent) {
        let MessageContent::Text { text } = message else {
            debug!("Ignoring non-text message");
            return;
        };
        let Some(user_id) = source.user_id() else {
            debug!("Message without a sender ID");
            return;
        };
        let scope = source.scope_id();

        let sender_known = self.database.exists(user_id, scope).unwrap_or_else(|e| {
            warn!("Failed to look up {}: {}", user_id, e);
            true
        });

        let name = self.resolver.resolve(&source.profile_context(), user_id).await;
        if let Err(e) = self.database.upsert(user_id, scope, &name, true) {
            warn!("Failed to record activity for {}: {}", user_id, e);
        }

        let preview: String = text.chars().take(100).collect();
        info!("Message from {} ({}) in {:?}: \"{}\"", name, user_id, scope, preview);

        if let Some(reply) = self.commands.process(&text, source.group_id(), sender_known).await {
            match reply_token {
                Some(token) => self.reply(token, &reply).await,
                None => debug!("No reply token, dropping reply to {}", user_id),
            }
        }
    }

    async fn handle_join(&self, source: &Source) {
        match source.group_id() {
            Some(group_id) => {
                info!("🎉 Added to group {}", group_id);
                self.membership.initialize_group(group_id).await;
            }
            None => info!("Joined {:?}, nothing to initialize", source),
        }
    }

    async fn reply(&self, reply_token: &str, text: &str) {
        if let Err(e) = self.platform.reply_text(reply_token, text).await {
            warn!("Failed to send reply: {}", e);
        }
    }
}
