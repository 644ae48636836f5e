//! Text commands understood in group chats.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{info, warn};

use crate::tracker::database::{ActivityRecord, Database};
use crate::tracker::membership::MembershipSync;

const NOT_YET_SPOKEN: &str = "尚未發言";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 查詢不活躍
    QueryInactive,
    /// 初始化群組
    InitializeGroup,
    /// 檢查成員數
    CheckMemberCount,
    /// 檢查資料庫
    DumpDatabase,
}

impl Command {
    /// Exact match after trimming and lower-casing. Anything else is chatter.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "查詢不活躍" => Some(Command::QueryInactive),
            "初始化群組" => Some(Command::InitializeGroup),
            "檢查成員數" => Some(Command::CheckMemberCount),
            "檢查資料庫" => Some(Command::DumpDatabase),
            _ => None,
        }
    }
}

/// Knobs for the inactivity report.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    /// Members quiet for longer than this are reported.
    pub inactive_threshold: chrono::Duration,
    /// Lines shown before the rest are summarized.
    pub max_entries: usize,
    /// A group with fewer tracked members than this is re-scanned first.
    pub heal_min_members: usize,
    /// Timezone dates are shown in.
    pub timezone: Tz,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            inactive_threshold: chrono::Duration::days(30),
            max_entries: 10,
            heal_min_members: 2,
            timezone: chrono_tz::Asia::Taipei,
        }
    }
}

pub struct CommandProcessor {
    database: Arc<Database>,
    membership: Arc<MembershipSync>,
    settings: ReportSettings,
}

impl CommandProcessor {
    pub fn new(database: Arc<Database>, membership: Arc<MembershipSync>, settings: ReportSettings) -> Self {
        Self { database, membership, settings }
    }

    /// Reply for `text`, if it is a command and makes sense here.
    ///
    /// `group_id` is `None` outside group chats; every command needs a group.
    /// `sender_known` says whether the sender was tracked before this message.
    pub async fn process(&self, text: &str, group_id: Option<&str>, sender_known: bool) -> Option<String> {
        let command = Command::parse(text)?;
        let Some(group_id) = group_id else {
            info!("Ignoring {:?} outside a group", command);
            return None;
        };
        info!("⌨️ {:?} in {}", command, group_id);

        let reply = match command {
            Command::QueryInactive => self.query_inactive(group_id, sender_known).await,
            Command::InitializeGroup => {
                let n = self.membership.initialize_group(group_id).await;
                Ok(format!("已初始化群組，共記錄 {n} 位成員。"))
            }
            Command::CheckMemberCount => self
                .database
                .count(group_id)
                .map(|n| format!("目前記錄的成員數：{n}")),
            Command::DumpDatabase => self.dump(group_id).await,
        };

        match reply {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("{:?} failed in {}: {}", command, group_id, e);
                None
            }
        }
    }

    async fn query_inactive(&self, group_id: &str, sender_known: bool) -> rusqlite::Result<String> {
        let tracked = self.database.count(group_id)?;
        if !sender_known || tracked < self.settings.heal_min_members {
            info!(
                "Group {} looks incomplete (sender known: {}, tracked: {}), re-scanning",
                group_id, sender_known, tracked
            );
            self.membership.initialize_group(group_id).await;
        }

        let cutoff = Utc::now() - self.settings.inactive_threshold;
        let inactive = self.database.inactive_since(group_id, cutoff)?;
        if inactive.is_empty() {
            let count = self.database.count(group_id)?;
            return Ok(format!("沒有發現不活躍的成員。（目前記錄 {count} 位成員）"));
        }

        Ok(self.render_inactive(&inactive))
    }

    fn render_inactive(&self, inactive: &[ActivityRecord]) -> String {
        let mut lines: Vec<String> = inactive
            .iter()
            .take(self.settings.max_entries)
            .map(|r| match r.last_active {
                Some(ts) => format!(
                    "{}（最後發言：{}）",
                    r.display_name,
                    format_date(ts, self.settings.timezone)
                ),
                None => format!("{}（{}）", r.display_name, NOT_YET_SPOKEN),
            })
            .collect();

        let hidden = inactive.len().saturating_sub(self.settings.max_entries);
        if hidden > 0 {
            lines.push(format!("…還有 {hidden} 位"));
        }
        lines.join("\n")
    }

    async fn dump(&self, group_id: &str) -> rusqlite::Result<String> {
        let records = self.database.list_with_ids(group_id)?;
        if records.is_empty() {
            let n = self.membership.initialize_group(group_id).await;
            return Ok(format!("資料庫為空，已重新初始化，共記錄 {n} 位成員。"));
        }

        let mut lines = vec![format!("共 {} 筆記錄：", records.len())];
        lines.extend(records.iter().map(|r| {
            let seen = r
                .last_active
                .map(|ts| format_timestamp(ts, self.settings.timezone))
                .unwrap_or_else(|| NOT_YET_SPOKEN.to_string());
            format!("{} | {} | {}", r.display_name, r.user_id, seen)
        }));
        Ok(lines.join("\n"))
    }
}

fn format_date(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

fn format_timestamp(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::fake::FakePlatform;
    use crate::tracker::membership::SyncPolicy;
    use crate::tracker::profile::ProfileResolver;
    use chrono::{Duration, TimeZone};

    fn processor_with(fake: FakePlatform, settings: ReportSettings) -> (CommandProcessor, Arc<Database>) {
        let fake = Arc::new(fake);
        let db = Arc::new(Database::open_in_memory().unwrap());
        let resolver = Arc::new(ProfileResolver::new(fake.clone()));
        let policy = SyncPolicy {
            attempts: 1,
            backoff: std::time::Duration::ZERO,
            fetch_delay: std::time::Duration::ZERO,
        };
        let membership = Arc::new(MembershipSync::new(db.clone(), fake, resolver, None, policy));
        (CommandProcessor::new(db.clone(), membership, settings), db)
    }

    fn processor() -> (CommandProcessor, Arc<Database>) {
        processor_with(FakePlatform::new(), ReportSettings::default())
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("查詢不活躍"), Some(Command::QueryInactive));
        assert_eq!(Command::parse("  初始化群組\n"), Some(Command::InitializeGroup));
        assert_eq!(Command::parse("檢查成員數"), Some(Command::CheckMemberCount));
        assert_eq!(Command::parse("檢查資料庫"), Some(Command::DumpDatabase));
        assert_eq!(Command::parse("查詢不活躍 please"), None);
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn test_format_date_uses_timezone() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 20, 0, 0).unwrap();
        assert_eq!(format_date(ts, chrono_tz::Asia::Taipei), "2024-01-16");
        assert_eq!(format_date(ts, chrono_tz::UTC), "2024-01-15");
    }

    #[tokio::test]
    async fn test_inactive_report_lists_quiet_and_silent() {
        let settings = ReportSettings {
            inactive_threshold: Duration::hours(1),
            ..ReportSettings::default()
        };
        let (processor, db) = processor_with(FakePlatform::new(), settings);
        let now = Utc::now();
        db.upsert_at("A", Some("G"), "alice", Some(now - Duration::hours(2))).unwrap();
        db.upsert_at("B", Some("G"), "bob", None).unwrap();
        db.upsert_at("C", Some("G"), "carol", Some(now)).unwrap();

        let reply = processor.process("查詢不活躍", Some("G"), true).await.unwrap();
        let lines: Vec<&str> = reply.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "bob（尚未發言）");
        assert!(lines[1].starts_with("alice（最後發言："));
        assert!(!reply.contains("carol"));
    }

    #[tokio::test]
    async fn test_inactive_report_truncates() {
        let (processor, db) = processor();
        for i in 0..12 {
            db.upsert_at(&format!("U{i:02}"), Some("G"), &format!("user{i:02}"), None).unwrap();
        }

        let reply = processor.process("查詢不活躍", Some("G"), true).await.unwrap();
        let lines: Vec<&str> = reply.lines().collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[10], "…還有 2 位");
    }

    #[tokio::test]
    async fn test_inactive_report_none_found() {
        let (processor, db) = processor();
        db.upsert("A", Some("G"), "alice", true).unwrap();
        db.upsert("B", Some("G"), "bob", true).unwrap();

        let reply = processor.process("查詢不活躍", Some("G"), true).await.unwrap();
        assert_eq!(reply, "沒有發現不活躍的成員。（目前記錄 2 位成員）");
    }

    #[tokio::test]
    async fn test_inactive_report_heals_unknown_sender() {
        let fake = FakePlatform::new()
            .with_member("G", "A", "alice")
            .with_member("G", "B", "bob")
            .with_member("G", "C", "carol");
        let (processor, db) = processor_with(fake, ReportSettings::default());
        db.upsert("A", Some("G"), "alice", true).unwrap();
        db.upsert("B", Some("G"), "bob", true).unwrap();

        let reply = processor.process("查詢不活躍", Some("G"), false).await.unwrap();
        assert_eq!(reply, "carol（尚未發言）");
        assert_eq!(db.count("G").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_inactive_report_heals_small_group() {
        let fake = FakePlatform::new()
            .with_member("G", "A", "alice")
            .with_member("G", "B", "bob");
        let (processor, db) = processor_with(fake, ReportSettings::default());
        db.upsert("A", Some("G"), "alice", true).unwrap();

        let reply = processor.process("查詢不活躍", Some("G"), true).await.unwrap();
        assert_eq!(reply, "bob（尚未發言）");
    }

    #[tokio::test]
    async fn test_initialize_and_count() {
        let fake = FakePlatform::new()
            .with_member("G", "A", "alice")
            .with_member("G", "B", "bob");
        let (processor, _db) = processor_with(fake, ReportSettings::default());

        let reply = processor.process("初始化群組", Some("G"), true).await.unwrap();
        assert_eq!(reply, "已初始化群組，共記錄 2 位成員。");

        let reply = processor.process("檢查成員數", Some("G"), true).await.unwrap();
        assert_eq!(reply, "目前記錄的成員數：2");
    }

    #[tokio::test]
    async fn test_dump_lists_records() {
        let (processor, db) = processor();
        db.upsert("U1", Some("G"), "alice", false).unwrap();
        db.upsert_at("U2", Some("G"), "bob", Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 30, 0).unwrap()))
            .unwrap();

        let reply = processor.process("檢查資料庫", Some("G"), true).await.unwrap();
        assert_eq!(
            reply,
            "共 2 筆記錄：\nalice | U1 | 尚未發言\nbob | U2 | 2024-03-01 08:30"
        );
    }

    #[tokio::test]
    async fn test_dump_empty_initializes() {
        let fake = FakePlatform::new().with_member("G", "A", "alice");
        let (processor, db) = processor_with(fake, ReportSettings::default());

        let reply = processor.process("檢查資料庫", Some("G"), true).await.unwrap();
        assert_eq!(reply, "資料庫為空，已重新初始化，共記錄 1 位成員。");
        assert!(db.exists("A", Some("G")).unwrap());
    }

    #[tokio::test]
    async fn test_ignored_outside_group_or_unknown_text() {
        let (processor, _db) = processor();
        assert_eq!(processor.process("檢查成員數", None, true).await, None);
        assert_eq!(processor.process("good morning", Some("G"), true).await, None);
    }
}
