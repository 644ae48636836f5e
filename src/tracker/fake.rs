//! In-memory stand-in for the LINE API, for tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::tracker::line::{Error, MemberIdsPage, Platform, Profile};

pub struct FakePlatform {
    profiles: HashMap<String, String>,
    /// Group -> members in enumeration order.
    group_members: HashMap<String, Vec<(String, String)>>,
    room_members: HashMap<(String, String), String>,
    /// Listed in member IDs but every profile fetch fails.
    unresolvable: HashSet<String>,
    /// User -> number of profile fetches that fail before one succeeds.
    flaky: Mutex<HashMap<String, usize>>,
    member_id_failures: Mutex<usize>,
    page_size: usize,
    fail_replies: bool,
    replies: Mutex<Vec<(String, String)>>,
    profile_calls: Mutex<usize>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
            group_members: HashMap::new(),
            room_members: HashMap::new(),
            unresolvable: HashSet::new(),
            flaky: Mutex::new(HashMap::new()),
            member_id_failures: Mutex::new(0),
            page_size: 100,
            fail_replies: false,
            replies: Mutex::new(Vec::new()),
            profile_calls: Mutex::new(0),
        }
    }

    pub fn with_profile(mut self, user_id: &str, name: &str) -> Self {
        self.profiles.insert(user_id.into(), name.into());
        self
    }

    pub fn with_member(mut self, group_id: &str, user_id: &str, name: &str) -> Self {
        self.group_members
            .entry(group_id.into())
            .or_default()
            .push((user_id.into(), name.into()));
        self
    }

    pub fn with_unresolvable_member(mut self, group_id: &str, user_id: &str) -> Self {
        self.unresolvable.insert(user_id.into());
        self.with_member(group_id, user_id, "")
    }

    pub fn with_flaky_member(self, group_id: &str, user_id: &str, name: &str, failures: usize) -> Self {
        self.flaky.lock().unwrap().insert(user_id.into(), failures);
        self.with_member(group_id, user_id, name)
    }

    pub fn with_room_member(mut self, room_id: &str, user_id: &str, name: &str) -> Self {
        self.room_members.insert((room_id.into(), user_id.into()), name.into());
        self
    }

    pub fn with_member_id_failures(self, failures: usize) -> Self {
        *self.member_id_failures.lock().unwrap() = failures;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_failing_replies(mut self) -> Self {
        self.fail_replies = true;
        self
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    pub fn profile_calls(&self) -> usize {
        *self.profile_calls.lock().unwrap()
    }

    fn not_found() -> Error {
        Error::Api { status: 404, body: "not found".into() }
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn get_profile(&self, user_id: &str) -> Result<Profile, Error> {
        *self.profile_calls.lock().unwrap() += 1;
        self.profiles
            .get(user_id)
            .map(|name| Profile { display_name: name.clone() })
            .ok_or_else(Self::not_found)
    }

    async fn get_group_member_profile(&self, group_id: &str, user_id: &str) -> Result<Profile, Error> {
        *self.profile_calls.lock().unwrap() += 1;
        if self.unresolvable.contains(user_id) {
            return Err(Error::Api { status: 500, body: "boom".into() });
        }
        if let Some(remaining) = self.flaky.lock().unwrap().get_mut(user_id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Error::Http("connection reset".into()));
        }

        self.group_members
            .get(group_id)
            .and_then(|members| members.iter().find(|(id, _)| id == user_id))
            .map(|(_, name)| Profile { display_name: name.clone() })
            .ok_or_else(Self::not_found)
    }

    async fn get_room_member_profile(&self, room_id: &str, user_id: &str) -> Result<Profile, Error> {
        *self.profile_calls.lock().unwrap() += 1;
        self.room_members
            .get(&(room_id.to_string(), user_id.to_string()))
            .map(|name| Profile { display_name: name.clone() })
            .ok_or_else(Self::not_found)
    }

    async fn get_group_member_ids(
        &self,
        group_id: &str,
        start: Option<&str>,
    ) -> Result<MemberIdsPage, Error> {
        {
            let mut failures = self.member_id_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Error::Api { status: 429, body: "rate limited".into() });
            }
        }

        let members = self.group_members.get(group_id).ok_or_else(Self::not_found)?;
        let offset: usize = start.map(|s| s.parse().unwrap()).unwrap_or(0);
        let end = (offset + self.page_size).min(members.len());
        Ok(MemberIdsPage {
            member_ids: members[offset..end].iter().map(|(id, _)| id.clone()).collect(),
            next: (end < members.len()).then(|| end.to_string()),
        })
    }

    async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), Error> {
        if self.fail_replies {
            return Err(Error::Http("reply failed".into()));
        }
        self.replies.lock().unwrap().push((reply_token.into(), text.into()));
        Ok(())
    }
}
