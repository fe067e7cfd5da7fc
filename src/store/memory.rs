//! In-memory [`ArenaStore`] for tests and local runs without PostgreSQL.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{ArenaStore, StoreError};
use crate::domain::{
    Arena, ArenaId, ArenaPhase, ArenaUser, ItemKind, MembershipStatus, RetroAction, RetroItem,
    User, UserId,
};

/// Parameters for seeding an arena.
#[derive(Debug, Clone)]
pub struct NewArena {
    /// Arena identifier.
    pub id: ArenaId,
    /// Board title.
    pub name: String,
    /// Initial leader.
    pub owner_id: UserId,
    /// Optional join secret.
    pub join_code: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Member {
    user_id: UserId,
    active: bool,
    abandoned: bool,
}

#[derive(Debug)]
struct ArenaRecord {
    name: String,
    owner_id: UserId,
    phase: ArenaPhase,
    join_code: Option<String>,
    members: Vec<Member>,
    items: Vec<RetroItem>,
    actions: Vec<RetroAction>,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    sessions: HashMap<String, UserId>,
    arenas: HashMap<ArenaId, ArenaRecord>,
}

impl State {
    fn record(&self, arena_id: ArenaId) -> Result<&ArenaRecord, StoreError> {
        self.arenas.get(&arena_id).ok_or(StoreError::NotFound("arena"))
    }

    fn record_mut(&mut self, arena_id: ArenaId) -> Result<&mut ArenaRecord, StoreError> {
        self.arenas
            .get_mut(&arena_id)
            .ok_or(StoreError::NotFound("arena"))
    }

    fn users_of(&self, record: &ArenaRecord) -> Vec<ArenaUser> {
        record
            .members
            .iter()
            .filter(|m| !m.abandoned)
            .filter_map(|m| {
                self.users.get(&m.user_id).map(|u| ArenaUser {
                    id: u.id,
                    name: u.name.clone(),
                    active: m.active,
                })
            })
            .collect()
    }

    fn arena(&self, arena_id: ArenaId) -> Result<Arena, StoreError> {
        let record = self.record(arena_id)?;
        Ok(Arena {
            id: arena_id,
            name: record.name.clone(),
            owner_id: record.owner_id,
            phase: record.phase,
            join_code: record.join_code.clone(),
            users: self.users_of(record),
            items: record.items.clone(),
            actions: record.actions.clone(),
        })
    }

    fn set_member(
        &mut self,
        arena_id: ArenaId,
        user_id: UserId,
        active: bool,
        abandoned: bool,
    ) -> Result<Vec<ArenaUser>, StoreError> {
        let record = self.record_mut(arena_id)?;
        match record.members.iter_mut().find(|m| m.user_id == user_id) {
            Some(member) => {
                member.active = active;
                member.abandoned = abandoned;
            }
            None => record.members.push(Member {
                user_id,
                active,
                abandoned,
            }),
        }
        let record = self.record(arena_id)?;
        Ok(self.users_of(record))
    }
}

/// [`ArenaStore`] backed by a `RwLock`-guarded set of maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a user.
    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// Binds a login session token to a user.
    pub async fn insert_session(&self, session_id: impl Into<String>, user_id: UserId) {
        self.state
            .write()
            .await
            .sessions
            .insert(session_id.into(), user_id);
    }

    /// Creates an empty arena in the intro phase.
    pub async fn insert_arena(&self, arena: NewArena) {
        self.state.write().await.arenas.insert(
            arena.id,
            ArenaRecord {
                name: arena.name,
                owner_id: arena.owner_id,
                phase: ArenaPhase::Intro,
                join_code: arena.join_code,
                members: Vec::new(),
                items: Vec::new(),
                actions: Vec::new(),
            },
        );
    }
}

#[async_trait]
impl ArenaStore for MemoryStore {
    async fn session_user(&self, session_id: &str) -> Result<User, StoreError> {
        let state = self.state.read().await;
        state
            .sessions
            .get(session_id)
            .and_then(|id| state.users.get(id))
            .cloned()
            .ok_or(StoreError::NotFound("session"))
    }

    async fn guest_user(&self, user_id: UserId) -> Result<User, StoreError> {
        self.state
            .read()
            .await
            .users
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound("user"))
    }

    async fn arena(&self, arena_id: ArenaId) -> Result<Arena, StoreError> {
        self.state.read().await.arena(arena_id)
    }

    async fn membership(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
    ) -> Result<MembershipStatus, StoreError> {
        let state = self.state.read().await;
        let record = state.record(arena_id)?;
        let status = match record
            .members
            .iter()
            .find(|m| m.user_id == user_id && !m.abandoned)
        {
            None => MembershipStatus::NotAMember,
            Some(m) if m.active => MembershipStatus::Active,
            Some(_) => MembershipStatus::Inactive,
        };
        Ok(status)
    }

    async fn add_user(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
    ) -> Result<Vec<ArenaUser>, StoreError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound("user"));
        }
        state.set_member(arena_id, user_id, true, false)
    }

    async fn retreat_user(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
    ) -> Result<Vec<ArenaUser>, StoreError> {
        let mut state = self.state.write().await;
        let abandoned = state
            .record(arena_id)?
            .members
            .iter()
            .any(|m| m.user_id == user_id && m.abandoned);
        state.set_member(arena_id, user_id, false, abandoned)
    }

    async fn abandon_user(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
    ) -> Result<Vec<ArenaUser>, StoreError> {
        self.state
            .write()
            .await
            .set_member(arena_id, user_id, false, true)
    }

    async fn confirm_owner(&self, arena_id: ArenaId, user_id: UserId) -> Result<(), StoreError> {
        let state = self.state.read().await;
        if state.record(arena_id)?.owner_id == user_id {
            Ok(())
        } else {
            Err(StoreError::NotOwner)
        }
    }

    async fn create_item(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
        kind: ItemKind,
        content: &str,
    ) -> Result<Vec<RetroItem>, StoreError> {
        let mut state = self.state.write().await;
        let record = state.record_mut(arena_id)?;
        record.items.push(RetroItem {
            id: uuid::Uuid::new_v4(),
            user_id,
            kind,
            content: content.to_string(),
            created_at: Utc::now(),
        });
        Ok(record.items.clone())
    }

    async fn delete_item(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
        item_id: uuid::Uuid,
    ) -> Result<Vec<RetroItem>, StoreError> {
        let mut state = self.state.write().await;
        let record = state.record_mut(arena_id)?;
        let before = record.items.len();
        record
            .items
            .retain(|item| !(item.id == item_id && item.user_id == user_id));
        if record.items.len() == before {
            return Err(StoreError::NotFound("item"));
        }
        Ok(record.items.clone())
    }

    async fn add_action(
        &self,
        arena_id: ArenaId,
        content: &str,
    ) -> Result<Vec<RetroAction>, StoreError> {
        let mut state = self.state.write().await;
        let record = state.record_mut(arena_id)?;
        record.actions.push(RetroAction {
            id: uuid::Uuid::new_v4(),
            content: content.to_string(),
            completed: false,
        });
        Ok(record.actions.clone())
    }

    async fn update_action(
        &self,
        arena_id: ArenaId,
        action_id: uuid::Uuid,
        content: &str,
        completed: bool,
    ) -> Result<Vec<RetroAction>, StoreError> {
        let mut state = self.state.write().await;
        let record = state.record_mut(arena_id)?;
        let action = record
            .actions
            .iter_mut()
            .find(|a| a.id == action_id)
            .ok_or(StoreError::NotFound("action"))?;
        action.content = content.to_string();
        action.completed = completed;
        Ok(record.actions.clone())
    }

    async fn delete_action(
        &self,
        arena_id: ArenaId,
        action_id: uuid::Uuid,
    ) -> Result<Vec<RetroAction>, StoreError> {
        let mut state = self.state.write().await;
        let record = state.record_mut(arena_id)?;
        let before = record.actions.len();
        record.actions.retain(|a| a.id != action_id);
        if record.actions.len() == before {
            return Err(StoreError::NotFound("action"));
        }
        Ok(record.actions.clone())
    }

    async fn set_phase(&self, arena_id: ArenaId, phase: ArenaPhase) -> Result<Arena, StoreError> {
        let mut state = self.state.write().await;
        state.record_mut(arena_id)?.phase = phase;
        state.arena(arena_id)
    }

    async fn set_owner(&self, arena_id: ArenaId, user_id: UserId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let record = state.record_mut(arena_id)?;
        if !record
            .members
            .iter()
            .any(|m| m.user_id == user_id && !m.abandoned)
        {
            return Err(StoreError::NotFound("member"));
        }
        record.owner_id = user_id;
        Ok(())
    }

    async fn delete_arena(&self, arena_id: ArenaId) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .arenas
            .remove(&arena_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("arena"))
    }
}
