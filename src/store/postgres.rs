//! PostgreSQL implementation of [`ArenaStore`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::{ArenaStore, StoreError};
use crate::config::DatabaseConfig;
use crate::domain::{
    Arena, ArenaId, ArenaPhase, ArenaUser, ItemKind, MembershipStatus, RetroAction, RetroItem,
    User, UserId, UserKind,
};

type UserRow = (Uuid, String, String, Option<String>);

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the database is unreachable or a
    /// migration fails.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self::new(pool))
    }

    async fn users(&self, arena_id: ArenaId) -> Result<Vec<ArenaUser>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, String, bool)>(
            "SELECT u.id, u.name, ru.active FROM retro_user ru \
             JOIN users u ON u.id = ru.user_id \
             WHERE ru.retro_id = $1 AND ru.abandoned = false \
             ORDER BY ru.joined_date ASC",
        )
        .bind(Uuid::from(arena_id))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name, active)| ArenaUser {
                id: UserId::from_uuid(id),
                name,
                active,
            })
            .collect())
    }

    async fn items(&self, arena_id: ArenaId) -> Result<Vec<RetroItem>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, String, String, DateTime<Utc>)>(
            "SELECT id, user_id, kind, content, created_date FROM retro_item \
             WHERE retro_id = $1 ORDER BY created_date ASC",
        )
        .bind(Uuid::from(arena_id))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, user_id, kind, content, created_at)| {
                Ok(RetroItem {
                    id,
                    user_id: UserId::from_uuid(user_id),
                    kind: kind.parse::<ItemKind>().map_err(StoreError::Backend)?,
                    content,
                    created_at,
                })
            })
            .collect()
    }

    async fn actions(&self, arena_id: ArenaId) -> Result<Vec<RetroAction>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, String, bool)>(
            "SELECT id, content, completed FROM retro_action \
             WHERE retro_id = $1 ORDER BY created_date ASC",
        )
        .bind(Uuid::from(arena_id))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, content, completed)| RetroAction {
                id,
                content,
                completed,
            })
            .collect())
    }

    /// Runs a membership write while holding a share lock on the arena row,
    /// so a concurrent `delete_arena` cannot slip in between the existence
    /// check and the write.
    async fn set_member_flags(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
        sql: &str,
    ) -> Result<Vec<ArenaUser>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query_scalar::<_, i32>("SELECT 1 FROM retro WHERE id = $1 FOR SHARE")
            .bind(Uuid::from(arena_id))
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound("arena"))?;
        sqlx::query(sql)
            .bind(Uuid::from(arena_id))
            .bind(Uuid::from(user_id))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.users(arena_id).await
    }
}

fn user_from_row((id, name, kind, avatar): UserRow) -> Result<User, StoreError> {
    let kind = match kind.as_str() {
        "guest" => UserKind::Guest,
        "registered" => UserKind::Registered,
        other => return Err(StoreError::Backend(format!("unknown user kind: {other}"))),
    };
    Ok(User {
        id: UserId::from_uuid(id),
        name,
        kind,
        avatar,
    })
}

fn expect_affected(rows: u64, what: &'static str) -> Result<(), StoreError> {
    if rows == 0 {
        Err(StoreError::NotFound(what))
    } else {
        Ok(())
    }
}

#[async_trait]
impl ArenaStore for PostgresStore {
    async fn session_user(&self, session_id: &str) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT u.id, u.name, u.kind, u.avatar FROM user_session s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.session_id = $1 AND s.expire_date > NOW()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("session"))?;
        user_from_row(row)
    }

    async fn guest_user(&self, user_id: UserId) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, kind, avatar FROM users WHERE id = $1",
        )
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("user"))?;
        user_from_row(row)
    }

    async fn arena(&self, arena_id: ArenaId) -> Result<Arena, StoreError> {
        let (name, owner_id, phase, join_code) =
            sqlx::query_as::<_, (String, Uuid, String, Option<String>)>(
                "SELECT name, owner_id, phase, join_code FROM retro WHERE id = $1",
            )
            .bind(Uuid::from(arena_id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("arena"))?;

        Ok(Arena {
            id: arena_id,
            name,
            owner_id: UserId::from_uuid(owner_id),
            phase: phase.parse::<ArenaPhase>().map_err(StoreError::Backend)?,
            join_code,
            users: self.users(arena_id).await?,
            items: self.items(arena_id).await?,
            actions: self.actions(arena_id).await?,
        })
    }

    async fn membership(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
    ) -> Result<MembershipStatus, StoreError> {
        let active = sqlx::query_scalar::<_, Option<bool>>(
            "SELECT ru.active FROM retro r \
             LEFT JOIN retro_user ru \
               ON ru.retro_id = r.id AND ru.user_id = $2 AND ru.abandoned = false \
             WHERE r.id = $1",
        )
        .bind(Uuid::from(arena_id))
        .bind(Uuid::from(user_id))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("arena"))?;

        Ok(match active {
            None => MembershipStatus::NotAMember,
            Some(true) => MembershipStatus::Active,
            Some(false) => MembershipStatus::Inactive,
        })
    }

    async fn add_user(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
    ) -> Result<Vec<ArenaUser>, StoreError> {
        self.set_member_flags(
            arena_id,
            user_id,
            "INSERT INTO retro_user (retro_id, user_id, active, abandoned) \
             VALUES ($1, $2, true, false) \
             ON CONFLICT (retro_id, user_id) DO UPDATE SET active = true, abandoned = false",
        )
        .await
    }

    async fn retreat_user(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
    ) -> Result<Vec<ArenaUser>, StoreError> {
        self.set_member_flags(
            arena_id,
            user_id,
            "UPDATE retro_user SET active = false WHERE retro_id = $1 AND user_id = $2",
        )
        .await
    }

    async fn abandon_user(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
    ) -> Result<Vec<ArenaUser>, StoreError> {
        self.set_member_flags(
            arena_id,
            user_id,
            "UPDATE retro_user SET active = false, abandoned = true \
             WHERE retro_id = $1 AND user_id = $2",
        )
        .await
    }

    async fn confirm_owner(&self, arena_id: ArenaId, user_id: UserId) -> Result<(), StoreError> {
        let owner = sqlx::query_scalar::<_, Uuid>("SELECT owner_id FROM retro WHERE id = $1")
            .bind(Uuid::from(arena_id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("arena"))?;

        if owner == Uuid::from(user_id) {
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
        sqlx::query(
            "INSERT INTO retro_item (id, retro_id, user_id, kind, content) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(Uuid::from(arena_id))
        .bind(Uuid::from(user_id))
        .bind(kind.as_str())
        .bind(content)
        .execute(&self.pool)
        .await?;
        self.items(arena_id).await
    }

    async fn delete_item(
        &self,
        arena_id: ArenaId,
        user_id: UserId,
        item_id: Uuid,
    ) -> Result<Vec<RetroItem>, StoreError> {
        let result = sqlx::query(
            "DELETE FROM retro_item WHERE id = $1 AND retro_id = $2 AND user_id = $3",
        )
        .bind(item_id)
        .bind(Uuid::from(arena_id))
        .bind(Uuid::from(user_id))
        .execute(&self.pool)
        .await?;
        expect_affected(result.rows_affected(), "item")?;
        self.items(arena_id).await
    }

    async fn add_action(
        &self,
        arena_id: ArenaId,
        content: &str,
    ) -> Result<Vec<RetroAction>, StoreError> {
        sqlx::query("INSERT INTO retro_action (id, retro_id, content) VALUES ($1, $2, $3)")
            .bind(Uuid::new_v4())
            .bind(Uuid::from(arena_id))
            .bind(content)
            .execute(&self.pool)
            .await?;
        self.actions(arena_id).await
    }

    async fn update_action(
        &self,
        arena_id: ArenaId,
        action_id: Uuid,
        content: &str,
        completed: bool,
    ) -> Result<Vec<RetroAction>, StoreError> {
        let result = sqlx::query(
            "UPDATE retro_action SET content = $3, completed = $4 \
             WHERE id = $1 AND retro_id = $2",
        )
        .bind(action_id)
        .bind(Uuid::from(arena_id))
        .bind(content)
        .bind(completed)
        .execute(&self.pool)
        .await?;
        expect_affected(result.rows_affected(), "action")?;
        self.actions(arena_id).await
    }

    async fn delete_action(
        &self,
        arena_id: ArenaId,
        action_id: Uuid,
    ) -> Result<Vec<RetroAction>, StoreError> {
        let result = sqlx::query("DELETE FROM retro_action WHERE id = $1 AND retro_id = $2")
            .bind(action_id)
            .bind(Uuid::from(arena_id))
            .execute(&self.pool)
            .await?;
        expect_affected(result.rows_affected(), "action")?;
        self.actions(arena_id).await
    }

    async fn set_phase(&self, arena_id: ArenaId, phase: ArenaPhase) -> Result<Arena, StoreError> {
        let result =
            sqlx::query("UPDATE retro SET phase = $2, updated_date = NOW() WHERE id = $1")
                .bind(Uuid::from(arena_id))
                .bind(phase.as_str())
                .execute(&self.pool)
                .await?;
        expect_affected(result.rows_affected(), "arena")?;
        self.arena(arena_id).await
    }

    async fn set_owner(&self, arena_id: ArenaId, user_id: UserId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE retro SET owner_id = $2, updated_date = NOW() WHERE id = $1 AND EXISTS ( \
                 SELECT 1 FROM retro_user \
                 WHERE retro_id = $1 AND user_id = $2 AND abandoned = false)",
        )
        .bind(Uuid::from(arena_id))
        .bind(Uuid::from(user_id))
        .execute(&self.pool)
        .await?;
        expect_affected(result.rows_affected(), "member")
    }

    async fn delete_arena(&self, arena_id: ArenaId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM retro WHERE id = $1")
            .bind(Uuid::from(arena_id))
            .execute(&self.pool)
            .await?;
        expect_affected(result.rows_affected(), "arena")
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn user_row_maps_kind() {
        let id = Uuid::new_v4();
        let Ok(user) = user_from_row((id, "Ada".to_string(), "registered".to_string(), None))
        else {
            panic!("valid row");
        };
        assert_eq!(user.kind, UserKind::Registered);
        assert_eq!(*user.id.as_uuid(), id);
    }

    #[test]
    fn user_row_rejects_unknown_kind() {
        let row = (Uuid::new_v4(), "Ada".to_string(), "admin".to_string(), None);
        assert!(matches!(user_from_row(row), Err(StoreError::Backend(_))));
    }

    #[test]
    fn zero_rows_is_not_found() {
        assert!(matches!(
            expect_affected(0, "item"),
            Err(StoreError::NotFound("item"))
        ));
        assert!(expect_affected(1, "item").is_ok());
    }
}
