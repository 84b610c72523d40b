mod models;

use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use time::{OffsetDateTime, UtcOffset, format_description::BorrowedFormatItem, macros::format_description};
use uuid::Uuid;

pub use models::{Message, MessageId, NewMessage, Room, RoomId, User, UserId};

/// Stored timestamp layout: UTC with a fixed nine-digit fraction, so the
/// text order of a column is its time order.
const STORED_TIME: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z");

fn stored_time(at: OffsetDateTime) -> Result<String, sqlx::Error> {
    at.to_offset(UtcOffset::UTC)
        .format(STORED_TIME)
        .map_err(|err| sqlx::Error::Encode(Box::new(err)))
}

/// Relational store for users, rooms, memberships and messages.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Store, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(options)
            .await?;

        Ok(Store { pool })
    }

    /// A private in-memory database. Pinned to one connection that never
    /// expires, since every sqlite memory connection is its own database.
    pub async fn in_memory() -> Result<Store, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Store { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub async fn create_user(&self, id: &UserId, name: &str) -> Result<User, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        let stamp = stored_time(now)?;
        sqlx::query("INSERT INTO users (id,name,created_at,updated_at) VALUES (?,?,?,?)")
            .bind(id)
            .bind(name)
            .bind(&stamp)
            .bind(&stamp)
            .execute(&self.pool)
            .await?;

        tracing::info!(user_id = %id, name, "user created");
        Ok(User {
            id: id.clone(),
            name: name.to_owned(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_user(&self, id: &UserId) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as("SELECT id,name,created_at,updated_at FROM users WHERE id=?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn create_room(
        &self,
        id: Option<RoomId>,
        name: &str,
        owner_id: Option<&UserId>,
    ) -> Result<Room, sqlx::Error> {
        let id = id.unwrap_or_else(RoomId::generate);
        let now = OffsetDateTime::now_utc();
        let stamp = stored_time(now)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO rooms (id,name,owner_id,created_at,updated_at) VALUES (?,?,?,?,?)")
            .bind(&id)
            .bind(name)
            .bind(owner_id)
            .bind(&stamp)
            .bind(&stamp)
            .execute(&mut *tx)
            .await?;
        if let Some(owner_id) = owner_id {
            insert_member(&mut *tx, &id, owner_id).await?;
        }
        tx.commit().await?;

        tracing::info!(room_id = %id, name, "room created");
        Ok(Room {
            id,
            name: name.to_owned(),
            owner_id: owner_id.cloned(),
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_room(&self, id: &RoomId) -> Result<Option<Room>, sqlx::Error> {
        sqlx::query_as("SELECT id,name,owner_id,created_at,updated_at FROM rooms WHERE id=?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Records that `user_id` belongs to `room_id`. Returns `false` if the
    /// membership already existed.
    pub async fn add_member(&self, room_id: &RoomId, user_id: &UserId) -> Result<bool, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        insert_member(&mut *conn, room_id, user_id).await
    }

    pub async fn rooms_for_user(&self, user_id: &UserId) -> Result<Vec<Room>, sqlx::Error> {
        sqlx::query_as(
            r#"SELECT r.id,r.name,r.owner_id,r.created_at,r.updated_at
               FROM room_members m
               INNER JOIN rooms r ON m.room_id = r.id
               WHERE m.user_id=?
               ORDER BY r.created_at, r.id"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn insert_message(&self, new: NewMessage) -> Result<Message, sqlx::Error> {
        self.insert_message_at(new, OffsetDateTime::now_utc()).await
    }

    async fn insert_message_at(&self, new: NewMessage, now: OffsetDateTime) -> Result<Message, sqlx::Error> {
        let id = MessageId::generate();
        let stamp = stored_time(now)?;
        sqlx::query(
            "INSERT INTO messages (id,content,room_id,user_id,created_at,updated_at) VALUES (?,?,?,?,?,?)",
        )
        .bind(&id)
        .bind(&new.content)
        .bind(&new.room_id)
        .bind(&new.user_id)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&self.pool)
        .await?;

        Ok(Message {
            id,
            content: new.content,
            room_id: new.room_id,
            user_id: new.user_id,
            created_at: now,
            updated_at: now,
        })
    }

    /// All messages of a room, oldest first. Unknown rooms yield no messages.
    pub async fn messages_for_room(&self, room_id: &RoomId) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as(
            r#"SELECT id,content,room_id,user_id,created_at,updated_at
               FROM messages
               WHERE room_id=?
               ORDER BY created_at, id"#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
    }
}

async fn insert_member(
    conn: &mut sqlx::SqliteConnection,
    room_id: &RoomId,
    user_id: &UserId,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("INSERT OR IGNORE INTO room_members (id,room_id,user_id) VALUES (?,?,?)")
        .bind(Uuid::now_v7().to_string())
        .bind(room_id)
        .bind(user_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected() == 1)
}
