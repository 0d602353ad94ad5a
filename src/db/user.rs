use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// Daily nutrition goals stored with each user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub daily_calorie_goal: i64,
    pub daily_protein_goal: i64,
    pub daily_carb_goal: i64,
    pub daily_fat_goal: i64,
    /// Litres per day
    pub water_goal: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            daily_calorie_goal: 2000,
            daily_protein_goal: 150,
            daily_carb_goal: 250,
            daily_fat_goal: 65,
            water_goal: 2.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub google_id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub token_version: i64,
    pub preferences: Preferences,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Public view of the user. Leaves out the row id and the token version.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.uuid.clone(),
            google_id: self.google_id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            avatar: self.avatar.clone(),
            preferences: self.preferences,
            created_at: self.created_at.clone(),
            updated_at: self.updated_at.clone(),
        }
    }
}

/// Profile returned by `GET /api/auth/user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub google_id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub preferences: Preferences,
    pub created_at: String,
    pub updated_at: String,
}

/// Identity produced by an external login, used to find or create a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser<'a> {
    pub google_id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub avatar: Option<&'a str>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    google_id: String,
    name: String,
    email: String,
    avatar: Option<String>,
    token_version: i64,
    daily_calorie_goal: i64,
    daily_protein_goal: i64,
    daily_carb_goal: i64,
    daily_fat_goal: i64,
    water_goal: f64,
    created_at: String,
    updated_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            google_id: row.google_id,
            name: row.name,
            email: row.email,
            avatar: row.avatar,
            token_version: row.token_version,
            preferences: Preferences {
                daily_calorie_goal: row.daily_calorie_goal,
                daily_protein_goal: row.daily_protein_goal,
                daily_carb_goal: row.daily_carb_goal,
                daily_fat_goal: row.daily_fat_goal,
                water_goal: row.water_goal,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user from an external identity. Returns the user ID.
    pub async fn create(&self, uuid: &str, new_user: &NewUser<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (uuid, google_id, name, email, avatar) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid)
        .bind(new_user.google_id)
        .bind(new_user.name)
        .bind(new_user.email)
        .bind(new_user.avatar)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Return the user linked to `google_id`, creating it on first login.
    pub async fn find_or_create(&self, new_user: &NewUser<'_>) -> Result<User, sqlx::Error> {
        if let Some(user) = self.get_by_google_id(new_user.google_id).await? {
            return Ok(user);
        }

        let uuid = uuid::Uuid::new_v4().to_string();
        let id = self.create(&uuid, new_user).await?;
        tracing::info!(user = %uuid, "Created user from external login");

        self.get_by_id(id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, google_id, name, email, avatar, token_version,
                    daily_calorie_goal, daily_protein_goal, daily_carb_goal, daily_fat_goal,
                    water_goal, created_at, updated_at
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, google_id, name, email, avatar, token_version,
                    daily_calorie_goal, daily_protein_goal, daily_carb_goal, daily_fat_goal,
                    water_goal, created_at, updated_at
             FROM users WHERE uuid = ?",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    pub async fn get_by_google_id(&self, google_id: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, uuid, google_id, name, email, avatar, token_version,
                    daily_calorie_goal, daily_protein_goal, daily_carb_goal, daily_fat_goal,
                    water_goal, created_at, updated_at
             FROM users WHERE google_id = ?",
        )
        .bind(google_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Bump the token version, revoking every refresh token issued so far.
    pub async fn increment_token_version(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET token_version = token_version + 1, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user by ID.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
