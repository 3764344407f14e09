use sqlx::SqlitePool;

use crate::models::user::User;

pub struct NewUser<'a> {
    pub name: &'a str,
    pub surname: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

/// Profile fields that may be changed through `PUT /users/:id`.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.surname.is_none()
            && self.email.is_none()
            && self.profile_picture.is_none()
    }
}

pub async fn insert_user(pool: &SqlitePool, user: NewUser<'_>) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, surname, username, email, password_hash)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user.name)
    .bind(user.surname)
    .bind(user.username)
    .bind(user.email)
    .bind(user.password_hash)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Looks a user up by username or (case-insensitively) by email.
pub async fn find_by_credential(
    pool: &SqlitePool,
    credential: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE username = $1 OR email = lower($1) ORDER BY username = $1 DESC LIMIT 1",
    )
    .bind(credential)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = lower($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn username_or_email_taken(
    pool: &SqlitePool,
    username: &str,
    email: &str,
) -> Result<bool, sqlx::Error> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE username = $1 OR email = $2 LIMIT 1")
            .bind(username)
            .bind(email)
            .fetch_optional(pool)
            .await?;
    Ok(existing.is_some())
}

/// Applies only the fields that are present. Returns the number of rows changed.
pub async fn update_profile(
    pool: &SqlitePool,
    id: i64,
    changes: &ProfileChanges,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET name            = COALESCE($1, name),
            surname         = COALESCE($2, surname),
            email           = COALESCE($3, email),
            profile_picture = COALESCE($4, profile_picture)
        WHERE id = $5
        "#,
    )
    .bind(changes.name.as_deref())
    .bind(changes.surname.as_deref())
    .bind(changes.email.as_deref())
    .bind(changes.profile_picture.as_deref())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn set_password_hash(
    pool: &SqlitePool,
    id: i64,
    password_hash: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
        .bind(password_hash)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn set_profile_picture(
    pool: &SqlitePool,
    id: i64,
    picture: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET profile_picture = $1 WHERE id = $2")
        .bind(picture)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
