//! User accounts on the main database.
//!
//! Deleting a user only clears `is_active`. Default reads treat inactive users
//! as absent, while [`UserService::find_any`] and the admin listing still see
//! them for history.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{any::AnyRow, Row};
use tracing::info;

use crate::{
    audit::{AuditLogService, LogLevel, NewApplicationLog},
    error::{is_unique_violation, DbError, FieldViolation, ValidationError, Violations},
    pager::{CursorPager, CursorValue, Page, PageRequest, Pageable, SortKey},
    password::PasswordHasher,
    session::{ScopedSession, SessionProvider},
    sql::{self, Select},
};

const PASSWORD_MIN_CHARS: usize = 8;

/// Stored password hash. Never serialized and redacted from debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    #[serde(skip)]
    pub password_hash: PasswordHash,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Pageable for User {
    fn cursor_id(&self) -> i64 {
        self.id
    }

    fn cursor_value(&self, _key: &SortKey) -> CursorValue {
        CursorValue::Int(self.id)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub password: String,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("full_name", &self.full_name)
            .finish_non_exhaustive()
    }
}

impl NewUser {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Violations::default();
        check_email(&mut violations, &self.email);
        check_username(&mut violations, &self.username);
        check_full_name(&mut violations, self.full_name.as_deref());
        check_password(&mut violations, &self.password);
        violations.finish()
    }
}

/// Partial update. `full_name: Some(None)` clears the name; a new password is
/// hashed before it is stored.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub email: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<Option<String>>,
    pub password: Option<String>,
}

impl fmt::Debug for UserPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPatch")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("full_name", &self.full_name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.username.is_none()
            && self.full_name.is_none()
            && self.password.is_none()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut violations = Violations::default();
        if let Some(email) = &self.email {
            check_email(&mut violations, email);
        }
        if let Some(username) = &self.username {
            check_username(&mut violations, username);
        }
        if let Some(full_name) = &self.full_name {
            check_full_name(&mut violations, full_name.as_deref());
        }
        if let Some(password) = &self.password {
            check_password(&mut violations, password);
        }
        violations.finish()
    }

    /// Applies the set fields on top of `user`, hashing any new password.
    pub fn merge(self, mut user: User, hasher: &PasswordHasher) -> User {
        if let Some(email) = self.email {
            user.email = email.trim().to_string();
        }
        if let Some(username) = self.username {
            user.username = username;
        }
        if let Some(full_name) = self.full_name {
            user.full_name = full_name;
        }
        if let Some(password) = self.password {
            user.password_hash = PasswordHash(hasher.hash(&password));
        }
        user
    }
}

fn check_email(violations: &mut Violations, email: &str) {
    let email = email.trim();
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    violations.check(well_formed, || {
        FieldViolation::new("email", "email must be a valid address").with_value(email)
    });
    violations.check(email.chars().count() <= 255, || {
        FieldViolation::new("email", "email must be at most 255 characters")
    });
}

fn check_username(violations: &mut Violations, username: &str) {
    violations.check(
        !username.is_empty() && username.chars().all(char::is_alphanumeric),
        || FieldViolation::new("username", "username must be alphanumeric").with_value(username),
    );
    violations.check(username.chars().count() <= 100, || {
        FieldViolation::new("username", "username must be at most 100 characters")
    });
}

fn check_full_name(violations: &mut Violations, full_name: Option<&str>) {
    violations.check(full_name.map_or(true, |n| n.chars().count() <= 255), || {
        FieldViolation::new("full_name", "full_name must be at most 255 characters")
    });
}

fn check_password(violations: &mut Violations, password: &str) {
    violations.check(password.chars().count() >= PASSWORD_MIN_CHARS, || {
        FieldViolation::new("password", "password must be at least 8 characters long")
    });
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub include_inactive: bool,
}

const SELECT_USER: &str = "SELECT id, email, username, full_name, hashed_password, is_active, \
     is_superuser, created_at, updated_at FROM users";

#[derive(Debug, Clone)]
pub struct UserService {
    provider: SessionProvider,
    pager: CursorPager,
    audit: AuditLogService,
    hasher: PasswordHasher,
}

impl UserService {
    pub fn new(provider: SessionProvider, pager: CursorPager, audit: AuditLogService) -> Self {
        Self {
            provider,
            pager,
            audit,
            hasher: PasswordHasher::default(),
        }
    }

    pub fn with_password_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    /// Fails with `Conflict` when the email or username is taken; nothing is
    /// written in that case.
    pub async fn create(&self, input: NewUser) -> Result<User, DbError> {
        input.validate()?;
        let password_hash = PasswordHash(self.hasher.hash(&input.password));

        let mut session = self.provider.acquire().await?;
        let result = insert_user(&mut session, input, password_hash).await;
        let user = session.finish(result).await?;

        info!(user_id = user.id, "user created");
        self.record_event(format!("user {} created", user.id), "create");
        Ok(user)
    }

    /// Active users only.
    pub async fn get(&self, id: i64) -> Result<User, DbError> {
        let mut session = self.provider.acquire().await?;
        let result = fetch_user(&mut session, id, true).await;
        session.finish(result).await
    }

    /// Any user, active or not.
    pub async fn find_any(&self, id: i64) -> Result<User, DbError> {
        let mut session = self.provider.acquire().await?;
        let result = fetch_user(&mut session, id, false).await;
        session.finish(result).await
    }

    pub async fn update(&self, id: i64, patch: UserPatch) -> Result<User, DbError> {
        patch.validate()?;
        let mut session = self.provider.acquire().await?;
        let result = update_user(&mut session, id, patch, &self.hasher).await;
        let user = session.finish(result).await?;

        info!(user_id = id, "user updated");
        self.record_event(format!("user {id} updated"), "update");
        Ok(user)
    }

    /// Soft delete: the user becomes inactive and disappears from default reads.
    pub async fn delete(&self, id: i64) -> Result<(), DbError> {
        let mut session = self.provider.acquire().await?;
        let result = set_flag(&mut session, id, "is_active", false, true).await;
        session.finish(result).await?;

        info!(user_id = id, "user deactivated");
        self.record_event(format!("user {id} deleted"), "delete");
        Ok(())
    }

    pub async fn list(
        &self,
        filter: UserFilter,
        page: &PageRequest,
    ) -> Result<Page<User>, DbError> {
        let window = self.pager.open(SortKey::ID_ASC, page)?;
        let mut select = Select::new(SELECT_USER);
        if !filter.include_inactive {
            select.eq("is_active", sql::flag(true));
        }

        let mut session = self.provider.acquire().await?;
        let result = sql::fetch_rows(&mut session, window.apply(select), map_user).await;
        let rows = session.finish(result).await?;
        Ok(self.pager.close(window, rows))
    }

    /// Activates or deactivates any user, including inactive ones.
    pub async fn set_active(&self, id: i64, active: bool) -> Result<User, DbError> {
        let mut session = self.provider.acquire().await?;
        let result = async {
            set_flag(&mut session, id, "is_active", active, false).await?;
            fetch_user(&mut session, id, false).await
        }
        .await;
        let user = session.finish(result).await?;

        let action = if active { "activated" } else { "deactivated" };
        info!(user_id = id, action, "user status changed");
        self.record_event(format!("user {id} {action}"), "set_active");
        Ok(user)
    }

    pub async fn set_superuser(&self, id: i64, superuser: bool) -> Result<User, DbError> {
        let mut session = self.provider.acquire().await?;
        let result = async {
            set_flag(&mut session, id, "is_superuser", superuser, false).await?;
            fetch_user(&mut session, id, false).await
        }
        .await;
        let user = session.finish(result).await?;

        let action = if superuser { "granted" } else { "revoked" };
        info!(user_id = id, action, "superuser flag changed");
        self.record_event(format!("superuser {action} for user {id}"), "set_superuser");
        Ok(user)
    }

    pub fn verify_password(&self, user: &User, password: &str) -> bool {
        self.hasher.verify(password, user.password_hash.as_str())
    }

    fn record_event(&self, message: String, function: &str) {
        self.audit.record_detached(
            NewApplicationLog::new(LogLevel::Info, "users", message)
                .module("users")
                .function(function),
        );
    }
}

async fn ensure_unique(
    session: &mut ScopedSession,
    field: &'static str,
    value: &str,
    exclude_id: Option<i64>,
) -> Result<(), DbError> {
    let mut select = Select::new("SELECT id FROM users");
    select.eq(field, value.to_string());
    if let Some(id) = exclude_id {
        select.and().push("id <> ").push_bind(id);
    }
    let taken = select
        .into_builder()
        .build()
        .fetch_optional(session.conn())
        .await?;
    match taken {
        Some(_) => Err(DbError::conflict("user", field, value)),
        None => Ok(()),
    }
}

/// Maps a unique-constraint failure that slipped past the pre-check (a
/// concurrent insert) onto the column named in the driver message.
fn conflict_from_constraint(err: sqlx::Error, email: &str, username: &str) -> DbError {
    if !is_unique_violation(&err) {
        return err.into();
    }
    let message = match &err {
        sqlx::Error::Database(db_err) => db_err.message().to_lowercase(),
        _ => String::new(),
    };
    if message.contains("username") {
        DbError::conflict("user", "username", username)
    } else {
        DbError::conflict("user", "email", email)
    }
}

async fn insert_user(
    session: &mut ScopedSession,
    input: NewUser,
    password_hash: PasswordHash,
) -> Result<User, DbError> {
    let email = input.email.trim().to_string();
    ensure_unique(session, "email", &email, None).await?;
    ensure_unique(session, "username", &input.username, None).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (
            email, username, full_name, hashed_password,
            is_active, is_superuser, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, NULL)
        "#,
    )
    .bind(email.clone())
    .bind(input.username.clone())
    .bind(input.full_name)
    .bind(password_hash.0)
    .bind(sql::flag(true))
    .bind(sql::flag(false))
    .bind(sql::now_timestamp())
    .execute(session.conn())
    .await
    .map_err(|err| conflict_from_constraint(err, &email, &input.username))?;

    let id = sql::inserted_id(session, &result, "users").await?;
    fetch_user(session, id, false).await
}

async fn fetch_user(
    session: &mut ScopedSession,
    id: i64,
    active_only: bool,
) -> Result<User, DbError> {
    let row = sqlx::query(&format!("{SELECT_USER} WHERE id = ?"))
        .bind(id)
        .fetch_optional(session.conn())
        .await?;

    match row.map(|row| map_user(&row)).transpose()? {
        Some(user) if user.is_active || !active_only => Ok(user),
        _ => Err(DbError::not_found("user", id)),
    }
}

async fn update_user(
    session: &mut ScopedSession,
    id: i64,
    patch: UserPatch,
    hasher: &PasswordHasher,
) -> Result<User, DbError> {
    let current = fetch_user(session, id, true).await?;
    if patch.is_empty() {
        return Ok(current);
    }
    if let Some(email) = &patch.email {
        ensure_unique(session, "email", email.trim(), Some(id)).await?;
    }
    if let Some(username) = &patch.username {
        ensure_unique(session, "username", username, Some(id)).await?;
    }
    let merged = patch.merge(current, hasher);

    sqlx::query(
        r#"
        UPDATE users
        SET email = ?, username = ?, full_name = ?, hashed_password = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(merged.email.clone())
    .bind(merged.username.clone())
    .bind(merged.full_name.clone())
    .bind(merged.password_hash.0.clone())
    .bind(sql::now_timestamp())
    .bind(id)
    .execute(session.conn())
    .await
    .map_err(|err| conflict_from_constraint(err, &merged.email, &merged.username))?;

    fetch_user(session, id, true).await
}

/// `active_only` restricts the update to active users, so deleting an already
/// deleted user reports `NotFound`.
async fn set_flag(
    session: &mut ScopedSession,
    id: i64,
    column: &'static str,
    value: bool,
    active_only: bool,
) -> Result<(), DbError> {
    let mut statement = format!("UPDATE users SET {column} = ?, updated_at = ? WHERE id = ?");
    if active_only {
        statement.push_str(" AND is_active = 1");
    }
    let result = sqlx::query(&statement)
        .bind(sql::flag(value))
        .bind(sql::now_timestamp())
        .bind(id)
        .execute(session.conn())
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("user", id));
    }
    Ok(())
}

fn map_user(row: &AnyRow) -> Result<User, DbError> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        full_name: row.try_get("full_name")?,
        is_active: sql::get_flag(row, "is_active")?,
        is_superuser: sql::get_flag(row, "is_superuser")?,
        password_hash: PasswordHash(row.try_get("hashed_password")?),
        created_at: sql::get_timestamp(row, "users", "created_at")?,
        updated_at: sql::get_opt_timestamp(row, "users", "updated_at")?,
    })
}
