//! Admin user management commands.
//!
//! # Usage
//!
//! ```bash
//! # Create a new admin account
//! ts-cli admin create -e admin@example.com -p 'a long password'
//!
//! # Grant admin to an existing account
//! ts-cli admin promote -e shopper@example.com
//! ```
//!
//! # Environment Variables
//!
//! - `API_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string

use thiserror::Error;

use tee_studio_api::db::{RepositoryError, UserRepository, UserStore};
use tee_studio_api::models::User;
use tee_studio_api::services::auth::{AuthError, hash_password};
use tee_studio_core::Email;

use super::{ConnectError, connect};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// Password rejected or could not be hashed.
    #[error("Password error: {0}")]
    Password(#[from] AuthError),

    /// User already exists.
    #[error("User already exists with email: {0}")]
    UserExists(String),

    /// No user with this email.
    #[error("No user with email: {0}")]
    UserNotFound(String),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

fn parse_email(email: &str) -> Result<Email, AdminError> {
    Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))
}

/// Create a new account with the admin flag set.
///
/// # Errors
///
/// Returns `AdminError` if the input is invalid, the email is taken, or
/// the database is unreachable.
pub async fn create_user(email: &str, password: &str) -> Result<User, AdminError> {
    let email = parse_email(email)?;
    let password_hash = hash_password(password)?;

    let users = UserRepository::new(connect().await?);

    tracing::info!("Creating admin user: {}", email);
    users
        .create(&email, &password_hash)
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AdminError::UserExists(email.to_string()),
            other => AdminError::Repository(other),
        })?;

    let user = users.set_admin(&email, true).await?;
    tracing::info!(
        "Admin user created successfully! ID: {}, Email: {}",
        user.id,
        user.email
    );

    Ok(user)
}

/// Set the admin flag on an existing account.
///
/// # Errors
///
/// Returns `AdminError::UserNotFound` if no account has this email.
pub async fn promote(email: &str) -> Result<User, AdminError> {
    let email = parse_email(email)?;
    let users = UserRepository::new(connect().await?);

    let user = users.set_admin(&email, true).await.map_err(|e| match e {
        RepositoryError::NotFound => AdminError::UserNotFound(email.to_string()),
        other => AdminError::Repository(other),
    })?;

    tracing::info!("Promoted user {} ({}) to admin", user.id, user.email);
    Ok(user)
}
