use crate::auth;
use crate::error::{AppError, AppResult, RepositoryError};
use crate::models::{User, UserRole};
use crate::repositories::{KametiMemberRepository, SessionRepository, UserRepository};
use crate::websocket::{Channel, ChannelAuthorizer};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

const MAX_NAME_LEN: usize = 120;

/// Registration form
#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub full_name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub phone: Option<&'a str>,
}

/// Issued on login; the raw token is only ever shown here
#[derive(Debug, Clone, Serialize)]
pub struct LoginGrant {
    pub token: String,
    pub expires_at: NaiveDateTime,
    pub user: User,
}

/// Accounts and bearer-token sessions
pub struct AuthService {
    user_repo: Arc<UserRepository>,
    session_repo: Arc<SessionRepository>,
    member_repo: Arc<KametiMemberRepository>,
    admin_emails: Vec<String>,
    session_ttl: chrono::Duration,
}

impl AuthService {
    pub fn new(
        user_repo: Arc<UserRepository>,
        session_repo: Arc<SessionRepository>,
        member_repo: Arc<KametiMemberRepository>,
        admin_emails: Vec<String>,
        session_ttl: chrono::Duration,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            member_repo,
            admin_emails,
            session_ttl,
        }
    }

    pub async fn register(&self, form: Registration<'_>) -> AppResult<User> {
        let full_name = validate_name(form.full_name)?;
        let email = auth::normalize_email(form.email)?;
        auth::validate_password(form.password)?;
        let phone = form.phone.map(str::trim).filter(|p| !p.is_empty());

        let role = if self.admin_emails.iter().any(|e| *e == email) {
            UserRole::Admin
        } else {
            UserRole::Member
        };

        let password_hash = auth::hash_password_async(form.password.to_string()).await?;

        let user = self
            .user_repo
            .create(full_name, &email, phone, &password_hash, role)
            .await
            .map_err(|e| match e {
                RepositoryError::Duplicate(_) => {
                    AppError::Conflict("An account with this email already exists".to_string())
                }
                other => other.into(),
            })?;

        info!("Registered user {} ({})", user.id, role.as_str());
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginGrant> {
        let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

        let email = auth::normalize_email(email).map_err(|_| invalid())?;
        let user = self.user_repo.find_by_email(&email).await?.ok_or_else(invalid)?;

        let matches =
            auth::verify_password_async(password.to_string(), user.password_hash.clone()).await?;
        if !matches {
            warn!("Failed login for user {}", user.id);
            return Err(invalid());
        }

        let token = auth::generate_token();
        let expires_at = chrono::Utc::now().naive_utc() + self.session_ttl;
        self.session_repo
            .create(&auth::hash_token(&token), user.id, expires_at)
            .await?;

        info!("User {} logged in", user.id);
        Ok(LoginGrant {
            token,
            expires_at,
            user,
        })
    }

    pub async fn logout(&self, token: &str) -> AppResult<()> {
        self.session_repo.delete(&auth::hash_token(token)).await?;
        Ok(())
    }

    /// Look up the user behind a bearer token
    pub async fn resolve(&self, token: &str) -> AppResult<User> {
        let now = chrono::Utc::now().naive_utc();
        self.session_repo
            .find_user(&auth::hash_token(token), now)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Session is invalid or has expired".to_string()))
    }

    pub async fn update_profile(
        &self,
        user: &User,
        full_name: Option<&str>,
        phone: Option<&str>,
    ) -> AppResult<User> {
        let full_name = full_name.map(validate_name).transpose()?;
        Ok(self.user_repo.update_profile(user.id, full_name, phone.map(str::trim)).await?)
    }
}

#[async_trait]
impl ChannelAuthorizer for AuthService {
    async fn authorize(&self, token: &str, channel: &Channel) -> bool {
        let user = match self.resolve(token).await {
            Ok(user) => user,
            Err(_) => return false,
        };

        match channel {
            Channel::User(id) => *id == user.id,
            Channel::Kameti(kameti_id) => {
                user.is_admin()
                    || self
                        .member_repo
                        .is_member(*kameti_id, user.id)
                        .await
                        .unwrap_or(false)
            }
        }
    }
}

fn validate_name(name: &str) -> AppResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("full_name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "full_name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Sana Tariq ").unwrap(), "Sana Tariq");
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(121)).is_err());
    }
}
