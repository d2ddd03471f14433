//! User service
//!
//! Registration, login/logout, session validation and the staff-only user
//! administration.
//!
//! - The first user ever registered becomes staff.
//! - Login accepts a username or an email address.
//! - Sessions are UUID tokens that expire after `auth.session_days`.

use crate::config::AuthConfig;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{permissions, CurrentUser, Session, UpdateUserInput, User};
use crate::services::access::AccessControl;
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Invalid credentials or inactive account
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Registration is closed")]
    RegistrationClosed,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    access: Arc<AccessControl>,
    session_days: i64,
    allow_registration: bool,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        access: Arc<AccessControl>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            access,
            session_days: config.session_days,
            allow_registration: config.allow_registration,
        }
    }

    /// Register a new user; the first one becomes staff
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        if !self.allow_registration {
            return Err(UserServiceError::RegistrationClosed);
        }
        validate_register_input(&input)?;

        if self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                input.username
            )));
        }

        if let Some(email) = &input.email {
            if self
                .user_repo
                .get_by_email(email)
                .await
                .context("Failed to check email")?
                .is_some()
            {
                return Err(UserServiceError::UserExists(format!(
                    "Email '{}' is already registered",
                    email
                )));
            }
        }

        let is_first = self.is_first_user().await?;
        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        let mut user = User::new(input.username, input.email, password_hash);
        user.first_name = input.first_name;
        user.last_name = input.last_name;
        user.is_staff = is_first;

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        tracing::info!(
            "User '{}' registered{}",
            created.username,
            if created.is_staff { " as staff" } else { "" }
        );
        Ok(created)
    }

    /// Check credentials and open a session
    pub async fn login(&self, input: LoginInput) -> Result<(Session, User), UserServiceError> {
        let invalid =
            || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let user = self
            .find_user_by_username_or_email(&input.username_or_email)
            .await?
            .ok_or_else(invalid)?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            return Err(invalid());
        }

        if !user.is_active {
            return Err(UserServiceError::AuthenticationError(
                "This account is inactive.".to_string(),
            ));
        }

        let session = self
            .session_repo
            .create(&Session::issue(user.id, self.session_days))
            .await
            .context("Failed to create session")?;

        tracing::info!("User '{}' logged in", user.username);
        Ok((session, user))
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to the signed-in principal.
    ///
    /// Expired sessions are removed; inactive users get `None`.
    pub async fn validate_session(&self, token: &str) -> Result<Option<CurrentUser>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            let _ = self.session_repo.delete(token).await;
            return Ok(None);
        }

        let user = match self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?
        {
            Some(user) if user.is_active => user,
            _ => return Ok(None),
        };

        Ok(Some(self.access.principal(user).await?))
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self
            .user_repo
            .count()
            .await
            .context("Failed to count users")?;
        Ok(count == 0)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    /// Home summary shown after sign-in
    pub fn summary(&self, principal: &CurrentUser) -> HomeSummary {
        HomeSummary {
            user: principal.user.clone(),
            group_ids: principal.group_ids.clone(),
            show_database: principal.has_perm(permissions::VIEW_FOLDER),
            show_lecture_database: principal.has_perm(permissions::VIEW_LECTURE),
            permissions: principal.permission_list(),
        }
    }

    // ========================================================================
    // Administration
    // ========================================================================

    pub async fn list_users(&self) -> Result<Vec<User>, UserServiceError> {
        Ok(self.user_repo.list().await.context("Failed to list users")?)
    }

    /// Apply profile and flag changes. Deactivating a user ends their sessions.
    pub async fn update_user(
        &self,
        id: i64,
        input: UpdateUserInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| UserServiceError::NotFound(format!("User with ID {} not found", id)))?;

        if let Some(email) = input.email {
            if let Some(address) = &email {
                if !address.contains('@') {
                    return Err(UserServiceError::ValidationError(
                        "Invalid email format".to_string(),
                    ));
                }
            }
            user.email = email;
        }
        if let Some(first_name) = input.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = input.last_name {
            user.last_name = last_name;
        }
        if let Some(is_staff) = input.is_staff {
            user.is_staff = is_staff;
        }
        if let Some(is_active) = input.is_active {
            user.is_active = is_active;
        }

        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user")?;

        if !updated.is_active {
            self.session_repo
                .delete_by_user(updated.id)
                .await
                .context("Failed to end sessions")?;
        }
        Ok(updated)
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        Ok(self
            .user_repo
            .get_by_email(username_or_email)
            .await
            .context("Failed to get user by email")?)
    }
}

fn validate_register_input(input: &RegisterInput) -> Result<(), UserServiceError> {
    if input.username.trim().is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username cannot be empty".to_string(),
        ));
    }
    if input.password.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Password cannot be empty".to_string(),
        ));
    }
    if let Some(email) = &input.email {
        if !email.contains('@') {
            return Err(UserServiceError::ValidationError(
                "Invalid email format".to_string(),
            ));
        }
    }
    Ok(())
}

/// Input for user registration
#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub username: String,
    pub email: Option<String>,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl RegisterInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}

/// What the signed-in user may open
#[derive(Debug, Clone, Serialize)]
pub struct HomeSummary {
    pub user: User,
    pub group_ids: Vec<i64>,
    pub show_database: bool,
    pub show_lecture_database: bool,
    pub permissions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GroupKind;
    use crate::services::test_support::Fixture;

    async fn setup_test_service() -> (Fixture, UserService) {
        let fx = Fixture::new().await;
        let service = UserService::new(
            fx.users.clone(),
            fx.sessions.clone(),
            fx.access.clone(),
            &AuthConfig::default(),
        );
        (fx, service)
    }

    /// Service over an empty user table
    async fn setup_empty_service() -> UserService {
        let (fx, _) = setup_test_service().await;
        let admin = fx.admin().await;
        fx.users.delete(admin.id()).await.unwrap();
        UserService::new(
            fx.users.clone(),
            fx.sessions.clone(),
            fx.access.clone(),
            &AuthConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_register_first_user_becomes_staff() {
        let service = setup_empty_service().await;

        let first = service
            .register(RegisterInput::new("root", "pw").with_email("root@lab.org"))
            .await
            .unwrap();
        assert!(first.is_staff);

        let second = service.register(RegisterInput::new("bob", "pw")).await.unwrap();
        assert!(!second.is_staff);
        assert!(second.email.is_none());
    }

    #[tokio::test]
    async fn test_register_duplicates_fail() {
        let (_fx, service) = setup_test_service().await;
        service
            .register(RegisterInput::new("alice", "pw").with_email("a@lab.org"))
            .await
            .unwrap();

        let by_name = service.register(RegisterInput::new("alice", "pw")).await;
        assert!(matches!(by_name, Err(UserServiceError::UserExists(_))));

        let by_email = service
            .register(RegisterInput::new("alice2", "pw").with_email("a@lab.org"))
            .await;
        assert!(matches!(by_email, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_fx, service) = setup_test_service().await;
        for input in [
            RegisterInput::new("  ", "pw"),
            RegisterInput::new("carol", ""),
            RegisterInput::new("carol", "pw").with_email("no-at-sign"),
        ] {
            assert!(matches!(
                service.register(input).await,
                Err(UserServiceError::ValidationError(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_registration_closed() {
        let fx = Fixture::new().await;
        let config = AuthConfig {
            allow_registration: false,
            ..AuthConfig::default()
        };
        let service = UserService::new(fx.users.clone(), fx.sessions.clone(), fx.access.clone(), &config);
        assert!(matches!(
            service.register(RegisterInput::new("dave", "pw")).await,
            Err(UserServiceError::RegistrationClosed)
        ));
    }

    #[tokio::test]
    async fn test_login_and_validate_session() {
        let (fx, service) = setup_test_service().await;
        let viewers = fx.group("Students", GroupKind::Viewer).await;
        let user = service
            .register(RegisterInput::new("alice", "secret").with_email("alice@lab.org"))
            .await
            .unwrap();
        fx.groups.add_member(viewers.id, user.id).await.unwrap();

        let (session, _) = service.login(LoginInput::new("alice", "secret")).await.unwrap();
        let principal = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(principal.id(), user.id);
        assert!(principal.in_group(viewers.id));
        assert!(principal.has_perm(permissions::VIEW_SLIDE));

        let (by_email, _) = service
            .login(LoginInput::new("alice@lab.org", "secret"))
            .await
            .unwrap();
        assert_ne!(by_email.id, session.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_failures() {
        let (_fx, service) = setup_test_service().await;
        let user = service.register(RegisterInput::new("alice", "secret")).await.unwrap();

        assert!(matches!(
            service.login(LoginInput::new("alice", "wrong")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
        assert!(matches!(
            service.login(LoginInput::new("nobody", "secret")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));

        service
            .update_user(user.id, UpdateUserInput { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();
        let inactive = service.login(LoginInput::new("alice", "secret")).await;
        assert!(matches!(inactive, Err(UserServiceError::AuthenticationError(msg)) if msg.contains("inactive")));
    }

    #[tokio::test]
    async fn test_deactivation_ends_sessions() {
        let (_fx, service) = setup_test_service().await;
        let user = service.register(RegisterInput::new("alice", "secret")).await.unwrap();
        let (session, _) = service.login(LoginInput::new("alice", "secret")).await.unwrap();

        service
            .update_user(user.id, UpdateUserInput { is_active: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_removed() {
        let (fx, service) = setup_test_service().await;
        let user = service.register(RegisterInput::new("alice", "secret")).await.unwrap();

        let mut session = Session::issue(user.id, 1);
        session.expires_at = chrono::Utc::now() - chrono::Duration::minutes(1);
        fx.sessions.create(&session).await.unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert!(fx.sessions.get_by_id(&session.id).await.unwrap().is_none());
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_user_toggles_staff() {
        let (_fx, service) = setup_test_service().await;
        let user = service.register(RegisterInput::new("alice", "secret")).await.unwrap();

        let updated = service
            .update_user(user.id, UpdateUserInput { is_staff: Some(true), ..Default::default() })
            .await
            .unwrap();
        assert!(updated.is_staff);

        assert!(matches!(
            service.update_user(9999, UpdateUserInput::default()).await,
            Err(UserServiceError::NotFound(_))
        ));
        assert_eq!(service.list_users().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_summary_flags() {
        let (fx, service) = setup_test_service().await;
        let viewers = fx.group("Students", GroupKind::Viewer).await;
        let student = fx.member("student", &[viewers.id]).await;

        let summary = service.summary(&student);
        assert!(!summary.show_database);
        assert!(summary.show_lecture_database);
        assert!(summary.permissions.contains(&permissions::VIEW_SLIDE.to_string()));

        let admin = service.summary(&fx.admin().await);
        assert!(admin.show_database);
        assert_eq!(admin.permissions.len(), permissions::ALL.len());
    }
}
