//! User model
//!
//! Defines the stored account and the authenticated principal that request
//! handlers and services use for permission checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A registered account.
///
/// Staff users are administrators: they hold every permission and pass every
/// ownership check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    /// Username (unique)
    pub username: String,
    pub email: Option<String>,
    /// Password hash (argon2)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    /// Root of the user's lecture folder tree, created on joining a publisher group
    pub base_lecture_folder_id: Option<i64>,
    pub is_staff: bool,
    /// Inactive accounts cannot log in
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

impl User {
    /// Create a new active, non-staff user. The password must already be hashed.
    pub fn new(username: String, email: Option<String>, password_hash: String) -> Self {
        Self {
            id: 0,
            username,
            email,
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            base_lecture_folder_id: None,
            is_staff: false,
            is_active: true,
            date_joined: Utc::now(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.is_staff
    }

    /// First and last name separated by a space, trimmed
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Input for updating a user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserInput {
    pub email: Option<Option<String>>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_staff: Option<bool>,
    pub is_active: Option<bool>,
}

/// The authenticated principal for one request
///
/// Carries the user's group ids and the union of their groups' permission
/// codenames so that permission checks need no further queries.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub group_ids: Vec<i64>,
    pub permissions: HashSet<String>,
}

impl CurrentUser {
    pub fn new(user: User, group_ids: Vec<i64>, permissions: HashSet<String>) -> Self {
        Self {
            user,
            group_ids,
            permissions,
        }
    }

    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }

    /// Check a single `app.action_model` permission; staff hold all of them
    pub fn has_perm(&self, codename: &str) -> bool {
        self.is_admin() || self.permissions.contains(codename)
    }

    pub fn has_perms(&self, codenames: &[&str]) -> bool {
        codenames.iter().all(|c| self.has_perm(c))
    }

    pub fn in_group(&self, group_id: i64) -> bool {
        self.group_ids.contains(&group_id)
    }

    /// Sorted permission list, as reported to clients
    pub fn permission_list(&self) -> Vec<String> {
        let mut list: Vec<String> = if self.is_admin() {
            super::permissions::ALL.iter().map(|p| p.to_string()).collect()
        } else {
            self.permissions.iter().cloned().collect()
        };
        list.sort();
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::permissions;

    fn principal(is_staff: bool, perms: &[&str]) -> CurrentUser {
        let mut user = User::new("alice".to_string(), None, "hash".to_string());
        user.id = 7;
        user.is_staff = is_staff;
        CurrentUser::new(
            user,
            vec![3],
            perms.iter().map(|p| p.to_string()).collect(),
        )
    }

    #[test]
    fn test_user_new_defaults() {
        let user = User::new("bob".to_string(), Some("b@x.org".to_string()), "h".to_string());
        assert_eq!(user.id, 0);
        assert!(user.is_active);
        assert!(!user.is_admin());
        assert!(user.base_lecture_folder_id.is_none());
    }

    #[test]
    fn test_full_name_trims() {
        let mut user = User::new("bob".to_string(), None, "h".to_string());
        assert_eq!(user.full_name(), "");
        user.first_name = "Bob".to_string();
        assert_eq!(user.full_name(), "Bob");
        user.last_name = "Ross".to_string();
        assert_eq!(user.full_name(), "Bob Ross");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("bob".to_string(), None, "secret-hash".to_string());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }

    #[test]
    fn test_has_perm() {
        let viewer = principal(false, &[permissions::VIEW_SLIDE]);
        assert!(viewer.has_perm(permissions::VIEW_SLIDE));
        assert!(!viewer.has_perm(permissions::VIEW_FOLDER));
        assert!(!viewer.has_perms(&[permissions::VIEW_SLIDE, permissions::VIEW_FOLDER]));

        let admin = principal(true, &[]);
        assert!(admin.has_perm(permissions::DELETE_LECTURE));
        assert_eq!(admin.permission_list().len(), permissions::ALL.len());
    }

    #[test]
    fn test_in_group() {
        let user = principal(false, &[]);
        assert!(user.in_group(3));
        assert!(!user.in_group(4));
    }
}
