// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identity: users, teams, tokens and team-membership checks.
//!
//! Passwords are stored as PBKDF2-HMAC-SHA512 derivations under a
//! process-wide salt; tokens are SHA-512 digests over the user email, the
//! configured token key and the issue time. Both parameter sets live in
//! [`crate::config::Config`].

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::Store;

/// PBKDF2 round count for password hashing.
const HASH_ROUNDS: u32 = 4096;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"));

/// An opaque access token owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    /// Opaque token value presented by clients.
    pub value: String,
    /// Absolute expiry timestamp, compared against wall clock on use.
    pub valid_until: DateTime<Utc>,
}

impl Token {
    /// Whether the token is still usable at `now`.
    pub fn valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_until
    }
}

/// A platform user, keyed by email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Globally unique email address.
    pub email: String,
    /// PBKDF2-HMAC-SHA512 password derivation, hex encoded.
    pub password: String,
    /// Live tokens; an unordered set looked up by value.
    #[serde(default)]
    pub tokens: Vec<Token>,
    /// Public keys registered for repository access (opaque strings).
    #[serde(default)]
    pub keys: Vec<String>,
}

/// A team, keyed by name, holding member emails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    /// Unique team name.
    pub name: String,
    /// Member emails; every entry refers to an existing user.
    #[serde(default)]
    pub users: Vec<String>,
}

impl Team {
    /// Whether `email` is a member of this team.
    pub fn contains_user(&self, email: &str) -> bool {
        self.users.iter().any(|u| u == email)
    }
}

/// Identity service: authentication, token issue/resolve, team membership.
#[derive(Clone)]
pub struct Identity {
    store: Arc<dyn Store>,
    config: Config,
}

impl Identity {
    /// Create an identity service over a store with the given auth config.
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self { store, config }
    }

    /// Derive the stored form of a password.
    pub fn hash_password(&self, password: &str) -> String {
        let salt = self.config.auth_salt.as_bytes();
        // Key length follows the salt width: salt bytes * 8 output bytes.
        let mut key = vec![0u8; salt.len() * 8];
        pbkdf2::pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, HASH_ROUNDS, &mut key);
        hex::encode(key)
    }

    /// Create a user with a validated email and a hashed password.
    ///
    /// Fails with `AlreadyExists` when the email is taken.
    pub async fn create_user(&self, email: &str, password: &str) -> Result<User> {
        if !EMAIL_RE.is_match(email) {
            return Err(Error::validation("email", format!("{email:?} is not an email")));
        }
        if password.is_empty() {
            return Err(Error::validation("password", "must not be empty"));
        }
        let user = User {
            email: email.to_string(),
            password: self.hash_password(password),
            tokens: Vec::new(),
            keys: Vec::new(),
        };
        self.store.insert_user(&user).await?;
        info!(user = %email, "Created user");
        Ok(user)
    }

    /// Remove a user. Refused while any team still lists them.
    pub async fn remove_user(&self, email: &str) -> Result<()> {
        let teams = self.store.teams_for_user(email).await?;
        if let Some(team) = teams.first() {
            return Err(Error::Conflict(format!(
                "This user is a member of the team \"{}\", and cannot be removed. \
                 Remove the membership first.",
                team.name
            )));
        }
        self.store.delete_user(email).await
    }

    /// Check a password against the stored derivation.
    ///
    /// A missing user and a wrong password are indistinguishable to the
    /// caller: both report invalid credentials.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let user = self
            .store
            .user_by_email(email)
            .await?
            .ok_or_else(|| Error::Unauthorized("invalid email or password".into()))?;
        if user.password != self.hash_password(password) {
            return Err(Error::Unauthorized("invalid email or password".into()));
        }
        Ok(user)
    }

    /// Issue a new token for the user and persist it on the user record.
    pub async fn issue_token(&self, user: &User) -> Result<Token> {
        let now = Utc::now();
        let token = self.new_token(&user.email, now);
        let mut stored = self
            .store
            .user_by_email(&user.email)
            .await?
            .ok_or_else(|| Error::not_found("user", &user.email))?;
        stored.tokens.push(token.clone());
        self.store.update_user(&stored).await?;
        debug!(user = %user.email, valid_until = %token.valid_until, "Issued token");
        Ok(token)
    }

    fn new_token(&self, email: &str, now: DateTime<Utc>) -> Token {
        // Digest input mirrors the historical scheme: email, token key and
        // the issue instant in unix-date form.
        let stamp = now.format("%a %b %e %H:%M:%S %Z %Y").to_string();
        let mut hasher = Sha512::new();
        hasher.update(email.as_bytes());
        hasher.update(self.config.token_key.as_bytes());
        hasher.update(stamp.as_bytes());
        Token {
            value: hex::encode(hasher.finalize()),
            valid_until: now + Duration::days(self.config.token_expire_days),
        }
    }

    /// Resolve a token value to its owning user.
    ///
    /// Missing and expired tokens are distinct failures; both carry the
    /// unauthorized kind for the public boundary.
    pub async fn resolve_token(&self, value: &str) -> Result<User> {
        if value.is_empty() {
            return Err(Error::Unauthorized("you must provide a token".into()));
        }
        let user = self
            .store
            .user_by_token(value)
            .await?
            .ok_or_else(|| Error::Unauthorized("invalid token".into()))?;
        let token = user
            .tokens
            .iter()
            .find(|t| t.value == value)
            .ok_or_else(|| Error::Unauthorized("invalid token".into()))?;
        if !token.valid_at(Utc::now()) {
            return Err(Error::Unauthorized("token expired".into()));
        }
        Ok(user)
    }

    /// Whether `user` belongs to at least one of `team_names`.
    ///
    /// An empty team set never grants access.
    pub async fn check_access(&self, team_names: &[String], user: &User) -> Result<bool> {
        for name in team_names {
            if let Some(team) = self.store.team_by_name(name).await? {
                if team.contains_user(&user.email) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Create a team with the creator as its first member.
    pub async fn create_team(&self, name: &str, creator: &User) -> Result<Team> {
        if name.is_empty() {
            return Err(Error::validation("team", "name must not be empty"));
        }
        let team = Team {
            name: name.to_string(),
            users: vec![creator.email.clone()],
        };
        self.store.insert_team(&team).await?;
        info!(team = %name, "Created team");
        Ok(team)
    }

    /// Add a user to a team. Fails with `Conflict` if already a member.
    pub async fn add_team_member(&self, team_name: &str, email: &str) -> Result<Team> {
        let mut team = self
            .store
            .team_by_name(team_name)
            .await?
            .ok_or_else(|| Error::not_found("team", team_name))?;
        // The member must exist; teams hold emails only.
        self.store
            .user_by_email(email)
            .await?
            .ok_or_else(|| Error::not_found("user", email))?;
        if team.contains_user(email) {
            return Err(Error::Conflict(format!(
                "User \"{email}\" is already a member of the team \"{team_name}\"."
            )));
        }
        team.users.push(email.to_string());
        self.store.update_team(&team).await?;
        Ok(team)
    }

    /// Remove a user from a team. A team emptied by the removal is deleted.
    pub async fn remove_team_member(&self, team_name: &str, email: &str) -> Result<()> {
        let mut team = self
            .store
            .team_by_name(team_name)
            .await?
            .ok_or_else(|| Error::not_found("team", team_name))?;
        let before = team.users.len();
        team.users.retain(|u| u != email);
        if team.users.len() == before {
            return Err(Error::not_found("user", email));
        }
        if team.users.is_empty() {
            self.store.delete_team(team_name).await?;
            info!(team = %team_name, "Deleted team on last member removal");
        } else {
            self.store.update_team(&team).await?;
        }
        Ok(())
    }

    /// Register a public key on the user.
    pub async fn add_key(&self, user: &User, key: &str) -> Result<()> {
        let mut stored = self
            .store
            .user_by_email(&user.email)
            .await?
            .ok_or_else(|| Error::not_found("user", &user.email))?;
        if stored.keys.iter().any(|k| k == key) {
            return Err(Error::Conflict("this key is already registered".into()));
        }
        stored.keys.push(key.to_string());
        self.store.update_user(&stored).await
    }

    /// Remove a public key from the user.
    pub async fn remove_key(&self, user: &User, key: &str) -> Result<()> {
        let mut stored = self
            .store
            .user_by_email(&user.email)
            .await?
            .ok_or_else(|| Error::not_found("user", &user.email))?;
        let before = stored.keys.len();
        stored.keys.retain(|k| k != key);
        if stored.keys.len() == before {
            return Err(Error::not_found("key", key));
        }
        self.store.update_user(&stored).await
    }
}
