use std::ops::{Deref, DerefMut};

use argon2::Config as Argon2Config;
use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::{
        citizen::Gender,
        governorate::Governorate,
        role::Role,
    },
    mongodb::Id,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Authentication material, kept apart from the domain profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub password_hash: String,
}

impl Credentials {
    /// Hash a new password. Enforces the minimum length.
    pub fn from_password(password: &str) -> Result<Self> {
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(Error::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let password_hash =
            argon2::hash_encoded(password.as_bytes(), &salt, &Argon2Config::default())?;
        Ok(Self { password_hash })
    }

    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> Result<bool> {
        Ok(argon2::verify_encoded(&self.password_hash, password.as_ref())?)
    }
}

/// Registry-derived facts about a voter or candidate, snapshotted at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitizenProfile {
    /// Keyed hash of the national ID; the raw ID is never stored here.
    pub national_id_hmac: String,
    pub full_name: String,
    pub governorate: Governorate,
    pub birth_date: NaiveDate,
    pub gender: Gender,
}

/// Core account data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCore {
    pub username: String,
    pub role: Role,
    /// Absent for administrators.
    pub citizen: Option<CitizenProfile>,
    pub credentials: Credentials,
}

impl AccountCore {
    pub fn admin(username: String, credentials: Credentials) -> Self {
        Self {
            username,
            role: Role::Admin,
            citizen: None,
            credentials,
        }
    }

    pub fn citizen(
        username: String,
        role: Role,
        citizen: CitizenProfile,
        credentials: Credentials,
    ) -> Self {
        Self {
            username,
            role,
            citizen: Some(citizen),
            credentials,
        }
    }
}

/// A Voting Service account with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub account: AccountCore,
}

impl Account {
    pub fn new(account: AccountCore) -> Self {
        Self {
            id: Id::new(),
            account,
        }
    }

    /// The citizen profile, which every voter and candidate has.
    pub fn citizen_profile(&self) -> Result<&CitizenProfile> {
        self.citizen.as_ref().ok_or_else(|| {
            Error::Forbidden(format!("Account {} has no citizen profile", self.username))
        })
    }
}

impl Deref for Account {
    type Target = AccountCore;

    fn deref(&self) -> &Self::Target {
        &self.account
    }
}

impl DerefMut for Account {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.account
    }
}
