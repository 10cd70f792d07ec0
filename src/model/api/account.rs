use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::{
        citizen::{NationalId, Token},
        role::Role,
    },
    db::account::Account,
};

/// Raw login credentials. The password is never stored.
#[derive(Clone, Deserialize, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// A voter claiming their Registry record and creating a local account.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterRegistrationRequest {
    pub national_id: NationalId,
    pub voting_token: Token,
    pub username: String,
    pub password: String,
}

/// A candidate claiming their Registry record and creating a local account.
#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRegistrationRequest {
    pub national_id: NationalId,
    pub nomination_token: Token,
    pub username: String,
    pub password: String,
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDescription {
    pub id: ApiId,
    pub username: String,
    pub role: Role,
}

impl From<&Account> for AccountDescription {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.into(),
            username: account.username.clone(),
            role: account.role,
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl LoginRequest {
        pub fn example_admin() -> Self {
            Self {
                username: "coordinator".into(),
                password: "coordinator-pass".into(),
            }
        }
    }
}
