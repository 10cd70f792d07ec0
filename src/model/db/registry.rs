use chrono::NaiveDate;
use rocket::request::FromParam;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::{
        citizen::{Gender, NationalId, Token},
        governorate::Governorate,
    },
    mongodb::Id,
};

/// Which kind of Registry record: people who may vote, or people who may stand.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Voter,
    Candidate,
}

impl RecordKind {
    pub const fn noun(self) -> &'static str {
        match self {
            Self::Voter => "Voter",
            Self::Candidate => "Candidate",
        }
    }
}

/// Record kinds appear in paths as `voters` or `candidates`.
impl<'a> FromParam<'a> for RecordKind {
    type Error = &'a str;

    fn from_param(param: &'a str) -> std::result::Result<Self, Self::Error> {
        match param {
            "voters" => Ok(Self::Voter),
            "candidates" => Ok(Self::Candidate),
            other => Err(other),
        }
    }
}

/// A Registry-owned voter or candidate record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    #[serde(rename = "_id")]
    pub id: Id,
    /// Stable identity anchor, unique per collection.
    pub national_id: NationalId,
    pub full_name: String,
    pub governorate: Governorate,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    /// The voting or nomination token, depending on the record kind.
    pub token: Token,
    /// False once the token has been revoked.
    pub valid_token: bool,
    pub eligible: bool,
    /// Set once per credential lifetime; registration is system-wide.
    pub is_registered: bool,
    /// Scoped to the current election cycle; cleared by an explicit reset.
    pub voted: bool,
    pub registered_username: Option<String>,
}

impl RegistryRecord {
    /// Create an unregistered record holding the given token.
    pub fn new(
        national_id: NationalId,
        full_name: String,
        governorate: Governorate,
        birth_date: NaiveDate,
        gender: Gender,
        eligible: bool,
        token: Token,
    ) -> Self {
        Self {
            id: Id::new(),
            national_id,
            full_name,
            governorate,
            birth_date,
            gender,
            token,
            valid_token: true,
            eligible,
            is_registered: false,
            voted: false,
            registered_username: None,
        }
    }

    /// The eligibility re-check performed on every cross-service call:
    /// the token must match, must still be valid, and the person must be eligible.
    /// Existence is checked by the caller when loading the record.
    pub fn check_eligibility(&self, token: &Token) -> Result<()> {
        if !self.token.matches(token) {
            return Err(Error::Unauthorized("InvalidToken".to_string()));
        }
        if !self.valid_token {
            return Err(Error::Unauthorized("TokenRevoked".to_string()));
        }
        if !self.eligible {
            return Err(Error::Unauthorized("NotEligible".to_string()));
        }
        Ok(())
    }

    /// Preconditions for flipping `is_registered`.
    pub fn check_can_register(&self, token: &Token) -> Result<()> {
        self.check_eligibility(token)?;
        if self.is_registered {
            return Err(Error::Conflict("AlreadyRegistered".to_string()));
        }
        Ok(())
    }

    /// Preconditions for flipping `voted`.
    pub fn check_can_vote(&self, token: &Token) -> Result<()> {
        self.check_eligibility(token)?;
        if !self.is_registered {
            return Err(Error::Conflict("NotRegistered".to_string()));
        }
        if self.voted {
            return Err(Error::Conflict("AlreadyVoted".to_string()));
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    use super::*;

    #[test]
    fn eligibility_requires_matching_valid_token() {
        let record = RegistryRecord::example();
        assert!(record.check_eligibility(&Token::example()).is_ok());

        let wrong = Token::try_from("WRONG".to_string()).unwrap();
        assert_eq!(
            record.check_eligibility(&wrong).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );

        let mut revoked = RegistryRecord::example();
        revoked.valid_token = false;
        assert_eq!(
            revoked.check_eligibility(&Token::example()).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn ineligible_is_unauthorized_even_with_valid_token() {
        let mut record = RegistryRecord::example();
        record.eligible = false;
        assert_eq!(
            record.check_eligibility(&Token::example()).unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
    }

    #[test]
    fn vote_requires_registration_first() {
        let mut record = RegistryRecord::example();
        assert_eq!(
            record.check_can_vote(&Token::example()).unwrap_err().kind(),
            ErrorKind::Conflict
        );
        record.is_registered = true;
        assert!(record.check_can_vote(&Token::example()).is_ok());
        assert_eq!(
            record.check_can_register(&Token::example()).unwrap_err().kind(),
            ErrorKind::Conflict
        );
        record.voted = true;
        assert_eq!(
            record.check_can_vote(&Token::example()).unwrap_err().detail(),
            "AlreadyVoted"
        );
    }
}
