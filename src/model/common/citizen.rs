use std::fmt::{Debug, Display, Formatter};

use chrono::{Datelike, NaiveDate};
use data_encoding::{BASE32_NOPAD, HEXLOWER};
use hmac::{Hmac, Mac};
use mongodb::bson::Bson;
use rand::{CryptoRng, RngCore};
use rocket::request::FromParam;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

pub type HmacSha256 = Hmac<Sha256>;

/// Length of a well-formed national ID.
pub const NATIONAL_ID_LENGTH: usize = 14;

/// Number of random bytes in a freshly issued token.
const TOKEN_BYTES: usize = 20;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

/// A person's registry-issued identity. Always `NATIONAL_ID_LENGTH` ASCII digits.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NationalId(String);

impl NationalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex-encoded keyed hash of this ID, so that the Voting Service never stores
    /// the raw value.
    pub fn to_hmac(&self, secret: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
        mac.update(self.0.as_bytes());
        HEXLOWER.encode(&mac.finalize().into_bytes())
    }
}

impl TryFrom<String> for NationalId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() == NATIONAL_ID_LENGTH && value.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(value))
        } else {
            Err(format!(
                "national ID must be exactly {NATIONAL_ID_LENGTH} digits"
            ))
        }
    }
}

impl<'a> FromParam<'a> for NationalId {
    type Error = String;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        Self::try_from(param.to_string())
    }
}

impl From<NationalId> for String {
    fn from(id: NationalId) -> Self {
        id.0
    }
}

impl From<&NationalId> for Bson {
    fn from(id: &NationalId) -> Self {
        Bson::String(id.0.clone())
    }
}

impl Display for NationalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Only the last four digits ever reach the logs.
impl Debug for NationalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let tail = &self.0[self.0.len().saturating_sub(4)..];
        write!(f, "NationalId(****{tail})")
    }
}

/// Compare a presented secret with the expected one in time independent of where
/// they first differ. Both sides go through an HMAC keyed with the expected value.
pub fn secrets_match(expected: &[u8], presented: &[u8]) -> bool {
    let Ok(mut reference) = HmacSha256::new_from_slice(expected) else {
        return false;
    };
    reference.update(expected);
    let reference = reference.finalize().into_bytes();

    let Ok(mut candidate) = HmacSha256::new_from_slice(expected) else {
        return false;
    };
    candidate.update(presented);
    candidate.verify_slice(&reference).is_ok()
}

/// A rotatable voting or nomination credential issued by the Registry.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Token(String);

impl Token {
    /// Issue a fresh random token.
    pub fn generate(mut rng: impl RngCore + CryptoRng) -> Self {
        let mut bytes = [0_u8; TOKEN_BYTES];
        rng.fill_bytes(&mut bytes);
        Self(BASE32_NOPAD.encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time equality, for checking a presented token against a stored one.
    pub fn matches(&self, presented: &Token) -> bool {
        secrets_match(self.0.as_bytes(), presented.0.as_bytes())
    }
}

impl TryFrom<String> for Token {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            Err("token must not be empty")
        } else {
            Ok(Self(value))
        }
    }
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl From<&Token> for Bson {
    fn from(token: &Token) -> Self {
        Bson::String(token.0.clone())
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Token(<redacted>)")
    }
}

/// Whole years between `birth_date` and `today`.
pub fn age_on(birth_date: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - birth_date.year();
    if (today.month(), today.day()) < (birth_date.month(), birth_date.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}


#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json;

    use super::*;

    #[test]
    fn national_id_requires_fourteen_digits() {
        assert!(NationalId::try_from("29001011234567".to_string()).is_ok());
        assert!(NationalId::try_from("2900101123456".to_string()).is_err());
        assert!(NationalId::try_from("2900101123456X".to_string()).is_err());
        assert!(serde_json::from_str::<NationalId>("\"\"").is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        assert_eq!(
            format!("{:?}", NationalId::example()),
            "NationalId(****4567)"
        );
        assert_eq!(format!("{:?}", Token::example()), "Token(<redacted>)");
    }

    #[test]
    fn generated_tokens_differ() {
        let mut rng = rand::thread_rng();
        let first = Token::generate(&mut rng);
        let second = Token::generate(&mut rng);
        assert_ne!(first, second);
        assert_eq!(first.as_str().len(), 32);
    }

    #[test]
    fn tokens_match_only_themselves() {
        let token = Token::example();
        assert!(token.matches(&token.clone()));
        assert!(!token.matches(&Token::try_from("WRONG".to_string()).unwrap()));
        let mut longer = token.as_str().to_string();
        longer.push('A');
        assert!(!token.matches(&Token::try_from(longer).unwrap()));
    }

    #[test]
    fn hmac_depends_on_secret() {
        let id = NationalId::example();
        assert_eq!(id.to_hmac(b"secret"), id.to_hmac(b"secret"));
        assert_ne!(id.to_hmac(b"secret"), id.to_hmac(b"other"));
    }

    #[test]
    fn age_counts_completed_years() {
        let birth = NaiveDate::from_ymd_opt(1990, 6, 15).unwrap();
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(2026, 6, 14).unwrap()), 35);
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()), 36);
        assert_eq!(age_on(birth, NaiveDate::from_ymd_opt(1980, 1, 1).unwrap()), 0);
    }
}
