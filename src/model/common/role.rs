use std::fmt::{Display, Formatter};

use mongodb::bson::Bson;
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Privilege levels of Voting Service accounts.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Role {
    Voter = 0,
    Candidate = 1,
    Admin = 2,
}

impl Display for Role {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Candidate => "candidate",
                Self::Admin => "admin",
            }
        )
    }
}

impl From<Role> for Bson {
    fn from(role: Role) -> Self {
        Bson::Int32(role as i32)
    }
}
