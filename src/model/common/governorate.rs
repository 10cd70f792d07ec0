use std::fmt::{Display, Formatter};

use mongodb::bson::Bson;
use rocket::form::{self, FromFormField, ValueField};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Administrative regions. Serialised by numeric ID.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Governorate {
    Cairo = 1,
    Alexandria = 2,
    PortSaid = 3,
    Suez = 4,
    Damietta = 5,
    Dakahlia = 6,
    Sharqia = 7,
    Qalyubia = 8,
    KafrElSheikh = 9,
    Gharbia = 10,
    Monufia = 11,
    Beheira = 12,
    Ismailia = 13,
    Giza = 14,
    BeniSuef = 15,
    Faiyum = 16,
    Minya = 17,
    Asyut = 18,
    Sohag = 19,
    Qena = 20,
    Aswan = 21,
    Luxor = 22,
    RedSea = 23,
    NewValley = 24,
    Matrouh = 25,
    NorthSinai = 26,
    SouthSinai = 27,
}

impl Governorate {
    pub const ALL: [Governorate; 27] = [
        Self::Cairo,
        Self::Alexandria,
        Self::PortSaid,
        Self::Suez,
        Self::Damietta,
        Self::Dakahlia,
        Self::Sharqia,
        Self::Qalyubia,
        Self::KafrElSheikh,
        Self::Gharbia,
        Self::Monufia,
        Self::Beheira,
        Self::Ismailia,
        Self::Giza,
        Self::BeniSuef,
        Self::Faiyum,
        Self::Minya,
        Self::Asyut,
        Self::Sohag,
        Self::Qena,
        Self::Aswan,
        Self::Luxor,
        Self::RedSea,
        Self::NewValley,
        Self::Matrouh,
        Self::NorthSinai,
        Self::SouthSinai,
    ];

    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cairo => "Cairo",
            Self::Alexandria => "Alexandria",
            Self::PortSaid => "Port Said",
            Self::Suez => "Suez",
            Self::Damietta => "Damietta",
            Self::Dakahlia => "Dakahlia",
            Self::Sharqia => "Sharqia",
            Self::Qalyubia => "Qalyubia",
            Self::KafrElSheikh => "Kafr El Sheikh",
            Self::Gharbia => "Gharbia",
            Self::Monufia => "Monufia",
            Self::Beheira => "Beheira",
            Self::Ismailia => "Ismailia",
            Self::Giza => "Giza",
            Self::BeniSuef => "Beni Suef",
            Self::Faiyum => "Faiyum",
            Self::Minya => "Minya",
            Self::Asyut => "Asyut",
            Self::Sohag => "Sohag",
            Self::Qena => "Qena",
            Self::Aswan => "Aswan",
            Self::Luxor => "Luxor",
            Self::RedSea => "Red Sea",
            Self::NewValley => "New Valley",
            Self::Matrouh => "Matrouh",
            Self::NorthSinai => "North Sinai",
            Self::SouthSinai => "South Sinai",
        }
    }
}

impl Display for Governorate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<u8> for Governorate {
    type Error = u8;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|governorate| governorate.id() == id)
            .ok_or(id)
    }
}

impl From<Governorate> for Bson {
    fn from(governorate: Governorate) -> Self {
        Bson::Int32(governorate.id().into())
    }
}

/// Query parameters name a governorate by its numeric ID.
#[rocket::async_trait]
impl<'r> FromFormField<'r> for Governorate {
    fn from_value(field: ValueField<'r>) -> form::Result<'r, Self> {
        field
            .value
            .parse::<u8>()
            .ok()
            .and_then(|id| Self::try_from(id).ok())
            .ok_or_else(|| form::Error::validation("unknown governorate").into())
    }
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json;

    use super::*;

    #[test]
    fn serialises_as_numeric_id() {
        assert_eq!(serde_json::to_string(&Governorate::Giza).unwrap(), "14");
        let parsed: Governorate = serde_json::from_str("22").unwrap();
        assert_eq!(parsed, Governorate::Luxor);
        assert!(serde_json::from_str::<Governorate>("28").is_err());
    }

    #[test]
    fn display_uses_static_name() {
        assert_eq!(Governorate::KafrElSheikh.to_string(), "Kafr El Sheikh");
        assert_eq!(Governorate::Cairo.id(), 1);
        assert_eq!(Governorate::try_from(27), Ok(Governorate::SouthSinai));
        assert_eq!(Governorate::try_from(0), Err(0));
    }
}
