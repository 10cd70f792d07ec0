use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// Phases in the Election lifecycle. Elections only ever move forwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElectionStatus {
    /// Created, waiting for the nomination period.
    Upcoming,
    /// Candidates may register and nominate themselves.
    Nomination,
    /// Nominations are closed, voting has not opened yet.
    PreVoting,
    /// Ballots may be cast.
    Voting,
    /// Finished. Results are public.
    Completed,
}

impl ElectionStatus {
    /// All phases, in lifecycle order.
    pub const ALL: [ElectionStatus; 5] = [
        Self::Upcoming,
        Self::Nomination,
        Self::PreVoting,
        Self::Voting,
        Self::Completed,
    ];

    /// The phase that must immediately precede this one, if any.
    pub const fn predecessor(self) -> Option<Self> {
        match self {
            Self::Upcoming => None,
            Self::Nomination => Some(Self::Upcoming),
            Self::PreVoting => Some(Self::Nomination),
            Self::Voting => Some(Self::PreVoting),
            Self::Completed => Some(Self::Voting),
        }
    }

    /// The phase that follows this one, if any.
    pub const fn successor(self) -> Option<Self> {
        match self {
            Self::Upcoming => Some(Self::Nomination),
            Self::Nomination => Some(Self::PreVoting),
            Self::PreVoting => Some(Self::Voting),
            Self::Voting => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Completed)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Upcoming => "Upcoming",
            Self::Nomination => "Nomination",
            Self::PreVoting => "PreVoting",
            Self::Voting => "Voting",
            Self::Completed => "Completed",
        }
    }
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successor_and_predecessor_agree() {
        for status in ElectionStatus::ALL {
            if let Some(next) = status.successor() {
                assert_eq!(next.predecessor(), Some(status));
            }
        }
        assert_eq!(ElectionStatus::Upcoming.predecessor(), None);
        assert_eq!(ElectionStatus::Completed.successor(), None);
    }

    #[test]
    fn lifecycle_is_a_single_chain() {
        let mut status = ElectionStatus::Upcoming;
        let mut visited = vec![status];
        while let Some(next) = status.successor() {
            visited.push(next);
            status = next;
        }
        assert_eq!(visited, ElectionStatus::ALL.to_vec());
        assert!(!ElectionStatus::Completed.is_active());
        assert!(ElectionStatus::Voting.is_active());
    }
}
