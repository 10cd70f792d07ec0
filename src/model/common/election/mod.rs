mod state;

pub use state::ElectionStatus;

/// Every ballot selects exactly this many distinct candidates.
pub const CHOICES_PER_BALLOT: usize = 5;
