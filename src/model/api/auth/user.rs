use crate::model::common::role::Role;

/// A kind of user of our application, having defined rights.
pub trait User {
    /// The role an account must hold to act as this user type.
    const ROLE: Role;
}

/// Marker for administrator-only routes.
pub struct Admin;

/// Marker for voter-only routes.
pub struct Voter;

/// Marker for candidate-only routes.
pub struct Candidate;

/// Marker for tokens issued at login, before a route decides which role it needs.
pub struct AnyUser;

impl User for Admin {
    const ROLE: Role = Role::Admin;
}

impl User for Voter {
    const ROLE: Role = Role::Voter;
}

impl User for Candidate {
    const ROLE: Role = Role::Candidate;
}
