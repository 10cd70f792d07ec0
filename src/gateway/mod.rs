//! The Voting Service's view of the Registry.
//!
//! Callers only ever see typed [`crate::error::Error`]s; network, parse and
//! status-code failures are all translated inside the gateway.

use std::ops::Deref;
use std::sync::Arc;

use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
    State,
};

use crate::error::Result;
use crate::model::{
    api::registry::VerificationSummary,
    common::citizen::{NationalId, Token},
    db::registry::RecordKind,
};

mod http;
mod local;

pub use http::HttpGateway;
pub use local::LocalGateway;

/// Header carrying the shared secret on every cross-service call.
pub const REGISTRY_KEY_HEADER: &str = "X-Registry-Key";

/// Detail of the failure reported when the Registry cannot be reached.
pub const UNREACHABLE: &str = "Registry.Unreachable";
/// Detail of the failure reported for a successful response with no body.
pub const NULL_RESPONSE: &str = "Registry.NullResponse";
/// Detail of the failure reported for a successful response that cannot be parsed.
pub const BAD_DATA: &str = "Registry.BadData";

#[rocket::async_trait]
pub trait RegistryGateway: Send + Sync {
    /// Read-only eligibility check. The Registry re-checks everything on each call.
    async fn verify(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        token: &Token,
    ) -> Result<VerificationSummary>;

    /// Flip `is_registered`. A second identical call yields `Conflict`.
    async fn mark_registered(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        token: &Token,
        username: &str,
    ) -> Result<()>;

    /// Flip `voted`. A second identical call yields `Conflict("AlreadyVoted")`.
    async fn mark_voted(&self, national_id: &NationalId, token: &Token) -> Result<()>;

    /// Clear `voted` on every voter record, returning how many were cleared.
    async fn reset_all_voted(&self) -> Result<u64>;

    async fn verify_voter(
        &self,
        national_id: &NationalId,
        token: &Token,
    ) -> Result<VerificationSummary> {
        self.verify(RecordKind::Voter, national_id, token).await
    }

    async fn verify_candidate(
        &self,
        national_id: &NationalId,
        token: &Token,
    ) -> Result<VerificationSummary> {
        self.verify(RecordKind::Candidate, national_id, token).await
    }
}

/// Handle on the configured gateway, kept in managed state.
#[derive(Clone)]
pub struct Gateway(Arc<dyn RegistryGateway>);

impl Gateway {
    pub fn new(gateway: impl RegistryGateway + 'static) -> Self {
        Self(Arc::new(gateway))
    }

    /// Wrap a gateway that is also held elsewhere.
    pub fn from_arc(gateway: Arc<dyn RegistryGateway>) -> Self {
        Self(gateway)
    }
}

impl Deref for Gateway {
    type Target = dyn RegistryGateway;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Gateway {
    type Error = ();

    /// Fails iff no gateway is managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.guard::<&State<Gateway>>().await {
            request::Outcome::Success(gateway) => {
                request::Outcome::Success(gateway.inner().clone())
            }
            _ => request::Outcome::Error((Status::InternalServerError, ())),
        }
    }
}
