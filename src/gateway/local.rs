#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::model::{
    api::registry::{MarkRegisteredRequest, VerificationSummary, VerifyRequest},
    common::citizen::{NationalId, Token},
    db::registry::RecordKind,
};
use crate::service::registry;
use crate::store::RegistryDb;

use super::RegistryGateway;
#[cfg(test)]
use super::UNREACHABLE;

/// A gateway that runs the Registry logic in-process against a Registry store.
/// Used for single-process deployments and as the test double.
pub struct LocalGateway {
    db: RegistryDb,
    #[cfg(test)]
    offline: AtomicBool,
}

impl LocalGateway {
    pub fn new(db: RegistryDb) -> Self {
        Self {
            db,
            #[cfg(test)]
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate the Registry becoming unreachable, or coming back.
    #[cfg(test)]
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn reachable(&self) -> Result<()> {
        #[cfg(test)]
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Failure(UNREACHABLE.to_string()));
        }
        Ok(())
    }
}

/// The Registry's storage failures are opaque to its callers.
fn as_remote(err: Error) -> Error {
    Error::of_kind(err.kind(), err.detail())
}

#[rocket::async_trait]
impl RegistryGateway for LocalGateway {
    async fn verify(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        token: &Token,
    ) -> Result<VerificationSummary> {
        self.reachable()?;
        let request = VerifyRequest {
            national_id: national_id.clone(),
            token: token.clone(),
        };
        registry::verify(&self.db, kind, &request)
            .await
            .map_err(as_remote)
    }

    async fn mark_registered(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        token: &Token,
        username: &str,
    ) -> Result<()> {
        self.reachable()?;
        let request = MarkRegisteredRequest {
            national_id: national_id.clone(),
            token: token.clone(),
            username: username.to_string(),
        };
        registry::mark_registered(&self.db, kind, &request)
            .await
            .map_err(as_remote)
    }

    async fn mark_voted(&self, national_id: &NationalId, token: &Token) -> Result<()> {
        self.reachable()?;
        let request = VerifyRequest {
            national_id: national_id.clone(),
            token: token.clone(),
        };
        registry::mark_voted(&self.db, &request)
            .await
            .map_err(as_remote)
    }

    async fn reset_all_voted(&self) -> Result<u64> {
        self.reachable()?;
        Ok(registry::reset_all_voted(&self.db)
            .await
            .map_err(as_remote)?
            .reset)
    }
}
