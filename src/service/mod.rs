//! Business operations of both services, independent of HTTP.

use log::error;

use crate::model::db::logs::SystemAuditLog;
use crate::store::VotingDb;

pub mod casting;
pub mod lifecycle;
pub mod nomination;
pub mod registration;
pub mod registry;
pub mod results;

/// Append an audit entry after the audited change has already happened.
/// A failure here must not undo or mask the change, so it is only logged.
async fn record_audit(db: &VotingDb, log: SystemAuditLog) {
    let action = log.action;
    if let Err(err) = db.append_audit(log).await {
        error!("Failed to record {action} in the audit log: {err}");
    }
}
