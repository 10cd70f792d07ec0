//! The Registry side of the verification protocol.
//!
//! Every call re-derives eligibility from the stored record: the record must
//! exist, the token must match and still be valid, and the person must be
//! eligible. Flag flips are compare-and-set writes; when one does not apply, the
//! record is re-read to report why.

use log::{debug, info};

use crate::error::{Error, Result};
use crate::model::{
    api::registry::{
        IssuedToken, MarkRegisteredRequest, NewRecordRequest, ResetResult, VerificationSummary,
        VerifyRequest,
    },
    common::citizen::{NationalId, Token},
    db::registry::{RecordKind, RegistryRecord},
};
use crate::store::RegistryDb;

async fn load(db: &RegistryDb, kind: RecordKind, national_id: &NationalId) -> Result<RegistryRecord> {
    db.record(kind, national_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("{} record", kind.noun())))
}

/// Read-only eligibility check.
pub async fn verify(
    db: &RegistryDb,
    kind: RecordKind,
    request: &VerifyRequest,
) -> Result<VerificationSummary> {
    let record = load(db, kind, &request.national_id).await?;
    record.check_eligibility(&request.token)?;
    Ok(VerificationSummary::from(&record))
}

/// Flip `is_registered`. A repeated call with the same arguments is a `Conflict`.
pub async fn mark_registered(
    db: &RegistryDb,
    kind: RecordKind,
    request: &MarkRegisteredRequest,
) -> Result<()> {
    if request.username.trim().is_empty() {
        return Err(Error::Validation("Username must not be empty".to_string()));
    }

    let flipped = db
        .try_mark_registered(kind, &request.national_id, &request.token, &request.username)
        .await?;
    if flipped {
        info!("{} record registered", kind.noun());
        return Ok(());
    }

    let record = load(db, kind, &request.national_id).await?;
    record.check_can_register(&request.token)?;
    // The record allows registration now, so it changed under us.
    Err(Error::Conflict("ConcurrentUpdate".to_string()))
}

/// Flip `voted` on a voter record. A repeated call is a `Conflict("AlreadyVoted")`.
pub async fn mark_voted(db: &RegistryDb, request: &VerifyRequest) -> Result<()> {
    let flipped = db
        .try_mark_voted(&request.national_id, &request.token)
        .await?;
    if flipped {
        debug!("Voter record marked as voted");
        return Ok(());
    }

    let record = load(db, RecordKind::Voter, &request.national_id).await?;
    record.check_can_vote(&request.token)?;
    Err(Error::Conflict("ConcurrentUpdate".to_string()))
}

/// Clear `voted` on every voter, ready for the next election cycle.
pub async fn reset_all_voted(db: &RegistryDb) -> Result<ResetResult> {
    let reset = db.reset_all_voted().await?;
    info!("Cleared the voted flag on {reset} voter records");
    Ok(ResetResult { reset })
}

/// Create a record with a freshly issued token.
pub async fn create_record(
    db: &RegistryDb,
    kind: RecordKind,
    request: NewRecordRequest,
) -> Result<IssuedToken> {
    if request.full_name.trim().is_empty() {
        return Err(Error::Validation("Full name must not be empty".to_string()));
    }

    let token = Token::generate(rand::thread_rng());
    let record = RegistryRecord::new(
        request.national_id.clone(),
        request.full_name,
        request.governorate,
        request.birth_date,
        request.gender,
        request.eligible,
        token.clone(),
    );
    let record_id = record.id;
    db.insert_record(kind, record).await?;
    info!("Created {} record {record_id}", kind.noun());

    Ok(IssuedToken {
        national_id: request.national_id,
        token,
    })
}

/// Issue a new token. The old one stops matching immediately.
pub async fn rotate_token(
    db: &RegistryDb,
    kind: RecordKind,
    national_id: NationalId,
) -> Result<IssuedToken> {
    let token = Token::generate(rand::thread_rng());
    if !db.replace_token(kind, &national_id, &token).await? {
        return Err(Error::not_found(format!("{} record", kind.noun())));
    }
    info!("Rotated token of {} {:?}", kind.noun(), national_id);
    Ok(IssuedToken { national_id, token })
}

pub async fn revoke_token(db: &RegistryDb, kind: RecordKind, national_id: &NationalId) -> Result<()> {
    if !db.revoke_token(kind, national_id).await? {
        return Err(Error::not_found(format!("{} record", kind.noun())));
    }
    info!("Revoked token of {} {:?}", kind.noun(), national_id);
    Ok(())
}

pub async fn set_eligibility(
    db: &RegistryDb,
    kind: RecordKind,
    national_id: &NationalId,
    eligible: bool,
) -> Result<()> {
    if !db.set_eligibility(kind, national_id, eligible).await? {
        return Err(Error::not_found(format!("{} record", kind.noun())));
    }
    info!(
        "Set eligibility of {} {:?} to {eligible}",
        kind.noun(),
        national_id
    );
    Ok(())
}
