//! Voter and candidate sign-up against the Registry, login, and the bootstrap admin.

use log::{error, info, warn};

use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::model::{
    api::account::{CandidateRegistrationRequest, LoginRequest, VoterRegistrationRequest},
    common::{
        audit::ActionType,
        citizen::{NationalId, Token},
        role::Role,
    },
    db::{
        account::{Account, AccountCore, CitizenProfile, Credentials},
        logs::SystemAuditLog,
        registry::RecordKind,
    },
};
use crate::store::VotingDb;

use super::record_audit;

pub async fn register_voter(
    db: &VotingDb,
    gateway: &Gateway,
    hmac_secret: &[u8],
    request: VoterRegistrationRequest,
) -> Result<Account> {
    let claim = Claim {
        kind: RecordKind::Voter,
        national_id: request.national_id,
        token: request.voting_token,
        username: request.username,
        password: request.password,
    };
    register(db, gateway, hmac_secret, claim).await
}

pub async fn register_candidate(
    db: &VotingDb,
    gateway: &Gateway,
    hmac_secret: &[u8],
    request: CandidateRegistrationRequest,
) -> Result<Account> {
    let claim = Claim {
        kind: RecordKind::Candidate,
        national_id: request.national_id,
        token: request.nomination_token,
        username: request.username,
        password: request.password,
    };
    register(db, gateway, hmac_secret, claim).await
}

/// A person claiming their Registry record.
struct Claim {
    kind: RecordKind,
    national_id: NationalId,
    token: Token,
    username: String,
    password: String,
}

impl Claim {
    fn role(&self) -> Role {
        match self.kind {
            RecordKind::Voter => Role::Voter,
            RecordKind::Candidate => Role::Candidate,
        }
    }

    fn action(&self) -> ActionType {
        match self.kind {
            RecordKind::Voter => ActionType::VoterRegistered,
            RecordKind::Candidate => ActionType::CandidateRegistered,
        }
    }
}

/// Verify the claim, flip `is_registered` at the Registry, then create the local
/// account.
///
/// If an earlier attempt flipped the Registry flag but never created the account,
/// the Registry reports the person as registered while no local account exists for
/// them; the claim then resumes at account creation.
async fn register(
    db: &VotingDb,
    gateway: &Gateway,
    hmac_secret: &[u8],
    claim: Claim,
) -> Result<Account> {
    let username = claim.username.trim().to_string();
    if username.is_empty() {
        return Err(Error::Validation("Username must not be empty".to_string()));
    }
    let credentials = Credentials::from_password(&claim.password)?;

    let summary = gateway
        .verify(claim.kind, &claim.national_id, &claim.token)
        .await?;
    if !summary.eligible {
        return Err(Error::Unauthorized("NotEligible".to_string()));
    }
    if db.account_by_username(&username).await?.is_some() {
        return Err(Error::Conflict(format!("Username {username} is already taken")));
    }

    let role = claim.role();
    let national_id_hmac = claim.national_id.to_hmac(hmac_secret);
    if summary.is_registered {
        if db.citizen_account(role, &national_id_hmac).await?.is_some() {
            return Err(Error::Conflict("AlreadyRegistered".to_string()));
        }
        warn!(
            "{} {} is registered at the Registry without a local account; resuming",
            claim.kind.noun(),
            national_id_hmac
        );
    } else {
        gateway
            .mark_registered(claim.kind, &claim.national_id, &claim.token, &username)
            .await?;
    }

    let citizen = CitizenProfile {
        national_id_hmac: national_id_hmac.clone(),
        full_name: summary.full_name,
        governorate: summary.governorate,
        birth_date: summary.birth_date,
        gender: summary.gender,
    };
    let account = Account::new(AccountCore::citizen(username, role, citizen, credentials));
    if let Err(err) = db.insert_account(account.clone()).await {
        error!(
            "{} {} was registered at the Registry but the account was not created: {err}",
            claim.kind.noun(),
            national_id_hmac
        );
        return Err(err);
    }
    info!("Created {} account {}", role, account.username);

    record_audit(
        db,
        SystemAuditLog::new(account.id, account.username.clone(), claim.action())
            .details(format!("Registered in {}", account.citizen_profile()?.governorate)),
    )
    .await;
    Ok(account)
}

/// Check a username and password. Both failure cases look the same to the caller.
pub async fn login(db: &VotingDb, request: &LoginRequest) -> Result<Account> {
    let invalid = || Error::Unauthorized("Invalid username or password".to_string());
    let account = db
        .account_by_username(&request.username)
        .await?
        .ok_or_else(invalid)?;
    if !account.credentials.verify_password(&request.password)? {
        return Err(invalid());
    }
    Ok(account)
}

/// Create the configured administrator if there is no administrator yet.
pub async fn ensure_default_admin(db: &VotingDb, username: &str, password: &str) -> Result<()> {
    if db.admin_exists().await? {
        return Ok(());
    }
    let credentials = Credentials::from_password(password)?;
    db.insert_account(Account::new(AccountCore::admin(
        username.to_string(),
        credentials,
    )))
    .await?;
    info!("Created default admin {username}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::LocalGateway;
    use crate::model::{
        api::logs::AuditLogFilter,
        common::governorate::Governorate,
        db::registry::RegistryRecord,
    };
    use crate::store::{
        memory::{MemoryRegistryStore, MemoryVotingStore},
        RegistryDb,
    };

    const SECRET: &[u8] = b"hmac-secret";

    async fn setup(kind: RecordKind, record: &RegistryRecord) -> (VotingDb, RegistryDb, Gateway) {
        let registry = RegistryDb::new(MemoryRegistryStore::new());
        registry.insert_record(kind, record.clone()).await.unwrap();
        let gateway = Gateway::new(LocalGateway::new(registry.clone()));
        (VotingDb::new(MemoryVotingStore::new()), registry, gateway)
    }

    fn voter_request(record: &RegistryRecord, username: &str) -> VoterRegistrationRequest {
        VoterRegistrationRequest {
            national_id: record.national_id.clone(),
            voting_token: record.token.clone(),
            username: username.to_string(),
            password: "voter-password".to_string(),
        }
    }

    #[rocket::async_test]
    async fn voter_registration_flips_registry_and_creates_account() {
        let record = RegistryRecord::example();
        let (db, registry, gateway) = setup(RecordKind::Voter, &record).await;

        let account = register_voter(&db, &gateway, SECRET, voter_request(&record, "alice"))
            .await
            .unwrap();
        assert_eq!(account.role, Role::Voter);
        let citizen = account.citizen_profile().unwrap();
        assert_eq!(citizen.governorate, Governorate::Giza);
        assert_eq!(citizen.national_id_hmac, record.national_id.to_hmac(SECRET));

        let stored = registry
            .record(RecordKind::Voter, &record.national_id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_registered);
        assert_eq!(stored.registered_username.as_deref(), Some("alice"));

        let filter = AuditLogFilter {
            action: Some(ActionType::VoterRegistered),
            ..Default::default()
        };
        let (_, total) = db.audit_logs_page(&filter, 0, 10).await.unwrap();
        assert_eq!(total, 1);

        let err = register_voter(&db, &gateway, SECRET, voter_request(&record, "alice2"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.detail(), "AlreadyRegistered");
    }

    #[rocket::async_test]
    async fn taken_username_is_refused_before_registry_write() {
        let record = RegistryRecord::example();
        let (db, registry, gateway) = setup(RecordKind::Voter, &record).await;
        ensure_default_admin(&db, "alice", "admin-password").await.unwrap();

        let err = register_voter(&db, &gateway, SECRET, voter_request(&record, "alice"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let stored = registry
            .record(RecordKind::Voter, &record.national_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.is_registered);
    }

    #[rocket::async_test]
    async fn wrong_token_and_short_password_are_rejected() {
        let record = RegistryRecord::example();
        let (db, _, gateway) = setup(RecordKind::Voter, &record).await;

        let mut request = voter_request(&record, "alice");
        request.password = "short".to_string();
        let err = register_voter(&db, &gateway, SECRET, request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut request = voter_request(&record, "alice");
        request.voting_token = Token::try_from("WRONG".to_string()).unwrap();
        let err = register_voter(&db, &gateway, SECRET, request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[rocket::async_test]
    async fn interrupted_registration_resumes() {
        let record = RegistryRecord::example();
        let (db, registry, gateway) = setup(RecordKind::Candidate, &record).await;
        // The Registry flip happened but the account was never created.
        registry
            .try_mark_registered(RecordKind::Candidate, &record.national_id, &record.token, "bob")
            .await
            .unwrap();

        let request = CandidateRegistrationRequest {
            national_id: record.national_id.clone(),
            nomination_token: record.token.clone(),
            username: "bob".to_string(),
            password: "candidate-password".to_string(),
        };
        let account = register_candidate(&db, &gateway, SECRET, request)
            .await
            .unwrap();
        assert_eq!(account.role, Role::Candidate);
    }

    #[rocket::async_test]
    async fn login_checks_password() {
        let db = VotingDb::new(MemoryVotingStore::new());
        let admin = LoginRequest::example_admin();
        ensure_default_admin(&db, &admin.username, &admin.password)
            .await
            .unwrap();
        // Idempotent.
        ensure_default_admin(&db, "someone-else", "another-password")
            .await
            .unwrap();

        let account = login(&db, &admin).await.unwrap();
        assert_eq!(account.role, Role::Admin);

        let wrong = LoginRequest {
            username: admin.username.clone(),
            password: "not-the-password".to_string(),
        };
        assert_eq!(
            login(&db, &wrong).await.unwrap_err().kind(),
            ErrorKind::Unauthorized
        );
        assert!(db
            .account_by_username("someone-else")
            .await
            .unwrap()
            .is_none());
    }
}
