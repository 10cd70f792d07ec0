use rocket::Route;

use crate::error::{Error, Result};
use crate::model::{api::AuthToken, db::account::Account};
use crate::store::VotingDb;

pub mod admin;
pub mod auth;
pub mod public;
pub mod registry;
pub mod voting;

/// Routes served by the Voting Service.
pub fn voting_routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(auth::routes());
    routes.extend(public::routes());
    routes.extend(voting::routes());
    routes
}

/// Routes served by the Registry Service.
pub fn registry_routes() -> Vec<Route> {
    registry::routes()
}

/// Load the account behind an authenticated request.
async fn account_for<U>(db: &VotingDb, token: &AuthToken<U>) -> Result<Account> {
    db.account_by_id(token.id)
        .await?
        .ok_or_else(|| Error::Unauthorized("Account no longer exists".to_string()))
}

/// Shared setup for route tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::model::{
        api::{
            account::{CandidateRegistrationRequest, LoginRequest, VoterRegistrationRequest},
            registry::{IssuedToken, NewRecordRequest},
        },
        common::{citizen::NationalId, governorate::Governorate},
        db::registry::RecordKind,
    };
    use crate::service;
    use crate::store::RegistryDb;

    pub const PASSWORD: &str = "citizen-password";

    /// A Registry record for the `n`th citizen of a test.
    pub async fn seed(
        registry: &RegistryDb,
        kind: RecordKind,
        n: u32,
        governorate: Governorate,
    ) -> IssuedToken {
        let request = NewRecordRequest {
            national_id: NationalId::numbered(n),
            full_name: format!("Citizen {n}"),
            governorate,
            ..NewRecordRequest::example()
        };
        service::registry::create_record(registry, kind, request)
            .await
            .unwrap()
    }

    pub async fn login(client: &Client, username: &str, password: &str) {
        let response = client
            .post(uri!(crate::api::auth::login))
            .header(ContentType::JSON)
            .body(
                json!(LoginRequest {
                    username: username.to_string(),
                    password: password.to_string(),
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    pub async fn login_admin(client: &Client) {
        let admin = LoginRequest::example_admin();
        login(client, &admin.username, &admin.password).await;
    }

    /// Register a voter over HTTP and leave the client logged in as them.
    pub async fn voter(client: &Client, registry: &RegistryDb, n: u32) -> IssuedToken {
        let issued = seed(registry, RecordKind::Voter, n, Governorate::Giza).await;
        let username = format!("voter{n}");
        let response = client
            .post(uri!(crate::api::auth::register_voter))
            .header(ContentType::JSON)
            .body(
                json!(VoterRegistrationRequest {
                    national_id: issued.national_id.clone(),
                    voting_token: issued.token.clone(),
                    username: username.clone(),
                    password: PASSWORD.to_string(),
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        login(client, &username, PASSWORD).await;
        issued
    }

    /// Register a candidate over HTTP and leave the client logged in as them.
    pub async fn candidate(
        client: &Client,
        registry: &RegistryDb,
        n: u32,
        governorate: Governorate,
    ) -> IssuedToken {
        let issued = seed(registry, RecordKind::Candidate, n, governorate).await;
        let username = format!("candidate{n}");
        let response = client
            .post(uri!(crate::api::auth::register_candidate))
            .header(ContentType::JSON)
            .body(
                json!(CandidateRegistrationRequest {
                    national_id: issued.national_id.clone(),
                    nomination_token: issued.token.clone(),
                    username: username.clone(),
                    password: PASSWORD.to_string(),
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        login(client, &username, PASSWORD).await;
        issued
    }
}
