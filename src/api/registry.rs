//! The Registry Service's HTTP surface: cross-service calls under `/external` and
//! record management under `/internal`.

use log::warn;
use rocket::{
    http::Status,
    outcome::try_outcome,
    request::{FromRequest, Outcome},
    serde::json::Json,
    Request, Route, State,
};

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::gateway::REGISTRY_KEY_HEADER;
use crate::model::{
    api::registry::{
        EligibilityUpdate, IssuedToken, MarkRegisteredRequest, NewRecordRequest, ResetResult,
        VerificationSummary, VerifyRequest,
    },
    common::citizen::{secrets_match, NationalId},
    db::registry::RecordKind,
};
use crate::service::registry;
use crate::store::RegistryDb;

pub fn routes() -> Vec<Route> {
    routes![
        verify,
        mark_registered,
        mark_voted,
        reset_vote_status,
        create_record,
        rotate_token,
        revoke_token,
        set_eligibility,
    ]
}

async fn registry_config<'r>(req: &'r Request<'_>) -> Outcome<&'r RegistryConfig, Error> {
    req.guard::<&State<RegistryConfig>>()
        .await
        .map(|config| config.inner())
        .map_error(|(status, _)| (status, Error::Failure("Config not managed".to_string())))
}

fn forbidden<T>(reason: &str) -> Outcome<T, Error> {
    Outcome::Error((Status::Forbidden, Error::Forbidden(reason.to_string())))
}

/// Does the presented key equal the configured one?
fn key_matches(expected: &[u8], presented: &str) -> bool {
    secrets_match(expected, presented.as_bytes())
}

/// The Voting Service (or an administrator's machine), authenticated by source
/// address and shared key.
pub struct ExternalCaller;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ExternalCaller {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = try_outcome!(registry_config(req).await);

        match req.client_ip() {
            Some(ip) if config.allows_external(ip) => {}
            ip => {
                warn!("Refused external call from {ip:?}");
                return forbidden("Caller address not allowed");
            }
        }

        match req.headers().get_one(REGISTRY_KEY_HEADER) {
            Some(key) if key_matches(config.api_key(), key) => Outcome::Success(ExternalCaller),
            _ => {
                warn!("Refused external call with a missing or wrong key");
                forbidden("Missing or invalid registry key")
            }
        }
    }
}

/// A Registry administrator, authenticated by source address.
pub struct InternalCaller;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for InternalCaller {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = try_outcome!(registry_config(req).await);
        match req.client_ip() {
            Some(ip) if config.allows_internal(ip) => Outcome::Success(InternalCaller),
            ip => {
                warn!("Refused internal call from {ip:?}");
                forbidden("Caller address not allowed")
            }
        }
    }
}

#[post("/external/<kind>/verify", data = "<request>", format = "json")]
pub async fn verify(
    _caller: ExternalCaller,
    kind: RecordKind,
    request: Json<VerifyRequest>,
    db: RegistryDb,
) -> Result<Json<VerificationSummary>> {
    Ok(Json(registry::verify(&db, kind, &request).await?))
}

#[put("/external/<kind>/registered", data = "<request>", format = "json")]
pub async fn mark_registered(
    _caller: ExternalCaller,
    kind: RecordKind,
    request: Json<MarkRegisteredRequest>,
    db: RegistryDb,
) -> Result<Status> {
    registry::mark_registered(&db, kind, &request).await?;
    Ok(Status::NoContent)
}

#[put("/external/voters/mark-voted", data = "<request>", format = "json")]
pub async fn mark_voted(
    _caller: ExternalCaller,
    request: Json<VerifyRequest>,
    db: RegistryDb,
) -> Result<Status> {
    registry::mark_voted(&db, &request).await?;
    Ok(Status::NoContent)
}

#[post("/external/reset-vote-status")]
pub async fn reset_vote_status(_caller: ExternalCaller, db: RegistryDb) -> Result<Json<ResetResult>> {
    Ok(Json(registry::reset_all_voted(&db).await?))
}

#[post("/internal/<kind>", data = "<request>", format = "json")]
pub async fn create_record(
    _caller: InternalCaller,
    kind: RecordKind,
    request: Json<NewRecordRequest>,
    db: RegistryDb,
) -> Result<(Status, Json<IssuedToken>)> {
    let issued = registry::create_record(&db, kind, request.into_inner()).await?;
    Ok((Status::Created, Json(issued)))
}

#[put("/internal/<kind>/<national_id>/token")]
pub async fn rotate_token(
    _caller: InternalCaller,
    kind: RecordKind,
    national_id: NationalId,
    db: RegistryDb,
) -> Result<Json<IssuedToken>> {
    Ok(Json(registry::rotate_token(&db, kind, national_id).await?))
}

#[put("/internal/<kind>/<national_id>/token/revoke")]
pub async fn revoke_token(
    _caller: InternalCaller,
    kind: RecordKind,
    national_id: NationalId,
    db: RegistryDb,
) -> Result<Status> {
    registry::revoke_token(&db, kind, &national_id).await?;
    Ok(Status::NoContent)
}

#[put("/internal/<kind>/<national_id>/eligibility", data = "<update>", format = "json")]
pub async fn set_eligibility(
    _caller: InternalCaller,
    kind: RecordKind,
    national_id: NationalId,
    update: Json<EligibilityUpdate>,
    db: RegistryDb,
) -> Result<Status> {
    registry::set_eligibility(&db, kind, &national_id, update.eligible).await?;
    Ok(Status::NoContent)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use rocket::{
        http::{ContentType, Header},
        local::asynchronous::{Client, LocalRequest},
        serde::json::serde_json::json,
    };

    use crate::error::Problem;
    use crate::model::common::citizen::Token;
    use crate::TEST_REGISTRY_KEY;

    use super::*;

    const VOTING_SERVICE: &str = "10.0.0.5:40000";
    const ADMIN: &str = "192.168.0.20:40000";
    const STRANGER: &str = "8.8.8.8:40000";

    fn from<'a>(request: LocalRequest<'a>, addr: &str) -> LocalRequest<'a> {
        request.remote(addr.parse::<SocketAddr>().unwrap())
    }

    fn external(request: LocalRequest<'_>) -> LocalRequest<'_> {
        from(request, VOTING_SERVICE)
            .header(Header::new(REGISTRY_KEY_HEADER, TEST_REGISTRY_KEY))
            .header(ContentType::JSON)
    }

    async fn create(client: &Client) -> IssuedToken {
        let response = from(client.post("/internal/voters"), ADMIN)
            .header(ContentType::JSON)
            .body(json!(NewRecordRequest::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        response.into_json().await.unwrap()
    }

    fn verify_body(issued: &IssuedToken) -> String {
        json!(VerifyRequest {
            national_id: issued.national_id.clone(),
            token: issued.token.clone(),
        })
        .to_string()
    }

    #[test]
    fn key_comparison() {
        assert!(key_matches(b"shared-secret", "shared-secret"));
        assert!(!key_matches(b"shared-secret", "shared-secreT"));
        assert!(!key_matches(b"shared-secret", ""));
    }

    #[backend_test(registry)]
    async fn verify_then_vote(client: Client) {
        let issued = create(&client).await;

        let response = external(client.post("/external/voters/verify"))
            .body(verify_body(&issued))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let summary: VerificationSummary = response.into_json().await.unwrap();
        assert!(summary.eligible && summary.valid_token);
        assert!(!summary.is_registered && !summary.voted);

        // Voting requires registration first.
        let response = external(client.put("/external/voters/mark-voted"))
            .body(verify_body(&issued))
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());

        let response = external(client.put("/external/voters/registered"))
            .body(
                json!(MarkRegisteredRequest {
                    national_id: issued.national_id.clone(),
                    token: issued.token.clone(),
                    username: "alice".to_string(),
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::NoContent, response.status());

        let response = external(client.put("/external/voters/mark-voted"))
            .body(verify_body(&issued))
            .dispatch()
            .await;
        assert_eq!(Status::NoContent, response.status());

        let response = external(client.put("/external/voters/mark-voted"))
            .body(verify_body(&issued))
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
        let problem: Problem = response.into_json().await.unwrap();
        assert_eq!("AlreadyVoted", problem.detail);

        let response = external(client.post("/external/reset-vote-status"))
            .dispatch()
            .await;
        let result: ResetResult = response.into_json().await.unwrap();
        assert_eq!(1, result.reset);
    }

    #[backend_test(registry)]
    async fn external_calls_need_key_and_address(client: Client) {
        let issued = create(&client).await;

        let response = from(client.post("/external/voters/verify"), VOTING_SERVICE)
            .header(ContentType::JSON)
            .body(verify_body(&issued))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        let response = from(client.post("/external/voters/verify"), VOTING_SERVICE)
            .header(Header::new(REGISTRY_KEY_HEADER, "guess"))
            .header(ContentType::JSON)
            .body(verify_body(&issued))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        let response = from(client.post("/external/voters/verify"), STRANGER)
            .header(Header::new(REGISTRY_KEY_HEADER, TEST_REGISTRY_KEY))
            .header(ContentType::JSON)
            .body(verify_body(&issued))
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());

        // Admin addresses may call external routes too.
        let response = from(client.post("/external/voters/verify"), ADMIN)
            .header(Header::new(REGISTRY_KEY_HEADER, TEST_REGISTRY_KEY))
            .header(ContentType::JSON)
            .body(verify_body(&issued))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test(registry)]
    async fn internal_calls_need_admin_address(client: Client) {
        let response = from(client.post("/internal/voters"), VOTING_SERVICE)
            .header(ContentType::JSON)
            .body(json!(NewRecordRequest::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(registry)]
    async fn duplicate_record_conflicts(client: Client) {
        create(&client).await;

        let response = from(client.post("/internal/voters"), ADMIN)
            .header(ContentType::JSON)
            .body(json!(NewRecordRequest::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test(registry)]
    async fn rotated_token_replaces_old(client: Client) {
        let issued = create(&client).await;

        let response = from(
            client.put(format!("/internal/voters/{}/token", issued.national_id)),
            ADMIN,
        )
        .dispatch()
        .await;
        assert_eq!(Status::Ok, response.status());
        let rotated: IssuedToken = response.into_json().await.unwrap();
        assert_ne!(issued.token, rotated.token);

        let response = external(client.post("/external/voters/verify"))
            .body(verify_body(&issued))
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());

        let response = external(client.post("/external/voters/verify"))
            .body(verify_body(&rotated))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test(registry)]
    async fn revoked_and_ineligible_records_fail_verification(client: Client) {
        let issued = create(&client).await;

        let response = from(
            client.put(format!(
                "/internal/voters/{}/eligibility",
                issued.national_id
            )),
            ADMIN,
        )
        .header(ContentType::JSON)
        .body(json!(EligibilityUpdate { eligible: false }).to_string())
        .dispatch()
        .await;
        assert_eq!(Status::NoContent, response.status());

        let response = external(client.post("/external/voters/verify"))
            .body(verify_body(&issued))
            .dispatch()
            .await;
        let problem: Problem = response.into_json().await.unwrap();
        assert_eq!("NotEligible", problem.detail);

        let response = from(
            client.put(format!(
                "/internal/voters/{}/token/revoke",
                issued.national_id
            )),
            ADMIN,
        )
        .dispatch()
        .await;
        assert_eq!(Status::NoContent, response.status());

        let response = external(client.post("/external/voters/verify"))
            .body(verify_body(&issued))
            .dispatch()
            .await;
        let problem: Problem = response.into_json().await.unwrap();
        assert_eq!("TokenRevoked", problem.detail);
    }

    #[backend_test(registry)]
    async fn unknown_records(client: Client) {
        let response = external(client.post("/external/candidates/verify"))
            .body(
                json!(VerifyRequest {
                    national_id: NationalId::example(),
                    token: Token::example(),
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());

        let response = from(
            client.put(format!("/internal/voters/{}/token", NationalId::example())),
            ADMIN,
        )
        .dispatch()
        .await;
        assert_eq!(Status::NotFound, response.status());

        let response = from(client.put("/internal/voters/123/token"), ADMIN)
            .dispatch()
            .await;
        assert!(response.status().class().is_client_error());
    }
}
