use rocket::{http::Status, serde::json::Json, Route};

use crate::error::Result;
use crate::gateway::Gateway;
use crate::model::{
    api::{
        election::{ElectionDescription, ElectionSpec},
        logs::{AuditLogDescription, AuditLogFilter},
        pagination::{Paginated, PaginationRequest, DEFAULT_PAGE_SIZE},
        registry::ResetResult,
        results::Reconciliation,
        Admin, AuthToken,
    },
    common::audit::ActionType,
    mongodb::Id,
};
use crate::service::{lifecycle, results};
use crate::store::VotingDb;

use super::account_for;

pub fn routes() -> Vec<Route> {
    routes![
        create_election,
        start_nomination,
        start_pre_voting,
        start_voting,
        complete_election,
        reset_vote_status,
        audit_logs,
        reconciliation,
    ]
}

#[post("/elections", data = "<spec>", format = "json")]
pub async fn create_election(
    token: AuthToken<Admin>,
    spec: Json<ElectionSpec>,
    db: VotingDb,
) -> Result<(Status, Json<ElectionDescription>)> {
    let admin = account_for(&db, &token).await?;
    let election = lifecycle::create(&db, &admin, spec.into_inner()).await?;
    Ok((Status::Created, Json(election.into())))
}

#[post("/elections/<election_id>/start-nomination")]
pub async fn start_nomination(
    token: AuthToken<Admin>,
    election_id: Id,
    db: VotingDb,
) -> Result<Json<ElectionDescription>> {
    let admin = account_for(&db, &token).await?;
    let election = lifecycle::start_nomination(&db, &admin, election_id).await?;
    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/start-pre-voting")]
pub async fn start_pre_voting(
    token: AuthToken<Admin>,
    election_id: Id,
    db: VotingDb,
) -> Result<Json<ElectionDescription>> {
    let admin = account_for(&db, &token).await?;
    let election = lifecycle::start_pre_voting(&db, &admin, election_id).await?;
    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/start-voting")]
pub async fn start_voting(
    token: AuthToken<Admin>,
    election_id: Id,
    db: VotingDb,
) -> Result<Json<ElectionDescription>> {
    let admin = account_for(&db, &token).await?;
    let election = lifecycle::start_voting(&db, &admin, election_id).await?;
    Ok(Json(election.into()))
}

#[post("/elections/<election_id>/complete")]
pub async fn complete_election(
    token: AuthToken<Admin>,
    election_id: Id,
    db: VotingDb,
) -> Result<Json<ElectionDescription>> {
    let admin = account_for(&db, &token).await?;
    let election = lifecycle::complete(&db, &admin, election_id).await?;
    Ok(Json(election.into()))
}

#[post("/admin/reset-vote-status")]
pub async fn reset_vote_status(
    token: AuthToken<Admin>,
    db: VotingDb,
    gateway: Gateway,
) -> Result<Json<ResetResult>> {
    let admin = account_for(&db, &token).await?;
    let reset = lifecycle::reset_vote_status(&db, &gateway, &admin).await?;
    Ok(Json(ResetResult { reset }))
}

/// Audit log search and paging parameters.
#[derive(Debug, FromForm)]
pub struct AuditLogQuery {
    action: Option<ActionType>,
    #[field(name = "electionId")]
    election_id: Option<Id>,
    #[field(name = "userId")]
    user_id: Option<Id>,
    filter: Option<String>,
    #[field(default = 1)]
    page: u32,
    #[field(name = "pageSize", default = DEFAULT_PAGE_SIZE)]
    page_size: u32,
}

impl AuditLogQuery {
    fn split(self) -> (AuditLogFilter, PaginationRequest) {
        let filter = AuditLogFilter {
            action: self.action,
            election_id: self.election_id,
            user_id: self.user_id,
            filter: self.filter,
        };
        (filter, PaginationRequest::new(self.page, self.page_size))
    }
}

#[get("/audit-logs?<query..>")]
pub async fn audit_logs(
    _token: AuthToken<Admin>,
    query: AuditLogQuery,
    db: VotingDb,
) -> Result<Json<Paginated<AuditLogDescription>>> {
    let (filter, pagination) = query.split();
    pagination.validate()?;
    let (logs, total) = db
        .audit_logs_page(&filter, pagination.skip(), pagination.limit())
        .await?;
    let logs = logs.into_iter().map(AuditLogDescription::from).collect();
    Ok(Json(pagination.to_paginated(total, logs)?))
}

#[get("/admin/elections/<election_id>/reconciliation")]
pub async fn reconciliation(
    _token: AuthToken<Admin>,
    election_id: Id,
    db: VotingDb,
) -> Result<Json<Reconciliation>> {
    Ok(Json(results::reconciliation(&db, election_id).await?))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rocket::{
        http::ContentType, local::asynchronous::Client, serde::json::serde_json::json,
    };

    use crate::api::fixtures;
    use crate::error::Problem;
    use crate::model::common::election::ElectionStatus;
    use crate::store::RegistryDb;

    use super::*;

    async fn create(client: &Client) -> ElectionDescription {
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(json!(ElectionSpec::example(Utc::now())).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Created, response.status());
        response.into_json().await.unwrap()
    }

    #[backend_test(admin)]
    async fn election_walks_every_phase(client: Client) {
        let election = create(&client).await;
        assert_eq!(ElectionStatus::Upcoming, election.status);
        let id = *election.id;

        for (uri, status) in [
            (uri!(start_nomination(id)), ElectionStatus::Nomination),
            (uri!(start_pre_voting(id)), ElectionStatus::PreVoting),
            (uri!(start_voting(id)), ElectionStatus::Voting),
            (uri!(complete_election(id)), ElectionStatus::Completed),
        ] {
            let response = client.post(uri).dispatch().await;
            assert_eq!(Status::Ok, response.status());
            let election: ElectionDescription = response.into_json().await.unwrap();
            assert_eq!(status, election.status);
        }

        // Every creation and transition is audited.
        let response = client
            .get(format!("/audit-logs?electionId={id}"))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let page: Paginated<AuditLogDescription> = response.into_json().await.unwrap();
        assert_eq!(5, page.total);
        assert_eq!(ActionType::ElectionCompleted, page.items[0].action);
    }

    #[backend_test(admin)]
    async fn phases_cannot_be_skipped(client: Client) {
        let election = create(&client).await;

        let response = client
            .post(uri!(start_voting(*election.id)))
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test(admin)]
    async fn second_active_election_conflicts(client: Client) {
        create(&client).await;

        let mut spec = ElectionSpec::example(Utc::now());
        spec.name = "By-election".to_string();
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test(admin)]
    async fn invalid_schedule(client: Client) {
        let mut spec = ElectionSpec::example(Utc::now());
        spec.voting_end = spec.voting_start;
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(json!(spec).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let problem: Problem = response.into_json().await.unwrap();
        assert_eq!("Voting start must be before voting end", problem.detail);
    }

    #[backend_test]
    async fn admin_routes_need_login(client: Client) {
        let response = client
            .post(uri!(create_election))
            .header(ContentType::JSON)
            .body(json!(ElectionSpec::example(Utc::now())).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());

        let response = client.get("/audit-logs").dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test]
    async fn voters_are_not_admins(client: Client, registry: RegistryDb) {
        fixtures::voter(&client, &registry, 1).await;

        let response = client.get("/audit-logs").dispatch().await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(admin)]
    async fn audit_log_paging_is_validated(client: Client) {
        let response = client.get("/audit-logs?pageSize=0").dispatch().await;
        assert_eq!(Status::BadRequest, response.status());

        let response = client.get("/audit-logs?page=9").dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test(admin)]
    async fn reset_refused_while_voting(client: Client) {
        let election = create(&client).await;
        let id = *election.id;
        let response = client.post(uri!(reset_vote_status)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let result: ResetResult = response.into_json().await.unwrap();
        assert_eq!(0, result.reset);

        for uri in [
            uri!(start_nomination(id)),
            uri!(start_pre_voting(id)),
            uri!(start_voting(id)),
        ] {
            client.post(uri).dispatch().await;
        }
        let response = client.post(uri!(reset_vote_status)).dispatch().await;
        assert_eq!(Status::Conflict, response.status());
    }

    #[backend_test(admin)]
    async fn reconciliation_of_unknown_election(client: Client) {
        let response = client
            .get(uri!(reconciliation(Id::new())))
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }
}
