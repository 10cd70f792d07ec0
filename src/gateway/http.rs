use std::time::Duration;

use log::{debug, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{Error, ErrorKind, Problem, Result};
use crate::model::{
    api::registry::{MarkRegisteredRequest, ResetResult, VerificationSummary, VerifyRequest},
    common::citizen::{NationalId, Token},
    db::registry::RecordKind,
};

use super::{RegistryGateway, BAD_DATA, NULL_RESPONSE, REGISTRY_KEY_HEADER, UNREACHABLE};

/// Talks to a remote Registry Service over HTTP.
pub struct HttpGateway {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpGateway {
    /// `timeout` bounds every call, from connecting to reading the body.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Failure(format!("Cannot build registry client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn records_path(kind: RecordKind) -> &'static str {
        match kind {
            RecordKind::Voter => "/external/voters",
            RecordKind::Candidate => "/external/candidates",
        }
    }

    /// Send the request and turn every non-2xx outcome into a typed error.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .header(REGISTRY_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|err| {
                warn!("Registry call failed: {err}");
                Error::Failure(UNREACHABLE.to_string())
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(status_error(status, response.text().await.ok()))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let body = self
            .send(request)
            .await?
            .bytes()
            .await
            .map_err(|err| {
                warn!("Registry response body could not be read: {err}");
                Error::Failure(UNREACHABLE.to_string())
            })?;
        parse_body(&body)
    }
}

/// Map a non-2xx status onto the error taxonomy, keeping the Registry's
/// problem detail when it sent one.
fn status_error(status: StatusCode, body: Option<String>) -> Error {
    let detail = body
        .as_deref()
        .and_then(|body| rocket::serde::json::from_str::<Problem>(body).ok())
        .map(|problem| problem.detail);

    let kind = match status.as_u16() {
        400 => ErrorKind::Validation,
        401 => ErrorKind::Unauthorized,
        403 => ErrorKind::Forbidden,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::Conflict,
        500 => ErrorKind::Failure,
        code => {
            warn!("Registry answered with unexpected status {code}");
            return Error::Failure(format!("Registry.UnexpectedStatus({code})"));
        }
    };
    debug!("Registry answered {status}");
    let detail = match (kind, detail) {
        // Never relay the peer's internal detail as our own.
        (ErrorKind::Failure, _) => "Registry.Failure".to_string(),
        (_, Some(detail)) => detail,
        (_, None) => status.to_string(),
    };
    Error::of_kind(kind, detail)
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) || body == b"null" {
        return Err(Error::Failure(NULL_RESPONSE.to_string()));
    }
    rocket::serde::json::serde_json::from_slice(body).map_err(|err| {
        warn!("Registry sent an unparsable body: {err}");
        Error::Failure(BAD_DATA.to_string())
    })
}

#[rocket::async_trait]
impl RegistryGateway for HttpGateway {
    async fn verify(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        token: &Token,
    ) -> Result<VerificationSummary> {
        let body = VerifyRequest {
            national_id: national_id.clone(),
            token: token.clone(),
        };
        let url = self.url(&format!("{}/verify", Self::records_path(kind)));
        self.send_json(self.client.post(url).json(&body)).await
    }

    async fn mark_registered(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        token: &Token,
        username: &str,
    ) -> Result<()> {
        let body = MarkRegisteredRequest {
            national_id: national_id.clone(),
            token: token.clone(),
            username: username.to_string(),
        };
        let url = self.url(&format!("{}/registered", Self::records_path(kind)));
        self.send(self.client.put(url).json(&body)).await?;
        Ok(())
    }

    async fn mark_voted(&self, national_id: &NationalId, token: &Token) -> Result<()> {
        let body = VerifyRequest {
            national_id: national_id.clone(),
            token: token.clone(),
        };
        let url = self.url("/external/voters/mark-voted");
        self.send(self.client.put(url).json(&body)).await?;
        Ok(())
    }

    async fn reset_all_voted(&self) -> Result<u64> {
        let url = self.url("/external/reset-vote-status");
        let result: ResetResult = self.send_json(self.client.post(url)).await?;
        Ok(result.reset)
    }
}
