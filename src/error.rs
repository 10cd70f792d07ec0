use std::fmt::{Display, Formatter};

use argon2::Error as Argon2Error;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use log::{debug, error};
use mongodb::error::Error as DbError;
use rocket::{
    http::{ContentType, Status},
    response::{self, Responder},
    serde::json::Json,
    Request, Response,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of failure categories every operation reports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Failure,
}

impl ErrorKind {
    /// The HTTP status this category is reported with.
    pub const fn status(self) -> Status {
        match self {
            Self::Validation => Status::BadRequest,
            Self::Unauthorized => Status::Unauthorized,
            Self::Forbidden => Status::Forbidden,
            Self::NotFound => Status::NotFound,
            Self::Conflict => Status::Conflict,
            Self::Failure => Status::InternalServerError,
        }
    }

    /// Human-readable title used in problem bodies.
    pub const fn title(self) -> &'static str {
        match self {
            Self::Validation => "Validation failed",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not found",
            Self::Conflict => "Conflict",
            Self::Failure => "Internal failure",
        }
    }

    /// Classify an HTTP status. Anything unrecognised is a `Failure`.
    pub const fn from_status(status: Status) -> Self {
        match status.code {
            400 | 422 => Self::Validation,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict,
            _ => Self::Failure,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation: {0}")]
    Validation(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Failure: {0}")]
    Failure(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
}

impl Error {
    pub fn not_found(what: impl Display) -> Self {
        Self::NotFound(what.to_string())
    }

    /// Build an error of the given category.
    pub fn of_kind(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match kind {
            ErrorKind::Validation => Self::Validation(detail),
            ErrorKind::Unauthorized => Self::Unauthorized(detail),
            ErrorKind::Forbidden => Self::Forbidden(detail),
            ErrorKind::NotFound => Self::NotFound(detail),
            ErrorKind::Conflict => Self::Conflict(detail),
            ErrorKind::Failure => Self::Failure(detail),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Failure(_) | Self::Db(_) | Self::Argon2(_) => ErrorKind::Failure,
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    ErrorKind::Unauthorized
                }
                _ => ErrorKind::Failure,
            },
        }
    }

    /// The detail message, without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Validation(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Failure(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let kind = self.kind();
        // Never leak internals to the caller.
        let detail = if kind == ErrorKind::Failure {
            error!("{self}");
            "An unexpected error occurred.".to_string()
        } else {
            debug!("{self}");
            self.detail()
        };
        Problem::new(kind, detail, req.uri().path().to_string()).respond_to(req)
    }
}

/// An RFC-7807 problem body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub detail: String,
    pub status: u16,
    pub instance: String,
}

impl Problem {
    pub fn new(kind: ErrorKind, detail: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            problem_type: format!("about:blank#{kind:?}"),
            title: kind.title().to_string(),
            detail: detail.into(),
            status: kind.status().code,
            instance: instance.into(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Problem {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = Status::from_code(self.status).unwrap_or(Status::InternalServerError);
        Response::build_from(Json(self).respond_to(req)?)
            .status(status)
            .header(ContentType::new("application", "problem+json"))
            .ok()
    }
}

/// Catch-all so that guard failures and unmatched routes produce problem bodies too.
#[catch(default)]
pub fn default_catcher(status: Status, req: &Request<'_>) -> Problem {
    let kind = ErrorKind::from_status(status);
    let detail = match status.reason() {
        Some(reason) => format!("{} {reason}", status.code),
        None => status.code.to_string(),
    };
    Problem::new(kind, detail, req.uri().path().to_string())
}
