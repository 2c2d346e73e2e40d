use argon2::Error as Argon2Error;
use jsonwebtoken::errors::Error as JwtError;
use log::{debug, error};
use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::{serde_json, Json},
    Request, Response,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the backend can report. Each variant has a stable kind
/// (see [`Error::kind`]) that is returned to API callers alongside the
/// human-readable message.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed input, rejected before any state access.
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// The ledger's own voter flag rejected a second vote.
    #[error("Voter {0} has already voted")]
    AlreadyVoted(String),
    /// The ballot guard rejected a second ballot for the same identity.
    #[error("A ballot has already been recorded for voter {0}")]
    DuplicateVote(String),
    #[error("Face verification failed (similarity {similarity:.1})")]
    VerificationFailed { similarity: f32 },
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    /// The ballot guard and the ledger disagree about a ballot.
    #[error("Ledger and ballot guard disagree: {0}")]
    Reconciliation(String),
    /// The underlying store could not complete the request. Reads may be
    /// retried; a vote must not be.
    #[error("Store unavailable: {0}")]
    TransientStore(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The stable, machine-readable kind of this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::NotFound(_) => "NotFound",
            Self::AlreadyExists(_) => "AlreadyExists",
            Self::AlreadyVoted(_) => "AlreadyVoted",
            Self::DuplicateVote(_) => "DuplicateVote",
            Self::VerificationFailed { .. } => "VerificationFailed",
            Self::Unauthorized(_) | Self::Jwt(_) => "Unauthorized",
            Self::Forbidden(_) => "Forbidden",
            Self::Reconciliation(_) => "ReconciliationError",
            Self::TransientStore(_) | Self::Db(_) => "TransientStoreError",
            Self::Argon2(_) | Self::Codec(_) | Self::Internal(_) => "InternalError",
        }
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Validation(_) => Status::BadRequest,
            Self::Unauthorized(_) | Self::Jwt(_) => Status::Unauthorized,
            Self::Forbidden(_) => Status::Forbidden,
            Self::NotFound(_) => Status::NotFound,
            Self::AlreadyExists(_) | Self::AlreadyVoted(_) | Self::DuplicateVote(_) => {
                Status::Conflict
            }
            Self::VerificationFailed { .. } => Status::UnprocessableEntity,
            Self::TransientStore(_) | Self::Db(_) => Status::ServiceUnavailable,
            Self::Reconciliation(_) | Self::Argon2(_) | Self::Codec(_) | Self::Internal(_) => {
                Status::InternalServerError
            }
        }
    }

    /// Shorthand for the common "no such thing" case.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

/// The JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub detail: String,
}

impl ErrorBody {
    pub fn new(kind: &str, detail: impl Into<String>) -> Self {
        Self {
            error: kind.to_string(),
            detail: detail.into(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{} {}: {self}", req.method(), req.uri());
        } else {
            debug!("{} {}: {self}", req.method(), req.uri());
        }
        let body = ErrorBody::new(self.kind(), self.to_string());
        Response::build_from(Json(body).respond_to(req)?)
            .status(status)
            .ok()
    }
}
