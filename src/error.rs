use std::fmt::Display;

use jsonwebtoken::errors::Error as JwtError;
use log::{error, warn};
use mongodb::error::Error as DbError;
use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Catcher, Request,
};
use thiserror::Error;

use crate::{logging::RequestId, model::api::Page};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    /// A 404 for the described resource.
    pub fn not_found(what: impl Display) -> Self {
        Self::Status(Status::NotFound, format!("Not found: {what}"))
    }

    /// A 500 that is not caused by an underlying library error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Status(Status::InternalServerError, message.into())
    }

    /// The HTTP status this error maps to.
    pub fn http_status(&self) -> Status {
        match self {
            Self::Db(_) | Self::Jwt(_) => Status::InternalServerError,
            Self::Status(status, _) => *status,
        }
    }
}

/// Detail of the error that ended a request, kept for the catcher.
#[derive(Debug, Default)]
struct ErrorDetail(Option<String>);

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.http_status();
        let id = req.local_cache(RequestId::next);
        match status.class() {
            StatusClass::ServerError => error!("req{id} failed: {self:?}"),
            _ => warn!("req{id} rejected: {self}"),
        }
        req.local_cache(|| ErrorDetail(Some(self.to_string())));
        Err(status)
    }
}

/// The catchers for every error status.
pub fn catchers() -> Vec<Catcher> {
    catchers![error_page]
}

/// Render every failed request as an error page. Failure detail is only
/// shown when running under the debug profile.
#[catch(default)]
fn error_page(status: Status, req: &Request<'_>) -> (Status, Json<Page>) {
    let message = if status == Status::NotFound {
        "Could not find the resource you were looking for"
    } else if status.class() == StatusClass::ServerError {
        "Something went wrong... see logs"
    } else {
        status.reason().unwrap_or("Request failed")
    };
    let detail = if req.rocket().config().profile == rocket::Config::DEBUG_PROFILE {
        req.local_cache(ErrorDetail::default).0.clone()
    } else {
        None
    };
    let page = Page::Error {
        status: status.code,
        message: message.to_string(),
        detail,
    };
    (status, Json(page))
}
