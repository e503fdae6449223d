use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use crate::domain_port::DeliveryFailure;
use serde::Serialize;
use std::convert::Infallible;
use tracing::warn;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    if let Some(err) = err.find::<ApiRejection>() {
        let json = warp::reply::json(&ApiResponse::<()>::err(err.to_api_error()));
        Ok(warp::reply::with_status(json, err.code.status()))
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        let rejection = ApiRejection::new(ApiErrorCode::BadRequest, e.to_string());
        let json = warp::reply::json(&ApiResponse::<()>::err(rejection.to_api_error()));
        Ok(warp::reply::with_status(json, StatusCode::BAD_REQUEST))
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        let rejection = ApiRejection::new(ApiErrorCode::BadRequest, e.to_string());
        let json = warp::reply::json(&ApiResponse::<()>::err(rejection.to_api_error()));
        Ok(warp::reply::with_status(json, StatusCode::BAD_REQUEST))
    } else if err.is_not_found() {
        let rejection = ApiRejection::new(ApiErrorCode::RouteNotFound, "no such route");
        let json = warp::reply::json(&ApiResponse::<()>::err(rejection.to_api_error()));
        Ok(warp::reply::with_status(json, StatusCode::NOT_FOUND))
    } else {
        let json = warp::reply::json(&ApiResponse::<()>::err(ApiError {
            code: ApiErrorCode::InternalError,
            message: format!("Unhandled error: {:?}", err),
            wait_secs: None,
            remaining_attempts: None,
        }));
        Ok(warp::reply::with_status(
            json,
            StatusCode::INTERNAL_SERVER_ERROR,
        ))
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_secs: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<u32>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub enum ApiErrorCode {
    BadRequest,
    RouteNotFound,
    InvalidIdentifier,
    NotFound,
    Expired,
    AttemptsExceeded,
    InvalidCode,
    ResendTooSoon,
    NotVerified,
    DeliveryAuthFailure,
    DeliveryConnectionFailure,
    DeliveryInvalidRecipient,
    InternalError,
}

impl ApiErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::BadRequest
            | ApiErrorCode::InvalidIdentifier
            | ApiErrorCode::InvalidCode => StatusCode::BAD_REQUEST,
            ApiErrorCode::RouteNotFound | ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::Expired => StatusCode::GONE,
            ApiErrorCode::AttemptsExceeded | ApiErrorCode::ResendTooSoon => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiErrorCode::NotVerified => StatusCode::FORBIDDEN,
            ApiErrorCode::DeliveryAuthFailure | ApiErrorCode::DeliveryConnectionFailure => {
                StatusCode::BAD_GATEWAY
            }
            ApiErrorCode::DeliveryInvalidRecipient => StatusCode::UNPROCESSABLE_ENTITY,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug)]
pub struct ApiRejection {
    pub code: ApiErrorCode,
    pub message: String,
    pub wait_secs: Option<i64>,
    pub remaining_attempts: Option<u32>,
}

impl ApiRejection {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            wait_secs: None,
            remaining_attempts: None,
        }
    }

    pub fn internal<E: std::fmt::Display>(error: E) -> Self {
        warn!("Internal error: {}", error);
        Self::new(ApiErrorCode::InternalError, "Internal error")
    }

    fn to_api_error(&self) -> ApiError {
        ApiError {
            code: self.code,
            message: self.message.clone(),
            wait_secs: self.wait_secs,
            remaining_attempts: self.remaining_attempts,
        }
    }
}

impl reject::Reject for ApiRejection {}

impl From<OtpError> for ApiRejection {
    fn from(error: OtpError) -> Self {
        let message = error.to_string();
        match error {
            OtpError::InvalidIdentifier => Self::new(ApiErrorCode::InvalidIdentifier, message),
            OtpError::NotFound => Self::new(ApiErrorCode::NotFound, message),
            OtpError::Expired => Self::new(ApiErrorCode::Expired, message),
            OtpError::AttemptsExceeded => Self::new(ApiErrorCode::AttemptsExceeded, message),
            OtpError::Mismatch { remaining_attempts } => Self {
                remaining_attempts: Some(remaining_attempts),
                ..Self::new(ApiErrorCode::InvalidCode, message)
            },
            OtpError::AlreadyLive { wait_secs } => Self {
                wait_secs: Some(wait_secs),
                ..Self::new(ApiErrorCode::ResendTooSoon, message)
            },
            OtpError::NotVerified => Self::new(ApiErrorCode::NotVerified, message),
            OtpError::Delivery(failure) => {
                warn!("otp delivery failed: {}", failure);
                match failure {
                    DeliveryFailure::Auth(_) => Self::new(
                        ApiErrorCode::DeliveryAuthFailure,
                        "could not send the code right now, try again later",
                    ),
                    DeliveryFailure::Connection(_) => Self::new(
                        ApiErrorCode::DeliveryConnectionFailure,
                        "mail service is unreachable, try again in a moment",
                    ),
                    DeliveryFailure::InvalidRecipient(_) => Self::new(
                        ApiErrorCode::DeliveryInvalidRecipient,
                        "this address cannot receive mail, check it and try again",
                    ),
                }
            }
            OtpError::Store(e) => Self::internal(e),
            OtpError::InternalError(e) => Self::internal(e),
        }
    }
}
