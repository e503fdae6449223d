use super::error::*;
use crate::application_port::*;
use crate::domain_model::{OtpPurpose, normalize_identifier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: ApiError) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    pub identifier: String,
    pub purpose: String,
}

impl TargetRequest {
    fn into_target(self) -> Result<OtpTarget, warp::Rejection> {
        let purpose = self.purpose.parse::<OtpPurpose>().map_err(|e| {
            reject::custom(ApiRejection::new(ApiErrorCode::BadRequest, e.to_string()))
        })?;
        Ok(OtpTarget::new(normalize_identifier(&self.identifier), purpose))
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub identifier: String,
    pub purpose: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct Empty {}

#[derive(Debug, Serialize)]
pub struct VerifiedResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl From<VerificationCheck> for VerifiedResponse {
    fn from(check: VerificationCheck) -> Self {
        let reason = match check {
            VerificationCheck::Verified => None,
            VerificationCheck::Pending => Some("code has not been verified yet"),
            VerificationCheck::NotFound => Some("no active code, request a new code"),
            VerificationCheck::Expired => Some("code expired, request a new code"),
        };
        VerifiedResponse {
            verified: check.is_verified(),
            reason,
        }
    }
}

pub async fn issue(
    body: TargetRequest,
    otp_service: Arc<dyn OtpService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let issued = otp_service
        .issue(body.into_target()?)
        .await
        .map_err(ApiRejection::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(issued)))
}

pub async fn resend(
    body: TargetRequest,
    otp_service: Arc<dyn OtpService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let issued = otp_service
        .resend(body.into_target()?)
        .await
        .map_err(ApiRejection::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(issued)))
}

pub async fn verify(
    body: VerifyRequest,
    otp_service: Arc<dyn OtpService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let target = TargetRequest {
        identifier: body.identifier,
        purpose: body.purpose,
    }
    .into_target()?;
    otp_service
        .verify(VerifyInput {
            target,
            code: body.code,
        })
        .await
        .map_err(ApiRejection::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(Empty {})))
}

pub async fn is_verified(
    query: TargetRequest,
    otp_service: Arc<dyn OtpService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let check = otp_service
        .is_verified(query.into_target()?)
        .await
        .map_err(ApiRejection::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(VerifiedResponse::from(check))))
}

pub async fn status(
    query: TargetRequest,
    otp_service: Arc<dyn OtpService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let status = otp_service
        .status(query.into_target()?)
        .await
        .map_err(ApiRejection::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(status)))
}

pub async fn consume(
    body: TargetRequest,
    otp_service: Arc<dyn OtpService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    otp_service
        .consume(body.into_target()?)
        .await
        .map_err(ApiRejection::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(Empty {})))
}
