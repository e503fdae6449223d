use super::handler::{self, TargetRequest};
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::Filter;

/// Request bodies are tiny; anything larger is refused.
const MAX_BODY_BYTES: u64 = 4 * 1024;

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let issue = warp::post()
        .and(warp::path("otp"))
        .and(warp::path("issue"))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.otp_service.clone()))
        .and_then(handler::issue);

    let resend = warp::post()
        .and(warp::path("otp"))
        .and(warp::path("resend"))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.otp_service.clone()))
        .and_then(handler::resend);

    let verify = warp::post()
        .and(warp::path("otp"))
        .and(warp::path("verify"))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.otp_service.clone()))
        .and_then(handler::verify);

    let consume = warp::post()
        .and(warp::path("otp"))
        .and(warp::path("consume"))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.otp_service.clone()))
        .and_then(handler::consume);

    let verified = warp::get()
        .and(warp::path("otp"))
        .and(warp::path("verified"))
        .and(warp::path::end())
        .and(warp::query::<TargetRequest>())
        .and(with(server.otp_service.clone()))
        .and_then(handler::is_verified);

    let status = warp::get()
        .and(warp::path("otp"))
        .and(warp::path("status"))
        .and(warp::path::end())
        .and(warp::query::<TargetRequest>())
        .and(with(server.otp_service.clone()))
        .and_then(handler::status);

    issue
        .or(resend)
        .or(verify)
        .or(consume)
        .or(verified)
        .or(status)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1::recover_error;
    use crate::application_impl::{OtpPolicy, RealOtpService};
    use crate::application_port::OtpService;
    use crate::domain_port::{DeliveryFailure, SystemClock};
    use crate::infra_mail::RecordingOtpSender;
    use crate::infra_memory::MemoryOtpStore;
    use serde_json::{Value, json};
    use warp::http::StatusCode;

    fn api() -> (
        impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone + 'static,
        Arc<RecordingOtpSender>,
    ) {
        let sender = Arc::new(RecordingOtpSender::new());
        let otp_service: Arc<dyn OtpService> = Arc::new(RealOtpService::new(
            Arc::new(MemoryOtpStore::new()),
            sender.clone(),
            Arc::new(SystemClock),
            OtpPolicy::default(),
            b"api-test-key".to_vec(),
        ));
        let server = Arc::new(Server::new(otp_service, None));
        (routes(server).recover(recover_error), sender)
    }

    async fn post<F>(api: &F, path: &str, body: Value) -> (StatusCode, Value)
    where
        F: Filter + 'static,
        F::Extract: warp::Reply + Send,
    {
        let res = warp::test::request()
            .method("POST")
            .path(path)
            .json(&body)
            .reply(api)
            .await;
        (res.status(), serde_json::from_slice(res.body()).unwrap())
    }

    async fn get<F>(api: &F, path: &str) -> (StatusCode, Value)
    where
        F: Filter + 'static,
        F::Extract: warp::Reply + Send,
    {
        let res = warp::test::request().method("GET").path(path).reply(api).await;
        (res.status(), serde_json::from_slice(res.body()).unwrap())
    }

    #[tokio::test]
    async fn issue_verify_and_consume_flow() {
        let (api, sender) = api();

        let (status, body) = post(
            &api,
            "/otp/issue",
            json!({"identifier": " B@X.com ", "purpose": "password_reset"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["expires_in_secs"], 600);

        // Identifiers are normalised before they reach the service.
        let code = sender.last_code("b@x.com").unwrap();

        let (status, body) = post(
            &api,
            "/otp/verify",
            json!({"identifier": "b@x.com", "purpose": "password_reset", "code": code}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, body) = get(&api, "/otp/verified?identifier=b@x.com&purpose=password_reset").await;
        assert_eq!(body["data"]["verified"], true);

        let (status, _) = post(
            &api,
            "/otp/consume",
            json!({"identifier": "b@x.com", "purpose": "password_reset"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = get(&api, "/otp/status?identifier=b@x.com&purpose=password_reset").await;
        assert_eq!(body["data"]["exists"], false);
    }

    #[tokio::test]
    async fn wrong_code_reports_remaining_attempts() {
        let (api, sender) = api();
        post(
            &api,
            "/otp/issue",
            json!({"identifier": "a@x.com", "purpose": "registration"}),
        )
        .await;
        let code = sender.last_code("a@x.com").unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let (status, body) = post(
            &api,
            "/otp/verify",
            json!({"identifier": "a@x.com", "purpose": "registration", "code": wrong}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "InvalidCode");
        assert_eq!(body["error"]["remaining_attempts"], 2);

        let (_, body) = get(&api, "/otp/status?identifier=a@x.com&purpose=registration").await;
        assert_eq!(body["data"]["attempts"], 1);
    }

    #[tokio::test]
    async fn resend_while_live_asks_caller_to_wait() {
        let (api, _) = api();
        let target = json!({"identifier": "c@x.com", "purpose": "registration"});
        post(&api, "/otp/issue", target.clone()).await;

        let (status, body) = post(&api, "/otp/resend", target).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "ResendTooSoon");
        assert!(body["error"]["wait_secs"].as_i64().unwrap() > 590);
    }

    #[tokio::test]
    async fn unknown_purpose_is_a_bad_request() {
        let (api, sender) = api();
        let (status, body) = post(
            &api,
            "/otp/issue",
            json!({"identifier": "a@x.com", "purpose": "newsletter"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BadRequest");
        assert!(sender.deliveries().is_empty());
    }

    #[tokio::test]
    async fn verify_without_issue_is_not_found() {
        let (api, _) = api();
        let (status, body) = post(
            &api,
            "/otp/verify",
            json!({"identifier": "a@x.com", "purpose": "registration", "code": "123456"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NotFound");
    }

    #[tokio::test]
    async fn delivery_failure_maps_to_bad_gateway() {
        let (api, sender) = api();
        sender.fail_next(DeliveryFailure::Auth("535 bad credentials".to_string()));
        let (status, body) = post(
            &api,
            "/otp/issue",
            json!({"identifier": "a@x.com", "purpose": "registration"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "DeliveryAuthFailure");
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request() {
        let (api, _) = api();
        let (status, body) = post(&api, "/otp/issue", json!({"identifier": "a@x.com"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BadRequest");
    }
}
