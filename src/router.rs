use axum::{
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderValue, Request, StatusCode,
    },
    response::{IntoResponse, Response},
    Router,
};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestId, RequestId},
    sensitive_headers::SetSensitiveRequestHeadersLayer,
    timeout::TimeoutLayer,
    trace::{DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    LatencyUnit, ServiceBuilderExt,
};
use tracing::Level;

use crate::errors::AppError;

pub fn get_router<S>(state: S, routes: Router<S>) -> Router
where
    S: Send + Sync + Clone + 'static,
{
    // Session cookies must never reach the logs.
    let sensitive_headers: Arc<[_]> = vec![COOKIE, SET_COOKIE].into();

    let middleware = ServiceBuilder::new()
        .layer(SetSensitiveRequestHeadersLayer::from_shared(
            sensitive_headers.clone(),
        ))
        .set_x_request_id(CounterRequestId::default())
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new())
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Micros)
                        .include_headers(true),
                )
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
        .sensitive_response_headers(sensitive_headers)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(10),
        ))
        .compression()
        .propagate_x_request_id()
        .insert_response_header_if_not_present(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );

    Router::new()
        .merge(routes)
        .fallback(error_404)
        .layer(middleware)
        .with_state(state)
}

#[derive(Clone, Default)]
struct CounterRequestId {
    counter: Arc<AtomicU64>,
}

impl MakeRequestId for CounterRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        self.counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
            .parse()
            .ok()
            .map(RequestId::new)
    }
}

async fn error_404() -> Response {
    AppError::DoesNotExist.into_response()
}
