//! Health endpoints: liveness and readiness probes plus a downstream report.

use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::{HttpResponse, HttpResponseBuilder, get, http::header, web};

use crate::domain::rpc::RetryingRequestExecutor;
use crate::domain::{ApiResult, Error};

/// Shared readiness flag.
#[derive(Default)]
pub struct HealthState {
    ready: AtomicBool,
}

impl HealthState {
    /// Create a new health state starting as not ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the service as ready.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Return readiness state.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

fn probe_builder(probe_ok: bool) -> HttpResponseBuilder {
    let mut response = if probe_ok {
        HttpResponse::Ok()
    } else {
        HttpResponse::ServiceUnavailable()
    };
    response.insert_header((header::CACHE_CONTROL, "no-store"));
    response
}

/// Readiness probe. Return 200 once the server can handle traffic; a 503
/// error body otherwise.
#[get("/health/ready")]
pub async fn ready(state: web::Data<HealthState>) -> ApiResult<HttpResponse> {
    if state.is_ready() {
        Ok(probe_builder(true).finish())
    } else {
        Err(Error::service_unavailable("service is not ready"))
    }
}

/// Liveness probe. Answers 200 while the process serves requests.
#[get("/health/live")]
pub async fn live() -> HttpResponse {
    probe_builder(true).finish()
}

/// Downstream report: `{service: healthy}` for every registered service.
/// Answers 503 when any service is unhealthy.
#[get("/health/services")]
pub async fn services(executor: web::Data<RetryingRequestExecutor>) -> HttpResponse {
    let report = executor.check_services().await;
    let all_healthy = report.values().all(|healthy| *healthy);
    probe_builder(all_healthy).json(report)
}
