//! `EventIngest`: `POST /bulk`, `POST /events/bulk/<envKey>`,
//! `POST /mobile/events/bulk`. Each route responds before the body is
//! dispatched to the verbatim/summarizing relays — the dispatch itself
//! runs on a detached task so a slow or panicking unmarshal can never
//! delay the response.

use super::authorization;
use crate::events;
use crate::supervisor::{EnvironmentHandle, Supervisor};
use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;

fn spawn_dispatch(handle: Arc<EnvironmentHandle>, body: web::Bytes, schema_version: u32) {
    tokio::spawn(async move {
        let outcome = events::dispatch(&body, schema_version, &handle.verbatim, &handle.summarizing).await;
        tracing::debug!(?outcome, environment = %handle.name, "event ingest dispatched");
    });
}

fn schema_version(req: &HttpRequest) -> u32 {
    let header = req.headers().get("X-LaunchDarkly-Event-Schema").and_then(|v| v.to_str().ok());
    events::schema_version_from_header(header)
}

/// `POST /bulk` — server-side, environment identified by `Authorization`.
pub async fn server_side_bulk(
    req: HttpRequest,
    body: web::Bytes,
    supervisor: web::Data<Arc<Supervisor>>,
) -> HttpResponse {
    if body.is_empty() {
        return HttpResponse::BadRequest().finish();
    }
    let Some(sdk_key) = authorization(&req) else {
        return HttpResponse::Unauthorized().finish();
    };
    let Some(handle) = supervisor.find_by_sdk_key(sdk_key) else {
        return HttpResponse::Unauthorized().finish();
    };
    spawn_dispatch(handle.clone(), body, schema_version(&req));
    HttpResponse::Accepted().finish()
}

/// `POST /events/bulk/<envKey>` — client-side, environment identified by
/// the path segment.
pub async fn client_side_bulk(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    supervisor: web::Data<Arc<Supervisor>>,
) -> HttpResponse {
    if body.is_empty() {
        return HttpResponse::BadRequest().finish();
    }
    let Some(handle) = supervisor.find_by_env_key(&path.into_inner()) else {
        return HttpResponse::NotFound().finish();
    };
    spawn_dispatch(handle.clone(), body, schema_version(&req));
    HttpResponse::Accepted().finish()
}

/// `POST /mobile/events/bulk` — mobile, environment identified by the
/// mobile key in `Authorization`.
pub async fn mobile_bulk(
    req: HttpRequest,
    body: web::Bytes,
    supervisor: web::Data<Arc<Supervisor>>,
) -> HttpResponse {
    if body.is_empty() {
        return HttpResponse::BadRequest().finish();
    }
    let Some(mobile_key) = authorization(&req) else {
        return HttpResponse::Unauthorized().finish();
    };
    let Some(handle) = supervisor.find_by_mobile_key(mobile_key) else {
        return HttpResponse::Unauthorized().finish();
    };
    spawn_dispatch(handle.clone(), body, schema_version(&req));
    HttpResponse::Accepted().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::HeaderValue;

    #[test]
    fn schema_version_reads_header_or_defaults() {
        let req = actix_web::test::TestRequest::default()
            .insert_header(("X-LaunchDarkly-Event-Schema", HeaderValue::from_static("3")))
            .to_http_request();
        assert_eq!(schema_version(&req), 3);

        let req = actix_web::test::TestRequest::default().to_http_request();
        assert_eq!(schema_version(&req), 1);
    }
}
