//! `DownstreamStreamHandler`: server-side `/all`, client-side `/eval/*`
//! GET+REPORT, and mobile `/meval` GET+REPORT. Each writes an
//! initial `put` — the full snapshot server-side, the `Evaluator`'s
//! user-scoped flag map client-side/mobile — then forwards broadcaster
//! frames until the subscriber disconnects or is marked degraded.

use super::authorization;
use crate::supervisor::{EnvironmentHandle, Supervisor};
use actix_web::{web, HttpRequest, HttpResponse};
use async_stream::stream;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use relay_core::streaming;
use serde_json::Value;
use std::sync::Arc;

fn sse_response(initial: Bytes, handle: Arc<EnvironmentHandle>) -> HttpResponse {
    let body = stream! {
        yield Ok::<_, actix_web::Error>(initial);
        let mut subscription = handle.broadcaster.attach().await;
        loop {
            match subscription.recv().await {
                Some(frame) => {
                    yield Ok(frame);
                    if subscription.is_degraded() {
                        break;
                    }
                }
                None => break,
            }
        }
    };

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache, no-store, must-revalidate"))
        .streaming(body)
}

/// Decode the user context a client-side/mobile route carries: a JSON
/// `REPORT` body, or a base64url-encoded JSON path segment on the `GET`
/// variant.
fn decode_user(path_segment: Option<&str>, body: &[u8]) -> Option<Value> {
    if !body.is_empty() {
        return serde_json::from_slice(body).ok();
    }
    let decoded = URL_SAFE_NO_PAD.decode(path_segment?).ok()?;
    serde_json::from_slice(&decoded).ok()
}

/// `GET /all` — server-side stream: full snapshot `put`, then raw
/// `patch`/`delete` frames as the store changes.
pub async fn server_side(req: HttpRequest, supervisor: web::Data<Arc<Supervisor>>) -> HttpResponse {
    let Some(sdk_key) = authorization(&req) else {
        return HttpResponse::Unauthorized().finish();
    };
    let Some(handle) = supervisor.find_by_sdk_key(sdk_key) else {
        return HttpResponse::Unauthorized().finish();
    };
    if !handle.store.is_initialized() {
        return HttpResponse::ServiceUnavailable().finish();
    }

    let snapshot = handle.store.get_all().await;
    match streaming::encode_put(&snapshot) {
        Ok(initial) => sse_response(initial, handle.clone()),
        Err(error) => {
            tracing::error!(%error, "failed to encode initial put frame for server-side stream");
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn eval_stream(handle: &Arc<EnvironmentHandle>, user: &Value) -> HttpResponse {
    if !handle.store.is_initialized() {
        return HttpResponse::ServiceUnavailable().finish();
    }
    let snapshot = handle.store.get_all().await;
    let evaluated = handle.evaluator.evaluate_all(&snapshot, user).await;
    match streaming::encode_eval_put(&evaluated) {
        Ok(initial) => sse_response(initial, handle.clone()),
        Err(error) => {
            tracing::error!(%error, "failed to encode initial put frame for eval stream");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// `GET /eval/<envKey>/<user>` — client-side stream, user context carried
/// base64url-encoded in the path.
pub async fn client_side_get(
    path: web::Path<(String, String)>,
    supervisor: web::Data<Arc<Supervisor>>,
) -> HttpResponse {
    let (env_key, user_segment) = path.into_inner();
    let Some(handle) = supervisor.find_by_env_key(&env_key) else {
        return HttpResponse::NotFound().finish();
    };
    let Some(user) = decode_user(Some(&user_segment), b"") else {
        return HttpResponse::BadRequest().finish();
    };
    eval_stream(handle, &user).await
}

/// `REPORT /eval/<envKey>` — client-side stream, user context carried as
/// the request body.
pub async fn client_side_report(
    path: web::Path<String>,
    body: web::Bytes,
    supervisor: web::Data<Arc<Supervisor>>,
) -> HttpResponse {
    let env_key = path.into_inner();
    let Some(handle) = supervisor.find_by_env_key(&env_key) else {
        return HttpResponse::NotFound().finish();
    };
    let Some(user) = decode_user(None, &body) else {
        return HttpResponse::BadRequest().finish();
    };
    eval_stream(handle, &user).await
}

/// `GET /meval/<user>` — mobile stream, environment identified by the
/// mobile key in `Authorization`.
pub async fn mobile_get(
    req: HttpRequest,
    path: web::Path<String>,
    supervisor: web::Data<Arc<Supervisor>>,
) -> HttpResponse {
    let Some(mobile_key) = authorization(&req) else {
        return HttpResponse::Unauthorized().finish();
    };
    let Some(handle) = supervisor.find_by_mobile_key(mobile_key) else {
        return HttpResponse::Unauthorized().finish();
    };
    let Some(user) = decode_user(Some(&path.into_inner()), b"") else {
        return HttpResponse::BadRequest().finish();
    };
    eval_stream(handle, &user).await
}

/// `REPORT /meval` — mobile stream, user context carried as the body.
pub async fn mobile_report(
    req: HttpRequest,
    body: web::Bytes,
    supervisor: web::Data<Arc<Supervisor>>,
) -> HttpResponse {
    let Some(mobile_key) = authorization(&req) else {
        return HttpResponse::Unauthorized().finish();
    };
    let Some(handle) = supervisor.find_by_mobile_key(mobile_key) else {
        return HttpResponse::Unauthorized().finish();
    };
    let Some(user) = decode_user(None, &body) else {
        return HttpResponse::BadRequest().finish();
    };
    eval_stream(handle, &user).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_user_prefers_body_over_path_segment() {
        let body = br#"{"key":"u1"}"#;
        let user = decode_user(Some("ignored"), body).unwrap();
        assert_eq!(user["key"], "u1");
    }

    #[test]
    fn decode_user_falls_back_to_base64url_path_segment() {
        let json = r#"{"key":"u2"}"#;
        let encoded = URL_SAFE_NO_PAD.encode(json);
        let user = decode_user(Some(&encoded), b"").unwrap();
        assert_eq!(user["key"], "u2");
    }

    #[test]
    fn decode_user_rejects_garbage() {
        assert!(decode_user(Some("not-base64!!"), b"").is_none());
        assert!(decode_user(None, b"").is_none());
    }
}
