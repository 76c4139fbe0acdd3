//! `PollingHandler`/`EvalEndpoints`: one-shot JSON variants of the stream
//! endpoints, for SDKs configured to poll instead of holding an SSE
//! connection open.

use super::authorization;
use crate::supervisor::{EnvironmentHandle, Supervisor};
use actix_web::{web, HttpRequest, HttpResponse};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use relay_core::model::{Kind, Snapshot};
use serde_json::Value;
use std::sync::Arc;

fn snapshot_json(snapshot: &Snapshot) -> Value {
    let mut body = serde_json::Map::new();
    for kind in Kind::all() {
        let mut items = serde_json::Map::new();
        if let Some(bucket) = snapshot.get(&kind) {
            for (key, item) in bucket {
                let mut value: Value = serde_json::from_slice(&item.payload).unwrap_or(Value::Object(Default::default()));
                if let Value::Object(map) = &mut value {
                    map.insert("version".to_string(), Value::from(item.version));
                }
                items.insert(key.clone(), value);
            }
        }
        body.insert(kind.namespace().to_string(), Value::Object(items));
    }
    Value::Object(body)
}

fn decode_user(path_segment: Option<&str>, body: &[u8]) -> Option<Value> {
    if !body.is_empty() {
        return serde_json::from_slice(body).ok();
    }
    let decoded = URL_SAFE_NO_PAD.decode(path_segment?).ok()?;
    serde_json::from_slice(&decoded).ok()
}

/// `GET /sdk/latest-all` — server-side one-shot snapshot.
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
    HttpResponse::Ok().json(snapshot_json(&handle.store.get_all().await))
}

async fn eval_once(handle: &Arc<EnvironmentHandle>, user: &Value) -> HttpResponse {
    if !handle.store.is_initialized() {
        return HttpResponse::ServiceUnavailable().finish();
    }
    let snapshot = handle.store.get_all().await;
    HttpResponse::Ok().json(handle.evaluator.evaluate_all(&snapshot, user).await)
}

/// `GET /sdk/eval/<envKey>/<user>` — client-side one-shot evaluated flags.
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
    eval_once(handle, &user).await
}

/// `REPORT /sdk/eval/<envKey>` — client-side one-shot evaluated flags, user
/// context carried as the body.
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
    eval_once(handle, &user).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::model::VersionedItem;

    #[test]
    fn snapshot_json_embeds_version_into_each_item() {
        let mut snapshot = relay_core::model::empty_snapshot();
        snapshot
            .get_mut(&Kind::Flags)
            .unwrap()
            .insert("f1".to_string(), VersionedItem::live("f1", 4, br#"{"on":true}"#.to_vec()));
        let json = snapshot_json(&snapshot);
        assert_eq!(json["flags"]["f1"]["version"], 4);
        assert_eq!(json["flags"]["f1"]["on"], true);
    }
}
