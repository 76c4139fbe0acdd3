//! `GET /status`: per-environment health — data store status, stream
//! initialization, and upstream reachability. `GET /metrics`: Prometheus
//! text exposition of the same ambient gauges/counters, behind the
//! `monitoring` feature.

use crate::supervisor::Supervisor;
use actix_web::{web, HttpResponse};
use serde_json::Map;
use std::sync::Arc;

pub async fn status(supervisor: web::Data<Arc<Supervisor>>) -> HttpResponse {
    let mut environments = Map::new();
    for (name, handle) in &supervisor.environments {
        environments.insert(name.clone(), serde_json::to_value(handle.health()).unwrap_or_default());
    }
    HttpResponse::Ok().json(serde_json::json!({ "environments": environments }))
}

#[cfg(feature = "monitoring")]
pub async fn metrics() -> HttpResponse {
    match crate::metrics::export() {
        Ok(body) => HttpResponse::Ok().content_type("text/plain; version=0.0.4").body(body),
        Err(error) => {
            tracing::error!(%error, "failed to encode prometheus metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}
