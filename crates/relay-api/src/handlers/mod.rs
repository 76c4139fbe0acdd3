//! Downstream HTTP surface: streaming, polling, event ingest, and status
//! handlers, each registered via a `configure(cfg: &mut web::ServiceConfig)`
//! function.

pub mod events;
pub mod polling;
pub mod status;
pub mod stream;

use actix_web::HttpRequest;

/// Raw `Authorization` header value, if present and valid UTF-8. Neither
/// LaunchDarkly's stream/poll/events contracts nor this relay's downstream
/// mirror of them use a `Bearer ` prefix — the SDK credential is sent
/// as-is.
fn authorization(req: &HttpRequest) -> Option<&str> {
    req.headers().get("Authorization")?.to_str().ok()
}

/// Register every downstream route on `cfg`.
pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    use actix_web::web;

    #[cfg(feature = "monitoring")]
    cfg.service(web::resource("/metrics").route(web::get().to(status::metrics)));

    cfg.service(web::resource("/status").route(web::get().to(status::status)))
        .service(web::resource("/all").route(web::get().to(stream::server_side)))
        .service(
            web::resource("/eval/{env_key}/{user}").route(web::get().to(stream::client_side_get)),
        )
        .service(
            web::resource("/eval/{env_key}")
                .route(web::method(actix_web::http::Method::from_bytes(b"REPORT").unwrap()).to(stream::client_side_report)),
        )
        .service(web::resource("/meval/{user}").route(web::get().to(stream::mobile_get)))
        .service(
            web::resource("/meval")
                .route(web::method(actix_web::http::Method::from_bytes(b"REPORT").unwrap()).to(stream::mobile_report)),
        )
        .service(web::resource("/sdk/latest-all").route(web::get().to(polling::server_side)))
        .service(
            web::resource("/sdk/eval/{env_key}/{user}").route(web::get().to(polling::client_side_get)),
        )
        .service(
            web::resource("/sdk/eval/{env_key}")
                .route(web::method(actix_web::http::Method::from_bytes(b"REPORT").unwrap()).to(polling::client_side_report)),
        )
        .service(web::resource("/bulk").route(web::post().to(events::server_side_bulk)))
        .service(web::resource("/events/bulk/{env_key}").route(web::post().to(events::client_side_bulk)))
        .service(web::resource("/mobile/events/bulk").route(web::post().to(events::mobile_bulk)));
}
