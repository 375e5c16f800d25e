use actix_web::{error::InternalError, web, HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;

use crate::error::AppError;
use crate::metrics::metrics_handler;
use crate::state::AppState;

pub mod friends;
pub mod groups;
pub mod history;
pub mod identity;
pub mod wsroute;

/// Plain acknowledgement body: `{"msg": "..."}`
#[derive(Debug, Serialize)]
pub struct Ack {
    pub msg: &'static str,
}

impl Ack {
    pub fn ok(msg: &'static str) -> HttpResponse {
        HttpResponse::Ok().json(Ack { msg })
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    online: usize,
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        online: state.presence.online_count().await,
    })
}

fn json_error(err: actix_web::error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    bad_request(err.to_string())
}

fn path_error(err: actix_web::error::PathError, _req: &HttpRequest) -> actix_web::Error {
    bad_request(err.to_string())
}

/// Extractor failures render the same error body as handler failures
fn bad_request(message: String) -> actix_web::Error {
    let app_error = AppError::BadRequest(message);
    let response = app_error.error_response();
    InternalError::from_response(app_error, response).into()
}

/// Mount every REST, WebSocket and operational route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .service(
            web::scope("/api")
                .service(history::append_message)
                .service(history::fetch_messages)
                .service(friends::send_request)
                .service(friends::accept_request)
                .service(friends::decline_request)
                .service(friends::list_friends)
                .service(friends::pending_requests)
                .service(friends::friend_status)
                .service(identity::register_identity)
                .service(identity::find_by_username)
                .service(identity::get_identity)
                .service(identity::publish_public_key)
                .service(groups::create_group)
                .service(groups::my_groups)
                .service(groups::post_group_message)
                .service(groups::group_messages),
        )
        .service(wsroute::ws_handler)
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_handler));
}
