use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;

use crate::state::AppState;
use crate::websocket::session::WsSession;

/// GET /ws
///
/// Connections are anonymous until they send `announce-identity`.
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let session = WsSession::new(state.get_ref().clone());
    ws::start(session, &req, stream)
}
