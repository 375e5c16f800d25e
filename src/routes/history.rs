//! Direct-message history under `/api/history`
//!
//! Writes here are independent of live routing: clients append the encrypted
//! body after (or instead of) sending it over the socket.

use actix_web::{post, web, HttpResponse};
use serde::Deserialize;

use super::Ack;
use crate::error::AppError;
use crate::models::{MessagePayload, UserId};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendBody {
    pub from: UserId,
    pub to: UserId,
    #[serde(default, alias = "msg", alias = "message")]
    pub body: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
}

#[derive(Deserialize)]
pub struct FetchBody {
    pub from: UserId,
    pub to: UserId,
}

/// POST /api/history/append
#[post("/history/append")]
pub async fn append_message(
    state: web::Data<AppState>,
    body: web::Json<AppendBody>,
) -> Result<HttpResponse, AppError> {
    let AppendBody {
        from,
        to,
        body,
        media_url,
        media_type,
    } = body.into_inner();
    let payload = MessagePayload::from_parts(body, media_url, media_type)?;
    state.history.append_direct(from, to, payload).await?;
    Ok(Ack::ok("Message added successfully"))
}

/// POST /api/history/fetch
///
/// Entries are oldest first, with `fromSelf` relative to `from`.
#[post("/history/fetch")]
pub async fn fetch_messages(
    state: web::Data<AppState>,
    body: web::Json<FetchBody>,
) -> Result<HttpResponse, AppError> {
    let entries = state.history.fetch(body.from, body.to).await?;
    Ok(HttpResponse::Ok().json(entries))
}
