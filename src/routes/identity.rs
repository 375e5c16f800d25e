use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;

use super::Ack;
use crate::error::AppError;
use crate::models::UserId;
use crate::services::RegisterIdentity;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyBody {
    #[serde(default)]
    pub public_key: Option<String>,
}

/// POST /api/identity
#[post("/identity")]
pub async fn register_identity(
    state: web::Data<AppState>,
    body: web::Json<RegisterIdentity>,
) -> Result<HttpResponse, AppError> {
    let identity = state.identities.register(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(identity))
}

/// GET /api/identity/{id}
///
/// Includes the public key peers encrypt to, or null when none is published.
#[get("/identity/{id}")]
pub async fn get_identity(
    state: web::Data<AppState>,
    id: web::Path<UserId>,
) -> Result<HttpResponse, AppError> {
    let identity = state.identities.get(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(identity))
}

/// GET /api/identity/by-username/{username}
#[get("/identity/by-username/{username}")]
pub async fn find_by_username(
    state: web::Data<AppState>,
    username: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let profile = state.identities.find_by_username(&username).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// POST /api/identity/{id}/public-key
#[post("/identity/{id}/public-key")]
pub async fn publish_public_key(
    state: web::Data<AppState>,
    id: web::Path<UserId>,
    body: web::Json<PublicKeyBody>,
) -> Result<HttpResponse, AppError> {
    let public_key = body.public_key.as_deref().unwrap_or_default();
    state
        .identities
        .publish_public_key(id.into_inner(), public_key)
        .await?;
    Ok(Ack::ok("Public key saved"))
}
