//! Friend graph endpoints under `/api/friend`

use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};

use super::Ack;
use crate::error::AppError;
use crate::models::{FriendGraphError, FriendStatus, UserId};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FriendRequestBody {
    pub from: UserId,
    pub to: UserId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBody {
    /// The accepting identity
    pub user_id: UserId,
    /// The identity that sent the request
    pub from: UserId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclineBody {
    pub user_id: UserId,
    pub other_id: UserId,
}

#[derive(Serialize)]
pub struct DeclineResponse {
    pub removed: bool,
    pub msg: &'static str,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: FriendStatus,
}

/// POST /api/friend/request
#[post("/friend/request")]
pub async fn send_request(
    state: web::Data<AppState>,
    body: web::Json<FriendRequestBody>,
) -> Result<HttpResponse, AppError> {
    state.friends.request(body.from, body.to).await?;
    Ok(Ack::ok("Friend request sent"))
}

/// POST /api/friend/accept
#[post("/friend/accept")]
pub async fn accept_request(
    state: web::Data<AppState>,
    body: web::Json<AcceptBody>,
) -> Result<HttpResponse, AppError> {
    state.friends.accept(body.user_id, body.from).await?;
    Ok(Ack::ok("Friend request accepted"))
}

/// POST /api/friend/decline
///
/// Declining and cancelling are the same call. Removing a request that no
/// longer exists succeeds with `removed: false`, so clients can retry.
#[post("/friend/decline")]
pub async fn decline_request(
    state: web::Data<AppState>,
    body: web::Json<DeclineBody>,
) -> Result<HttpResponse, AppError> {
    match state.friends.decline(body.user_id, body.other_id).await {
        Ok(_) => Ok(HttpResponse::Ok().json(DeclineResponse {
            removed: true,
            msg: "Request removed",
        })),
        Err(AppError::Friend(FriendGraphError::NoSuchRequest)) => {
            Ok(HttpResponse::Ok().json(DeclineResponse {
                removed: false,
                msg: "No such request",
            }))
        }
        Err(e) => Err(e),
    }
}

/// GET /api/friend/list/{userId}
#[get("/friend/list/{user_id}")]
pub async fn list_friends(
    state: web::Data<AppState>,
    user_id: web::Path<UserId>,
) -> Result<HttpResponse, AppError> {
    let friends = state.friends.list_friends(user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(friends))
}

/// GET /api/friend/requests/{userId}
#[get("/friend/requests/{user_id}")]
pub async fn pending_requests(
    state: web::Data<AppState>,
    user_id: web::Path<UserId>,
) -> Result<HttpResponse, AppError> {
    let pending = state.friends.pending_requests(user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(pending))
}

/// GET /api/friend/status/{userId}/{otherId}
#[get("/friend/status/{user_id}/{other_id}")]
pub async fn friend_status(
    state: web::Data<AppState>,
    path: web::Path<(UserId, UserId)>,
) -> Result<HttpResponse, AppError> {
    let (user_id, other_id) = path.into_inner();
    let status = state.friends.status(user_id, other_id).await?;
    Ok(HttpResponse::Ok().json(StatusResponse { status }))
}
