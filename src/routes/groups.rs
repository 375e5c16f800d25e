//! Group endpoints under `/api/groups`
//!
//! These persist groups and group history. Live fan-out happens over the
//! socket with `send-group`.

use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;

use crate::error::AppError;
use crate::models::{GroupId, GroupSummary, MessagePayload, UserId};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupBody {
    pub name: String,
    pub admin_id: UserId,
    #[serde(default)]
    pub member_ids: Vec<UserId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessageBody {
    pub from: UserId,
    pub group_id: GroupId,
    #[serde(default, alias = "msg", alias = "message")]
    pub body: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessagesBody {
    pub group_id: GroupId,
}

/// POST /api/groups/create
#[post("/groups/create")]
pub async fn create_group(
    state: web::Data<AppState>,
    body: web::Json<CreateGroupBody>,
) -> Result<HttpResponse, AppError> {
    let group = state
        .groups
        .create(&body.name, body.admin_id, &body.member_ids)
        .await?;
    Ok(HttpResponse::Ok().json(group))
}

/// GET /api/groups/my/{userId}
#[get("/groups/my/{user_id}")]
pub async fn my_groups(
    state: web::Data<AppState>,
    user_id: web::Path<UserId>,
) -> Result<HttpResponse, AppError> {
    let groups = state.groups.for_member(user_id.into_inner()).await?;
    let summaries: Vec<GroupSummary> = groups.iter().map(GroupSummary::from).collect();
    Ok(HttpResponse::Ok().json(summaries))
}

/// POST /api/groups/message
#[post("/groups/message")]
pub async fn post_group_message(
    state: web::Data<AppState>,
    body: web::Json<GroupMessageBody>,
) -> Result<HttpResponse, AppError> {
    let GroupMessageBody {
        from,
        group_id,
        body,
        media_url,
        media_type,
    } = body.into_inner();
    let payload = MessagePayload::from_parts(body, media_url, media_type)?;

    let entry = state.groups.post_message(from, group_id, payload).await?;
    Ok(HttpResponse::Ok().json(entry))
}

/// POST /api/groups/messages
#[post("/groups/messages")]
pub async fn group_messages(
    state: web::Data<AppState>,
    body: web::Json<GroupMessagesBody>,
) -> Result<HttpResponse, AppError> {
    let messages = state.groups.messages(body.group_id).await?;
    Ok(HttpResponse::Ok().json(messages))
}
