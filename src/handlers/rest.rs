/// REST API handlers for the room access subsystem.
/// Thin translation layer: DTOs in, DTOs out, typed errors mapped onto
/// HTTP statuses. The verified user identity arrives in the `X-User-Id`
/// header, installed by the upstream identity collaborator; identity is
/// never read from request payloads.

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use serde::Deserialize;
use serde_json::json;

use super::ServerConfig;
use crate::access::{AccessCoordinator, LeaveOutcome};
use crate::db::ledger::MembershipLedger;
use crate::db::models::{
    CreateRoomRequest, InviteUsersRequest, JoinRoomRequest, JoinRoomResponse, LeaveRoomResponse,
    ManageParticipantRequest, MyRoomResponse, RoomListResponse, RoomResponse, RoomSort,
    UpdateRoomRequest, ValidateCodeRequest,
};
use crate::db::registry::RoomRegistry;
use crate::db::DbPool;
use crate::error::AccessError;
use crate::events::{MembershipEvent, MembershipFeed};
use crate::moderation::{ModerationAction, ModerationAuthority};

const USER_ID_HEADER: &str = "X-User-Id";
const DEFAULT_PAGE_LIMIT: u32 = 20;
const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct RoomListQuery {
    pub search: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Map a typed error onto its HTTP representation.
/// Storage faults are logged and masked; everything else carries its
/// message and stable kind.
fn error_response(err: &AccessError) -> HttpResponse {
    let status = match err {
        AccessError::NotFound(_) => StatusCode::NOT_FOUND,
        AccessError::Forbidden(_) => StatusCode::FORBIDDEN,
        AccessError::Conflict(_) | AccessError::RoomFull(_) | AccessError::InvalidState(_) => {
            StatusCode::CONFLICT
        }
        AccessError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
        AccessError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AccessError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
        AccessError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match err {
        AccessError::Storage(e) => {
            log::error!("storage error: {}", e);
            "internal storage error".to_string()
        }
        other => other.to_string(),
    };
    HttpResponse::build(status).json(json!({
        "error": message,
        "kind": err.kind(),
    }))
}

fn require_user_id(req: &HttpRequest) -> Result<String, HttpResponse> {
    match req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(HttpResponse::Forbidden().json(json!({
            "error": "missing verified user identity",
            "kind": "forbidden",
        }))),
    }
}

/// Create a room; the caller becomes its owner
/// POST /rooms
pub async fn create_room(
    pool: web::Data<DbPool>,
    feed: web::Data<MembershipFeed>,
    req: HttpRequest,
    body: web::Json<CreateRoomRequest>,
) -> ActixResult<HttpResponse> {
    let user_id = match require_user_id(&req) {
        Ok(u) => u,
        Err(resp) => return Ok(resp),
    };
    let new_room = match body.into_inner().into_new_room() {
        Ok(n) => n,
        Err(e) => return Ok(error_response(&e)),
    };
    match RoomRegistry::create_room(&pool, &user_id, new_room).await {
        Ok(room) => {
            feed.publish(MembershipEvent::Joined {
                room_id: room.id.clone(),
                user_id,
            });
            Ok(HttpResponse::Created().json(RoomResponse::from_room(&room, 1)))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// List public rooms (password-protected ones included)
/// GET /rooms?search=&sort=&page=&limit=
pub async fn list_public_rooms(
    pool: web::Data<DbPool>,
    query: web::Query<RoomListQuery>,
) -> ActixResult<HttpResponse> {
    let sort = match query.sort.as_deref() {
        None => RoomSort::Newest,
        Some(s) => match RoomSort::parse(s) {
            Some(v) => v,
            None => {
                return Ok(error_response(&AccessError::Validation(format!(
                    "unknown sort '{}'",
                    s
                ))));
            }
        },
    };
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);

    match RoomRegistry::list_public(&pool, query.search.as_deref(), sort, page, limit).await {
        Ok((rooms, total)) => {
            let rooms = rooms
                .iter()
                .map(|(room, count)| RoomResponse::from_room(room, *count))
                .collect();
            Ok(HttpResponse::Ok().json(RoomListResponse {
                rooms,
                total,
                page,
                limit,
            }))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// Rooms the caller currently belongs to
/// GET /rooms/mine
pub async fn list_my_rooms(pool: web::Data<DbPool>, req: HttpRequest) -> ActixResult<HttpResponse> {
    let user_id = match require_user_id(&req) {
        Ok(u) => u,
        Err(resp) => return Ok(resp),
    };
    match RoomRegistry::list_for_user(&pool, &user_id).await {
        Ok(rooms) => {
            let rooms: Vec<MyRoomResponse> = rooms
                .iter()
                .map(|(room, count, role)| MyRoomResponse {
                    room: RoomResponse::from_room(room, *count),
                    my_role: role.as_str().to_string(),
                })
                .collect();
            Ok(HttpResponse::Ok().json(rooms))
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// GET /rooms/{room_id}
pub async fn get_room(
    pool: web::Data<DbPool>,
    room_id: web::Path<String>,
) -> ActixResult<HttpResponse> {
    match RoomRegistry::find_by_id(&pool, &room_id).await {
        Ok(Some(room)) => match MembershipLedger::participant_count(&pool, &room.id).await {
            Ok(count) => Ok(HttpResponse::Ok().json(RoomResponse::from_room(&room, count))),
            Err(e) => Ok(error_response(&e)),
        },
        Ok(None) => Ok(error_response(&AccessError::NotFound(
            "room not found".into(),
        ))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Owner-only room patch
/// PATCH /rooms/{room_id}
pub async fn update_room(
    pool: web::Data<DbPool>,
    req: HttpRequest,
    room_id: web::Path<String>,
    body: web::Json<UpdateRoomRequest>,
) -> ActixResult<HttpResponse> {
    let user_id = match require_user_id(&req) {
        Ok(u) => u,
        Err(resp) => return Ok(resp),
    };
    let patch = match body.into_inner().into_patch() {
        Ok(p) => p,
        Err(e) => return Ok(error_response(&e)),
    };
    match RoomRegistry::update_room(&pool, &room_id, &user_id, patch).await {
        Ok(room) => match MembershipLedger::participant_count(&pool, &room.id).await {
            Ok(count) => Ok(HttpResponse::Ok().json(RoomResponse::from_room(&room, count))),
            Err(e) => Ok(error_response(&e)),
        },
        Err(e) => Ok(error_response(&e)),
    }
}

/// Owner-only room deletion, cascading membership and ban cleanup
/// DELETE /rooms/{room_id}
pub async fn delete_room(
    pool: web::Data<DbPool>,
    feed: web::Data<MembershipFeed>,
    req: HttpRequest,
    room_id: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let user_id = match require_user_id(&req) {
        Ok(u) => u,
        Err(resp) => return Ok(resp),
    };
    match RoomRegistry::delete_room(&pool, &room_id, &user_id).await {
        Ok(()) => {
            feed.publish(MembershipEvent::RoomDeleted {
                room_id: room_id.to_string(),
            });
            Ok(HttpResponse::NoContent().finish())
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// Join a room by code
/// POST /rooms/join
pub async fn join_room(
    pool: web::Data<DbPool>,
    feed: web::Data<MembershipFeed>,
    req: HttpRequest,
    body: web::Json<JoinRoomRequest>,
) -> ActixResult<HttpResponse> {
    let user_id = match require_user_id(&req) {
        Ok(u) => u,
        Err(resp) => return Ok(resp),
    };
    match AccessCoordinator::join_room(&pool, &feed, &body.code, &user_id, body.password.as_deref())
        .await
    {
        Ok(outcome) => {
            match MembershipLedger::participant_count(&pool, &outcome.room.id).await {
                Ok(count) => Ok(HttpResponse::Ok().json(JoinRoomResponse {
                    room: RoomResponse::from_room(&outcome.room, count),
                    membership: outcome.membership,
                    already_member: outcome.already_member,
                })),
                Err(e) => Ok(error_response(&e)),
            }
        }
        Err(e) => Ok(error_response(&e)),
    }
}

/// Read-only pre-check before joining
/// POST /rooms/validate
pub async fn validate_room_code(
    pool: web::Data<DbPool>,
    body: web::Json<ValidateCodeRequest>,
) -> ActixResult<HttpResponse> {
    match AccessCoordinator::validate_room_code(&pool, &body.code, body.password.as_deref()).await
    {
        Ok(resp) => Ok(HttpResponse::Ok().json(resp)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// POST /rooms/{room_id}/leave
pub async fn leave_room(
    pool: web::Data<DbPool>,
    feed: web::Data<MembershipFeed>,
    req: HttpRequest,
    room_id: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let user_id = match require_user_id(&req) {
        Ok(u) => u,
        Err(resp) => return Ok(resp),
    };
    match AccessCoordinator::leave_room(&pool, &feed, &room_id, &user_id).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(LeaveRoomResponse {
            left: true,
            room_deleted: outcome == LeaveOutcome::RoomDeleted,
        })),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Grant password-bypass invites to a list of users
/// POST /rooms/{room_id}/invites
pub async fn invite_users(
    pool: web::Data<DbPool>,
    config: web::Data<ServerConfig>,
    req: HttpRequest,
    room_id: web::Path<String>,
    body: web::Json<InviteUsersRequest>,
) -> ActixResult<HttpResponse> {
    let user_id = match require_user_id(&req) {
        Ok(u) => u,
        Err(resp) => return Ok(resp),
    };
    match AccessCoordinator::invite_users(
        &pool,
        &room_id,
        &user_id,
        &body.user_ids,
        config.invite_ttl_seconds,
    )
    .await
    {
        Ok(outcomes) => Ok(HttpResponse::Ok().json(outcomes)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Current members, by join time ascending
/// GET /rooms/{room_id}/participants
pub async fn list_participants(
    pool: web::Data<DbPool>,
    room_id: web::Path<String>,
) -> ActixResult<HttpResponse> {
    match RoomRegistry::find_by_id(&pool, &room_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Ok(error_response(&AccessError::NotFound(
                "room not found".into(),
            )));
        }
        Err(e) => return Ok(error_response(&e)),
    }
    match MembershipLedger::list_participants(&pool, &room_id).await {
        Ok(participants) => Ok(HttpResponse::Ok().json(participants)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Apply a moderation action to a member
/// POST /rooms/{room_id}/participants/{user_id}
pub async fn manage_participant(
    pool: web::Data<DbPool>,
    feed: web::Data<MembershipFeed>,
    req: HttpRequest,
    path: web::Path<(String, String)>,
    body: web::Json<ManageParticipantRequest>,
) -> ActixResult<HttpResponse> {
    let acting_user_id = match require_user_id(&req) {
        Ok(u) => u,
        Err(resp) => return Ok(resp),
    };
    let (room_id, target_user_id) = path.into_inner();
    let action = match ModerationAction::parse(&body.action) {
        Some(a) => a,
        None => {
            return Ok(error_response(&AccessError::Validation(format!(
                "unknown action '{}'",
                body.action
            ))));
        }
    };
    match ModerationAuthority::manage_participant(
        &pool,
        &feed,
        &room_id,
        &acting_user_id,
        &target_user_id,
        action,
    )
    .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "status": "ok",
            "action": action.as_str(),
        }))),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Health check endpoint
/// GET /health
pub async fn health() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok"
    })))
}
