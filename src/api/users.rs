use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::AppState;
use crate::error::AppError;
use crate::models::user::{User, UserRole};
use crate::services::access_guard::{self, Principal};
use crate::services::users;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users", post(register_user).get(list_users))
        .route("/api/users/:user_id", axum::routing::delete(delete_user))
        .route("/api/users/:user_id/role", axum::routing::patch(set_user_role))
}

/// User as exposed over the API; the credential hash stays server-side.
#[derive(Debug, Serialize)]
struct UserView {
    id: Uuid,
    login: String,
    role: UserRole,
    created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            login: user.login,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    login: String,
    password: String,
}

async fn register_user(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, AppError> {
    if body.login.trim().is_empty() || body.password.is_empty() {
        return Err(AppError::BadRequest(
            "Login and password must not be empty".to_string(),
        ));
    }

    let user = users::register(&state.pool, body.login.trim(), &body.password).await?;

    Ok((StatusCode::CREATED, Json(UserView::from(user))))
}

#[derive(Debug, Deserialize)]
struct PageParams {
    page: Option<i64>,
    size: Option<i64>,
}

async fn list_users(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    access_guard::require_admin(&principal)?;

    let size = params.size.unwrap_or(20).clamp(1, 100);
    let page = params.page.unwrap_or(0).max(0);

    let users = users::list(&state.pool, size, page * size).await?;
    let views: Vec<UserView> = users.into_iter().map(UserView::from).collect();

    Ok(Json(views))
}

#[derive(Debug, Deserialize)]
struct RoleBody {
    role: UserRole,
}

async fn set_user_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<Uuid>,
    Json(body): Json<RoleBody>,
) -> Result<impl IntoResponse, AppError> {
    access_guard::require_admin(&principal)?;

    users::set_role(&state.pool, user_id, body.role).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn delete_user(
    State(state): State<AppState>,
    principal: Principal,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    access_guard::require_admin(&principal)?;

    users::delete(&state.pool, &state.key_vault, &state.number_index, user_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
