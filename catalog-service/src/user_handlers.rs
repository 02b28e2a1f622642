use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use common_auth::{AuthError, Role};
use common_http_errors::{ApiError, ApiResult};
use common_security::{CurrentIdentity, RequireAdmin};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::accounts::{Availability, Registration};
use crate::credentials::UserView;
use crate::AppState;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserView>)> {
    // Self-registration always yields USER; ADMIN accounts come from the seed or an admin.
    let identity = state
        .accounts
        .register(Registration {
            username: request.username,
            email: request.email,
            password: request.password,
            role: None,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(UserView::from(&identity))))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
    pub username: String,
    pub role: Role,
    pub authorities: Vec<&'static str>,
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    match state.accounts.login(&request.username, &request.password).await {
        Ok((identity, issued)) => {
            state.metrics.login_attempt("success");
            info!(username = %identity.username, "login succeeded");
            Ok(Json(LoginResponse {
                token: issued.token,
                token_type: issued.token_type,
                expires_in: issued.expires_in,
                expires_at: issued.expires_at,
                username: identity.username,
                role: identity.role,
                authorities: vec![identity.role.authority()],
            }))
        }
        Err(AuthError::InvalidCredentials) => {
            state.metrics.login_attempt("invalid_credentials");
            Err(AuthError::InvalidCredentials.into())
        }
        Err(err) => {
            state.metrics.login_attempt("error");
            error!(error = %err, "login failed");
            Err(err.into())
        }
    }
}

pub async fn logout(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> StatusCode {
    if let (Some(token_id), Some(expires_at)) = (identity.token_id, identity.token_expires_at) {
        state.denylist.deny(token_id, expires_at);
        info!(username = %identity.username, "token revoked on logout");
    }
    StatusCode::NO_CONTENT
}

pub async fn get_profile(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> ApiResult<Json<UserView>> {
    let record = state.accounts.profile(&identity.username).await?;
    Ok(Json(UserView::from(&record)))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub email: String,
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<Json<UserView>> {
    let record = state
        .accounts
        .update_email(&identity.username, &request.email)
        .await?;
    Ok(Json(UserView::from(&record)))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    state
        .accounts
        .change_password(
            &identity.username,
            &request.current_password,
            &request.new_password,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub username: Option<String>,
    pub email: Option<String>,
}

pub async fn availability(
    State(state): State<AppState>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<Json<Availability>> {
    if query.username.is_none() && query.email.is_none() {
        return Err(ApiError::bad_request(
            "missing_query",
            "Provide a username or an email to check",
        ));
    }
    let result = state
        .accounts
        .availability(query.username.as_deref(), query.email.as_deref())
        .await?;
    Ok(Json(result))
}

pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> ApiResult<Json<Vec<UserView>>> {
    let users = state.accounts.list().await?;
    Ok(Json(users.iter().map(UserView::from).collect()))
}

#[derive(Deserialize)]
pub struct RoleChangeRequest {
    pub role: String,
}

pub async fn change_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(username): Path<String>,
    Json(request): Json<RoleChangeRequest>,
) -> ApiResult<Json<UserView>> {
    let role = request
        .role
        .parse::<Role>()
        .map_err(|err| ApiError::bad_request("invalid_role", err.to_string()))?;
    let updated = state
        .accounts
        .set_role(&username, role)
        .await?
        .ok_or_else(|| ApiError::not_found("user_not_found"))?;
    info!(admin = %admin.username, username = %updated.username, role = %role, "admin changed role");
    Ok(Json(UserView::from(&updated)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(username): Path<String>,
) -> ApiResult<StatusCode> {
    if admin.username == username {
        return Err(ApiError::bad_request(
            "cannot_delete_self",
            "Administrators cannot delete their own account",
        ));
    }
    if !state.accounts.delete(&username).await? {
        return Err(ApiError::not_found("user_not_found"));
    }
    let ratings = state.catalog.remove_ratings_by(&username).await?;
    info!(admin = %admin.username, username = %username, ratings, "admin deleted user");
    Ok(StatusCode::NO_CONTENT)
}
