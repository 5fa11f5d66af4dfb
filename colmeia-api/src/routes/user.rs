//! User REST API Routes
//!
//! Registration writes the identity account first and the `users` row second,
//! deleting the account again when the row cannot be written.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use colmeia_core::{IdentityError, UserRecord};
use serde::{Deserialize, Serialize};

use super::{required, MessageResponse};
use crate::constants::CLEARED_SESSION_COOKIE;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::state::{AppState, SharedIdentity, SharedRelational};
use crate::telemetry::metrics::with_metrics;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RegisterResponse {
    pub message: String,
    pub uid: String,
    #[serde(rename = "customToken")]
    pub custom_token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub refresh_token: String,
    pub uid: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
}

fn required_password(value: Option<String>) -> ApiResult<String> {
    value
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::missing_field("password"))
}

// ============================================================================
// PUBLIC HANDLERS
// ============================================================================

/// POST /register - Create an account and its private workspace
#[utoipa::path(
    post,
    path = "/register",
    tag = "Users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = RegisterResponse),
        (status = 400, description = "Missing field", body = ApiError),
        (status = 409, description = "User already exists", body = ApiError),
    ),
)]
pub async fn register(
    State(identity): State<SharedIdentity>,
    State(relational): State<SharedRelational>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let email = required(req.email, "email")?;
    let password = required_password(req.password)?;
    let display_name = required(req.display_name, "display_name")?;

    if identity.get_user_by_email(&email).await?.is_some() {
        return Err(ApiError::already_exists("User already exists"));
    }

    let account = identity
        .create_user(&email, &password, &display_name)
        .await?;
    let uid = account.uid;

    if let Err(e) = relational.user_insert(&uid, &email, &display_name).await {
        tracing::warn!(user_id = %uid, error = %e, "User row insert failed, deleting identity account");
        match identity.delete_user(&uid).await {
            Ok(()) => with_metrics(|m| m.record_compensation("user_register", true)),
            Err(cleanup) => {
                tracing::error!(
                    user_id = %uid,
                    error = %cleanup,
                    "Compensating identity delete failed, account is orphaned"
                );
                with_metrics(|m| m.record_compensation("user_register", false));
            }
        }
        return Err(ApiError::database_error("Failed to create user record"));
    }

    let custom_token = identity.create_custom_token(&uid).await?;

    match relational.workspace_create_private(&uid).await {
        Ok(ws) => tracing::info!(user_id = %uid, workspace_id = ws.id, "Private workspace created"),
        Err(e) => tracing::warn!(user_id = %uid, error = %e, "Private workspace provisioning failed"),
    }

    tracing::info!(user_id = %uid, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created successfully and ready to sign in".to_string(),
            uid,
            custom_token,
        }),
    ))
}

/// POST /login - Email/password sign-in
#[utoipa::path(
    post,
    path = "/login",
    tag = "Users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = LoginResponse),
        (status = 400, description = "Missing field", body = ApiError),
        (status = 401, description = "Invalid credentials", body = ApiError),
    ),
)]
pub async fn login(
    State(identity): State<SharedIdentity>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let email = required(req.email, "email")?;
    let password = required_password(req.password)?;

    let signed_in = identity.sign_in_with_password(&email, &password).await?;
    tracing::info!(user_id = %signed_in.uid, "User signed in");

    Ok(Json(LoginResponse {
        token: signed_in.id_token,
        refresh_token: signed_in.refresh_token,
        uid: signed_in.uid,
        expires_in: signed_in.expires_in,
    }))
}

// ============================================================================
// PROTECTED HANDLERS
// ============================================================================

/// POST /logout - Revoke refresh tokens and clear the session cookie
#[utoipa::path(
    post,
    path = "/logout",
    tag = "Users",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(identity): State<SharedIdentity>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<impl IntoResponse> {
    identity.revoke_refresh_tokens(&auth.uid).await?;
    tracing::info!(user_id = %auth.uid, "User logged out");
    Ok((
        [(header::SET_COOKIE, CLEARED_SESSION_COOKIE)],
        Json(MessageResponse::new("Logged out successfully")),
    ))
}

/// GET /user - The caller's profile
#[utoipa::path(
    get,
    path = "/user",
    tag = "Users",
    responses(
        (status = 200, description = "Profile", body = UserRecord),
        (status = 404, description = "User not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_current_user(
    State(relational): State<SharedRelational>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<Json<UserRecord>> {
    relational
        .user_get(&auth.uid)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

/// PUT /user - Change the caller's display name
#[utoipa::path(
    put,
    path = "/user",
    tag = "Users",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = MessageResponse),
        (status = 400, description = "Missing display name", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_current_user(
    State(relational): State<SharedRelational>,
    AuthExtractor(auth): AuthExtractor,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let display_name = required(req.display_name, "display_name")?;
    if !relational
        .user_update_display_name(&auth.uid, &display_name)
        .await?
    {
        return Err(ApiError::not_found("User not found"));
    }
    Ok(Json(MessageResponse::new("User updated successfully")))
}

/// DELETE /user - Delete the caller's account
#[utoipa::path(
    delete,
    path = "/user",
    tag = "Users",
    responses(
        (status = 204, description = "Deleted"),
        (status = 409, description = "Caller still owns workspaces", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_current_user(
    State(identity): State<SharedIdentity>,
    State(relational): State<SharedRelational>,
    AuthExtractor(auth): AuthExtractor,
) -> ApiResult<StatusCode> {
    let owned = relational.workspace_owned_count(&auth.uid).await?;
    if owned > 0 {
        return Err(ApiError::state_conflict(format!(
            "User still owns {} workspace(s). Delete them first.",
            owned
        )));
    }

    match identity.delete_user(&auth.uid).await {
        Ok(()) | Err(IdentityError::UserNotFound { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    match relational.user_delete(&auth.uid).await {
        Ok(true) => tracing::info!(user_id = %auth.uid, "User deleted"),
        Ok(false) => tracing::warn!(user_id = %auth.uid, "Deleted identity account had no user row"),
        Err(e) => tracing::error!(
            user_id = %auth.uid,
            error = %e,
            "User row delete failed after identity delete, row is orphaned"
        ),
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /users - All users
#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses(
        (status = 200, description = "Users", body = [UserRecord]),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(relational): State<SharedRelational>,
) -> ApiResult<Json<Vec<UserRecord>>> {
    Ok(Json(relational.user_list().await?))
}

/// GET /users/{id} - One user by uid
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = String, Path, description = "Firebase uid")),
    responses(
        (status = 200, description = "User", body = UserRecord),
        (status = 404, description = "User not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(relational): State<SharedRelational>,
    Path(uid): Path<String>,
) -> ApiResult<Json<UserRecord>> {
    relational
        .user_get(&uid)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User not found"))
}

// ============================================================================
// ROUTERS
// ============================================================================

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route(
            "/user",
            get(get_current_user)
                .put(update_current_user)
                .delete(delete_current_user),
        )
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user))
}
