use axum::{extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::extractor::AuthUser;
use crate::auth::password::{generate_password, hash_password, verify_password};
use crate::cv::validation::validate_email;
use crate::errors::{is_unique_violation, AppError};
use crate::mail::templates;
use crate::models::user::User;
use crate::routes::extract::Json;
use crate::state::AppState;
use crate::users::store::{self, NewUser};

/// Length of passwords generated by the forgot-password flow.
const RESET_PASSWORD_LEN: usize = 10;

const FORGOT_PASSWORD_MESSAGE: &str = "If the email is correct, a new password was sent to your email.";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub credential: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

/// POST /register
pub async fn handle_register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let name = req.name.trim();
    let surname = req.surname.trim();
    let username = req.username.trim();
    let email = req.email.trim().to_lowercase();
    let password = req.password.as_str();

    if [name, surname, username, email.as_str(), password]
        .iter()
        .any(|f| f.is_empty())
    {
        return Err(AppError::Validation("All fields required".to_string()));
    }
    let email = validate_email(&email).map_err(AppError::Validation)?;

    if store::username_or_email_taken(&state.db, username, &email).await? {
        return Err(AppError::Conflict(
            "Username or email already in use".to_string(),
        ));
    }

    let password_hash = hash_password(password)?;
    let user_id = store::insert_user(
        &state.db,
        NewUser {
            name,
            surname,
            username,
            email: &email,
            password_hash: &password_hash,
        },
    )
    .await
    .map_err(|e| {
        // Lost a race with a concurrent registration.
        if is_unique_violation(&e) {
            AppError::Conflict("Username or email already in use".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    info!("Registered user {user_id} ({username})");

    if let Err(e) = state.mailer.send(templates::sign_up(&email)).await {
        warn!("Welcome mail to user {user_id} failed: {e}");
    }

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registered".to_string(),
            user_id,
        }),
    ))
}

/// POST /login
///
/// `credential` may be a username or an email address.
pub async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let credential = req.credential.as_deref().map(str::trim).unwrap_or_default();
    let password = req.password.as_deref().unwrap_or_default();
    if credential.is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "Missing credential or password".to_string(),
        ));
    }

    let user = store::find_by_credential(&state.db, credential)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !verify_password(password, &user.password_hash)? {
        warn!("Failed login for user {}", user.id);
        return Err(AppError::Unauthorized("Incorrect Password".to_string()));
    }

    let token = state
        .jwt
        .issue(user.id, &user.username)
        .map_err(|e| AppError::Internal(e.into()))?;

    info!("User {} logged in", user.id);

    Ok(Json(LoginResponse {
        success: true,
        user_id: user.id,
        username: user.username,
        email: user.email,
        token,
    }))
}

/// POST /forgot-password
///
/// Always answers with the same message so callers cannot tell which
/// addresses have accounts.
pub async fn handle_forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    let email = validate_email(&req.email.to_lowercase())
        .map_err(|_| AppError::Validation("Incorrect format, Please try again!".to_string()))?;

    if let Some(user) = store::find_by_email(&state.db, &email).await? {
        let new_password = generate_password(RESET_PASSWORD_LEN);
        let password_hash = hash_password(&new_password)?;

        // The old password stays valid until the new one has been delivered.
        match state
            .mailer
            .send(templates::forgot_password(&user.email, &new_password))
            .await
        {
            Ok(()) => {
                store::set_password_hash(&state.db, user.id, &password_hash).await?;
                info!("Password reset for user {}", user.id);
            }
            Err(e) => warn!(
                "Password reset mail to user {} failed, password unchanged: {e}",
                user.id
            ),
        }
    }

    Ok(Json(json!({ "message": FORGOT_PASSWORD_MESSAGE })))
}

/// GET /me
pub async fn handle_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<User>, AppError> {
    let user = store::find_by_id(&state.db, auth.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(user))
}
