use axum::{extract::State, Json};
use chrono::{Duration as ChronoDuration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    activity::create_notification,
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{AccessListEntry, NewSingleUseCode, NewUser, SingleUseCode, User, CT_SINGLE_USE_CODE},
    schema::{access_list, single_use_codes, users},
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let mut conn = state.db()?;

    let user: User = users::table
        .filter(users::email.eq(payload.email.to_lowercase()))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    // Code-flow users have no password and cannot log in this way.
    let password_hash = user.password_hash.as_deref().ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, password_hash)
        .map_err(|_| AppError::unauthorized())?;

    if !valid {
        return Err(AppError::unauthorized());
    }

    issue_token(&state, &user)
}

#[derive(Deserialize)]
pub struct CodeRequest {
    pub email: String,
}

/// Allowlist-gated single-use-code issuance. The response is the same
/// neutral 200 whether or not the email is known, except for the rate-limit
/// case where a still-valid code already exists.
pub async fn request_code(
    State(state): State<AppState>,
    Json(payload): Json<CodeRequest>,
) -> AppResult<Json<Value>> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::bad_request("invalid email format"));
    }

    let mut conn = state.db()?;

    let allowed: Option<AccessListEntry> = access_list::table
        .filter(access_list::email.eq(&email))
        .first(&mut conn)
        .optional()?;

    if allowed.is_some() {
        let expiry_minutes = state.config.code_expiry_minutes;
        conn.transaction::<_, AppError, _>(|conn| {
            let user = find_or_create_user(conn, &email)?;

            let existing: Option<SingleUseCode> = single_use_codes::table
                .filter(single_use_codes::user_id.eq(user.id))
                .first(conn)
                .optional()?;

            if let Some(code) = &existing {
                if code.is_redeemable() {
                    return Err(AppError::too_many_requests(
                        "Rate limit exceeded. Please try again in a few minutes.",
                    ));
                }
            }

            let expires_at = (Utc::now() + ChronoDuration::minutes(expiry_minutes)).naive_utc();
            let fresh_code = Uuid::new_v4();

            let code_id = match existing {
                Some(code) => {
                    diesel::update(single_use_codes::table.find(code.id))
                        .set((
                            single_use_codes::code.eq(fresh_code),
                            single_use_codes::is_used.eq(false),
                            single_use_codes::expires_at.eq(expires_at),
                            single_use_codes::updated_at.eq(Utc::now().naive_utc()),
                        ))
                        .execute(conn)?;
                    code.id
                }
                None => {
                    let new_code = NewSingleUseCode {
                        id: Uuid::new_v4(),
                        user_id: user.id,
                        code: fresh_code,
                        expires_at,
                    };
                    diesel::insert_into(single_use_codes::table)
                        .values(&new_code)
                        .execute(conn)?;
                    new_code.id
                }
            };

            create_notification(conn, user.id, CT_SINGLE_USE_CODE, code_id)?;
            Ok(())
        })?;
    }

    Ok(Json(json!({
        "message": "If we have your email address on file, you will receive a single-use code shortly."
    })))
}

#[derive(Deserialize)]
pub struct CodeVerifyRequest {
    pub code: Uuid,
}

pub async fn verify_code(
    State(state): State<AppState>,
    Json(payload): Json<CodeVerifyRequest>,
) -> AppResult<Json<LoginResponse>> {
    let mut conn = state.db()?;

    let user_id = conn.transaction::<_, AppError, _>(|conn| {
        // Non-blocking row lock so two concurrent redemptions of the same
        // code cannot both succeed.
        let code: SingleUseCode = single_use_codes::table
            .filter(single_use_codes::code.eq(payload.code))
            .for_update()
            .skip_locked()
            .first(conn)
            .optional()?
            .ok_or_else(AppError::unauthorized)?;

        if !code.is_redeemable() {
            return Err(AppError::unauthorized());
        }

        diesel::update(single_use_codes::table.find(code.id))
            .set((
                single_use_codes::is_used.eq(true),
                single_use_codes::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;

        Ok(code.user_id)
    })?;

    let user: User = users::table.find(user_id).first(&mut conn)?;
    issue_token(&state, &user)
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

fn issue_token(state: &AppState, user: &User) -> AppResult<Json<LoginResponse>> {
    let access_token = state
        .jwt
        .generate_token(user.id, &user.email, user.is_admin)
        .map_err(AppError::from)?;

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.jwt_expiry_minutes * 60,
    }))
}

fn find_or_create_user(conn: &mut PgConnection, email: &str) -> Result<User, AppError> {
    let existing: Option<User> = users::table
        .filter(users::email.eq(email))
        .first(conn)
        .optional()?;

    if let Some(user) = existing {
        return Ok(user);
    }

    let new_user = NewUser {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: None,
        first_name: String::new(),
        last_name: String::new(),
    };
    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(conn)?;

    Ok(users::table.find(new_user.id).first(conn)?)
}
