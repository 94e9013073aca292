use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::User,
    schema::users,
    state::AppState,
};

#[derive(Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
}

/// Directory used by assignee pickers.
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserSummary>>> {
    let mut conn = state.db()?;

    let user_list: Vec<User> = users::table.order(users::email.asc()).load(&mut conn)?;

    let response = user_list
        .into_iter()
        .map(|user| UserSummary {
            id: user.id,
            display_name: user.display_name(),
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
        })
        .collect();

    Ok(Json(response))
}
