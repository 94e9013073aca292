use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Domain, NewDomain, NewDomainMember},
    schema::{domain_members, domains, users},
    state::AppState,
};

#[derive(Serialize)]
pub struct DomainResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub members: Vec<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

fn to_response(domain: Domain, members: Vec<Uuid>) -> DomainResponse {
    DomainResponse {
        id: domain.id,
        title: domain.title,
        description: domain.description,
        members,
        created_by: domain.created_by,
        created_at: domain.created_at,
        updated_at: domain.updated_at,
    }
}

pub async fn list_domains(State(state): State<AppState>) -> AppResult<Json<Vec<DomainResponse>>> {
    let mut conn = state.db()?;

    let domain_list: Vec<Domain> = domains::table.order(domains::title.asc()).load(&mut conn)?;

    let memberships: Vec<(Uuid, Uuid)> = domain_members::table
        .select((domain_members::domain_id, domain_members::user_id))
        .load(&mut conn)?;

    let mut by_domain: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (domain_id, user_id) in memberships {
        by_domain.entry(domain_id).or_default().push(user_id);
    }

    let response = domain_list
        .into_iter()
        .map(|domain| {
            let members = by_domain.remove(&domain.id).unwrap_or_default();
            to_response(domain, members)
        })
        .collect();

    Ok(Json(response))
}

#[derive(Deserialize)]
pub struct CreateDomainRequest {
    pub title: String,
    pub description: Option<String>,
}

pub async fn create_domain(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateDomainRequest>,
) -> AppResult<Json<DomainResponse>> {
    if payload.title.trim().is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let mut conn = state.db()?;
    let new_domain = NewDomain {
        id: Uuid::new_v4(),
        title: payload.title.trim().to_string(),
        description: payload.description,
        created_by: Some(user.user_id),
    };

    match diesel::insert_into(domains::table)
        .values(&new_domain)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        )) => {
            return Err(AppError::bad_request("domain title already exists"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let domain: Domain = domains::table.find(new_domain.id).first(&mut conn)?;
    Ok(Json(to_response(domain, Vec::new())))
}

pub async fn get_domain(
    State(state): State<AppState>,
    Path(domain_id): Path<Uuid>,
) -> AppResult<Json<DomainResponse>> {
    let mut conn = state.db()?;

    let domain: Domain = domains::table.find(domain_id).first(&mut conn)?;
    let members: Vec<Uuid> = domain_members::table
        .filter(domain_members::domain_id.eq(domain_id))
        .select(domain_members::user_id)
        .load(&mut conn)?;

    Ok(Json(to_response(domain, members)))
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(domain_id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;

    let domain_exists: i64 = domains::table
        .filter(domains::id.eq(domain_id))
        .count()
        .get_result(&mut conn)?;
    if domain_exists == 0 {
        return Err(AppError::not_found());
    }

    let user_exists: i64 = users::table
        .filter(users::id.eq(payload.user_id))
        .count()
        .get_result(&mut conn)?;
    if user_exists == 0 {
        return Err(AppError::bad_request("user does not exist"));
    }

    diesel::insert_into(domain_members::table)
        .values(&NewDomainMember {
            domain_id,
            user_id: payload.user_id,
        })
        .on_conflict_do_nothing()
        .execute(&mut conn)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_member(
    State(state): State<AppState>,
    Path((domain_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;

    let removed = diesel::delete(
        domain_members::table
            .filter(domain_members::domain_id.eq(domain_id))
            .filter(domain_members::user_id.eq(user_id)),
    )
    .execute(&mut conn)?;

    if removed == 0 {
        return Err(AppError::not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}
