use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod activities;
pub mod attachments;
pub mod auth;
pub mod comments;
pub mod domains;
pub mod health;
pub mod notifications;
pub mod projects;
pub mod subtasks;
pub mod tasks;
pub mod todos;
pub mod users;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/code/request", post(auth::request_code))
        .route("/code/verify", post(auth::verify_code))
        .route("/me", get(auth::me));

    let domains_routes = Router::new()
        .route("/", get(domains::list_domains).post(domains::create_domain))
        .route("/:id", get(domains::get_domain))
        .route("/:id/members", post(domains::add_member))
        .route(
            "/:id/members/:user_id",
            axum::routing::delete(domains::remove_member),
        );

    let projects_routes = Router::new()
        .route(
            "/",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/:id",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/:id/tasks", get(tasks::list_project_tasks));

    let tasks_routes = Router::new()
        .route("/", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/:id",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/:id/subtasks", get(subtasks::list_task_subtasks));

    let subtasks_routes = Router::new()
        .route(
            "/",
            get(subtasks::list_subtasks).post(subtasks::create_subtask),
        )
        .route(
            "/:id",
            get(subtasks::get_subtask)
                .patch(subtasks::update_subtask)
                .delete(subtasks::delete_subtask),
        );

    let comments_routes = Router::new()
        .route(
            "/",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route(
            "/:id",
            patch(comments::update_comment).delete(comments::delete_comment),
        );

    let attachments_routes = Router::new()
        .route(
            "/",
            get(attachments::list_attachments).post(attachments::create_attachment),
        )
        .route(
            "/:id",
            patch(attachments::update_attachment).delete(attachments::delete_attachment),
        );

    let todos_routes = Router::new()
        .route("/", get(todos::list_todos).post(todos::create_todo))
        .route(
            "/:id",
            get(todos::get_todo)
                .patch(todos::update_todo)
                .delete(todos::delete_todo),
        )
        .route("/:id/mark_done", post(todos::mark_done))
        .route("/:id/mark_undone", post(todos::mark_undone));

    let activities_routes = Router::new().route("/", get(activities::list_activities));

    let notifications_routes = Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/:id", patch(notifications::mark_viewed))
        .route(
            "/mark_all_viewed",
            post(notifications::mark_all_viewed),
        );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .route("/api/users", get(users::list_users))
        .nest("/api/domains", domains_routes)
        .nest("/api/projects", projects_routes)
        .nest("/api/tasks", tasks_routes)
        .nest("/api/subtasks", subtasks_routes)
        .nest("/api/comments", comments_routes)
        .nest("/api/attachments", attachments_routes)
        .nest("/api/todos", todos_routes)
        .nest("/api/activities", activities_routes)
        .nest("/api/notifications", notifications_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
}
