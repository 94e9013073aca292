pub mod activity;
pub mod auth;
pub mod changes;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod jobs;
pub mod models;
pub mod render;
pub mod routes;
pub mod schema;
pub mod ses;
pub mod state;
pub mod utils;
pub mod workers;

pub use routes::create_router;
pub use workers::{default_handlers, JobExecution, JobHandler, Worker};
