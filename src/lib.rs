pub mod activity;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod inquiry_number;
pub mod mailer;
pub mod maintenance;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
pub mod uploads;
pub mod utils;
pub mod validation;
pub mod workflow;

pub use routes::create_router;
pub use state::AppState;
