pub mod api;
pub mod auth;
pub mod models;
pub mod session;
