pub mod api;
pub mod auth;
pub mod capture;
pub mod config;
pub mod event;
pub mod event_log;
pub mod export;
pub mod index;
pub mod pipeline;
pub mod playlist;
pub mod prometheus;
pub mod router;
pub mod schema;
pub mod server;
pub mod time;
