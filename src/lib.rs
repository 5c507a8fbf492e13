pub mod app;
pub mod auth;
pub mod controller;
pub mod logging;
pub mod models;
pub mod session;
pub mod store;
pub mod ui;
