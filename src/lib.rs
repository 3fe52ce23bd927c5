// This file exposes the modules as public modules in the crate

pub mod admin_handlers;
pub mod app_state;
pub mod assistants;
pub mod catalogue_handlers;
pub mod config;
pub mod db;
pub mod deploy;
pub mod dev_handlers;
pub mod errors;
pub mod logging;
pub mod model_catalog;
pub mod models;
pub mod pages;
pub mod persona_admin;
pub mod persona_query;
pub mod relay;
pub mod relay_handlers;
pub mod routes;
pub mod session;
