pub mod auth;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod health;
pub mod mail;
pub mod notify;
pub mod rules;
pub mod store;
