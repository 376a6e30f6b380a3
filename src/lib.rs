//! hire: a small job board. Admins post jobs, members search, apply and
//! withdraw, admins review applicants. State lives in one SQLite file.

pub mod config;
pub mod db;
pub mod error;
pub mod federated;
pub mod identity;
pub mod image_host;
pub mod mailer;
pub mod models;
pub mod pages;
pub mod render;
pub mod router;
pub mod search;
pub mod session;
pub mod tui;
