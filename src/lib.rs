// src/lib.rs
pub mod account;
pub mod api;
pub mod attendance;
pub mod bulletin;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod grades;
pub mod models;
pub mod notify;
pub mod org;
pub mod people;
pub mod prefs;
pub mod refresh;
pub mod search;
pub mod session;
pub mod timetable;
pub mod validation;

pub use api::{ApiClient, Page, Query};
pub use config::Config;
pub use error::{ApiError, ClientError};
