//! HTTP client for the blog API.
//!
//! Every call goes through a [`RequestActivity`] so front ends can show a
//! "waking server" notice while a cold backend spins up.

pub mod api;
pub mod config;
pub mod error;
pub mod files;
pub mod log;
pub mod notice;

pub use api::{ApiClient, ApiRequest, Body};
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use error::{ApiError, ApiResult};
pub use files::file_url;
pub use server_wake::{RequestActivity, Subscription, WAKE_THRESHOLD};
