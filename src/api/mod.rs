//! Client side of the EcoReceipt HTTP API
//!
//! - `gateway`: bearer injection, header merging, 401 teardown
//! - `client`: typed operations (auth, receipts, analytics, chat)
//! - `error`: error taxonomy shared by both

mod client;
mod error;
mod gateway;

pub use client::{ApiClient, AuthOutcome, CHAT_FALLBACK_REPLY};
pub use error::{extract_detail, ApiError};
pub use gateway::{Gateway, RequestOptions};
