//! EcoReceipt client
//!
//! Session management and API orchestration for the EcoReceipt paperless
//! receipt service:
//!
//! - `api`: HTTP gateway (token injection, 401 teardown) and typed endpoints
//! - `session`: persisted session store and the anonymous/active state machine
//! - `dashboard`: concurrent all-or-nothing refresh of receipts and analytics
//! - `chat`: append-only assistant transcript
//! - `receipts`: client-side search and ordering of the receipts list

pub mod api;
pub mod chat;
pub mod config;
pub mod dashboard;
pub mod logging;
pub mod models;
pub mod receipts;
pub mod session;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;
