#![doc(test(attr(deny(warnings))))]

//! Journal Core holds the in-memory model of a parsed accounting journal:
//! committed transactions, automated and periodic templates, provenance of
//! every source read, and the finalizer chain each transaction passes before
//! it is committed.

pub mod account;
pub mod commodity;
pub mod config;
pub mod errors;
pub mod journal;
pub mod parser;
pub mod session;
pub mod utils;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::info!("Journal Core tracing initialized.");
    });
}

/// Initializes global tracing using the filter from `config`.
pub fn init_with(config: &config::JournalConfig) {
    INIT_TRACING.call_once(|| {
        utils::init_tracing_with(&config.log_filter);
        tracing::info!(filter = %config.log_filter, "Journal Core tracing initialized.");
    });
}
