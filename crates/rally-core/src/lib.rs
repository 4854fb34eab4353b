//! Core types, the feedback aggregator and the reputation-event emitter for
//! Rally match closure.
//!
//! This crate has no HTTP or database dependencies.
//! All other crates depend on it; storage backends implement
//! [`store::MatchStore`].

// Store impls use native `async fn`; the trait spells out the `Send` bounds.
#![allow(async_fn_in_trait)]

pub mod aggregate;
pub mod error;
pub mod matches;
pub mod reputation;
pub mod store;

pub use error::{Error, Result};
