//! Core types and derivation logic for the QEM bot.
//!
//! Upstream services (SMELT, the QEM dashboard, openQA, the download server,
//! OBS) are reached only through the traits in [`source`]; the HTTP
//! implementations live in `qem-client`.

#![allow(async_fn_in_trait)]

pub mod approve;
pub mod channel;
pub mod error;
pub mod gate;
pub mod incident;
pub mod product;
pub mod raw;
pub mod review;
pub mod revision;
pub mod source;
pub mod sync;

pub use error::{
  ConfigError, Error, GateError, IncidentError, LookupError, Result, SyncError,
};
