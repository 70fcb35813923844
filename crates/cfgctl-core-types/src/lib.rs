//! Core types shared across cfgctl facilities
//!
//! This crate provides foundational types used by both error handling
//! and logging facilities:
//!
//! - **Correlation types**: RequestId, TraceId, RequestContext, InvocationOrigin
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;

pub use correlation::{InvocationOrigin, RequestContext, RequestId, TraceId};
