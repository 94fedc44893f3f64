//! Declarative extraction engine.
//!
//! Site definitions describe fields as selector lists plus a filter chain.
//! This module compiles those descriptions once and applies them to parsed
//! HTML or JSON documents:
//!
//! - [`FieldSelector`] / [`FieldExtractor`] - candidate selectors, attribute or text, default value
//! - [`Filter`] - closed registry of string transforms (`parseSize`, `split`, `regex`, ...)
//! - [`UserInfoPlan`] / [`UserInfoCollector`] - ordered fetch steps with cross-step assertions

mod document;
mod error;
mod filter;
mod selector;
mod user_info;

pub use document::{Document, ResponseType};
pub use error::ExtractError;
pub use filter::{Filter, FilterSpec};
pub use selector::{FieldExtractor, FieldSelector};
pub use user_info::{
    CompiledStep, FetchStepSpec, RequestSpec, UserInfoCollector, UserInfoConfig, UserInfoPlan,
    apply_user_field,
};
