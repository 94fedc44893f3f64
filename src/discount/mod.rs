//! Discount levels, promotion resolution and download feasibility.
//!
//! - [`DiscountLevel`] - closed set of site promotions with ratio semantics and a priority order
//! - [`PromotionRule`] / [`resolve_discount`] - time-bounded overrides on top of a base discount
//! - [`check_feasibility`] - whether a transfer finishes before its discount expires

mod feasibility;
mod level;
mod promotion;

pub use feasibility::{Feasibility, check_feasibility};
pub use level::DiscountLevel;
pub use promotion::{PromotionRule, resolve_discount};
