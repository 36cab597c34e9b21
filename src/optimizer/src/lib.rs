//! Transformation of parsed statements into logical operator trees.

pub mod alias_scope;
pub mod binder;
pub mod config;
mod join;
pub mod predicate;
pub mod query_to_operator;
#[cfg(test)]
mod query_to_operator_tests;

pub use config::PlannerConfig;
pub use query_to_operator::QueryToOperatorTransformer;
