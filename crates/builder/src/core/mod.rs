//! Build orchestration

pub mod builder;
pub mod config;
pub mod context;
