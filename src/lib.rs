//! CTA strategy layer: a strategy base with engine-mediated order placement,
//! composable signals, and target-position trading that reconciles a desired
//! net position against the actual one.

pub mod config;
pub mod db;
pub mod engine;
pub mod models;
pub mod replay;
pub mod runner;
pub mod strategy;
