//! # Custom resources module
//!
//! This module provide the custom resources exposed by the operator and
//! their reconciliation logic

pub mod database;
