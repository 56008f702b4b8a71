//! # Services module
//!
//! This module provide services to interact with kubernetes, aws and
//! helpers to do so.
pub mod aws;
pub mod cfg;
pub mod crd;
pub mod k8s;
