// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the admission decision engine.
//!
//! These tests drive complete decisions (decode, namespace gate, rule sets,
//! patch synthesis) WITHOUT requiring a live Kubernetes cluster. Namespaces
//! come from a static lookup table.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run specific test
//! cargo test --test functional test_bare_pod_in_project_namespace
//! ```
//!
//! ## Test Categories
//!
//! - **Scenario tests**: end-to-end mutation and validation of realistic workloads
//! - **Parity tests**: the same pod judged identically bare and inside every template kind
//! - **Idempotence tests**: applying a patch and deciding again yields no further changes

#[path = "../common/mod.rs"]
mod common;

mod idempotence_tests;
mod scenario_tests;
