//! Integration test suite for scout.
//!
//! These tests run whole research graphs through the executor with
//! scripted models and search tools, so no model binary or network
//! access is needed.
//!
//! # Test Categories
//!
//! - `dag_execution`: ordering, exactly-once dispatch, graph validation
//! - `icp_pipeline`: the full Acme Co pipeline through the research agent
//! - `partial_failure`: failure propagation and partial reports
//! - `degradation`: research without real-time search

mod fixtures;

mod dag_execution;
mod degradation;
mod icp_pipeline;
mod partial_failure;
