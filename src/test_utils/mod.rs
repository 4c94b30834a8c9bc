//! Test utilities and mock implementations.
//!
//! This module provides reusable mock implementations of the domain traits
//! for use in unit and integration tests.

pub mod mocks;

pub use mocks::{
    CountingErrorSink, MockConfig, MockDocumentStore, MockKvStore, MockLlmClient,
    MockTableTransport,
};
