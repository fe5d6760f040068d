//! Core traits for the Huckleberry bridge
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`TrackerApi`]: Blocking client for the vendor service
//! - [`TrackerApiFactory`]: Builds a client from configuration

pub mod tracker_api;

pub use tracker_api::{StreamCallback, TrackerApi, TrackerApiFactory};
