#![doc = "mdm-upload-core: client library for the device-management custom app library."]

//! Uploads a build artifact through a signed storage target and attaches it
//! to a custom app, tolerating the backend's processing delay.
//!
//! # Usage
//! Build a [`transport::HttpTransport`] from a [`config::ClientConfig`] and
//! hand it to [`upload::upload_app`], or drive the release lifecycle in
//! [`release`].

pub mod asset;
pub mod config;
pub mod contract;
pub mod error;
pub mod release;
pub mod transport;
pub mod upload;

pub use error::{Error, Result};
