//! ps-asset: asset-store adapter for pshell
//!
//! Implements the `Backend` contract against a server speaking
//! request-response XML over HTTPS with a session token and a separate data
//! channel. This is the only crate that talks the service's XML dialect.

pub mod client;
pub mod service;
pub mod xml;

pub use client::AssetClient;
