//! ps-s3: S3-compatible object-store adapter for pshell
//!
//! Implements the `Backend` contract over aws-sdk-s3. This is the only
//! crate that depends on the AWS SDK.

pub mod client;
pub mod policy;
pub mod split;

pub use client::S3Client;
pub use split::ObjectAddr;
