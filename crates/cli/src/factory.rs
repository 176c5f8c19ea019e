//! Adapter construction
//!
//! The one place where the adapter crates are linked together: descriptors
//! from the profile become live backend clients by kind.

use std::sync::Arc;

use ps_core::{Backend, BackendFactory, BackendKind, EndpointDescriptor, Result};

/// Builds asset-store and object-store clients from descriptors
pub struct AdapterFactory;

impl BackendFactory for AdapterFactory {
    fn create(&self, prefix: &str, descriptor: &EndpointDescriptor) -> Result<Arc<dyn Backend>> {
        match descriptor.kind {
            BackendKind::Asset => Ok(Arc::new(ps_asset::AssetClient::new(
                prefix,
                descriptor.clone(),
            )?)),
            BackendKind::S3 => Ok(Arc::new(ps_s3::S3Client::new(prefix, descriptor.clone())?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_builds_by_kind() {
        let factory = AdapterFactory;

        let asset = EndpointDescriptor::new(BackendKind::Asset, "https://assets.example.com");
        let backend = factory.create("/assets", &asset).unwrap();
        assert_eq!(backend.kind(), BackendKind::Asset);

        let s3 = EndpointDescriptor::new(BackendKind::S3, "https://s3.example.com");
        let backend = factory.create("/projects/x", &s3).unwrap();
        assert_eq!(backend.kind(), BackendKind::S3);
    }
}
