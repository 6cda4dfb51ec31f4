//! Mapping request paths to protected resources.

pub mod cache;
pub mod loader;
pub mod matcher;
pub mod pattern;

use crate::client::models::ResourceRepresentation;
use crate::client::ClientError;
use async_trait::async_trait;

pub use crate::paths::cache::{CacheLookup, PathCache};
pub use crate::paths::loader::configure_paths;
pub use crate::paths::matcher::PathMatcher;

/// Resource registry lookups needed to resolve paths.
#[async_trait]
pub trait ResourceFinder: Send + Sync {
    /// Resources whose URI patterns match the concrete `uri`
    async fn find_by_matching_uri(&self, uri: &str)
        -> Result<Vec<ResourceRepresentation>, ClientError>;

    async fn find_by_uri(&self, uri: &str) -> Result<Vec<ResourceRepresentation>, ClientError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<ResourceRepresentation>, ClientError>;

    async fn find_by_id(&self, id: &str) -> Result<ResourceRepresentation, ClientError>;

    async fn find_all_ids(&self) -> Result<Vec<String>, ClientError>;
}
