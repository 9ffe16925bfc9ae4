//! Block metadata layering.

pub mod manager;
pub mod types;

pub use manager::MetadataLayerManager;
pub use types::{BlockMetadataLayers, PrivateMetadata, PublicMetadata, SizeRange};
