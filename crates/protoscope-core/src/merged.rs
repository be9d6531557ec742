//! Union of several implementations

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::extractor::{DataSourceMetadata, Implementation};
use crate::references::ReferenceMap;
use crate::schema::ProtocolSchema;

/// Implementations queried together, as if they were one.
///
/// References are concatenated per symbol in child order, keeping each
/// entry's own source.
pub struct MergedImplementation {
    display_name: String,
    children: Vec<Arc<dyn Implementation>>,
}

impl MergedImplementation {
    pub fn new(children: Vec<Arc<dyn Implementation>>) -> Self {
        let display_name = children
            .iter()
            .map(|child| child.display_name())
            .collect::<Vec<_>>()
            .join(" + ");
        Self {
            display_name,
            children,
        }
    }

    pub fn children(&self) -> &[Arc<dyn Implementation>] {
        &self.children
    }
}

impl std::fmt::Debug for MergedImplementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedImplementation")
            .field("display_name", &self.display_name)
            .field("children", &self.children.len())
            .finish()
    }
}

#[async_trait]
impl Implementation for MergedImplementation {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    async fn extract_references(&self, schema: &ProtocolSchema) -> Result<ReferenceMap> {
        let mut merged = ReferenceMap::new();
        for child in &self.children {
            merged.extend(child.extract_references(schema).await?);
        }
        Ok(merged)
    }

    async fn data_source(&self) -> Result<DataSourceMetadata> {
        for child in &self.children {
            let metadata = child.data_source().await?;
            if metadata.repository.is_some() {
                return Ok(metadata);
            }
        }
        Ok(DataSourceMetadata::default())
    }
}
