//! Node.js adapter for runtimes the platform does not run natively.

use async_trait::async_trait;
use tracing::debug;

use super::Plugin;
use crate::archive::ArchiveBuilder;
use crate::error::ShipResult;
use crate::function::FunctionSpec;
use crate::types::Hook;

/// Archive entry the adapter is written to.
pub const SHIM_ENTRY: &str = "index.js";

const SHIM_SOURCE: &str = include_str!("shim/index.js");

/// Adds the adapter script when `shim` is enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShimPlugin;

#[async_trait]
impl Plugin for ShimPlugin {
    fn name(&self) -> &str {
        "shim"
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Build]
    }

    async fn build(&self, spec: &mut FunctionSpec, archive: &mut ArchiveBuilder) -> ShipResult<()> {
        if !spec.config.shim {
            return Ok(());
        }
        debug!(function = %spec.name, "Adding shim");
        archive.add_bytes(SHIM_ENTRY, SHIM_SOURCE.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::read_entries;
    use std::path::Path;

    #[tokio::test]
    async fn test_shim_added_only_when_enabled() {
        let mut spec = FunctionSpec::for_tests("api", Path::new("/fn"));
        let mut archive = ArchiveBuilder::new();
        ShimPlugin.build(&mut spec, &mut archive).await.unwrap();
        assert!(archive.is_empty());

        spec.config.shim = true;
        ShimPlugin.build(&mut spec, &mut archive).await.unwrap();
        let entries = read_entries(&archive.close().unwrap()).unwrap();
        assert_eq!(entries[0].0, SHIM_ENTRY);
        assert!(String::from_utf8_lossy(&entries[0].1).contains("exports.handle"));
    }
}
