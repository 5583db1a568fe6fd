//! Environment file injection.

use async_trait::async_trait;
use tracing::debug;

use super::Plugin;
use crate::archive::ArchiveBuilder;
use crate::error::{ShipError, ShipResult};
use crate::function::FunctionSpec;
use crate::types::Hook;

/// Archive entry holding the function's environment as a JSON object.
pub const ENV_FILE: &str = ".env.json";

/// Adds [`ENV_FILE`] to the archive when the function has any environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvPlugin;

#[async_trait]
impl Plugin for EnvPlugin {
    fn name(&self) -> &str {
        "env"
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Build]
    }

    async fn build(&self, spec: &mut FunctionSpec, archive: &mut ArchiveBuilder) -> ShipResult<()> {
        if spec.config.environment.is_empty() {
            return Ok(());
        }

        // BTreeMap keeps the serialized bytes stable across builds.
        let content =
            serde_json::to_vec(&spec.config.environment).map_err(|e| ShipError::Serialization {
                context: "environment file",
                message: e.to_string(),
            })?;

        debug!(function = %spec.name, vars = spec.config.environment.len(), "Adding environment file");
        archive.add_bytes(ENV_FILE, &content)?;
        Ok(())
    }
}
