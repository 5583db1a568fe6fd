//! Java functions deployed as the expanded contents of a fat jar.

use async_trait::async_trait;
use tracing::debug;

use super::Plugin;
use crate::archive::{copy_entries, ArchiveBuilder};
use crate::error::{ShipError, ShipResult};
use crate::function::FunctionSpec;
use crate::types::Hook;

/// Jar produced by the function's build tool.
pub const JAR_FILE: &str = "fnship.jar";

/// Directories searched for [`JAR_FILE`], in order.
const JAR_DIRS: &[&str] = &["target", "build/libs"];

#[derive(Debug, Clone, Copy, Default)]
pub struct JavaPlugin;

#[async_trait]
impl Plugin for JavaPlugin {
    fn name(&self) -> &str {
        "java"
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Open, Hook::Build]
    }

    async fn open(&self, spec: &mut FunctionSpec) -> ShipResult<()> {
        if spec.config.runtime != "java" {
            return Ok(());
        }

        if spec.config.handler.is_empty() {
            spec.config.handler = "lambda.Main::handler".to_string();
        }

        // Only the jar's contents are deployed.
        spec.ignore.push("*");
        spec.ignore.push(format!("!**/{}", JAR_FILE));
        Ok(())
    }

    async fn build(&self, spec: &mut FunctionSpec, archive: &mut ArchiveBuilder) -> ShipResult<()> {
        if spec.config.runtime != "java" {
            return Ok(());
        }
        spec.config.runtime = "java8".to_string();

        let mut found = None;
        for dir in JAR_DIRS {
            let candidate = spec.path.join(dir).join(JAR_FILE);
            if tokio::fs::metadata(&candidate).await.is_ok() {
                found = Some(candidate);
                break;
            }
        }

        let jar = found.ok_or_else(|| ShipError::Io {
            context: "locating jar",
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found in {}", JAR_FILE, JAR_DIRS.join(", ")),
            ),
        })?;

        debug!(function = %spec.name, jar = %jar.display(), "Expanding jar");
        let bytes = tokio::fs::read(&jar).await.map_err(|source| ShipError::Io {
            context: "reading jar",
            source,
        })?;
        copy_entries(archive, &bytes, |_| true)?;
        Ok(())
    }
}
