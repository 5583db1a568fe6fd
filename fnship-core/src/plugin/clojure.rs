//! Clojure functions built with Leiningen and deployed on the JVM runtime.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use super::{Plugin, JAR_FILE};
use crate::archive::{copy_entries, ArchiveBuilder};
use crate::error::{ShipError, ShipResult};
use crate::function::FunctionSpec;
use crate::ignore::IGNORE_FILE;
use crate::types::Hook;

/// Runtime the platform runs Clojure jars on.
const RUNTIME_CANONICAL: &str = "java8";

/// Source extensions left out of the archive; the jar carries compiled classes.
const SOURCE_EXTENSIONS: &[&str] = &["clj", "cljx", "cljc"];

fn applies(spec: &FunctionSpec) -> bool {
    spec.config.runtime.starts_with("clojure")
}

fn is_source(name: &str) -> bool {
    name.rsplit('.')
        .next()
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Handles `clojure*` runtimes. The runtime name is rewritten only at Deploy,
/// so Build still sees the original name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClojurePlugin;

#[async_trait]
impl Plugin for ClojurePlugin {
    fn name(&self) -> &str {
        "clojure"
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Open, Hook::Build, Hook::Deploy]
    }

    async fn open(&self, spec: &mut FunctionSpec) -> ShipResult<()> {
        if !applies(spec) {
            return Ok(());
        }

        let hooks = &mut spec.config.hooks;
        if hooks.build.is_empty() {
            hooks.build = format!(
                "lein uberjar && mv target/*-standalone.jar target/{}",
                JAR_FILE
            );
        }
        if hooks.clean.is_empty() {
            hooks.clean = "rm -fr target".to_string();
        }

        // Without a function ignore file only the jar is deployed.
        let own_ignore = tokio::fs::metadata(spec.path.join(IGNORE_FILE)).await.is_ok();
        if !own_ignore {
            spec.ignore.replace(&format!("*\n!**/{}\n", JAR_FILE));
        }
        Ok(())
    }

    async fn build(&self, spec: &mut FunctionSpec, archive: &mut ArchiveBuilder) -> ShipResult<()> {
        if !applies(spec) {
            return Ok(());
        }

        let jar = spec.path.join("target").join(JAR_FILE);
        let bytes = read_jar(&jar).await?;

        let copied = copy_entries(archive, &bytes, |name| !is_source(name))?;
        debug!(function = %spec.name, jar = %jar.display(), entries = copied, "Expanded jar");
        Ok(())
    }

    async fn deploy(&self, spec: &mut FunctionSpec) -> ShipResult<()> {
        if applies(spec) {
            spec.config.runtime = RUNTIME_CANONICAL.to_string();
        }
        Ok(())
    }
}

async fn read_jar(jar: &Path) -> ShipResult<Vec<u8>> {
    tokio::fs::read(jar).await.map_err(|source| ShipError::Io {
        context: "reading clojure jar",
        source,
    })
}
