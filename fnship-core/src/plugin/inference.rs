//! Runtime inference from marker files.

use async_trait::async_trait;
use tracing::debug;

use super::Plugin;
use crate::error::ShipResult;
use crate::function::FunctionSpec;
use crate::types::Hook;

/// Fills in `runtime` from the first marker file present in the function
/// directory. An explicit runtime is never overridden.
#[derive(Debug, Clone)]
pub struct InferencePlugin {
    markers: Vec<(String, String)>,
}

impl InferencePlugin {
    /// Markers checked in order; the first hit wins.
    pub fn new(markers: Vec<(String, String)>) -> Self {
        Self { markers }
    }
}

impl Default for InferencePlugin {
    fn default() -> Self {
        let markers = [
            ("main.py", "python"),
            ("index.js", "nodejs"),
            ("main.go", "golang"),
            ("project.clj", "clojure"),
            ("target/fnship.jar", "java"),
            ("build/libs/fnship.jar", "java"),
            ("lambda.rb", "ruby"),
        ];
        Self::new(
            markers
                .iter()
                .map(|(file, runtime)| (file.to_string(), runtime.to_string()))
                .collect(),
        )
    }
}

#[async_trait]
impl Plugin for InferencePlugin {
    fn name(&self) -> &str {
        "inference"
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Open]
    }

    async fn open(&self, spec: &mut FunctionSpec) -> ShipResult<()> {
        if !spec.config.runtime.is_empty() {
            return Ok(());
        }

        for (file, runtime) in &self.markers {
            if tokio::fs::metadata(spec.path.join(file)).await.is_ok() {
                debug!(function = %spec.name, runtime = %runtime, marker = %file, "Inferred runtime");
                spec.config.runtime = runtime.clone();
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FunctionSpec;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_infers_from_marker() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.py"), "def handle(e, c): pass").unwrap();

        let mut spec = FunctionSpec::for_tests("api", dir.path());
        InferencePlugin::default().open(&mut spec).await.unwrap();
        assert_eq!(spec.config.runtime, "python");
    }

    #[tokio::test]
    async fn test_explicit_runtime_kept() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.js"), "").unwrap();

        let mut spec = FunctionSpec::for_tests("api", dir.path());
        spec.config.runtime = "golang".to_string();
        InferencePlugin::default().open(&mut spec).await.unwrap();
        assert_eq!(spec.config.runtime, "golang");
    }

    #[tokio::test]
    async fn test_nested_jar_marker() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("build/libs")).unwrap();
        std::fs::write(dir.path().join("build/libs/fnship.jar"), "").unwrap();

        let mut spec = FunctionSpec::for_tests("api", dir.path());
        InferencePlugin::default().open(&mut spec).await.unwrap();
        assert_eq!(spec.config.runtime, "java");
    }
}
