// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! Project-level orchestration over many functions.
//!
//! Deploys and alias changes fan out one task per function, bounded by the
//! project's concurrency limit. A batch always waits for every task it
//! started; the first failure observed is returned and later ones are
//! logged. Clean, delete and rollback run one function at a time and stop at
//! the first failure.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, ProjectConfig};
use crate::error::{ShipError, ShipResult};
use crate::function::{Deployment, Function, FunctionSpec};
use crate::ignore::{read_ignore_file, IgnoreRules, NameGlobs};
use crate::plugin::PluginRegistry;
use crate::remote::RemoteService;
use crate::types::FunctionName;

/// Directory holding one sub-directory per function.
pub const FUNCTIONS_DIR: &str = "functions";

/// Ignore patterns every function starts with.
pub const DEFAULT_IGNORE: &str = ".fnshipignore\nfunction.json\n";

/// How to open a project.
#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    pub path: PathBuf,
    /// Selects `project.<env>.json`; falls back to `defaultEnvironment`
    /// for name rendering when unset.
    pub environment: Option<String>,
    /// Alias override for every function.
    pub alias: Option<String>,
    /// Concurrency override for batch operations.
    pub concurrency: Option<usize>,
}

impl ProjectOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// A loaded project and its functions.
pub struct Project {
    path: PathBuf,
    config: ProjectConfig,
    environment: Option<String>,
    alias: Option<String>,
    concurrency: usize,
    ignore: IgnoreRules,
    registry: Arc<PluginRegistry>,
    service: Arc<dyn RemoteService>,
    functions: Vec<Arc<Function>>,
}

impl Project {
    /// Read the project configuration and ignore file.
    pub fn open(
        options: ProjectOptions,
        registry: Arc<PluginRegistry>,
        service: Arc<dyn RemoteService>,
    ) -> ShipResult<Self> {
        let config = ConfigLoader::load_project(&options.path, options.environment.as_deref())?;

        let mut ignore = IgnoreRules::new();
        ignore.extend_from(DEFAULT_IGNORE);
        if let Some(content) = read_ignore_file(&options.path)? {
            ignore.extend_from(&content);
        }

        let environment = options
            .environment
            .filter(|e| !e.is_empty())
            .or_else(|| config.default_environment.clone());
        let concurrency = options.concurrency.unwrap_or(config.concurrency).max(1);

        info!(
            project = %config.name,
            environment = environment.as_deref().unwrap_or(""),
            concurrency,
            "Opened project"
        );

        Ok(Self {
            path: options.path,
            config,
            environment,
            alias: options.alias.filter(|a| !a.is_empty()),
            concurrency,
            ignore,
            registry,
            service,
            functions: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn functions(&self) -> &[Arc<Function>] {
        &self.functions
    }

    /// A loaded function by local name.
    pub fn function(&self, name: &str) -> Option<&Arc<Function>> {
        self.functions.iter().find(|f| f.name() == name)
    }

    /// Sorted names of the directories under `functions/`.
    pub fn function_dir_names(&self) -> ShipResult<Vec<String>> {
        let dir = self.path.join(FUNCTIONS_DIR);
        let entries = std::fs::read_dir(&dir).map_err(|source| ShipError::Io {
            context: "listing functions directory",
            source,
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ShipError::Io {
                context: "listing functions directory",
                source,
            })?;
            let is_dir = entry
                .file_type()
                .map_err(|source| ShipError::Io {
                    context: "listing functions directory",
                    source,
                })?
                .is_dir();
            if is_dir {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Load and open every function whose directory name matches one of
    /// `patterns`. No patterns loads every function.
    pub async fn load_functions<S: AsRef<str>>(&mut self, patterns: &[S]) -> ShipResult<()> {
        debug!(path = %self.path.join(FUNCTIONS_DIR).display(), "Loading functions");

        let existing = self.function_dir_names()?;
        let globs = NameGlobs::new(patterns)?;

        for pattern in globs.unmatched(&existing) {
            warn!(pattern = %pattern, "No function in the project matches");
        }

        for name in existing.iter().filter(|n| globs.matches(n)) {
            let function = self.load_function(name).await?;
            self.functions.push(Arc::new(function));
        }

        if self.functions.is_empty() {
            return Err(ShipError::NoFunctionLoaded);
        }
        Ok(())
    }

    /// Load and open the function in `functions/<name>`.
    pub async fn load_function(&self, name: &str) -> ShipResult<Function> {
        let path = self.path.join(FUNCTIONS_DIR).join(name);
        self.load_function_at(name, &path).await
    }

    /// Load and open the function in `path`, named `name`.
    pub async fn load_function_at(&self, name: &str, path: &Path) -> ShipResult<Function> {
        debug!(function = %name, path = %path.display(), "Loading function");

        let wrap = |e: ShipError| e.in_function(name);
        let function_name = FunctionName::new(name).map_err(|e| wrap(e.into()))?;

        let overrides = ConfigLoader::load_function_overrides(path).map_err(wrap)?;
        let mut config = self.config.defaults.merged(overrides);
        if let Some(alias) = &self.alias {
            config.alias = alias.clone();
        }

        let remote_name = self.config.name_template.render(
            &self.config.name,
            name,
            self.environment.as_deref(),
        );

        let spec = FunctionSpec {
            name: function_name,
            remote_name,
            path: path.to_path_buf(),
            config,
            ignore: self.ignore.clone(),
        };

        let mut function = Function::new(spec, Arc::clone(&self.registry), Arc::clone(&self.service));
        function.open().await.map_err(wrap)?;
        Ok(function)
    }

    /// Set an environment variable on every loaded function.
    pub fn set_env(&mut self, name: &str, value: &str) {
        for function in &mut self.functions {
            Arc::make_mut(function).setenv(name, value);
        }
    }

    /// Deploy every loaded function.
    pub async fn deploy(&self) -> ShipResult<Vec<Deployment>> {
        debug!(functions = self.functions.len(), "Deploying functions");
        self.fan_out("deploy", |function| async move { function.deploy().await })
            .await
    }

    /// Deploy, then clean every loaded function.
    pub async fn deploy_and_clean(&self) -> ShipResult<Vec<Deployment>> {
        let deployments = self.deploy().await?;
        self.clean().await?;
        Ok(deployments)
    }

    /// Point `alias` of every function at `reference`, which may be a version
    /// or the name of another alias of that function.
    pub async fn create_or_update_alias(&self, alias: &str, reference: &str) -> ShipResult<()> {
        let alias = Arc::new(alias.to_string());
        let reference = Arc::new(reference.to_string());

        self.fan_out("alias", move |function| {
            let alias = Arc::clone(&alias);
            let reference = Arc::clone(&reference);
            async move {
                let version = function.resolve_version(&reference).await?;
                function.create_or_update_alias(&alias, &version).await
            }
        })
        .await?;
        Ok(())
    }

    /// Run the Clean hooks of every function, one at a time.
    pub async fn clean(&self) -> ShipResult<()> {
        debug!(functions = self.functions.len(), "Cleaning functions");
        for function in &self.functions {
            function
                .clean()
                .await
                .map_err(|e| e.in_function(function.name()))?;
        }
        Ok(())
    }

    /// Delete every function, one at a time. Functions that do not exist
    /// remotely are skipped.
    pub async fn delete(&self) -> ShipResult<()> {
        debug!(functions = self.functions.len(), "Deleting functions");
        for function in &self.functions {
            match function.remote_config().await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    info!(
                        function = %function.name(),
                        "Function is not deployed or was already deleted"
                    );
                    continue;
                }
                Err(e) => return Err(e.in_function(function.name())),
            }

            function
                .delete()
                .await
                .map_err(|e| e.in_function(function.name()))?;
        }
        Ok(())
    }

    /// Roll every function back, one at a time. Stops at the first failure.
    pub async fn rollback(&self) -> ShipResult<()> {
        debug!(functions = self.functions.len(), "Rolling back functions");
        for function in &self.functions {
            function
                .rollback()
                .await
                .map_err(|e| e.in_function(function.name()))?;
        }
        Ok(())
    }

    /// Move every function's alias to `version`, one at a time.
    pub async fn rollback_version(&self, version: &str) -> ShipResult<()> {
        debug!(functions = self.functions.len(), version = %version, "Rolling back functions");
        for function in &self.functions {
            function
                .rollback_version(version)
                .await
                .map_err(|e| e.in_function(function.name()))?;
        }
        Ok(())
    }

    /// Run `task` for every function with at most `concurrency` running at
    /// once. Waits for all tasks; results keep load order.
    async fn fan_out<T, F, Fut>(&self, operation: &'static str, task: F) -> ShipResult<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(Arc<Function>) -> Fut,
        Fut: Future<Output = ShipResult<T>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();

        for (index, function) in self.functions.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let name = function.name().to_string();
            let fut = task(Arc::clone(function));

            join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => fut.await,
                    Err(e) => Err(ShipError::Task {
                        message: e.to_string(),
                    }),
                };
                (index, result.map_err(|e| e.in_function(name)))
            });
        }

        let mut results = Vec::with_capacity(self.functions.len());
        let mut first_error = None;

        while let Some(joined) = join_set.join_next().await {
            let outcome = joined.map_err(|e| ShipError::Task {
                message: e.to_string(),
            });

            match outcome {
                Ok((index, Ok(value))) => results.push((index, value)),
                Ok((_, Err(e))) | Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    } else {
                        error!(operation, error = %e, "Batch task failed");
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().map(|(_, value)| value).collect())
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.config.name)
            .field("path", &self.path)
            .field("environment", &self.environment)
            .field("functions", &self.functions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;
    use tempfile::TempDir;

    fn project(dir: &Path) -> Project {
        std::fs::write(
            dir.join("project.json"),
            r#"{ "name": "shop", "role": "arn:role", "runtime": "nodejs", "concurrency": 3 }"#,
        )
        .unwrap();
        Project::open(
            ProjectOptions::new(dir),
            Arc::new(PluginRegistry::with_builtins()),
            Arc::new(MemoryRemote::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_function_dirs_sorted_and_files_skipped() {
        let dir = TempDir::new().unwrap();
        let functions = dir.path().join(FUNCTIONS_DIR);
        std::fs::create_dir_all(functions.join("worker")).unwrap();
        std::fs::create_dir_all(functions.join("api")).unwrap();
        std::fs::write(functions.join("README.md"), "notes").unwrap();

        let project = project(dir.path());
        assert_eq!(project.function_dir_names().unwrap(), vec!["api", "worker"]);
        assert_eq!(project.concurrency(), 3);
    }

    #[tokio::test]
    async fn test_alias_override_and_set_env() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(FUNCTIONS_DIR).join("api")).unwrap();
        std::fs::write(
            dir.path().join("project.json"),
            r#"{ "name": "shop", "role": "arn:role", "runtime": "nodejs" }"#,
        )
        .unwrap();

        let options = ProjectOptions {
            alias: Some("canary".to_string()),
            ..ProjectOptions::new(dir.path())
        };
        let mut project = Project::open(
            options,
            Arc::new(PluginRegistry::with_builtins()),
            Arc::new(MemoryRemote::new()),
        )
        .unwrap();
        project.load_functions(&["api"]).await.unwrap();
        project.set_env("STAGE", "beta");

        let api = project.function("api").unwrap();
        assert_eq!(api.config().alias, "canary");
        assert_eq!(api.config().environment["STAGE"], "beta");
    }

    #[tokio::test]
    async fn test_invalid_function_is_named() {
        let dir = TempDir::new().unwrap();
        let api = dir.path().join(FUNCTIONS_DIR).join("api");
        std::fs::create_dir_all(&api).unwrap();
        std::fs::write(api.join("function.json"), r#"{ "role": "" }"#).unwrap();

        let mut project = project(dir.path());
        let err = project.load_functions::<&str>(&[]).await.unwrap_err();
        assert!(err.to_string().starts_with("function api:"));
        assert!(err.to_string().contains("role"));
    }
}
