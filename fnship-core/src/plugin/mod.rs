// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! Lifecycle plugins and their dispatch.
//!
//! A plugin declares which [`Hook`]s it handles and overrides only those
//! methods. Plugins are registered once, by unique name, into a
//! [`PluginRegistry`] that is handed to every project and function. A
//! function's `plugins` list selects and orders the plugins run for it.

mod clojure;
mod env;
mod hooks;
mod inference;
mod java;
mod runtime;
mod rust;
mod shim;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::archive::ArchiveBuilder;
use crate::error::{ShipError, ShipResult};
use crate::function::FunctionSpec;
use crate::types::Hook;

pub use clojure::ClojurePlugin;
pub use env::{EnvPlugin, ENV_FILE};
pub use hooks::HooksPlugin;
pub use inference::InferencePlugin;
pub use java::{JavaPlugin, JAR_FILE};
pub use runtime::{GolangPlugin, NodejsPlugin, PythonPlugin, RubyPlugin};
pub use rust::{RustPlugin, RustTarget};
pub use shim::{ShimPlugin, SHIM_ENTRY};

/// A named unit of lifecycle logic.
///
/// Every hook method defaults to a no-op. Dispatch only calls the methods
/// for hooks listed by [`Plugin::hooks`].
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Registry name.
    fn name(&self) -> &str;

    /// Lifecycle points this plugin handles.
    fn hooks(&self) -> &'static [Hook];

    /// Resolve configuration. May change any field of the spec.
    async fn open(&self, _spec: &mut FunctionSpec) -> ShipResult<()> {
        Ok(())
    }

    /// Contribute to the archive being built.
    async fn build(&self, _spec: &mut FunctionSpec, _archive: &mut ArchiveBuilder) -> ShipResult<()> {
        Ok(())
    }

    /// Remove local build byproducts.
    async fn clean(&self, _spec: &FunctionSpec) -> ShipResult<()> {
        Ok(())
    }

    /// Last change before upload.
    async fn deploy(&self, _spec: &mut FunctionSpec) -> ShipResult<()> {
        Ok(())
    }
}

/// Name-indexed plugin set.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in plugin.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: Vec<Arc<dyn Plugin>> = vec![
            Arc::new(InferencePlugin::default()),
            Arc::new(GolangPlugin),
            Arc::new(RustPlugin::new(RustTarget::Musl)),
            Arc::new(RustPlugin::new(RustTarget::Gnu)),
            Arc::new(PythonPlugin),
            Arc::new(NodejsPlugin),
            Arc::new(JavaPlugin),
            Arc::new(RubyPlugin),
            Arc::new(HooksPlugin),
            Arc::new(ClojurePlugin),
            Arc::new(EnvPlugin),
            Arc::new(ShimPlugin),
        ];

        for plugin in builtins {
            registry.plugins.insert(plugin.name().to_string(), plugin);
        }
        registry
    }

    /// Add a plugin. Names must be unique.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), ShipError> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(ShipError::DuplicatePlugin { name });
        }
        self.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Fail on the first name in `names` that is not registered.
    pub fn check(&self, names: &[String]) -> ShipResult<()> {
        match names.iter().find(|n| !self.contains(n)) {
            Some(name) => Err(ShipError::UnknownPlugin { name: name.clone() }),
            None => Ok(()),
        }
    }

    /// Plugins from `names`, in order, that handle `hook`.
    fn pipeline(&self, names: &[String], hook: Hook) -> ShipResult<Vec<(String, Arc<dyn Plugin>)>> {
        let mut stages = Vec::new();
        for name in names {
            let plugin = self
                .plugins
                .get(name)
                .ok_or_else(|| ShipError::UnknownPlugin { name: name.clone() })?;
            if plugin.hooks().contains(&hook) {
                stages.push((name.clone(), Arc::clone(plugin)));
            }
        }
        Ok(stages)
    }

    /// Run the Open hooks configured for `spec`.
    pub async fn run_open(&self, spec: &mut FunctionSpec) -> ShipResult<()> {
        let names = spec.config.plugins.clone();
        for (name, plugin) in self.pipeline(&names, Hook::Open)? {
            debug!(function = %spec.name, plugin = %name, hook = "open", "Running hook");
            plugin
                .open(spec)
                .await
                .map_err(|e| e.in_plugin(name, Hook::Open))?;
        }
        Ok(())
    }

    /// Run the Build hooks configured for `spec`.
    pub async fn run_build(&self, spec: &mut FunctionSpec, archive: &mut ArchiveBuilder) -> ShipResult<()> {
        let names = spec.config.plugins.clone();
        for (name, plugin) in self.pipeline(&names, Hook::Build)? {
            debug!(function = %spec.name, plugin = %name, hook = "build", "Running hook");
            plugin
                .build(spec, archive)
                .await
                .map_err(|e| e.in_plugin(name, Hook::Build))?;
        }
        Ok(())
    }

    /// Run the Clean hooks configured for `spec`.
    pub async fn run_clean(&self, spec: &FunctionSpec) -> ShipResult<()> {
        for (name, plugin) in self.pipeline(&spec.config.plugins, Hook::Clean)? {
            debug!(function = %spec.name, plugin = %name, hook = "clean", "Running hook");
            plugin
                .clean(spec)
                .await
                .map_err(|e| e.in_plugin(name, Hook::Clean))?;
        }
        Ok(())
    }

    /// Run the Deploy hooks configured for `spec`.
    pub async fn run_deploy(&self, spec: &mut FunctionSpec) -> ShipResult<()> {
        let names = spec.config.plugins.clone();
        for (name, plugin) in self.pipeline(&names, Hook::Deploy)? {
            debug!(function = %spec.name, plugin = %name, hook = "deploy", "Running hook");
            plugin
                .deploy(spec)
                .await
                .map_err(|e| e.in_plugin(name, Hook::Deploy))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use crate::config::FunctionConfig;
    use crate::error::HookError;
    use crate::ignore::IgnoreRules;
    use crate::types::FunctionName;

    struct Recorder {
        name: &'static str,
        hooks: &'static [Hook],
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl Plugin for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn hooks(&self) -> &'static [Hook] {
            self.hooks
        }

        async fn open(&self, spec: &mut FunctionSpec) -> ShipResult<()> {
            self.log.lock().unwrap().push(format!("{}:open", self.name));
            spec.config.description.push_str(self.name);
            if self.fail {
                return Err(HookError {
                    hook: Hook::Open,
                    command: "false".to_string(),
                    output: "boom".to_string(),
                }
                .into());
            }
            Ok(())
        }

        async fn deploy(&self, _spec: &mut FunctionSpec) -> ShipResult<()> {
            self.log.lock().unwrap().push(format!("{}:deploy", self.name));
            Ok(())
        }
    }

    fn spec(plugins: &[&str]) -> FunctionSpec {
        FunctionSpec {
            name: FunctionName::new("api").unwrap(),
            remote_name: "shop_api".to_string(),
            path: PathBuf::from("/tmp/api"),
            config: FunctionConfig {
                plugins: plugins.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            },
            ignore: IgnoreRules::new(),
        }
    }

    fn registry(log: &Arc<Mutex<Vec<String>>>, failing: &str) -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        for (name, hooks) in [
            ("a", &[Hook::Open, Hook::Deploy][..]),
            ("b", &[Hook::Deploy][..]),
            ("c", &[Hook::Open][..]),
        ] {
            registry
                .register(Arc::new(Recorder {
                    name,
                    hooks,
                    log: Arc::clone(log),
                    fail: name == failing,
                }))
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_dispatch_follows_configured_order_and_capabilities() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&log, "");
        let mut spec = spec(&["c", "b", "a"]);

        registry.run_open(&mut spec).await.unwrap();
        registry.run_deploy(&mut spec).await.unwrap();

        assert_eq!(spec.config.description, "ca");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["c:open", "a:open", "b:deploy", "a:deploy"]
        );
    }

    #[tokio::test]
    async fn test_failure_aborts_and_names_plugin() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&log, "c");
        let mut spec = spec(&["c", "a"]);

        let err = registry.run_open(&mut spec).await.unwrap_err();
        match err {
            ShipError::Plugin { plugin, hook, .. } => {
                assert_eq!(plugin, "c");
                assert_eq!(hook, Hook::Open);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*log.lock().unwrap(), vec!["c:open"]);
    }

    #[tokio::test]
    async fn test_unknown_plugin_is_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(&log, "");
        let mut spec = spec(&["a", "missing"]);

        let err = registry.run_open(&mut spec).await.unwrap_err();
        assert!(matches!(err, ShipError::UnknownPlugin { ref name } if name == "missing"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = PluginRegistry::with_builtins();
        let err = registry.register(Arc::new(HooksPlugin)).unwrap_err();
        assert!(matches!(err, ShipError::DuplicatePlugin { .. }));
        assert!(registry.contains("inference"));
        assert_eq!(registry.names().len(), 12);
    }
}
