// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! Lifecycle of a single deployable function.
//!
//! A [`Function`] owns its resolved [`FunctionSpec`] and talks to the
//! platform through a shared [`RemoteService`]. Everything after `open` takes
//! `&self`: hooks that run during build, deploy and clean work on a copy of
//! the spec, so functions stay read-only while a project batch is running.

use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::archive::{content_hash, join_entry_path, ArchiveBuilder};
use crate::config::FunctionConfig;
use crate::diff::diff_config;
use crate::error::{ArchiveError, InvokeError, RollbackError, ShipError, ShipResult};
use crate::ignore::{read_ignore_file, IgnoreMatcher, IgnoreRules};
use crate::plugin::PluginRegistry;
use crate::remote::{
    all_aliases, all_versions, CodeUpdate, FunctionDefinition, FunctionSettings, InvocationKind,
    InvokeRequest, RemoteFunctionConfig, RemoteService,
};
use crate::types::{compare_versions, is_published, FunctionName, LATEST_VERSION};

/// Environment variable holding the local function name.
pub const FUNCTION_NAME_ENV: &str = "FNSHIP_FUNCTION_NAME";

/// Environment variable holding the remote function name.
pub const REMOTE_NAME_ENV: &str = "FNSHIP_REMOTE_NAME";

/// Everything plugins may read or change about a function.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub name: FunctionName,
    /// Name on the remote platform.
    pub remote_name: String,
    /// Function directory.
    pub path: PathBuf,
    pub config: FunctionConfig,
    /// Patterns excluded from the archive.
    pub ignore: IgnoreRules,
}

impl FunctionSpec {
    /// Settings sent on create and configuration update.
    pub fn settings(&self) -> FunctionSettings {
        let c = &self.config;
        FunctionSettings {
            description: c.description.clone(),
            runtime: c.runtime.clone(),
            handler: c.handler.clone(),
            memory: c.memory,
            timeout: c.timeout,
            role: c.role.clone(),
            environment: c.environment.clone(),
            vpc: c.vpc.clone(),
            kms_key_arn: c.kms_key_arn.clone(),
            dead_letter_arn: c.dead_letter_arn.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(name: &str, path: &std::path::Path) -> Self {
        Self {
            name: FunctionName::new(name).unwrap(),
            remote_name: format!("test_{}", name),
            path: path.to_path_buf(),
            config: FunctionConfig::default(),
            ignore: IgnoreRules::new(),
        }
    }
}

/// What a deploy did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployAction {
    /// The function did not exist and was created.
    Created,
    /// New code (and possibly configuration) was published.
    Updated,
    /// Nothing was uploaded; the alias was re-pinned.
    Unchanged,
}

/// Result of [`Function::deploy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    pub function: String,
    pub action: DeployAction,
    /// Version the alias points at afterwards.
    pub version: String,
    /// Versions removed by retention.
    pub removed_versions: Vec<String>,
}

/// Successful invocation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub payload: Vec<u8>,
    /// Decoded tail of the execution log.
    pub logs: String,
}

/// Error body written by the function runtime.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ErrorPayload {
    error_message: String,
    error_type: String,
    stack_trace: Vec<String>,
}

/// Published versions to delete so at most `retained` of `versions` remain.
///
/// `versions` must be ordered oldest first and exclude `$LATEST`. A retained
/// count of zero selects every version.
pub fn versions_to_cleanup(versions: &[String], retained: usize) -> Vec<String> {
    let excess = versions.len().saturating_sub(retained);
    versions[..excess].to_vec()
}

/// One deployable function.
#[derive(Clone)]
pub struct Function {
    spec: FunctionSpec,
    matcher: Option<IgnoreMatcher>,
    registry: Arc<PluginRegistry>,
    service: Arc<dyn RemoteService>,
}

impl Function {
    pub fn new(
        spec: FunctionSpec,
        registry: Arc<PluginRegistry>,
        service: Arc<dyn RemoteService>,
    ) -> Self {
        Self {
            spec,
            matcher: None,
            registry,
            service,
        }
    }

    pub fn name(&self) -> &str {
        self.spec.name.as_str()
    }

    pub fn remote_name(&self) -> &str {
        &self.spec.remote_name
    }

    pub fn spec(&self) -> &FunctionSpec {
        &self.spec
    }

    pub fn config(&self) -> &FunctionConfig {
        &self.spec.config
    }

    pub fn is_open(&self) -> bool {
        self.matcher.is_some()
    }

    /// Resolve the final configuration.
    ///
    /// Sets the built-in environment, runs the Open hooks, validates the
    /// required fields, then appends the function's own ignore file.
    pub async fn open(&mut self) -> ShipResult<()> {
        let name = self.spec.name.to_string();
        let remote_name = self.spec.remote_name.clone();
        self.spec.config.setenv(FUNCTION_NAME_ENV, name.clone());
        self.spec.config.setenv(REMOTE_NAME_ENV, remote_name);

        self.registry.check(&self.spec.config.plugins)?;
        self.registry.run_open(&mut self.spec).await?;
        self.spec.config.validate(&name)?;

        if let Some(content) = read_ignore_file(&self.spec.path)? {
            self.spec.ignore.extend_from(&content);
        }
        self.matcher = Some(self.spec.ignore.compile(&self.spec.path)?);

        debug!(function = %name, runtime = %self.spec.config.runtime, "Opened function");
        Ok(())
    }

    /// Set an environment variable on the resolved configuration.
    pub fn setenv(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.spec.config.setenv(name, value);
    }

    /// Build the archive and return its bytes.
    pub async fn build(&self) -> ShipResult<Vec<u8>> {
        let mut working = self.spec.clone();
        self.build_with(&mut working).await
    }

    async fn build_with(&self, spec: &mut FunctionSpec) -> ShipResult<Vec<u8>> {
        let matcher = self.matcher.as_ref().ok_or_else(|| ShipError::NotOpen {
            name: self.name().to_string(),
        })?;
        let mut archive = ArchiveBuilder::new();

        self.registry.run_build(spec, &mut archive).await?;

        let root = spec.path.clone();
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || {
                    let rel = entry.path().strip_prefix(&root).unwrap_or(entry.path());
                    !matcher.is_ignored(rel, entry.file_type().is_dir())
                }
            });

        for entry in walker {
            let entry = entry.map_err(|e| ArchiveError::Io {
                path: e.path().unwrap_or(&root).to_path_buf(),
                source: e.into(),
            })?;

            let file_type = entry.file_type();
            if !(file_type.is_file() || file_type.is_symlink()) {
                continue;
            }

            let rel = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            let name = join_entry_path("", rel);
            if archive.contains(&name) {
                debug!(function = %spec.name, entry = %name, "Entry provided by a plugin, skipping file");
                continue;
            }
            archive.add_path(&name, entry.path())?;
        }

        let bytes = archive.close()?;
        debug!(function = %spec.name, entries = archive.len(), bytes = bytes.len(), "Created build");
        Ok(bytes)
    }

    /// Archive bytes for a deploy: the pre-built archive when configured,
    /// otherwise a fresh build.
    async fn package(&self, spec: &mut FunctionSpec) -> ShipResult<Vec<u8>> {
        match &spec.config.zip {
            Some(zip) => {
                let path = if zip.is_absolute() {
                    zip.clone()
                } else {
                    spec.path.join(zip)
                };
                debug!(function = %spec.name, zip = %path.display(), "Using pre-built archive");
                tokio::fs::read(&path).await.map_err(|source| ShipError::Io {
                    context: "reading pre-built archive",
                    source,
                })
            }
            None => self.build_with(spec).await,
        }
    }

    /// Build, run Deploy hooks, then create or update the remote function.
    pub async fn deploy(&self) -> ShipResult<Deployment> {
        let mut working = self.spec.clone();
        let code = self.package(&mut working).await?;
        self.registry.run_deploy(&mut working).await?;

        let remote = match self.remote_config().await {
            Ok(remote) => remote,
            Err(e) if e.is_not_found() => return self.create(&working, code).await,
            Err(e) => return Err(e),
        };

        let settings = working.settings();
        let changes = diff_config(&settings, &remote);

        if !changes.is_empty() {
            for change in &changes {
                debug!(function = %self.remote_name(), change = %change, "Config changed");
            }
            info!(function = %self.remote_name(), fields = changes.len(), "Updating config");
            self.service
                .update_function_configuration(&working.remote_name, &settings)
                .await?;
            // Published versions snapshot configuration, so the new config
            // only reaches the alias through a new version.
            return self.update(code).await;
        }

        let local_hash = content_hash(&code);
        if local_hash != remote.code_sha256 {
            debug!(
                function = %self.remote_name(),
                local = %local_hash,
                remote = %remote.code_sha256,
                "Code changed"
            );
            return self.update(code).await;
        }

        let version = if is_published(&remote.version) {
            Some(remote.version.clone())
        } else {
            self.versions().await?.pop()
        };

        let Some(version) = version else {
            // Never published; publish what is there now.
            return self.update(code).await;
        };

        info!(function = %self.remote_name(), version = %version, "Code unchanged");
        self.create_or_update_alias(&self.spec.config.alias, &version)
            .await?;

        Ok(Deployment {
            function: self.remote_name().to_string(),
            action: DeployAction::Unchanged,
            version,
            removed_versions: Vec::new(),
        })
    }

    async fn create(&self, spec: &FunctionSpec, code: Vec<u8>) -> ShipResult<Deployment> {
        info!(function = %spec.remote_name, "Creating function");

        let created = self
            .service
            .create_function(&FunctionDefinition {
                function_name: spec.remote_name.clone(),
                settings: spec.settings(),
                code,
                publish: true,
            })
            .await?;

        self.create_or_update_alias(&spec.config.alias, &created.version)
            .await?;

        info!(function = %spec.remote_name, version = %created.version, "Function created");
        Ok(Deployment {
            function: spec.remote_name.clone(),
            action: DeployAction::Created,
            version: created.version,
            removed_versions: Vec::new(),
        })
    }

    /// Publish `code`, move the alias, then apply retention.
    async fn update(&self, code: Vec<u8>) -> ShipResult<Deployment> {
        info!(function = %self.remote_name(), "Updating function");

        let updated = self
            .service
            .update_function_code(&CodeUpdate {
                function_name: self.spec.remote_name.clone(),
                code,
                publish: true,
            })
            .await?;

        self.create_or_update_alias(&self.spec.config.alias, &updated.version)
            .await?;
        info!(function = %self.remote_name(), version = %updated.version, "Function updated");

        let stale = self.versions_to_cleanup(&updated.version).await?;
        self.remove_versions(&stale).await?;

        Ok(Deployment {
            function: self.remote_name().to_string(),
            action: DeployAction::Updated,
            version: updated.version,
            removed_versions: stale,
        })
    }

    async fn remove_versions(&self, versions: &[String]) -> ShipResult<()> {
        for version in versions {
            debug!(function = %self.remote_name(), version = %version, "Cleaning up version");
            self.service
                .delete_function(&self.spec.remote_name, Some(version))
                .await?;
        }
        Ok(())
    }

    /// Point `alias` at `version`, creating the alias when needed.
    ///
    /// Makes one create attempt and, only if the alias already exists, one
    /// update with the same pair.
    pub async fn create_or_update_alias(&self, alias: &str, version: &str) -> ShipResult<()> {
        match self
            .service
            .create_alias(&self.spec.remote_name, alias, version)
            .await
        {
            Ok(_) => {
                info!(function = %self.remote_name(), alias = %alias, version = %version, "Created alias");
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                self.service
                    .update_alias(&self.spec.remote_name, alias, version)
                    .await?;
                info!(function = %self.remote_name(), alias = %alias, version = %version, "Updated alias");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Toggle the alias between the two newest published versions.
    ///
    /// When the alias points at the newest version it moves to the one
    /// before; otherwise it moves to the newest.
    pub async fn rollback(&self) -> ShipResult<String> {
        info!(function = %self.remote_name(), "Rolling back");

        let current = self.current_version().await?;
        debug!(function = %self.remote_name(), version = %current, "Current version");

        let versions = self.versions().await?;
        let [.., prev, latest] = versions.as_slice() else {
            return Err(RollbackError::SingleVersion.into());
        };

        let target = if current == *latest { prev } else { latest };
        self.service
            .update_alias(&self.spec.remote_name, &self.spec.config.alias, target)
            .await?;

        info!(function = %self.remote_name(), version = %target, "Function rolled back");
        Ok(target.clone())
    }

    /// Move the alias to `version`.
    pub async fn rollback_version(&self, version: &str) -> ShipResult<()> {
        info!(function = %self.remote_name(), version = %version, "Rolling back");

        let current = self.current_version().await?;
        if current == version {
            return Err(RollbackError::VersionCurrentlyDeployed {
                version: version.to_string(),
            }
            .into());
        }

        self.service
            .update_alias(&self.spec.remote_name, &self.spec.config.alias, version)
            .await?;

        info!(function = %self.remote_name(), version = %version, "Function rolled back");
        Ok(())
    }

    /// Invoke the aliased version synchronously with log tailing.
    pub async fn invoke<E, C>(&self, event: &E, context: &C) -> ShipResult<Invocation>
    where
        E: Serialize + Sync + ?Sized,
        C: Serialize + Sync + ?Sized,
    {
        self.invoke_as(InvocationKind::RequestResponse, event, context)
            .await
    }

    pub async fn invoke_as<E, C>(
        &self,
        kind: InvocationKind,
        event: &E,
        context: &C,
    ) -> ShipResult<Invocation>
    where
        E: Serialize + Sync + ?Sized,
        C: Serialize + Sync + ?Sized,
    {
        let payload = serde_json::to_vec(event).map_err(|e| ShipError::Serialization {
            context: "invocation event",
            message: e.to_string(),
        })?;
        let client_context = serde_json::to_vec(context).map_err(|e| ShipError::Serialization {
            context: "invocation context",
            message: e.to_string(),
        })?;

        let response = self
            .service
            .invoke(&InvokeRequest {
                function_name: self.spec.remote_name.clone(),
                qualifier: Some(self.spec.config.alias.clone()),
                kind,
                payload,
                client_context: Some(BASE64.encode(client_context)),
                tail_logs: kind == InvocationKind::RequestResponse,
            })
            .await?;

        let logs = match &response.log_result {
            Some(encoded) => {
                let decoded = BASE64.decode(encoded).map_err(|e| ShipError::Serialization {
                    context: "invocation logs",
                    message: e.to_string(),
                })?;
                String::from_utf8_lossy(&decoded).into_owned()
            }
            None => String::new(),
        };

        if let Some(function_error) = &response.function_error {
            let body: ErrorPayload =
                serde_json::from_slice(&response.payload).map_err(|e| ShipError::Serialization {
                    context: "invocation error",
                    message: e.to_string(),
                })?;
            return Err(InvokeError {
                message: body.error_message,
                error_type: body.error_type,
                stack_trace: body.stack_trace,
                handled: function_error == "Handled",
                logs,
            }
            .into());
        }

        Ok(Invocation {
            payload: response.payload,
            logs,
        })
    }

    /// Run the Clean hooks.
    pub async fn clean(&self) -> ShipResult<()> {
        self.registry.run_clean(&self.spec).await
    }

    /// Delete the function and every version of it.
    pub async fn delete(&self) -> ShipResult<()> {
        info!(function = %self.remote_name(), "Deleting function");
        self.service
            .delete_function(&self.spec.remote_name, None)
            .await?;
        info!(function = %self.remote_name(), "Function deleted");
        Ok(())
    }

    /// Remote `$LATEST` configuration.
    pub async fn remote_config(&self) -> ShipResult<RemoteFunctionConfig> {
        debug!(function = %self.remote_name(), "Fetching config");
        Ok(self.service.get_function(&self.spec.remote_name, None).await?)
    }

    /// Version the alias points at.
    pub async fn current_version(&self) -> ShipResult<String> {
        let alias = self
            .service
            .get_alias(&self.spec.remote_name, &self.spec.config.alias)
            .await?;
        Ok(alias.function_version)
    }

    /// Resolve `reference` to a version: an existing alias name resolves to
    /// its target, anything else is taken as a version.
    pub async fn resolve_version(&self, reference: &str) -> ShipResult<String> {
        let aliases = all_aliases(self.service.as_ref(), &self.spec.remote_name).await?;
        Ok(aliases
            .into_iter()
            .find(|a| a.name == reference)
            .map(|a| a.function_version)
            .unwrap_or_else(|| reference.to_string()))
    }

    /// Published versions, oldest first.
    pub async fn versions(&self) -> ShipResult<Vec<String>> {
        let mut versions: Vec<String> = all_versions(self.service.as_ref(), &self.spec.remote_name)
            .await?
            .into_iter()
            .map(|v| v.version)
            .filter(|v| v != LATEST_VERSION)
            .collect();
        versions.sort_by(|a, b| compare_versions(a, b));
        Ok(versions)
    }

    /// Published versions beyond the retained count, oldest first.
    ///
    /// `current` is the version the alias points at and is never selected,
    /// so a retained count of zero leaves only that version.
    pub async fn versions_to_cleanup(&self, current: &str) -> ShipResult<Vec<String>> {
        let versions = self.versions().await?;
        Ok(versions_to_cleanup(&versions, self.spec.config.retained_versions)
            .into_iter()
            .filter(|v| v != current)
            .collect())
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.spec.name)
            .field("remote_name", &self.spec.remote_name)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn published(n: usize) -> Vec<String> {
        (1..=n).map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_versions_to_cleanup_counts() {
        let versions = published(11);

        assert_eq!(versions_to_cleanup(&versions, 0).len(), 11);
        assert_eq!(versions_to_cleanup(&versions, 10), vec!["1"]);
        assert_eq!(versions_to_cleanup(&versions, 2).len(), 9);
        assert!(versions_to_cleanup(&versions, 11).is_empty());
        assert!(versions_to_cleanup(&versions, 50).is_empty());
    }

    #[test]
    fn test_versions_to_cleanup_takes_oldest() {
        let versions = published(5);
        assert_eq!(versions_to_cleanup(&versions, 3), vec!["1", "2"]);
    }

    #[test]
    fn test_settings_mirror_config() {
        let mut spec = FunctionSpec::for_tests("api", Path::new("/fn"));
        spec.config.memory = 512;
        spec.config.kms_key_arn = Some("arn:kms".to_string());

        let settings = spec.settings();
        assert_eq!(settings.memory, 512);
        assert_eq!(settings.kms_key_arn.as_deref(), Some("arn:kms"));
    }
}
