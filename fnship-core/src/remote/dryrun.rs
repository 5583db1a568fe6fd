// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! Dry-run remote that previews mutations instead of performing them.
//!
//! Reads go to the wrapped service so the engine sees real remote state.
//! Mutations are recorded as [`Change`]s, logged, and answered with
//! synthesized results.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::info;

use super::{
    all_versions, AliasConfiguration, CodeUpdate, FunctionDefinition, FunctionSettings,
    InvocationKind, InvokeRequest, InvokeResponse, Page, RemoteFunctionConfig, RemoteResult,
    RemoteService,
};
use crate::archive::content_hash;
use crate::diff::diff_config;
use crate::error::RemoteError;
use crate::types::{compare_versions, is_published, LATEST_VERSION};

/// What an intended change would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Remove,
}

impl ChangeKind {
    pub const fn marker(&self) -> char {
        match self {
            Self::Create => '+',
            Self::Update => '~',
            Self::Remove => '-',
        }
    }
}

/// One intended mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    /// Kind of resource: `function`, `config` or `alias`.
    pub resource: &'static str,
    pub name: String,
    pub detail: String,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:<10} {:<13} {}",
            self.kind.marker(),
            self.resource,
            self.name,
            self.detail
        )
    }
}

/// Wraps a real service and turns its mutations into recorded changes.
pub struct DryRun<S> {
    inner: S,
    changes: Mutex<Vec<Change>>,
}

impl<S: RemoteService> DryRun<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            changes: Mutex::new(Vec::new()),
        }
    }

    /// Changes recorded so far, in call order.
    pub fn changes(&self) -> Vec<Change> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn record(&self, kind: ChangeKind, resource: &'static str, name: &str, detail: String) {
        let change = Change {
            kind,
            resource,
            name: name.to_string(),
            detail,
        };
        info!(change = %change, "Dry run");
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(change);
    }

    /// The number the next published version would get.
    async fn next_version(&self, function_name: &str) -> RemoteResult<String> {
        let newest = all_versions(&self.inner, function_name)
            .await?
            .into_iter()
            .map(|v| v.version)
            .filter(|v| is_published(v))
            .max_by(|a, b| compare_versions(a, b));

        Ok(match newest.and_then(|v| v.parse::<u64>().ok()) {
            Some(n) => (n + 1).to_string(),
            None => "1".to_string(),
        })
    }
}

impl<S> fmt::Debug for DryRun<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DryRun").finish_non_exhaustive()
    }
}

#[async_trait]
impl<S: RemoteService> RemoteService for DryRun<S> {
    async fn create_function(&self, def: &FunctionDefinition) -> RemoteResult<RemoteFunctionConfig> {
        let s = &def.settings;
        self.record(
            ChangeKind::Create,
            "function",
            &def.function_name,
            format!(
                "runtime={} memory={} timeout={} handler={}",
                s.runtime, s.memory, s.timeout, s.handler
            ),
        );

        let mut created = RemoteFunctionConfig {
            function_name: def.function_name.clone(),
            version: "1".to_string(),
            code_sha256: content_hash(&def.code),
            code_size: def.code.len() as u64,
            ..Default::default()
        };
        created.apply_settings(s);
        Ok(created)
    }

    async fn update_function_code(&self, update: &CodeUpdate) -> RemoteResult<RemoteFunctionConfig> {
        let mut current = self.inner.get_function(&update.function_name, None).await?;
        let checksum = content_hash(&update.code);

        if checksum != current.code_sha256 {
            self.record(
                ChangeKind::Update,
                "function",
                &update.function_name,
                format!("{} bytes -> {} bytes", current.code_size, update.code.len()),
            );
        }

        current.version = if update.publish {
            self.next_version(&update.function_name).await?
        } else {
            LATEST_VERSION.to_string()
        };
        current.code_sha256 = checksum;
        current.code_size = update.code.len() as u64;
        Ok(current)
    }

    async fn update_function_configuration(
        &self,
        function_name: &str,
        settings: &FunctionSettings,
    ) -> RemoteResult<RemoteFunctionConfig> {
        let mut current = self.inner.get_function(function_name, None).await?;

        let changes = diff_config(settings, &current);
        if !changes.is_empty() {
            self.record(ChangeKind::Update, "config", function_name, String::new());
            for change in changes {
                self.record(
                    ChangeKind::Update,
                    "config",
                    change.field,
                    format!("{:?} -> {:?}", change.from, change.to),
                );
            }
        }

        current.apply_settings(settings);
        Ok(current)
    }

    async fn get_function(
        &self,
        function_name: &str,
        qualifier: Option<&str>,
    ) -> RemoteResult<RemoteFunctionConfig> {
        self.inner.get_function(function_name, qualifier).await
    }

    async fn delete_function(&self, function_name: &str, qualifier: Option<&str>) -> RemoteResult<()> {
        self.inner.get_function(function_name, qualifier).await?;

        let detail = qualifier.map(|v| format!("version {}", v)).unwrap_or_default();
        self.record(ChangeKind::Remove, "function", function_name, detail);
        Ok(())
    }

    async fn create_alias(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> RemoteResult<AliasConfiguration> {
        match self.inner.get_alias(function_name, alias).await {
            Ok(_) => return Err(RemoteError::conflict(format!("alias {}", alias))),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        self.record(
            ChangeKind::Create,
            "alias",
            function_name,
            format!("{} -> {}", alias, version),
        );
        Ok(AliasConfiguration {
            name: alias.to_string(),
            function_version: version.to_string(),
        })
    }

    async fn update_alias(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> RemoteResult<AliasConfiguration> {
        self.record(
            ChangeKind::Update,
            "alias",
            function_name,
            format!("{} -> {}", alias, version),
        );
        Ok(AliasConfiguration {
            name: alias.to_string(),
            function_version: version.to_string(),
        })
    }

    async fn get_alias(&self, function_name: &str, alias: &str) -> RemoteResult<AliasConfiguration> {
        self.inner.get_alias(function_name, alias).await
    }

    async fn list_aliases(
        &self,
        function_name: &str,
        marker: Option<&str>,
    ) -> RemoteResult<Page<AliasConfiguration>> {
        self.inner.list_aliases(function_name, marker).await
    }

    async fn list_versions_by_function(
        &self,
        function_name: &str,
        marker: Option<&str>,
    ) -> RemoteResult<Page<RemoteFunctionConfig>> {
        self.inner.list_versions_by_function(function_name, marker).await
    }

    /// Only validates the call against the wrapped service.
    async fn invoke(&self, request: &InvokeRequest) -> RemoteResult<InvokeResponse> {
        let request = InvokeRequest {
            kind: InvocationKind::DryRun,
            ..request.clone()
        };
        self.inner.invoke(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;

    fn seeded() -> MemoryRemote {
        let remote = MemoryRemote::new();
        remote.seed_function(
            RemoteFunctionConfig {
                function_name: "shop_api".to_string(),
                runtime: "nodejs".to_string(),
                memory: 128,
                code_sha256: content_hash(b"old"),
                code_size: 3,
                ..Default::default()
            },
            &["1", "2"],
        );
        remote.seed_alias("shop_api", "current", "2");
        remote
    }

    #[tokio::test]
    async fn test_mutations_are_recorded_not_applied() {
        let dry = DryRun::new(seeded());

        let published = dry
            .update_function_code(&CodeUpdate {
                function_name: "shop_api".to_string(),
                code: b"new".to_vec(),
                publish: true,
            })
            .await
            .unwrap();
        assert_eq!(published.version, "3");

        dry.update_alias("shop_api", "current", "3").await.unwrap();
        dry.delete_function("shop_api", Some("1")).await.unwrap();

        let changes = dry.changes();
        let markers: Vec<_> = changes.iter().map(|c| c.kind.marker()).collect();
        assert_eq!(markers, vec!['~', '~', '-']);

        assert!(dry.inner().mutations().is_empty());
        assert_eq!(dry.inner().published_versions("shop_api"), vec!["1", "2"]);
        assert_eq!(
            dry.inner().alias_target("shop_api", "current").as_deref(),
            Some("2")
        );
    }

    #[tokio::test]
    async fn test_existing_alias_conflicts() {
        let dry = DryRun::new(seeded());
        let err = dry.create_alias("shop_api", "current", "2").await.unwrap_err();
        assert!(err.is_conflict());
        assert!(dry.changes().is_empty());
    }

    #[tokio::test]
    async fn test_config_diff_lines() {
        let dry = DryRun::new(seeded());
        let settings = FunctionSettings {
            runtime: "nodejs".to_string(),
            memory: 512,
            ..Default::default()
        };
        dry.update_function_configuration("shop_api", &settings)
            .await
            .unwrap();

        let changes = dry.changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].name, "memory");
        assert_eq!(changes[1].detail, "\"128\" -> \"512\"");
        assert!(changes[0].to_string().starts_with("~ config"));
    }

    #[tokio::test]
    async fn test_delete_missing_function_is_not_found() {
        let dry = DryRun::new(MemoryRemote::new());
        let err = dry.delete_function("ghost", None).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(dry.changes().is_empty());
    }
}
