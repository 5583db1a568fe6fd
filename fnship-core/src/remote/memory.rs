// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! In-process function platform.
//!
//! Keeps functions, published versions and aliases in memory with the same
//! observable rules as the real platform: versions are append-only with
//! never-reused numbers, aliases must point at existing versions, and a
//! version still referenced by an alias cannot be deleted. Every call is
//! journaled so callers can assert exactly which operations were issued.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{
    AliasConfiguration, CodeUpdate, FunctionDefinition, FunctionSettings, InvocationKind,
    InvokeRequest, InvokeResponse, Page, RemoteFunctionConfig, RemoteResult, RemoteService,
};
use crate::archive::content_hash;
use crate::error::RemoteError;
use crate::types::{is_published, LATEST_VERSION};

/// Default listing page size.
const DEFAULT_PAGE_SIZE: usize = 50;

/// A journaled remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    CreateFunction { name: String },
    UpdateFunctionCode { name: String, publish: bool },
    UpdateFunctionConfiguration { name: String },
    GetFunction { name: String, qualifier: Option<String> },
    DeleteFunction { name: String, qualifier: Option<String> },
    CreateAlias { name: String, alias: String, version: String },
    UpdateAlias { name: String, alias: String, version: String },
    GetAlias { name: String, alias: String },
    ListAliases { name: String },
    ListVersions { name: String },
    Invoke { name: String, kind: InvocationKind },
}

impl RemoteCall {
    /// Whether the call changes remote state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateFunction { .. }
                | Self::UpdateFunctionCode { .. }
                | Self::UpdateFunctionConfiguration { .. }
                | Self::DeleteFunction { .. }
                | Self::CreateAlias { .. }
                | Self::UpdateAlias { .. }
        )
    }

    /// Operation name, as used by [`MemoryRemote::fail_on`].
    pub fn operation(&self) -> &'static str {
        match self {
            Self::CreateFunction { .. } => "create_function",
            Self::UpdateFunctionCode { .. } => "update_function_code",
            Self::UpdateFunctionConfiguration { .. } => "update_function_configuration",
            Self::GetFunction { .. } => "get_function",
            Self::DeleteFunction { .. } => "delete_function",
            Self::CreateAlias { .. } => "create_alias",
            Self::UpdateAlias { .. } => "update_alias",
            Self::GetAlias { .. } => "get_alias",
            Self::ListAliases { .. } => "list_aliases",
            Self::ListVersions { .. } => "list_versions_by_function",
            Self::Invoke { .. } => "invoke",
        }
    }
}

#[derive(Debug, Clone)]
struct FunctionRecord {
    latest: RemoteFunctionConfig,
    published: Vec<RemoteFunctionConfig>,
    aliases: BTreeMap<String, String>,
    next_version: u64,
    invoke_response: Option<InvokeResponse>,
}

impl FunctionRecord {
    fn new(latest: RemoteFunctionConfig) -> Self {
        Self {
            latest,
            published: Vec::new(),
            aliases: BTreeMap::new(),
            next_version: 1,
            invoke_response: None,
        }
    }

    fn publish(&mut self) -> RemoteFunctionConfig {
        let mut snapshot = self.latest.clone();
        snapshot.version = self.next_version.to_string();
        self.next_version += 1;
        self.published.push(snapshot.clone());
        snapshot
    }

    fn has_version(&self, version: &str) -> bool {
        version == LATEST_VERSION || self.published.iter().any(|v| v.version == version)
    }

    fn resolve(&self, qualifier: Option<&str>) -> Option<RemoteFunctionConfig> {
        match qualifier {
            None | Some(LATEST_VERSION) => Some(self.latest.clone()),
            Some(q) => {
                let version = self.aliases.get(q).map(String::as_str).unwrap_or(q);
                if version == LATEST_VERSION {
                    return Some(self.latest.clone());
                }
                self.published.iter().find(|v| v.version == version).cloned()
            }
        }
    }
}

/// DashMap-backed in-memory platform.
#[derive(Debug)]
pub struct MemoryRemote {
    functions: DashMap<String, FunctionRecord>,
    calls: Mutex<Vec<RemoteCall>>,
    failures: DashMap<&'static str, RemoteError>,
    page_size: usize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            functions: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            failures: DashMap::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Use a smaller listing page size to exercise pagination.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make every call to `operation` fail with `error` until cleared.
    pub fn fail_on(&self, operation: &'static str, error: RemoteError) {
        self.failures.insert(operation, error);
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls that changed remote state.
    pub fn mutations(&self) -> Vec<RemoteCall> {
        self.calls().into_iter().filter(RemoteCall::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Seed a function whose `$LATEST` is `latest`, with `published` version
    /// snapshots of it. The alias map starts empty.
    pub fn seed_function(&self, latest: RemoteFunctionConfig, published: &[&str]) {
        let name = latest.function_name.clone();
        let mut record = FunctionRecord::new(RemoteFunctionConfig {
            version: LATEST_VERSION.to_string(),
            ..latest
        });

        for version in published {
            let mut snapshot = record.latest.clone();
            snapshot.version = version.to_string();
            if let Ok(n) = version.parse::<u64>() {
                record.next_version = record.next_version.max(n + 1);
            }
            record.published.push(snapshot);
        }

        self.functions.insert(name, record);
    }

    /// Point `alias` at `version` without journaling a call.
    pub fn seed_alias(&self, function_name: &str, alias: &str, version: &str) {
        if let Some(mut record) = self.functions.get_mut(function_name) {
            record.aliases.insert(alias.to_string(), version.to_string());
        }
    }

    /// Canned response returned by `invoke` for `function_name`.
    pub fn set_invoke_response(&self, function_name: &str, response: InvokeResponse) {
        if let Some(mut record) = self.functions.get_mut(function_name) {
            record.invoke_response = Some(response);
        }
    }

    /// Current target of `alias`, if any.
    pub fn alias_target(&self, function_name: &str, alias: &str) -> Option<String> {
        self.functions
            .get(function_name)
            .and_then(|r| r.aliases.get(alias).cloned())
    }

    /// Published version numbers, oldest first.
    pub fn published_versions(&self, function_name: &str) -> Vec<String> {
        self.functions
            .get(function_name)
            .map(|r| r.published.iter().map(|v| v.version.clone()).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, function_name: &str) -> bool {
        self.functions.contains_key(function_name)
    }

    pub fn latest(&self, function_name: &str) -> Option<RemoteFunctionConfig> {
        self.functions.get(function_name).map(|r| r.latest.clone())
    }

    fn record(&self, call: RemoteCall) -> RemoteResult<()> {
        let operation = call.operation();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);

        match self.failures.get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn paginate<T: Clone>(&self, items: &[T], marker: Option<&str>) -> RemoteResult<Page<T>> {
        let start = match marker {
            Some(m) => m.parse::<usize>().map_err(|_| RemoteError::Api {
                code: "InvalidParameterValueException".to_string(),
                message: format!("invalid marker '{}'", m),
            })?,
            None => 0,
        };
        let end = (start + self.page_size).min(items.len());
        let page = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();

        Ok(Page {
            items: page,
            next_marker: (end < items.len()).then(|| end.to_string()),
        })
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn function_not_found(name: &str) -> RemoteError {
    RemoteError::not_found(format!("function {}", name))
}

#[async_trait]
impl RemoteService for MemoryRemote {
    async fn create_function(&self, def: &FunctionDefinition) -> RemoteResult<RemoteFunctionConfig> {
        self.record(RemoteCall::CreateFunction {
            name: def.function_name.clone(),
        })?;

        if self.functions.contains_key(&def.function_name) {
            return Err(RemoteError::conflict(format!("function {}", def.function_name)));
        }

        let mut latest = RemoteFunctionConfig {
            function_name: def.function_name.clone(),
            version: LATEST_VERSION.to_string(),
            code_sha256: content_hash(&def.code),
            code_size: def.code.len() as u64,
            ..Default::default()
        };
        latest.apply_settings(&def.settings);

        let mut record = FunctionRecord::new(latest);
        let created = if def.publish {
            record.publish()
        } else {
            record.latest.clone()
        };

        self.functions.insert(def.function_name.clone(), record);
        Ok(created)
    }

    async fn update_function_code(&self, update: &CodeUpdate) -> RemoteResult<RemoteFunctionConfig> {
        self.record(RemoteCall::UpdateFunctionCode {
            name: update.function_name.clone(),
            publish: update.publish,
        })?;

        let mut record = self
            .functions
            .get_mut(&update.function_name)
            .ok_or_else(|| function_not_found(&update.function_name))?;

        record.latest.code_sha256 = content_hash(&update.code);
        record.latest.code_size = update.code.len() as u64;

        if update.publish {
            Ok(record.publish())
        } else {
            Ok(record.latest.clone())
        }
    }

    async fn update_function_configuration(
        &self,
        function_name: &str,
        settings: &FunctionSettings,
    ) -> RemoteResult<RemoteFunctionConfig> {
        self.record(RemoteCall::UpdateFunctionConfiguration {
            name: function_name.to_string(),
        })?;

        let mut record = self
            .functions
            .get_mut(function_name)
            .ok_or_else(|| function_not_found(function_name))?;

        record.latest.apply_settings(settings);
        Ok(record.latest.clone())
    }

    async fn get_function(
        &self,
        function_name: &str,
        qualifier: Option<&str>,
    ) -> RemoteResult<RemoteFunctionConfig> {
        self.record(RemoteCall::GetFunction {
            name: function_name.to_string(),
            qualifier: qualifier.map(str::to_string),
        })?;

        let record = self
            .functions
            .get(function_name)
            .ok_or_else(|| function_not_found(function_name))?;

        record.resolve(qualifier).ok_or_else(|| {
            RemoteError::not_found(format!(
                "function {}:{}",
                function_name,
                qualifier.unwrap_or_default()
            ))
        })
    }

    async fn delete_function(&self, function_name: &str, qualifier: Option<&str>) -> RemoteResult<()> {
        self.record(RemoteCall::DeleteFunction {
            name: function_name.to_string(),
            qualifier: qualifier.map(str::to_string),
        })?;

        let Some(version) = qualifier else {
            return self
                .functions
                .remove(function_name)
                .map(|_| ())
                .ok_or_else(|| function_not_found(function_name));
        };

        let mut record = self
            .functions
            .get_mut(function_name)
            .ok_or_else(|| function_not_found(function_name))?;

        if !is_published(version) {
            return Err(RemoteError::Api {
                code: "InvalidParameterValueException".to_string(),
                message: "$LATEST cannot be deleted on its own".to_string(),
            });
        }

        if let Some((alias, _)) = record.aliases.iter().find(|(_, v)| v.as_str() == version) {
            return Err(RemoteError::conflict(format!(
                "version {} is referenced by alias {}",
                version, alias
            )));
        }

        let before = record.published.len();
        record.published.retain(|v| v.version != version);
        if record.published.len() == before {
            return Err(RemoteError::not_found(format!(
                "function {}:{}",
                function_name, version
            )));
        }

        Ok(())
    }

    async fn create_alias(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> RemoteResult<AliasConfiguration> {
        self.record(RemoteCall::CreateAlias {
            name: function_name.to_string(),
            alias: alias.to_string(),
            version: version.to_string(),
        })?;

        let mut record = self
            .functions
            .get_mut(function_name)
            .ok_or_else(|| function_not_found(function_name))?;

        if record.aliases.contains_key(alias) {
            return Err(RemoteError::conflict(format!("alias {}", alias)));
        }
        if !record.has_version(version) {
            return Err(RemoteError::not_found(format!(
                "function {}:{}",
                function_name, version
            )));
        }

        record.aliases.insert(alias.to_string(), version.to_string());
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
        self.record(RemoteCall::UpdateAlias {
            name: function_name.to_string(),
            alias: alias.to_string(),
            version: version.to_string(),
        })?;

        let mut record = self
            .functions
            .get_mut(function_name)
            .ok_or_else(|| function_not_found(function_name))?;

        if !record.aliases.contains_key(alias) {
            return Err(RemoteError::not_found(format!("alias {}", alias)));
        }
        if !record.has_version(version) {
            return Err(RemoteError::not_found(format!(
                "function {}:{}",
                function_name, version
            )));
        }

        record.aliases.insert(alias.to_string(), version.to_string());
        Ok(AliasConfiguration {
            name: alias.to_string(),
            function_version: version.to_string(),
        })
    }

    async fn get_alias(&self, function_name: &str, alias: &str) -> RemoteResult<AliasConfiguration> {
        self.record(RemoteCall::GetAlias {
            name: function_name.to_string(),
            alias: alias.to_string(),
        })?;

        let record = self
            .functions
            .get(function_name)
            .ok_or_else(|| function_not_found(function_name))?;

        record
            .aliases
            .get(alias)
            .map(|version| AliasConfiguration {
                name: alias.to_string(),
                function_version: version.clone(),
            })
            .ok_or_else(|| RemoteError::not_found(format!("alias {}", alias)))
    }

    async fn list_aliases(
        &self,
        function_name: &str,
        marker: Option<&str>,
    ) -> RemoteResult<Page<AliasConfiguration>> {
        self.record(RemoteCall::ListAliases {
            name: function_name.to_string(),
        })?;

        let aliases: Vec<AliasConfiguration> = self
            .functions
            .get(function_name)
            .ok_or_else(|| function_not_found(function_name))?
            .aliases
            .iter()
            .map(|(name, version)| AliasConfiguration {
                name: name.clone(),
                function_version: version.clone(),
            })
            .collect();

        self.paginate(&aliases, marker)
    }

    async fn list_versions_by_function(
        &self,
        function_name: &str,
        marker: Option<&str>,
    ) -> RemoteResult<Page<RemoteFunctionConfig>> {
        self.record(RemoteCall::ListVersions {
            name: function_name.to_string(),
        })?;

        let versions: Vec<RemoteFunctionConfig> = {
            let record = self
                .functions
                .get(function_name)
                .ok_or_else(|| function_not_found(function_name))?;
            std::iter::once(record.latest.clone())
                .chain(record.published.iter().cloned())
                .collect()
        };

        self.paginate(&versions, marker)
    }

    async fn invoke(&self, request: &InvokeRequest) -> RemoteResult<InvokeResponse> {
        self.record(RemoteCall::Invoke {
            name: request.function_name.clone(),
            kind: request.kind,
        })?;

        let record = self
            .functions
            .get(&request.function_name)
            .ok_or_else(|| function_not_found(&request.function_name))?;

        if record.resolve(request.qualifier.as_deref()).is_none() {
            return Err(RemoteError::not_found(format!(
                "function {}:{}",
                request.function_name,
                request.qualifier.as_deref().unwrap_or_default()
            )));
        }

        let response = match request.kind {
            InvocationKind::RequestResponse => {
                record.invoke_response.clone().unwrap_or(InvokeResponse {
                    status_code: 200,
                    payload: request.payload.clone(),
                    function_error: None,
                    log_result: None,
                })
            }
            InvocationKind::Event => InvokeResponse {
                status_code: 202,
                ..Default::default()
            },
            InvocationKind::DryRun => InvokeResponse {
                status_code: 204,
                ..Default::default()
            },
        };

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::all_versions;

    fn latest(name: &str) -> RemoteFunctionConfig {
        RemoteFunctionConfig {
            function_name: name.to_string(),
            runtime: "nodejs".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_publish_numbers_never_reused() {
        let remote = MemoryRemote::new();
        remote.seed_function(latest("fn"), &["1", "2"]);

        remote.delete_function("fn", Some("2")).await.unwrap();
        let update = CodeUpdate {
            function_name: "fn".to_string(),
            code: b"zip".to_vec(),
            publish: true,
        };
        let published = remote.update_function_code(&update).await.unwrap();
        assert_eq!(published.version, "3");
        assert_eq!(remote.published_versions("fn"), vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_alias_conflict_and_protection() {
        let remote = MemoryRemote::new();
        remote.seed_function(latest("fn"), &["1"]);

        remote.create_alias("fn", "current", "1").await.unwrap();
        let err = remote.create_alias("fn", "current", "1").await.unwrap_err();
        assert!(err.is_conflict());

        let err = remote.delete_function("fn", Some("1")).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_versions_paginate() {
        let remote = MemoryRemote::new().with_page_size(2);
        remote.seed_function(latest("fn"), &["1", "2", "3", "4"]);

        let versions = all_versions(&remote, "fn").await.unwrap();
        let names: Vec<_> = versions.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(names, vec!["$LATEST", "1", "2", "3", "4"]);
        assert_eq!(remote.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_function_is_not_found() {
        let remote = MemoryRemote::new();
        let err = remote.get_function("nope", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let remote = MemoryRemote::new();
        remote.seed_function(latest("fn"), &[]);
        remote.fail_on(
            "get_function",
            RemoteError::Transport {
                message: "connection reset".to_string(),
            },
        );

        let err = remote.get_function("fn", None).await.unwrap_err();
        assert!(!err.is_not_found());
        remote.clear_failures();
        assert!(remote.get_function("fn", None).await.is_ok());
    }
}
