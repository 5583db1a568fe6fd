// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! Remote function platform interface.
//!
//! The deployment engine talks to the platform only through [`RemoteService`].
//! Implementations must be safe for concurrent use: a project batch drives
//! several functions through one shared client at once. Retries and timeouts
//! belong to the implementation, not to the engine.

pub mod dryrun;
pub mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::VpcConfig;
use crate::error::RemoteError;

pub use dryrun::{Change, ChangeKind, DryRun};
pub use memory::{MemoryRemote, RemoteCall};

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Configuration snapshot of one function version as the platform reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFunctionConfig {
    pub function_name: String,
    pub version: String,
    pub description: String,
    pub runtime: String,
    pub handler: String,
    pub memory: u64,
    pub timeout: u64,
    pub role: String,
    pub environment: BTreeMap<String, String>,
    /// Absent and empty placement are equivalent.
    pub vpc: Option<VpcConfig>,
    pub kms_key_arn: Option<String>,
    pub dead_letter_arn: Option<String>,
    /// Content hash of the deployed archive.
    pub code_sha256: String,
    pub code_size: u64,
}

impl RemoteFunctionConfig {
    /// Overwrite the mutable configuration fields with `settings`.
    pub fn apply_settings(&mut self, settings: &FunctionSettings) {
        self.description = settings.description.clone();
        self.runtime = settings.runtime.clone();
        self.handler = settings.handler.clone();
        self.memory = settings.memory;
        self.timeout = settings.timeout;
        self.role = settings.role.clone();
        self.environment = settings.environment.clone();
        self.vpc = (!settings.vpc.is_empty()).then(|| settings.vpc.clone());
        self.kms_key_arn = settings.kms_key_arn.clone();
        self.dead_letter_arn = settings.dead_letter_arn.clone();
    }
}

/// Everything needed to create a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDefinition {
    pub function_name: String,
    pub settings: FunctionSettings,
    pub code: Vec<u8>,
    pub publish: bool,
}

/// Mutable configuration of a function, sent on create and config update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionSettings {
    pub description: String,
    pub runtime: String,
    pub handler: String,
    pub memory: u64,
    pub timeout: u64,
    pub role: String,
    pub environment: BTreeMap<String, String>,
    pub vpc: VpcConfig,
    pub kms_key_arn: Option<String>,
    pub dead_letter_arn: Option<String>,
}

/// New code for an existing function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUpdate {
    pub function_name: String,
    pub code: Vec<u8>,
    pub publish: bool,
}

/// Named pointer to a published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasConfiguration {
    pub name: String,
    pub function_version: String,
}

/// How an invocation is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvocationKind {
    /// Synchronous request/response.
    RequestResponse,
    /// Fire-and-forget.
    Event,
    /// Validate parameters and permissions only.
    DryRun,
}

impl fmt::Display for InvocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RequestResponse => "RequestResponse",
            Self::Event => "Event",
            Self::DryRun => "DryRun",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    pub function_name: String,
    pub qualifier: Option<String>,
    pub kind: InvocationKind,
    pub payload: Vec<u8>,
    /// Base64-encoded JSON client context.
    pub client_context: Option<String>,
    /// Ask for the tail of the execution log.
    pub tail_logs: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeResponse {
    pub status_code: u16,
    pub payload: Vec<u8>,
    /// `Handled` or `Unhandled` when the function code failed.
    pub function_error: Option<String>,
    /// Base64-encoded log tail.
    pub log_result: Option<String>,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_marker: Option<String>,
}

/// Capability surface of the remote function platform.
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn create_function(&self, def: &FunctionDefinition) -> RemoteResult<RemoteFunctionConfig>;

    /// Upload new code; with `publish` set a new immutable version is created.
    async fn update_function_code(&self, update: &CodeUpdate) -> RemoteResult<RemoteFunctionConfig>;

    async fn update_function_configuration(
        &self,
        function_name: &str,
        settings: &FunctionSettings,
    ) -> RemoteResult<RemoteFunctionConfig>;

    /// Fetch configuration for `$LATEST`, or for a version or alias qualifier.
    async fn get_function(
        &self,
        function_name: &str,
        qualifier: Option<&str>,
    ) -> RemoteResult<RemoteFunctionConfig>;

    /// Delete the whole function, or a single version when qualified.
    async fn delete_function(&self, function_name: &str, qualifier: Option<&str>) -> RemoteResult<()>;

    /// Fails with [`RemoteError::Conflict`] when the alias already exists.
    async fn create_alias(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> RemoteResult<AliasConfiguration>;

    async fn update_alias(
        &self,
        function_name: &str,
        alias: &str,
        version: &str,
    ) -> RemoteResult<AliasConfiguration>;

    async fn get_alias(&self, function_name: &str, alias: &str) -> RemoteResult<AliasConfiguration>;

    async fn list_aliases(
        &self,
        function_name: &str,
        marker: Option<&str>,
    ) -> RemoteResult<Page<AliasConfiguration>>;

    /// Versions oldest first, `$LATEST` included.
    async fn list_versions_by_function(
        &self,
        function_name: &str,
        marker: Option<&str>,
    ) -> RemoteResult<Page<RemoteFunctionConfig>>;

    async fn invoke(&self, request: &InvokeRequest) -> RemoteResult<InvokeResponse>;
}

/// Follow `list_versions_by_function` pagination to the end.
pub async fn all_versions(
    service: &dyn RemoteService,
    function_name: &str,
) -> RemoteResult<Vec<RemoteFunctionConfig>> {
    let mut versions = Vec::new();
    let mut marker: Option<String> = None;

    loop {
        let page = service
            .list_versions_by_function(function_name, marker.as_deref())
            .await?;
        versions.extend(page.items);

        match page.next_marker {
            Some(next) => marker = Some(next),
            None => return Ok(versions),
        }
    }
}

/// Follow `list_aliases` pagination to the end.
pub async fn all_aliases(
    service: &dyn RemoteService,
    function_name: &str,
) -> RemoteResult<Vec<AliasConfiguration>> {
    let mut aliases = Vec::new();
    let mut marker: Option<String> = None;

    loop {
        let page = service.list_aliases(function_name, marker.as_deref()).await?;
        aliases.extend(page.items);

        match page.next_marker {
            Some(next) => marker = Some(next),
            None => return Ok(aliases),
        }
    }
}
