// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! JSON configuration for projects and functions.
//!
//! `project.json` supplies shared defaults; each `functions/<name>/function.json`
//! overrides them. Raw files are parsed into all-optional structs first, then
//! merged and resolved. Required fields are checked once, when the function is
//! opened, after plugins had their chance to fill them in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigValidationError, ShipError, ShipResult};
use crate::types::DEFAULT_ALIAS;

/// Project configuration file name.
pub const PROJECT_FILE: &str = "project.json";

/// Per-function override file name.
pub const FUNCTION_FILE: &str = "function.json";

/// Default memory (MB) for every function in a project.
pub const DEFAULT_MEMORY: u64 = 128;

/// Default timeout (seconds) for every function in a project.
pub const DEFAULT_TIMEOUT: u64 = 3;

/// Published versions kept when `retainedVersions` is not configured.
pub const DEFAULT_RETAINED_VERSIONS: usize = 10;

/// Functions deployed at once by batch operations.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Remote name used when the project does not set `nameTemplate`.
pub const DEFAULT_NAME_TEMPLATE: &str = "{project}_{function}";

/// Plugins run for every function unless configured otherwise. Runtime
/// inference must come before the runtime plugins it feeds, and the shimmed
/// runtimes before `nodejs`, which fills in their handler. `clojure` follows
/// `hooks` so the jar is expanded after the build command produced it.
pub const DEFAULT_PLUGINS: &[&str] = &[
    "inference",
    "golang",
    "rust-musl",
    "rust-gnu",
    "python",
    "nodejs",
    "java",
    "ruby",
    "hooks",
    "clojure",
    "env",
    "shim",
];

/// Shell commands run at lifecycle points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookCommands {
    /// Run before the archive is created.
    pub build: String,
    /// Run after a deploy to remove build artifacts.
    pub clean: String,
    /// Run after builds and before uploads.
    pub deploy: String,
}

/// Network placement of a function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VpcConfig {
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
}

impl VpcConfig {
    /// Copy with both lists sorted, for order-insensitive comparison.
    pub fn normalized(&self) -> Self {
        let mut subnets = self.subnets.clone();
        let mut security_groups = self.security_groups.clone();
        subnets.sort();
        security_groups.sort();
        Self {
            subnets,
            security_groups,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subnets.is_empty() && self.security_groups.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawHooks {
    build: Option<String>,
    clean: Option<String>,
    deploy: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVpc {
    subnets: Option<Vec<String>>,
    security_groups: Option<Vec<String>>,
}

/// Function fields as written on disk, every one optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFunctionConfig {
    description: Option<String>,
    runtime: Option<String>,
    memory: Option<u64>,
    timeout: Option<u64>,
    role: Option<String>,
    handler: Option<String>,
    shim: Option<bool>,
    environment: Option<BTreeMap<String, String>>,
    hooks: Option<RawHooks>,
    vpc: Option<RawVpc>,
    #[serde(rename = "retainedVersions")]
    retained_versions: Option<usize>,
    kms_arn: Option<String>,
    deadletter_arn: Option<String>,
    zip: Option<PathBuf>,
    alias: Option<String>,
    plugins: Option<Vec<String>>,
}

/// Raw root of `project.json`.
#[derive(Debug, Deserialize)]
struct RawProjectConfig {
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(rename = "nameTemplate")]
    name_template: Option<String>,
    concurrency: Option<usize>,
    #[serde(rename = "defaultEnvironment")]
    default_environment: Option<String>,
    #[serde(flatten)]
    defaults: RawFunctionConfig,
}

/// Resolved configuration of one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub description: String,
    pub runtime: String,
    pub handler: String,
    /// Memory in MB.
    pub memory: u64,
    /// Timeout in seconds.
    pub timeout: u64,
    pub role: String,
    /// Wrap the function in the Node.js adapter script.
    pub shim: bool,
    pub environment: BTreeMap<String, String>,
    pub hooks: HookCommands,
    pub vpc: VpcConfig,
    /// Published versions kept after a code update. Zero keeps none of the
    /// previously published versions.
    pub retained_versions: usize,
    pub kms_key_arn: Option<String>,
    pub dead_letter_arn: Option<String>,
    /// Pre-built archive deployed instead of running the build pipeline.
    pub zip: Option<PathBuf>,
    pub alias: String,
    /// Plugins run for this function, in order.
    pub plugins: Vec<String>,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            runtime: String::new(),
            handler: String::new(),
            memory: DEFAULT_MEMORY,
            timeout: DEFAULT_TIMEOUT,
            role: String::new(),
            shim: false,
            environment: BTreeMap::new(),
            hooks: HookCommands::default(),
            vpc: VpcConfig::default(),
            retained_versions: DEFAULT_RETAINED_VERSIONS,
            kms_key_arn: None,
            dead_letter_arn: None,
            zip: None,
            alias: DEFAULT_ALIAS.to_string(),
            plugins: DEFAULT_PLUGINS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl FunctionConfig {
    /// Layer `raw` over `self`. Maps merge key-wise, hooks and vpc field-wise,
    /// everything else is replaced when present.
    pub fn merged(&self, raw: RawFunctionConfig) -> Self {
        let mut out = self.clone();

        if let Some(v) = raw.description {
            out.description = v;
        }
        if let Some(v) = raw.runtime {
            out.runtime = v;
        }
        if let Some(v) = raw.memory {
            out.memory = v;
        }
        if let Some(v) = raw.timeout {
            out.timeout = v;
        }
        if let Some(v) = raw.role {
            out.role = v;
        }
        if let Some(v) = raw.handler {
            out.handler = v;
        }
        if let Some(v) = raw.shim {
            out.shim = v;
        }
        if let Some(env) = raw.environment {
            out.environment.extend(env);
        }
        if let Some(hooks) = raw.hooks {
            if let Some(v) = hooks.build {
                out.hooks.build = v;
            }
            if let Some(v) = hooks.clean {
                out.hooks.clean = v;
            }
            if let Some(v) = hooks.deploy {
                out.hooks.deploy = v;
            }
        }
        if let Some(vpc) = raw.vpc {
            if let Some(v) = vpc.subnets {
                out.vpc.subnets = v;
            }
            if let Some(v) = vpc.security_groups {
                out.vpc.security_groups = v;
            }
        }
        if let Some(v) = raw.retained_versions {
            out.retained_versions = v;
        }
        if raw.kms_arn.is_some() {
            out.kms_key_arn = non_empty(raw.kms_arn);
        }
        if raw.deadletter_arn.is_some() {
            out.dead_letter_arn = non_empty(raw.deadletter_arn);
        }
        if let Some(v) = raw.zip {
            out.zip = Some(v);
        }
        if let Some(v) = raw.alias {
            out.alias = v;
        }
        if let Some(v) = raw.plugins {
            out.plugins = v;
        }

        out
    }

    /// Check the fields every deployable function needs.
    pub fn validate(&self, function: &str) -> Result<(), ConfigValidationError> {
        let missing = |field: &'static str| ConfigValidationError::MissingRequiredField {
            field,
            function: function.to_string(),
        };

        if self.runtime.is_empty() {
            return Err(missing("runtime"));
        }
        if self.memory == 0 {
            return Err(missing("memory"));
        }
        if self.timeout == 0 {
            return Err(missing("timeout"));
        }
        if self.role.is_empty() {
            return Err(missing("role"));
        }
        if self.handler.is_empty() {
            return Err(missing("handler"));
        }
        if self.alias.is_empty() {
            return Err(missing("alias"));
        }

        if self.environment.keys().any(|k| k.is_empty()) {
            return Err(ConfigValidationError::InvalidFieldValue {
                field: "environment",
                value: format!("empty key in function '{}'", function),
                reason: "Environment variable names cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn setenv(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.environment.insert(name.into(), value.into());
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

/// Remote-name template with `{project}`, `{function}` and `{environment}`
/// placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTemplate {
    source: String,
    parts: Vec<TemplatePart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Literal(String),
    Project,
    Function,
    Environment,
}

impl NameTemplate {
    pub fn parse(source: &str) -> ShipResult<Self> {
        let invalid = |reason: String| ShipError::NameTemplate {
            template: source.to_string(),
            reason,
        };

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| invalid("unclosed '{'".to_string()))?;

            let part = match after[..close].trim() {
                "project" => TemplatePart::Project,
                "function" => TemplatePart::Function,
                "environment" => TemplatePart::Environment,
                other => return Err(invalid(format!("unknown placeholder '{}'", other))),
            };

            if !literal.is_empty() {
                parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
            }
            parts.push(part);
            rest = &after[close + 1..];
        }

        if rest.contains('}') {
            return Err(invalid("unmatched '}'".to_string()));
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal));
        }

        if parts.is_empty() {
            return Err(invalid("template is empty".to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn render(&self, project: &str, function: &str, environment: Option<&str>) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                TemplatePart::Literal(s) => s.as_str(),
                TemplatePart::Project => project,
                TemplatePart::Function => function,
                TemplatePart::Environment => environment.unwrap_or(""),
            })
            .collect()
    }
}

impl Default for NameTemplate {
    fn default() -> Self {
        Self {
            source: DEFAULT_NAME_TEMPLATE.to_string(),
            parts: vec![
                TemplatePart::Project,
                TemplatePart::Literal("_".to_string()),
                TemplatePart::Function,
            ],
        }
    }
}

/// Validated project configuration.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub name: String,
    pub description: String,
    /// Defaults every function starts from before its own overrides.
    pub defaults: FunctionConfig,
    pub name_template: NameTemplate,
    pub concurrency: usize,
    pub default_environment: Option<String>,
}

/// Configuration loader with strict validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Path of the project file for `environment`: `project.<env>.json` when
    /// an environment is selected, `project.json` otherwise.
    pub fn project_file(dir: &Path, environment: Option<&str>) -> PathBuf {
        match environment {
            Some(env) if !env.is_empty() => dir.join(format!("project.{}.json", env)),
            _ => dir.join(PROJECT_FILE),
        }
    }

    /// Load and validate the project configuration in `dir`.
    pub fn load_project(dir: &Path, environment: Option<&str>) -> ShipResult<ProjectConfig> {
        let path = Self::project_file(dir, environment);

        if !path.exists() {
            return Err(ShipError::ConfigNotFound { path });
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ShipError::Io {
            context: "reading project config",
            source: e,
        })?;

        Self::project_from_str(&content).map_err(|e| match e {
            ShipError::ConfigParse { message, .. } => ShipError::ConfigParse { path, message },
            other => other,
        })
    }

    /// Parse and validate project configuration from a JSON string.
    pub fn project_from_str(content: &str) -> ShipResult<ProjectConfig> {
        let raw: RawProjectConfig =
            serde_json::from_str(content).map_err(|e| ShipError::ConfigParse {
                path: PathBuf::from(PROJECT_FILE),
                message: e.to_string(),
            })?;

        Self::validate_project(raw)
    }

    fn validate_project(raw: RawProjectConfig) -> ShipResult<ProjectConfig> {
        let name = raw.name.filter(|n| !n.is_empty()).ok_or(
            ConfigValidationError::MissingRequiredField {
                field: "name",
                function: PROJECT_FILE.to_string(),
            },
        )?;

        let concurrency = raw.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ConfigValidationError::InvalidFieldValue {
                field: "concurrency",
                value: "0".to_string(),
                reason: "Concurrency must be at least 1".to_string(),
            }
            .into());
        }

        let name_template = match raw.name_template.as_deref() {
            Some(t) if !t.is_empty() => NameTemplate::parse(t)?,
            _ => NameTemplate::default(),
        };

        // The project description describes the project, not its functions.
        let mut overrides = raw.defaults;
        overrides.description = None;
        overrides.zip = None;

        Ok(ProjectConfig {
            name,
            description: raw.description,
            defaults: FunctionConfig::default().merged(overrides),
            name_template,
            concurrency,
            default_environment: raw.default_environment.filter(|e| !e.is_empty()),
        })
    }

    /// Load the overrides in `dir/function.json`. A missing file means no
    /// overrides.
    pub fn load_function_overrides(dir: &Path) -> ShipResult<RawFunctionConfig> {
        let path = dir.join(FUNCTION_FILE);

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RawFunctionConfig::default())
            }
            Err(source) => {
                return Err(ShipError::Io {
                    context: "reading function config",
                    source,
                })
            }
        };

        Self::function_overrides_from_str(&content).map_err(|e| match e {
            ShipError::ConfigParse { message, .. } => ShipError::ConfigParse { path, message },
            other => other,
        })
    }

    pub fn function_overrides_from_str(content: &str) -> ShipResult<RawFunctionConfig> {
        serde_json::from_str(content).map_err(|e| ShipError::ConfigParse {
            path: PathBuf::from(FUNCTION_FILE),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"{
  "name": "shop",
  "description": "shop backend",
  "role": "arn:role/shop",
  "memory": 256,
  "environment": { "PROJECT_ENV": "projectEnv", "SHARED": "project" },
  "vpc": { "subnets": ["subnet-b", "subnet-a"], "securityGroups": ["sg-default"] },
  "hooks": { "build": "make" }
}"#;

    #[test]
    fn test_project_defaults_applied() {
        let config = ConfigLoader::project_from_str(PROJECT).unwrap();
        assert_eq!(config.name, "shop");
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.defaults.memory, 256);
        assert_eq!(config.defaults.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.defaults.retained_versions, DEFAULT_RETAINED_VERSIONS);
        assert_eq!(config.defaults.alias, "current");
        assert_eq!(config.defaults.description, "");
        assert_eq!(config.name_template.render("shop", "api", None), "shop_api");
    }

    #[test]
    fn test_project_requires_name() {
        let result = ConfigLoader::project_from_str(r#"{"description": "x"}"#);
        assert!(matches!(result, Err(ShipError::ConfigValidation(_))));
    }

    #[test]
    fn test_project_zero_concurrency() {
        let result = ConfigLoader::project_from_str(r#"{"name": "x", "concurrency": 0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_function_overrides_merge() {
        let project = ConfigLoader::project_from_str(PROJECT).unwrap();
        let raw = ConfigLoader::function_overrides_from_str(
            r#"{
  "description": "api handler",
  "timeout": 10,
  "environment": { "FUNCTION_ENV": "functionEnv", "SHARED": "function" },
  "vpc": { "securityGroups": ["sg-override"] },
  "hooks": { "clean": "rm -rf dist" },
  "retainedVersions": 0,
  "kms_arn": "arn:kms/key"
}"#,
        )
        .unwrap();

        let config = project.defaults.merged(raw);
        assert_eq!(config.description, "api handler");
        assert_eq!(config.memory, 256);
        assert_eq!(config.timeout, 10);
        assert_eq!(config.environment["PROJECT_ENV"], "projectEnv");
        assert_eq!(config.environment["FUNCTION_ENV"], "functionEnv");
        assert_eq!(config.environment["SHARED"], "function");
        assert_eq!(config.vpc.security_groups, vec!["sg-override"]);
        assert_eq!(config.vpc.subnets, vec!["subnet-b", "subnet-a"]);
        assert_eq!(config.hooks.build, "make");
        assert_eq!(config.hooks.clean, "rm -rf dist");
        assert_eq!(config.retained_versions, 0);
        assert_eq!(config.kms_key_arn.as_deref(), Some("arn:kms/key"));

        // Project defaults stay untouched.
        assert_eq!(project.defaults.vpc.security_groups, vec!["sg-default"]);
    }

    #[test]
    fn test_validate_names_missing_field() {
        let mut config = FunctionConfig {
            runtime: "nodejs".to_string(),
            role: "arn:role".to_string(),
            handler: "index.handle".to_string(),
            ..Default::default()
        };
        assert!(config.validate("api").is_ok());

        config.memory = 0;
        let err = config.validate("api").unwrap_err();
        assert!(err.to_string().contains("memory"));

        config.memory = 128;
        config.role.clear();
        let err = config.validate("api").unwrap_err();
        assert!(err.to_string().contains("role"));
    }

    #[test]
    fn test_name_template() {
        let t = NameTemplate::parse("{environment}-{project}-{function}").unwrap();
        assert_eq!(t.render("shop", "api", Some("prod")), "prod-shop-api");

        assert!(NameTemplate::parse("{project}_{fn}").is_err());
        assert!(NameTemplate::parse("{project").is_err());
        assert!(NameTemplate::parse("project}").is_err());
    }

    #[test]
    fn test_environment_project_file() {
        let dir = Path::new("/srv/shop");
        assert_eq!(
            ConfigLoader::project_file(dir, Some("prod")),
            dir.join("project.prod.json")
        );
        assert_eq!(ConfigLoader::project_file(dir, None), dir.join("project.json"));
    }
}
