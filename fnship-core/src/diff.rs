// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 fnship contributors

//! Field-by-field comparison of local settings against remote configuration.
//!
//! Normalization rules:
//! - subnet and security-group lists are compared sorted;
//! - an absent network placement equals one with both lists empty;
//! - an absent KMS key or dead-letter target equals an empty string.

use std::collections::BTreeMap;
use std::fmt;

use crate::remote::{FunctionSettings, RemoteFunctionConfig};

/// One differing configuration field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    /// Remote value.
    pub from: String,
    /// Local value.
    pub to: String,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?} -> {:?}", self.field, self.from, self.to)
    }
}

/// Every field where `local` differs from `remote`, in a fixed order.
///
/// Values are compared structurally; the rendered strings in each
/// [`FieldChange`] are for display only.
pub fn diff_config(local: &FunctionSettings, remote: &RemoteFunctionConfig) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    field(&mut changes, "description", &remote.description, &local.description, str_of);
    field(&mut changes, "memory", &remote.memory, &local.memory, u64::to_string);
    field(&mut changes, "timeout", &remote.timeout, &local.timeout, u64::to_string);
    field(&mut changes, "role", &remote.role, &local.role, str_of);
    field(&mut changes, "runtime", &remote.runtime, &local.runtime, str_of);
    field(&mut changes, "handler", &remote.handler, &local.handler, str_of);

    let remote_vpc = remote.vpc.clone().unwrap_or_default().normalized();
    let local_vpc = local.vpc.normalized();
    field(
        &mut changes,
        "vpc.subnets",
        &remote_vpc.subnets,
        &local_vpc.subnets,
        render_list,
    );
    field(
        &mut changes,
        "vpc.securityGroups",
        &remote_vpc.security_groups,
        &local_vpc.security_groups,
        render_list,
    );

    field(
        &mut changes,
        "environment",
        &remote.environment,
        &local.environment,
        render_map,
    );
    field(
        &mut changes,
        "kms_arn",
        &non_empty(&remote.kms_key_arn),
        &non_empty(&local.kms_key_arn),
        render_opt,
    );
    field(
        &mut changes,
        "deadletter_arn",
        &non_empty(&remote.dead_letter_arn),
        &non_empty(&local.dead_letter_arn),
        render_opt,
    );

    changes
}

fn field<T, F>(changes: &mut Vec<FieldChange>, name: &'static str, from: &T, to: &T, render: F)
where
    T: PartialEq + ?Sized,
    F: Fn(&T) -> String,
{
    if from != to {
        changes.push(FieldChange {
            field: name,
            from: render(from),
            to: render(to),
        });
    }
}

fn str_of(s: &String) -> String {
    s.clone()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn render_opt(value: &Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

fn render_list(items: &Vec<String>) -> String {
    format!("{:?}", items)
}

fn render_map(map: &BTreeMap<String, String>) -> String {
    format!("{:?}", map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VpcConfig;

    fn settings() -> FunctionSettings {
        FunctionSettings {
            description: "api".to_string(),
            runtime: "nodejs".to_string(),
            handler: "index.handle".to_string(),
            memory: 128,
            timeout: 3,
            role: "arn:role".to_string(),
            ..Default::default()
        }
    }

    fn remote_of(local: &FunctionSettings) -> RemoteFunctionConfig {
        let mut remote = RemoteFunctionConfig::default();
        remote.apply_settings(local);
        remote
    }

    #[test]
    fn test_identical_config_has_no_diff() {
        let local = settings();
        assert!(diff_config(&local, &remote_of(&local)).is_empty());
    }

    #[test]
    fn test_vpc_order_and_absence_normalized() {
        let mut local = settings();
        let mut remote = remote_of(&local);

        // Absent remote placement equals empty local placement.
        remote.vpc = None;
        assert!(diff_config(&local, &remote).is_empty());

        local.vpc = VpcConfig {
            subnets: vec!["b".to_string(), "a".to_string()],
            security_groups: vec![],
        };
        remote.vpc = Some(VpcConfig {
            subnets: vec!["a".to_string(), "b".to_string()],
            security_groups: vec![],
        });
        assert!(diff_config(&local, &remote).is_empty());
    }

    #[test]
    fn test_reports_each_changed_field() {
        let local = settings();
        let mut remote = remote_of(&local);
        remote.memory = 256;
        remote.environment.insert("A".to_string(), "1".to_string());
        remote.kms_key_arn = Some(String::new());

        let changes = diff_config(&local, &remote);
        let fields: Vec<_> = changes.iter().map(|c| c.field).collect();
        assert_eq!(fields, vec!["memory", "environment"]);
        assert_eq!(changes[0].from, "256");
        assert_eq!(changes[0].to, "128");
    }

    #[test]
    fn test_values_containing_separators_still_differ() {
        let mut local = settings();
        local
            .environment
            .insert("A".to_string(), "1,B=2".to_string());
        let mut remote = remote_of(&settings());
        remote.environment.insert("A".to_string(), "1".to_string());
        remote.environment.insert("B".to_string(), "2".to_string());

        let fields: Vec<_> = diff_config(&local, &remote).iter().map(|c| c.field).collect();
        assert_eq!(fields, vec!["environment"]);

        let mut local = settings();
        local.vpc.subnets = vec!["a,b".to_string()];
        let mut remote = remote_of(&settings());
        remote.vpc = Some(VpcConfig {
            subnets: vec!["a".to_string(), "b".to_string()],
            security_groups: vec![],
        });

        let fields: Vec<_> = diff_config(&local, &remote).iter().map(|c| c.field).collect();
        assert_eq!(fields, vec!["vpc.subnets"]);
    }
}
