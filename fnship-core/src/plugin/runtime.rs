//! Per-runtime defaults for the natively supported and shimmed runtimes.

use async_trait::async_trait;

use super::Plugin;
use crate::error::ShipResult;
use crate::function::FunctionSpec;
use crate::types::Hook;

/// Node.js runtime names accepted by the platform.
pub const NODEJS_RUNTIMES: &[&str] = &["nodejs", "nodejs4.3", "nodejs4.3-edge", "nodejs6.10"];

fn default_handler(spec: &mut FunctionSpec, handler: &str) {
    if spec.config.handler.is_empty() {
        spec.config.handler = handler.to_string();
    }
}

/// Go binaries, run behind the Node.js shim.
#[derive(Debug, Clone, Copy, Default)]
pub struct GolangPlugin;

#[async_trait]
impl Plugin for GolangPlugin {
    fn name(&self) -> &str {
        "golang"
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Open]
    }

    async fn open(&self, spec: &mut FunctionSpec) -> ShipResult<()> {
        if spec.config.runtime != "golang" {
            return Ok(());
        }

        let hooks = &mut spec.config.hooks;
        if hooks.build.is_empty() {
            hooks.build = "GOOS=linux GOARCH=amd64 go build -o main *.go".to_string();
        }
        if hooks.clean.is_empty() {
            hooks.clean = "rm -f main".to_string();
        }
        spec.config.shim = true;
        spec.config.runtime = "nodejs".to_string();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NodejsPlugin;

#[async_trait]
impl Plugin for NodejsPlugin {
    fn name(&self) -> &str {
        "nodejs"
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Open]
    }

    async fn open(&self, spec: &mut FunctionSpec) -> ShipResult<()> {
        if NODEJS_RUNTIMES.contains(&spec.config.runtime.as_str()) {
            default_handler(spec, "index.handle");
        }
        Ok(())
    }
}

/// `python` maps to the canonical `python2.7`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonPlugin;

#[async_trait]
impl Plugin for PythonPlugin {
    fn name(&self) -> &str {
        "python"
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Open]
    }

    async fn open(&self, spec: &mut FunctionSpec) -> ShipResult<()> {
        if spec.config.runtime != "python" {
            return Ok(());
        }
        spec.config.runtime = "python2.7".to_string();
        default_handler(spec, "main.handle");
        Ok(())
    }
}

/// Any `ruby*` runtime; bare `ruby` maps to `ruby2.5`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RubyPlugin;

#[async_trait]
impl Plugin for RubyPlugin {
    fn name(&self) -> &str {
        "ruby"
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Open]
    }

    async fn open(&self, spec: &mut FunctionSpec) -> ShipResult<()> {
        if !spec.config.runtime.starts_with("ruby") {
            return Ok(());
        }
        if spec.config.runtime == "ruby" {
            spec.config.runtime = "ruby2.5".to_string();
        }
        default_handler(spec, "lambda.handler");
        Ok(())
    }
}
