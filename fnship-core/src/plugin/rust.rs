//! Rust binaries cross-compiled for Linux and run behind the Node.js shim.

use async_trait::async_trait;

use super::Plugin;
use crate::error::ShipResult;
use crate::function::FunctionSpec;
use crate::types::Hook;

/// Paths that only matter for compiling, never at run time.
const SOURCE_PATTERNS: &[&str] = &[
    "target/",
    "src/",
    "examples/",
    "tests/",
    "benches/",
    "Cargo.toml",
    "Cargo.lock",
    ".git/",
    ".gitignore",
    "build.rs",
];

/// C library the binary links against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RustTarget {
    Musl,
    Gnu,
}

impl RustTarget {
    fn runtime(&self) -> &'static str {
        match self {
            Self::Musl => "rust-musl",
            Self::Gnu => "rust-gnu",
        }
    }

    fn triple(&self) -> &'static str {
        match self {
            Self::Musl => "x86_64-unknown-linux-musl",
            Self::Gnu => "x86_64-unknown-linux-gnu",
        }
    }

    /// Node.js runtime hosting the shim.
    fn host_runtime(&self) -> &'static str {
        match self {
            Self::Musl => "nodejs4.3",
            Self::Gnu => "nodejs",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RustPlugin {
    target: RustTarget,
}

impl RustPlugin {
    pub fn new(target: RustTarget) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Plugin for RustPlugin {
    fn name(&self) -> &str {
        self.target.runtime()
    }

    fn hooks(&self) -> &'static [Hook] {
        &[Hook::Open]
    }

    async fn open(&self, spec: &mut FunctionSpec) -> ShipResult<()> {
        if !spec.config.runtime.starts_with(self.target.runtime()) {
            return Ok(());
        }

        let triple = self.target.triple();
        if spec.config.hooks.build.is_empty() {
            spec.config.hooks.build = format!(
                "cargo build --target={triple} --release && mv target/{triple}/release/{} ./main",
                spec.name
            );
        }
        if spec.config.hooks.clean.is_empty() {
            spec.config.hooks.clean = "rm -f main".to_string();
        }

        spec.config.shim = true;
        spec.config.runtime = self.target.host_runtime().to_string();

        for pattern in SOURCE_PATTERNS {
            spec.ignore.push(*pattern);
        }
        Ok(())
    }
}
