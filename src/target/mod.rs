// This module holds the target-selection layer: target triples, the TargetOptions that
// influence code generation (frame-pointer elimination and stack realignment), the static
// registry of built-in targets, and TargetMachine, which binds a registered target to a
// triple and options and creates subtargets for a CPU and feature string. Subtargets are
// handed out as Arc<dyn TargetSubtarget> so that one instance can be shared by every worker
// thread compiling functions for the same configuration.

//! Target triples, options, registry and target machines.

pub mod registry;

pub use registry::{TargetEntry, TargetRegistry};

use crate::core::error::CodegenResult;
use crate::core::target_info::TargetSubtarget;
use std::fmt;
use std::sync::Arc;

/// A parsed `arch-vendor-os[-env]` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    raw: String,
    pub arch: String,
    pub vendor: String,
    pub os: String,
    pub environment: String,
}

impl Triple {
    /// Split a triple into its components. Missing components are empty.
    pub fn new(triple: &str) -> Self {
        let mut parts = triple.splitn(4, '-');
        let mut next = || parts.next().unwrap_or_default().to_string();
        Self {
            raw: triple.to_string(),
            arch: next(),
            vendor: next(),
            os: next(),
            environment: next(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Code generation options shared by every subtarget of a target machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetOptions {
    /// Keep a frame pointer in every function.
    pub disable_fp_elim: bool,
    /// Allow dynamic realignment of over-aligned frames.
    pub realign_stack: bool,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            disable_fp_elim: false,
            realign_stack: true,
        }
    }
}

/// A registered target bound to a triple and options.
#[derive(Debug, Clone)]
pub struct TargetMachine {
    triple: Triple,
    options: TargetOptions,
    target: &'static TargetEntry,
}

impl TargetMachine {
    pub fn new(registry: &TargetRegistry, triple: &str, options: TargetOptions) -> CodegenResult<Self> {
        let triple = Triple::new(triple);
        let target = registry.lookup(&triple)?;
        log::debug!("target machine: {} ({}) for {}", target.name, target.description, triple);
        Ok(Self {
            triple,
            options,
            target,
        })
    }

    pub fn triple(&self) -> &Triple {
        &self.triple
    }

    pub fn options(&self) -> TargetOptions {
        self.options
    }

    pub fn target(&self) -> &'static TargetEntry {
        self.target
    }

    /// Build the subtarget for `cpu` and `features`.
    pub fn create_subtarget(&self, cpu: &str, features: &str) -> Arc<dyn TargetSubtarget> {
        (self.target.create_subtarget)(&self.triple, cpu, features, self)
    }
}
