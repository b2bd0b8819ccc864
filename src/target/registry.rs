//! Static registry of built-in targets.

use super::{TargetMachine, Triple};
use crate::core::error::{CodegenError, CodegenResult};
use crate::core::target_info::TargetSubtarget;
use hashbrown::HashMap;
use std::sync::Arc;

/// Constructor for a target's subtarget.
pub type SubtargetCtor = fn(&Triple, &str, &str, &TargetMachine) -> Arc<dyn TargetSubtarget>;

/// A target the registry can hand out.
pub struct TargetEntry {
    pub name: &'static str,
    pub description: &'static str,
    /// Triple architectures served by this target.
    pub arch_names: &'static [&'static str],
    pub create_subtarget: SubtargetCtor,
}

impl std::fmt::Debug for TargetEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetEntry")
            .field("name", &self.name)
            .field("arch_names", &self.arch_names)
            .finish()
    }
}

static BUILTIN_TARGETS: &[TargetEntry] = &[crate::riscpi::TARGET];

/// Lookup table from triple architecture to target.
#[derive(Debug)]
pub struct TargetRegistry {
    targets: &'static [TargetEntry],
    by_arch: HashMap<&'static str, usize>,
}

impl TargetRegistry {
    /// Registry of every target compiled into this crate.
    pub fn builtin() -> Self {
        Self::with_targets(BUILTIN_TARGETS)
    }

    pub fn with_targets(targets: &'static [TargetEntry]) -> Self {
        let mut by_arch = HashMap::new();
        for (index, target) in targets.iter().enumerate() {
            for &arch in target.arch_names {
                if by_arch.insert(arch, index).is_some() {
                    log::warn!("architecture '{arch}' registered twice; '{}' wins", target.name);
                }
            }
        }
        Self { targets, by_arch }
    }

    pub fn targets(&self) -> impl Iterator<Item = &'static TargetEntry> {
        self.targets.iter()
    }

    pub fn get(&self, name: &str) -> Option<&'static TargetEntry> {
        self.targets.iter().find(|target| target.name == name)
    }

    /// Target serving the triple's architecture.
    pub fn lookup(&self, triple: &Triple) -> CodegenResult<&'static TargetEntry> {
        self.by_arch
            .get(triple.arch.as_str())
            .map(|&index| &self.targets[index])
            .ok_or_else(|| CodegenError::UnknownTarget {
                triple: triple.to_string(),
            })
    }
}
