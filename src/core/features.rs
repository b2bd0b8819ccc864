// This module turns a CPU name and a feature string into the immutable SubtargetConfig that
// every per-target component reads. The set of known features and CPUs comes from a
// hand-maintained FeatureTable supplied by the target; each table carries a version number
// so that changes to feature semantics are visible in review. Parsing is forgiving: tokens
// that name nothing in the table are reported through log::warn! and skipped, so a single
// bad feature never stops a build. Enabling a feature also enables what it implies, and
// disabling one also disables everything that implies it, matching the usual subtarget
// feature semantics of production backends.

//! Feature tables and subtarget configuration parsing.

use hashbrown::HashMap;

/// CPU name used when none is given.
pub const DEFAULT_CPU: &str = "generic";

/// A single subtarget feature.
#[derive(Debug, Clone, Copy)]
pub struct FeatureDesc {
    pub name: &'static str,
    pub description: &'static str,
    /// Features switched on together with this one.
    pub implies: &'static [&'static str],
}

/// A named CPU and the features it implies.
#[derive(Debug, Clone, Copy)]
pub struct CpuDesc {
    pub name: &'static str,
    pub features: &'static [&'static str],
}

/// Versioned mapping from feature and CPU names to feature sets.
#[derive(Debug)]
pub struct FeatureTable {
    pub version: u32,
    pub features: &'static [FeatureDesc],
    pub cpus: &'static [CpuDesc],
}

impl FeatureTable {
    pub fn feature(&self, name: &str) -> Option<&'static FeatureDesc> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn cpu(&self, name: &str) -> Option<&'static CpuDesc> {
        self.cpus.iter().find(|c| c.name == name)
    }
}

/// Immutable CPU and feature configuration of a subtarget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtargetConfig {
    cpu: String,
    features: HashMap<&'static str, bool>,
}

impl SubtargetConfig {
    /// Parse `cpu` and `feature_string` against `table`.
    ///
    /// An empty CPU name selects [`DEFAULT_CPU`]. The CPU's implied features are
    /// applied first, then the tokens of the feature string in order, so later
    /// tokens override earlier ones.
    pub fn parse(table: &FeatureTable, cpu: &str, feature_string: &str) -> Self {
        let cpu = if cpu.is_empty() { DEFAULT_CPU } else { cpu };
        let mut builder = ConfigBuilder {
            table,
            features: HashMap::new(),
        };

        match table.cpu(cpu) {
            Some(desc) => builder.apply_cpu(desc),
            None => log::warn!("'{cpu}' is not a recognized processor; using no implied features"),
        }

        for token in feature_string
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            builder.apply_token(token);
        }

        let config = Self {
            cpu: cpu.to_string(),
            features: builder.features,
        };
        log::debug!(
            "subtarget config: cpu={} features=[{}] (table v{})",
            config.cpu,
            config.feature_string(),
            table.version
        );
        config
    }

    pub fn cpu(&self) -> &str {
        &self.cpu
    }

    /// True if the feature is explicitly enabled.
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    /// The recorded state of a feature, if the configuration mentions it.
    pub fn feature_state(&self, name: &str) -> Option<bool> {
        self.features.get(name).copied()
    }

    /// All recorded features, sorted by name.
    pub fn features(&self) -> Vec<(&'static str, bool)> {
        let mut features: Vec<_> = self.features.iter().map(|(k, v)| (*k, *v)).collect();
        features.sort_unstable_by_key(|(name, _)| *name);
        features
    }

    /// True if no feature is recorded at all.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Canonical `+a,-b` rendering of the capability set.
    pub fn feature_string(&self) -> String {
        self.features()
            .into_iter()
            .map(|(name, on)| format!("{}{}", if on { '+' } else { '-' }, name))
            .collect::<Vec<_>>()
            .join(",")
    }
}

struct ConfigBuilder<'t> {
    table: &'t FeatureTable,
    features: HashMap<&'static str, bool>,
}

impl ConfigBuilder<'_> {
    fn apply_cpu(&mut self, cpu: &CpuDesc) {
        for name in cpu.features {
            match self.table.feature(name) {
                Some(desc) => self.enable(desc),
                None => log::warn!("CPU '{}' implies unknown feature '{name}'", cpu.name),
            }
        }
    }

    fn apply_token(&mut self, token: &str) {
        let (sign, name) = match token.as_bytes()[0] {
            b'+' => (Some(true), &token[1..]),
            b'-' => (Some(false), &token[1..]),
            _ => (None, token),
        };

        if let Some(desc) = self.table.feature(name) {
            match sign {
                Some(false) => self.disable(desc.name),
                _ => self.enable(desc),
            }
            return;
        }

        if sign.is_none() {
            if let Some(cpu) = self.table.cpu(name) {
                self.apply_cpu(cpu);
                return;
            }
        }

        log::warn!("'{token}' is not a recognized feature for this target (ignoring feature)");
    }

    fn enable(&mut self, desc: &'static FeatureDesc) {
        self.features.insert(desc.name, true);
        for implied in desc.implies {
            if let Some(implied) = self.table.feature(implied) {
                if self.features.get(implied.name) != Some(&true) {
                    self.enable(implied);
                }
            }
        }
    }

    fn disable(&mut self, name: &'static str) {
        self.features.insert(name, false);
        for desc in self.table.features {
            if desc.implies.contains(&name) && self.features.get(desc.name) != Some(&false) {
                self.disable(desc.name);
            }
        }
    }
}
