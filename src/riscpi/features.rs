//! RISCPI feature and processor table.

use crate::core::features::{CpuDesc, FeatureDesc, FeatureTable};

/// Bumped whenever a feature's meaning or a CPU's feature set changes.
pub const FEATURE_TABLE_VERSION: u32 = 1;

pub const FEATURE_MUL: &str = "mul";
pub const FEATURE_DIV: &str = "div";
pub const FEATURE_FPU: &str = "fpu";
pub const FEATURE_RESERVE_R9: &str = "reserve-r9";

pub static FEATURES: FeatureTable = FeatureTable {
    version: FEATURE_TABLE_VERSION,
    features: &[
        FeatureDesc {
            name: FEATURE_MUL,
            description: "Hardware multiply",
            implies: &[],
        },
        FeatureDesc {
            name: FEATURE_DIV,
            description: "Hardware divide",
            implies: &[FEATURE_MUL],
        },
        FeatureDesc {
            name: FEATURE_FPU,
            description: "VFP double-precision registers and hard-float calling convention",
            implies: &[],
        },
        FeatureDesc {
            name: FEATURE_RESERVE_R9,
            description: "Reserve r9 as the platform register",
            implies: &[],
        },
    ],
    cpus: &[
        CpuDesc {
            name: "generic",
            features: &[],
        },
        CpuDesc {
            name: "bcm2835",
            features: &[FEATURE_MUL, FEATURE_FPU],
        },
        CpuDesc {
            name: "bcm2836",
            features: &[FEATURE_MUL, FEATURE_DIV, FEATURE_FPU],
        },
        CpuDesc {
            name: "bcm2837",
            features: &[FEATURE_MUL, FEATURE_DIV, FEATURE_FPU],
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::SubtargetConfig;

    #[test]
    fn test_cpu_feature_sets() {
        let pi1 = SubtargetConfig::parse(&FEATURES, "bcm2835", "");
        assert!(pi1.has_feature(FEATURE_MUL));
        assert!(pi1.has_feature(FEATURE_FPU));
        assert!(!pi1.has_feature(FEATURE_DIV));

        let pi3 = SubtargetConfig::parse(&FEATURES, "bcm2837", "-fpu");
        assert!(pi3.has_feature(FEATURE_DIV));
        assert!(!pi3.has_feature(FEATURE_FPU));
    }

    #[test]
    fn test_div_implies_mul() {
        let config = SubtargetConfig::parse(&FEATURES, "", "+div");
        assert!(config.has_feature(FEATURE_MUL));

        let config = SubtargetConfig::parse(&FEATURES, "", "+div,-mul");
        assert!(!config.has_feature(FEATURE_DIV));

        let config = SubtargetConfig::parse(&FEATURES, "", "+div,-div");
        assert!(!config.has_feature(FEATURE_DIV));
        assert!(config.has_feature(FEATURE_MUL));
    }
}
