// This module implements the RISCPI subtarget descriptor. Construction parses the CPU name
// and feature string exactly once into a SubtargetConfig, wraps it in an Arc, and builds
// the per-subtarget helpers in a fixed order: instruction info, frame lowering, call
// lowering, register info. Each helper keeps its own Arc to the shared configuration, so
// the descriptor as a whole is immutable after construction and can be shared across
// threads. The convenience queries (has_mul, has_fpu, ...) are plain reads of the
// configuration.

//! RISCPI subtarget descriptor.

use super::calling_convention::RiscPiTargetLowering;
use super::features::{FEATURES, FEATURE_DIV, FEATURE_FPU, FEATURE_MUL, FEATURE_RESERVE_R9};
use super::frame_lowering::RiscPiFrameLowering;
use super::instr_info::RiscPiInstrInfo;
use super::register_info::RiscPiRegisterInfo;
use crate::core::features::SubtargetConfig;
use crate::core::frame_lowering::FrameLowering;
use crate::core::target_info::{TargetInstrInfo, TargetRegisterInfo, TargetSubtarget};
use crate::target::{TargetMachine, Triple};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RiscPiSubtarget {
    triple: Triple,
    config: Arc<SubtargetConfig>,
    instr_info: RiscPiInstrInfo,
    frame_lowering: RiscPiFrameLowering,
    lowering: RiscPiTargetLowering,
    register_info: RiscPiRegisterInfo,
}

impl RiscPiSubtarget {
    /// Build the subtarget for `cpu` and `features`. An empty CPU selects `generic`;
    /// unknown feature tokens are reported and ignored.
    pub fn new(triple: &Triple, cpu: &str, features: &str, tm: &TargetMachine) -> Self {
        let config = Arc::new(Self::initialize_subtarget_dependencies(cpu, features));

        let instr_info = RiscPiInstrInfo::new(Arc::clone(&config));
        let frame_lowering =
            RiscPiFrameLowering::new(Arc::clone(&config), instr_info.clone(), tm.options());
        let lowering = RiscPiTargetLowering::new(Arc::clone(&config), instr_info.clone());
        let register_info = RiscPiRegisterInfo::new(Arc::clone(&config));

        log::debug!(
            "created riscpi subtarget for {triple}: cpu={} features=[{}]",
            config.cpu(),
            config.feature_string()
        );

        Self {
            triple: triple.clone(),
            config,
            instr_info,
            frame_lowering,
            lowering,
            register_info,
        }
    }

    fn initialize_subtarget_dependencies(cpu: &str, features: &str) -> SubtargetConfig {
        SubtargetConfig::parse(&FEATURES, cpu, features)
    }

    pub fn triple(&self) -> &Triple {
        &self.triple
    }

    pub fn has_mul(&self) -> bool {
        self.config.has_feature(FEATURE_MUL)
    }

    pub fn has_div(&self) -> bool {
        self.config.has_feature(FEATURE_DIV)
    }

    pub fn has_fpu(&self) -> bool {
        self.config.has_feature(FEATURE_FPU)
    }

    pub fn reserves_r9(&self) -> bool {
        self.config.has_feature(FEATURE_RESERVE_R9)
    }

    pub fn riscpi_instr_info(&self) -> &RiscPiInstrInfo {
        &self.instr_info
    }

    pub fn riscpi_frame_lowering(&self) -> &RiscPiFrameLowering {
        &self.frame_lowering
    }

    pub fn lowering(&self) -> &RiscPiTargetLowering {
        &self.lowering
    }
}

impl TargetSubtarget for RiscPiSubtarget {
    fn config(&self) -> &SubtargetConfig {
        &self.config
    }

    fn instr_info(&self) -> &dyn TargetInstrInfo {
        &self.instr_info
    }

    fn frame_lowering(&self) -> &dyn FrameLowering {
        &self.frame_lowering
    }

    fn register_info(&self) -> &dyn TargetRegisterInfo {
        &self.register_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{TargetOptions, TargetRegistry};

    fn subtarget(cpu: &str, fs: &str) -> RiscPiSubtarget {
        let tm = TargetMachine::new(&TargetRegistry::builtin(), "riscpi", TargetOptions::default())
            .unwrap();
        RiscPiSubtarget::new(tm.triple(), cpu, fs, &tm)
    }

    #[test]
    fn test_empty_cpu_means_generic() {
        let empty = subtarget("", "");
        let generic = subtarget("generic", "");
        assert_eq!(empty.cpu(), "generic");
        assert_eq!(empty.config(), generic.config());
        assert!(!empty.has_mul());
    }

    #[test]
    fn test_feature_queries() {
        let st = subtarget("bcm2836", "+reserve-r9");
        assert!(st.has_mul() && st.has_div() && st.has_fpu() && st.reserves_r9());
        assert!(st.lowering().uses_hard_float());
        assert_eq!(st.riscpi_frame_lowering().config().cpu(), "bcm2836");
    }

    #[test]
    fn test_malformed_features_degrade_to_defaults() {
        let st = subtarget("", ",,+,garbage,-nothing");
        assert!(st.config().is_empty());
    }

    #[test]
    fn test_subtarget_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RiscPiSubtarget>();
    }
}
