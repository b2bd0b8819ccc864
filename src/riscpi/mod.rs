//! RISCPI target.
//!
//! A 32-bit load/store architecture with sixteen core registers, an optional
//! VFP register bank and a full-descending stack kept 8-byte aligned:
//! - Feature and CPU tables (`features`)
//! - Register file and callee-saved lists (`regs`, `register_info`)
//! - Opcode table and instruction builders (`instr_info`)
//! - Frame lowering (`frame_lowering`)
//! - Procedure-call standard (`calling_convention`)
//! - The subtarget descriptor tying them together (`subtarget`)

pub mod calling_convention;
pub mod features;
pub mod frame_lowering;
pub mod instr_info;
pub mod register_info;
pub mod regs;
pub mod subtarget;

pub use calling_convention::{ArgClass, CCAssigner, CCAssignment, RiscPiAssigner, RiscPiTargetLowering};
pub use frame_lowering::RiscPiFrameLowering;
pub use instr_info::RiscPiInstrInfo;
pub use register_info::RiscPiRegisterInfo;
pub use subtarget::RiscPiSubtarget;

use crate::core::target_info::TargetSubtarget;
use crate::target::{TargetEntry, TargetMachine, Triple};
use std::sync::Arc;

fn create_subtarget(
    triple: &Triple,
    cpu: &str,
    features: &str,
    tm: &TargetMachine,
) -> Arc<dyn TargetSubtarget> {
    Arc::new(RiscPiSubtarget::new(triple, cpu, features, tm))
}

/// Registry entry of the RISCPI target.
pub const TARGET: TargetEntry = TargetEntry {
    name: "riscpi",
    description: "RISCPI 32-bit",
    arch_names: &["riscpi", "riscpiel"],
    create_subtarget,
};
