// This module serves as the central hub for the target-independent half of the backend
// layer. It exports the machine-function model (blocks, instructions, frame information),
// the register model, subtarget feature parsing, the trait seams a target implements
// (FrameLowering, TargetInstrInfo, TargetRegisterInfo, TargetSubtarget), the register
// scavenger, the arena-based compilation session, and the prologue/epilogue inserter that
// drives a target's frame lowering over a function.

//! Core backend infrastructure
//!
//! Target-independent building blocks for frame lowering.
//!
//! # Key Components
//!
//! ## Machine IR (`machine`, `frame_info`, `regs`)
//! - Functions, blocks and instructions with static opcode descriptions
//! - Stack objects, callee-saved info and frame facts
//! - Physical registers and ordered register sets
//!
//! ## Subtarget description (`features`, `target_info`, `frame_lowering`)
//! - Versioned feature tables and forgiving feature-string parsing
//! - Trait seams implemented by each target
//!
//! ## Frame lowering driver (`pei`, `scavenger`, `session`)
//! - Prologue/epilogue insertion and frame-index elimination
//! - Emergency register scavenging for large frames
//! - Arena-backed per-thread sessions with statistics

pub mod error;
pub mod features;
pub mod frame_info;
pub mod frame_lowering;
pub mod machine;
pub mod pei;
pub mod regs;
pub mod scavenger;
pub mod session;
pub mod target_info;

pub use error::{CodegenError, CodegenResult};
pub use features::{CpuDesc, FeatureDesc, FeatureTable, SubtargetConfig, DEFAULT_CPU};
pub use frame_info::{
    align_to, CalleeSavedInfo, FrameFacts, FrameIndex, MachineFrameInfo, StackObject,
    StackObjectKind,
};
pub use frame_lowering::FrameLowering;
pub use machine::{
    BlockId, FramePhase, FunctionAttrs, InstrDesc, MIFlags, MachineBasicBlock, MachineFunction,
    MachineInstr, Operand,
};
pub use pei::PrologEpilogInserter;
pub use regs::{PhysReg, RegBank, RegId, RegSet};
pub use scavenger::{RegScavenger, Scavenged};
pub use session::{CompilationSession, SessionStats};
pub use target_info::{TargetInstrInfo, TargetRegisterInfo, TargetSubtarget};
