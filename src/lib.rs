//! RISCPI frame lowering and subtarget description.
//!
//! This crate is the RISCPI slice of a machine-code backend: it answers how a
//! function's stack frame is built and torn down for a given CPU and feature set.
//!
//! # Primary Usage
//!
//! ```ignore
//! use riscpi::core::{CompilationSession, PrologEpilogInserter};
//! use riscpi::target::{TargetMachine, TargetOptions, TargetRegistry};
//! use riscpi::test_mir::{parse_module, MirPrinter};
//! use bumpalo::Bump;
//!
//! let tm = TargetMachine::new(&TargetRegistry::builtin(), "riscpi", TargetOptions::default())?;
//! let subtarget = tm.create_subtarget("bcm2836", "+reserve-r9");
//!
//! let mut functions = parse_module(text, subtarget.instr_info(), subtarget.register_info())?;
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! PrologEpilogInserter::new(subtarget.as_ref()).run_module(&mut functions, &session);
//! println!("{}", MirPrinter::new(subtarget.register_info()).print_module(&functions));
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Target-independent machine IR, trait seams and the inserter
//! - [`target`] - Triples, options, registry and target machines
//! - [`riscpi`] - The RISCPI subtarget, register file and frame lowering
//! - [`test_mir`] - Textual machine IR for tests and the driver

pub mod core;
pub mod riscpi;
pub mod target;
pub mod test_mir;

pub use core::{
    // Errors
    CodegenError, CodegenResult,
    // Machine IR
    MachineFunction, MachineInstr, Operand, PhysReg, RegSet,
    // Trait seams
    FrameLowering, TargetInstrInfo, TargetRegisterInfo, TargetSubtarget,
    // Driver
    CompilationSession, PrologEpilogInserter, SessionStats,
};
pub use riscpi::RiscPiSubtarget;
pub use target::{TargetMachine, TargetOptions, TargetRegistry, Triple};
