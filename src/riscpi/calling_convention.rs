// This module implements the RISCPI procedure-call standard. It provides the CCAssigner
// trait and the RiscPiAssigner implementation that places arguments and return values:
// integer arguments go in r0-r3 with 64-bit values in an even/odd register pair, floating
// point arguments go in d0-d7 when the subtarget has the `fpu` feature and are passed in
// core registers otherwise (soft-float), remaining arguments go on the stack in 4-byte
// slots with 64-bit values 8-byte aligned, and results come back in r0/r1 or d0. The
// outgoing stack area is rounded to the 8-byte stack alignment. RiscPiTargetLowering
// wraps the assigner for a subtarget and uses it to size the call frames that the
// ADJCALLSTACK pseudos carry.

//! RISCPI calling convention.

use super::features::{FEATURE_FPU, FEATURE_RESERVE_R9};
use super::instr_info::RiscPiInstrInfo;
use super::regs::{self, d, r, R9, STACK_ALIGN};
use crate::core::features::SubtargetConfig;
use crate::core::frame_info::align_to;
use crate::core::machine::MachineInstr;
use crate::core::regs::{PhysReg, RegSet};
use std::sync::Arc;

/// Value class of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgClass {
    Integer,
    Float,
}

/// Argument assignment result from calling convention analysis.
#[derive(Debug, Clone, Copy)]
pub struct CCAssignment {
    pub class: ArgClass,
    /// Size of the argument in bytes.
    pub size: u32,
    /// Required alignment in bytes.
    pub align: u32,
    /// First assigned register (if any). A 64-bit integer also occupies the next one.
    pub reg: Option<PhysReg>,
    /// Offset in the outgoing argument area (if assigned to stack).
    pub stack_off: Option<u32>,
}

impl CCAssignment {
    pub fn new(class: ArgClass, size: u32, align: u32) -> Self {
        Self {
            class,
            size,
            align,
            reg: None,
            stack_off: None,
        }
    }

    pub fn int(size: u32) -> Self {
        Self::new(ArgClass::Integer, size, size.min(8))
    }

    pub fn float(size: u32) -> Self {
        Self::new(ArgClass::Float, size, size.min(8))
    }
}

/// Register sets of a calling convention.
#[derive(Debug, Clone)]
pub struct CCInfo {
    /// Registers the register allocator may use.
    pub allocatable_regs: RegSet,
    /// Registers that must be preserved by the callee.
    pub callee_saved_regs: RegSet,
    /// Registers used for argument passing.
    pub arg_regs: RegSet,
}

/// Trait for calling convention argument assignment.
pub trait CCAssigner {
    fn get_ccinfo(&self) -> &CCInfo;

    fn assign_arg(&mut self, arg: &mut CCAssignment);

    fn assign_ret(&mut self, arg: &mut CCAssignment);

    /// Reset state for a new call.
    fn reset(&mut self);

    /// Stack space needed for the arguments assigned so far.
    fn get_stack_size(&self) -> u32;
}

pub struct RiscPiAssigner {
    cc_info: CCInfo,
    hard_float: bool,
    gp_cnt: usize,
    fp_cnt: usize,
    stack: u32,
    ret_gp_cnt: usize,
    ret_fp_cnt: usize,
}

impl RiscPiAssigner {
    const GP_ARG_REGS: [PhysReg; 4] = [r(0), r(1), r(2), r(3)];

    const FP_ARG_REGS: [PhysReg; 8] = [d(0), d(1), d(2), d(3), d(4), d(5), d(6), d(7)];

    const RET_GP_REGS: [PhysReg; 2] = [r(0), r(1)];

    const RET_FP_REGS: [PhysReg; 1] = [d(0)];

    pub fn new(config: &SubtargetConfig) -> Self {
        let hard_float = config.has_feature(FEATURE_FPU);

        // Everything but fp, ip, sp and pc.
        let mut allocatable = RegSet::new();
        for id in (0..=10).chain([14]) {
            allocatable.insert(r(id));
        }
        if config.has_feature(FEATURE_RESERVE_R9) {
            allocatable.remove(R9);
        }
        if hard_float {
            allocatable.extend((0..16).map(d));
        }

        let mut arg_regs = RegSet::from_regs(&Self::GP_ARG_REGS);
        if hard_float {
            arg_regs.extend(Self::FP_ARG_REGS);
        }

        let callee_saved_regs = RegSet::from_regs(regs::callee_saved_regs(config));

        Self {
            cc_info: CCInfo {
                allocatable_regs: allocatable,
                callee_saved_regs,
                arg_regs,
            },
            hard_float,
            gp_cnt: 0,
            fp_cnt: 0,
            stack: 0,
            ret_gp_cnt: 0,
            ret_fp_cnt: 0,
        }
    }

    pub fn gp_used(&self) -> usize {
        self.gp_cnt
    }

    pub fn fp_used(&self) -> usize {
        self.fp_cnt
    }

    fn assign_stack(&mut self, arg: &mut CCAssignment) {
        let align = if arg.size > 4 { 8 } else { 4 };
        self.stack = align_to(self.stack, align.max(arg.align));
        arg.stack_off = Some(self.stack);
        self.stack += align_to(arg.size, 4);
    }

    fn assign_gp(&mut self, arg: &mut CCAssignment) {
        let regs_needed = if arg.size > 4 { 2 } else { 1 };
        // 64-bit values start at an even register.
        let first = if regs_needed == 2 {
            (self.gp_cnt + 1) & !1
        } else {
            self.gp_cnt
        };
        if first + regs_needed <= Self::GP_ARG_REGS.len() {
            arg.reg = Some(Self::GP_ARG_REGS[first]);
            self.gp_cnt = first + regs_needed;
        } else {
            // Once an argument spills, no later one may use a core register.
            self.gp_cnt = Self::GP_ARG_REGS.len();
            self.assign_stack(arg);
        }
    }
}

impl CCAssigner for RiscPiAssigner {
    fn get_ccinfo(&self) -> &CCInfo {
        &self.cc_info
    }

    fn assign_arg(&mut self, arg: &mut CCAssignment) {
        match arg.class {
            ArgClass::Float if self.hard_float => {
                if self.fp_cnt < Self::FP_ARG_REGS.len() {
                    arg.reg = Some(Self::FP_ARG_REGS[self.fp_cnt]);
                    self.fp_cnt += 1;
                } else {
                    self.assign_stack(arg);
                }
            }
            ArgClass::Float | ArgClass::Integer => self.assign_gp(arg),
        }
    }

    fn assign_ret(&mut self, arg: &mut CCAssignment) {
        match arg.class {
            ArgClass::Float if self.hard_float => {
                if self.ret_fp_cnt < Self::RET_FP_REGS.len() {
                    arg.reg = Some(Self::RET_FP_REGS[self.ret_fp_cnt]);
                    self.ret_fp_cnt += 1;
                }
            }
            ArgClass::Float | ArgClass::Integer => {
                let needed = if arg.size > 4 { 2 } else { 1 };
                if self.ret_gp_cnt + needed <= Self::RET_GP_REGS.len() {
                    arg.reg = Some(Self::RET_GP_REGS[self.ret_gp_cnt]);
                    self.ret_gp_cnt += needed;
                }
            }
        }
    }

    fn reset(&mut self) {
        self.gp_cnt = 0;
        self.fp_cnt = 0;
        self.stack = 0;
        self.ret_gp_cnt = 0;
        self.ret_fp_cnt = 0;
    }

    fn get_stack_size(&self) -> u32 {
        align_to(self.stack, STACK_ALIGN)
    }
}

/// Call lowering information for one subtarget.
#[derive(Debug, Clone)]
pub struct RiscPiTargetLowering {
    config: Arc<SubtargetConfig>,
    instr_info: RiscPiInstrInfo,
}

impl RiscPiTargetLowering {
    pub fn new(config: Arc<SubtargetConfig>, instr_info: RiscPiInstrInfo) -> Self {
        Self { config, instr_info }
    }

    pub fn assigner(&self) -> RiscPiAssigner {
        RiscPiAssigner::new(&self.config)
    }

    pub fn uses_hard_float(&self) -> bool {
        self.config.has_feature(FEATURE_FPU)
    }

    /// Assign `args` and return the size of the outgoing argument area.
    pub fn outgoing_call_frame_size(&self, args: &mut [CCAssignment]) -> u32 {
        let mut assigner = self.assigner();
        for arg in args.iter_mut() {
            assigner.assign_arg(arg);
        }
        assigner.get_stack_size()
    }

    /// The pseudo-bracketed call sequence for calling `callee` with `args`.
    pub fn lower_call(&self, callee: &str, args: &mut [CCAssignment]) -> Vec<MachineInstr> {
        let frame_size = self.outgoing_call_frame_size(args);
        self.instr_info.call_sequence(callee, frame_size)
    }
}
