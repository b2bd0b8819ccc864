// This module defines the RISCPI opcode table and the instruction builders frame lowering
// relies on. Besides the two ADJCALLSTACK pseudos the table holds the small set of real
// instructions a prologue, an epilogue or a frame-index rewrite can produce, plus the
// arithmetic, call and branch opcodes that appear in function bodies. Immediates of addi,
// subi, ldr and str are 12 bits wide; larger stack adjustments are built in ip with a
// movw/movt pair and applied with a register add or sub. Opcode legality follows the
// subtarget features: mul needs `mul`, sdiv needs `div`, and the VFP loads and stores need
// `fpu`.

//! RISCPI instruction table and builders.

use super::features::{FEATURE_DIV, FEATURE_FPU, FEATURE_MUL};
use super::regs::{self, ARG_REGS, CALL_CLOBBERS, DPR, IP, RETURN_REGS};
use crate::core::features::SubtargetConfig;
use crate::core::machine::{InstrDesc, MIFlags, MachineInstr};
use crate::core::regs::PhysReg;
use crate::core::target_info::TargetInstrInfo;
use std::sync::Arc;

/// Largest unsigned 12-bit immediate.
pub const IMM12_MAX: i64 = 4095;

/// Largest VFP load/store offset magnitude (word-scaled 8-bit field).
pub const VFP_OFFSET_MAX: i64 = 1020;

pub mod opcodes {
    pub const ADJCALLSTACKDOWN: u16 = 0;
    pub const ADJCALLSTACKUP: u16 = 1;
    pub const MOV: u16 = 2;
    pub const MOVW: u16 = 3;
    pub const MOVT: u16 = 4;
    pub const ADD: u16 = 5;
    pub const ADDI: u16 = 6;
    pub const SUB: u16 = 7;
    pub const SUBI: u16 = 8;
    pub const ANDI: u16 = 9;
    pub const MUL: u16 = 10;
    pub const SDIV: u16 = 11;
    pub const LDR: u16 = 12;
    pub const STR: u16 = 13;
    pub const VLDR: u16 = 14;
    pub const VSTR: u16 = 15;
    pub const BL: u16 = 16;
    pub const B: u16 = 17;
    pub const BNZ: u16 = 18;
    pub const RET: u16 = 19;
}

use opcodes::*;

pub static DESCS: [InstrDesc; 20] = [
    InstrDesc::new(ADJCALLSTACKDOWN, "adjcallstackdown").frame_setup_pseudo(),
    InstrDesc::new(ADJCALLSTACKUP, "adjcallstackup").frame_destroy_pseudo(),
    InstrDesc::new(MOV, "mov").defs(),
    InstrDesc::new(MOVW, "movw").defs(),
    InstrDesc::new(MOVT, "movt").defs(),
    InstrDesc::new(ADD, "add").defs(),
    InstrDesc::new(ADDI, "addi").defs(),
    InstrDesc::new(SUB, "sub").defs(),
    InstrDesc::new(SUBI, "subi").defs(),
    InstrDesc::new(ANDI, "andi").defs(),
    InstrDesc::new(MUL, "mul").defs(),
    InstrDesc::new(SDIV, "sdiv").defs(),
    InstrDesc::new(LDR, "ldr").defs().loads(),
    InstrDesc::new(STR, "str").stores(),
    InstrDesc::new(VLDR, "vldr").defs().loads(),
    InstrDesc::new(VSTR, "vstr").stores(),
    InstrDesc::new(BL, "bl").call().uses(ARG_REGS).clobbers(CALL_CLOBBERS),
    InstrDesc::new(B, "b").terminator(),
    InstrDesc::new(BNZ, "bnz").terminator(),
    InstrDesc::new(RET, "ret").returns().uses(RETURN_REGS),
];

/// Description of a RISCPI opcode.
pub fn desc(opcode: u16) -> &'static InstrDesc {
    &DESCS[opcode as usize]
}

fn inst(opcode: u16) -> MachineInstr {
    MachineInstr::new(desc(opcode))
}

#[derive(Debug, Clone)]
pub struct RiscPiInstrInfo {
    config: Arc<SubtargetConfig>,
}

impl RiscPiInstrInfo {
    pub fn new(config: Arc<SubtargetConfig>) -> Self {
        Self { config }
    }

    /// `dst = base + amount`, materializing amounts outside the 12-bit range in ip.
    ///
    /// Returns nothing when `dst == base` and `amount == 0`.
    pub fn adjust_reg(
        &self,
        dst: PhysReg,
        base: PhysReg,
        amount: i64,
        flags: MIFlags,
    ) -> Vec<MachineInstr> {
        if amount == 0 {
            if dst == base {
                return Vec::new();
            }
            return vec![inst(MOV).reg(dst).reg(base).with_flags(flags)];
        }

        let magnitude = amount.unsigned_abs() as i64;
        let (imm_op, reg_op) = if amount > 0 { (ADDI, ADD) } else { (SUBI, SUB) };
        if magnitude <= IMM12_MAX {
            return vec![inst(imm_op).reg(dst).reg(base).imm(magnitude).with_flags(flags)];
        }

        debug_assert!(dst != IP && base != IP, "ip is the materialization scratch");
        let mut seq = self.materialize_imm(IP, magnitude as u32, flags);
        seq.push(inst(reg_op).reg(dst).reg(base).reg(IP).with_flags(flags));
        seq
    }

    /// Load a 32-bit constant into `dst` with movw and, if needed, movt.
    pub fn materialize_imm(&self, dst: PhysReg, value: u32, flags: MIFlags) -> Vec<MachineInstr> {
        let mut seq = vec![inst(MOVW)
            .reg(dst)
            .imm((value & 0xffff) as i64)
            .with_flags(flags)];
        if value >> 16 != 0 {
            seq.push(inst(MOVT).reg(dst).imm((value >> 16) as i64).with_flags(flags));
        }
        seq
    }

    /// Spill `reg` to `[base, #offset]`.
    pub fn store_reg(&self, reg: PhysReg, base: PhysReg, offset: i64, flags: MIFlags) -> MachineInstr {
        let opcode = if reg.bank == DPR { VSTR } else { STR };
        inst(opcode).reg(reg).reg(base).imm(offset).with_flags(flags)
    }

    /// Reload `reg` from `[base, #offset]`.
    pub fn load_reg(&self, reg: PhysReg, base: PhysReg, offset: i64, flags: MIFlags) -> MachineInstr {
        let opcode = if reg.bank == DPR { VLDR } else { LDR };
        inst(opcode).reg(reg).reg(base).imm(offset).with_flags(flags)
    }

    /// Realign `sp` down to `align` bytes.
    pub fn align_sp(&self, align: u32, flags: MIFlags) -> MachineInstr {
        inst(ANDI)
            .reg(regs::SP)
            .reg(regs::SP)
            .imm(-(align as i64))
            .with_flags(flags)
    }

    /// `adjcallstackdown #amount; bl @callee; adjcallstackup #amount`.
    pub fn call_sequence(&self, callee: &str, amount: u32) -> Vec<MachineInstr> {
        vec![
            inst(ADJCALLSTACKDOWN).imm(amount as i64),
            inst(BL).symbol(callee),
            inst(ADJCALLSTACKUP).imm(amount as i64),
        ]
    }

    /// Whether `offset` fits the addressing mode of `opcode`.
    pub fn is_legal_offset(&self, opcode: u16, offset: i64) -> bool {
        match opcode {
            VLDR | VSTR => offset.abs() <= VFP_OFFSET_MAX && offset % 4 == 0,
            ADDI | SUBI => (0..=IMM12_MAX).contains(&offset),
            _ => offset.abs() <= IMM12_MAX,
        }
    }
}

impl TargetInstrInfo for RiscPiInstrInfo {
    fn descs(&self) -> &'static [InstrDesc] {
        &DESCS
    }

    fn call_frame_setup_opcode(&self) -> u16 {
        ADJCALLSTACKDOWN
    }

    fn call_frame_destroy_opcode(&self) -> u16 {
        ADJCALLSTACKUP
    }

    fn is_legal(&self, desc: &InstrDesc) -> bool {
        match desc.opcode {
            MUL => self.config.has_feature(FEATURE_MUL),
            SDIV => self.config.has_feature(FEATURE_DIV),
            VLDR | VSTR => self.config.has_feature(FEATURE_FPU),
            _ => true,
        }
    }

    fn accepts_frame_index(&self, desc: &InstrDesc) -> bool {
        desc.opcode == ADDI || desc.is_memory_access()
    }
}
