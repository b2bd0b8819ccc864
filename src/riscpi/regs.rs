// This module holds the RISCPI register tables. Bank 0 holds the sixteen 32-bit general
// registers r0-r15, with the ABI roles fp=r11, ip=r12 (intra-procedure scratch), sp=r13,
// lr=r14 and pc=r15. Bank 1 holds the sixteen 64-bit VFP registers d0-d15, present only
// with the `fpu` feature. The callee-saved lists are precomputed for every combination of
// the `fpu` and `reserve-r9` features so that both frame lowering and register info can
// hand out a static slice without allocating.

//! RISCPI register file.

use super::features::{FEATURE_FPU, FEATURE_RESERVE_R9};
use crate::core::features::SubtargetConfig;
use crate::core::regs::{PhysReg, RegBank};

pub const GPR: RegBank = 0;
pub const DPR: RegBank = 1;

pub const fn r(n: u8) -> PhysReg {
    PhysReg::new(GPR, n)
}

pub const fn d(n: u8) -> PhysReg {
    PhysReg::new(DPR, n)
}

pub const R0: PhysReg = r(0);
pub const R1: PhysReg = r(1);
pub const R2: PhysReg = r(2);
pub const R3: PhysReg = r(3);
pub const R4: PhysReg = r(4);
pub const R5: PhysReg = r(5);
pub const R9: PhysReg = r(9);
pub const FP: PhysReg = r(11);
pub const IP: PhysReg = r(12);
pub const SP: PhysReg = r(13);
pub const LR: PhysReg = r(14);
pub const PC: PhysReg = r(15);

/// Stack alignment at call boundaries.
pub const STACK_ALIGN: u32 = 8;

pub const GPR_NAMES: [&str; 16] = [
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "fp", "ip", "sp", "lr",
    "pc",
];

pub const DPR_NAMES: [&str; 16] = [
    "d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7", "d8", "d9", "d10", "d11", "d12", "d13", "d14",
    "d15",
];

/// Integer argument registers, read by every call.
pub const ARG_REGS: &[PhysReg] = &[R0, R1, R2, R3];

/// Integer return value registers, read by every return.
pub const RETURN_REGS: &[PhysReg] = &[R0, R1];

/// Registers clobbered by every call.
pub const CALL_CLOBBERS: &[PhysReg] = &[R0, R1, R2, R3, IP, LR];

const CSR_BASE: &[PhysReg] = &[r(4), r(5), r(6), r(7), r(8), r(9), r(10), FP, LR];

const CSR_R9: &[PhysReg] = &[r(4), r(5), r(6), r(7), r(8), r(10), FP, LR];

const CSR_FPU: &[PhysReg] = &[
    r(4),
    r(5),
    r(6),
    r(7),
    r(8),
    r(9),
    r(10),
    FP,
    LR,
    d(8),
    d(9),
    d(10),
    d(11),
    d(12),
    d(13),
    d(14),
    d(15),
];

const CSR_FPU_R9: &[PhysReg] = &[
    r(4),
    r(5),
    r(6),
    r(7),
    r(8),
    r(10),
    FP,
    LR,
    d(8),
    d(9),
    d(10),
    d(11),
    d(12),
    d(13),
    d(14),
    d(15),
];

/// Callee-saved registers for a configuration, in save order.
pub fn callee_saved_regs(config: &SubtargetConfig) -> &'static [PhysReg] {
    match (
        config.has_feature(FEATURE_FPU),
        config.has_feature(FEATURE_RESERVE_R9),
    ) {
        (false, false) => CSR_BASE,
        (false, true) => CSR_R9,
        (true, false) => CSR_FPU,
        (true, true) => CSR_FPU_R9,
    }
}

/// Canonical assembly name.
pub fn name(reg: PhysReg) -> &'static str {
    match reg.bank {
        GPR => GPR_NAMES.get(reg.id as usize).copied().unwrap_or("r?"),
        DPR => DPR_NAMES.get(reg.id as usize).copied().unwrap_or("d?"),
        _ => "?",
    }
}

/// Parse a register name. `r11`-`r15` are accepted next to their ABI names.
pub fn parse(name: &str) -> Option<PhysReg> {
    if let Some(id) = GPR_NAMES.iter().position(|n| *n == name) {
        return Some(r(id as u8));
    }
    if let Some(id) = DPR_NAMES.iter().position(|n| *n == name) {
        return Some(d(id as u8));
    }
    let id: u8 = name.strip_prefix('r')?.parse().ok()?;
    (id < 16 && name[1..] == id.to_string()).then(|| r(id))
}

/// Bytes needed to spill `reg`.
pub fn spill_size(reg: PhysReg) -> u32 {
    if reg.bank == DPR {
        8
    } else {
        4
    }
}
