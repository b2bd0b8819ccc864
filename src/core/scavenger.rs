// This module implements the register scavenger used while rewriting frame indices. When an
// object's offset does not fit an instruction's immediate field, the target needs one spare
// register to build the address in. The scavenger hands out registers in preference order:
// first the target's dedicated scratch registers (reserved and never allocated, so free at
// any instruction that does not mention them), then fallback candidates that are not
// referenced anywhere in the function, counting the implicit uses of calls and returns so
// that argument and return-value registers stay live. When neither is available it picks a candidate that
// the instruction itself does not touch and reports that it must be spilled to one of the
// emergency slots registered by determine_callee_saves.

//! Emergency register scavenging for frame-index elimination.

use super::frame_info::FrameIndex;
use super::machine::{MachineFunction, MachineInstr};
use super::regs::PhysReg;

/// Outcome of a scavenging request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scavenged {
    /// The register may be clobbered freely.
    Free(PhysReg),
    /// The register is live; save it to `slot` before use and reload it after.
    Spilled { reg: PhysReg, slot: FrameIndex },
}

impl Scavenged {
    pub fn reg(self) -> PhysReg {
        match self {
            Scavenged::Free(reg) | Scavenged::Spilled { reg, .. } => reg,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegScavenger {
    scratch: Vec<PhysReg>,
    fallback: Vec<PhysReg>,
    slots: Vec<FrameIndex>,
    spills: usize,
}

impl RegScavenger {
    /// `scratch` registers are reserved for the scavenger; `fallback` ones are only
    /// handed out when the function never mentions them.
    pub fn new(scratch: &[PhysReg], fallback: &[PhysReg]) -> Self {
        Self {
            scratch: scratch.to_vec(),
            fallback: fallback.to_vec(),
            slots: Vec::new(),
            spills: 0,
        }
    }

    /// Register an emergency spill slot.
    pub fn add_scavenging_frame_index(&mut self, index: FrameIndex) {
        self.slots.push(index);
    }

    pub fn scavenging_frame_indices(&self) -> &[FrameIndex] {
        &self.slots
    }

    /// How many requests had to fall back to spilling.
    pub fn spill_count(&self) -> usize {
        self.spills
    }

    /// Find a register usable as a temporary around `inst`.
    pub fn scavenge_register(&mut self, mf: &MachineFunction, inst: &MachineInstr) -> Scavenged {
        if let Some(&reg) = self.scratch.iter().find(|&&reg| !inst.references(reg)) {
            return Scavenged::Free(reg);
        }

        if let Some(&reg) = self
            .fallback
            .iter()
            .find(|&&reg| !mf.instrs().any(|other| other.references(reg)))
        {
            return Scavenged::Free(reg);
        }

        let candidate = self
            .scratch
            .iter()
            .chain(self.fallback.iter())
            .copied()
            .find(|&reg| !inst.references(reg));

        match (candidate, self.slots.first()) {
            (Some(reg), Some(&slot)) => {
                self.spills += 1;
                log::debug!("{}: scavenger spills {reg} to {slot}", mf.name);
                Scavenged::Spilled { reg, slot }
            }
            (Some(reg), None) => {
                debug_assert!(false, "{}: no emergency slot for scavenged {reg}", mf.name);
                log::error!("{}: no emergency slot, clobbering {reg}", mf.name);
                Scavenged::Free(reg)
            }
            (None, _) => {
                panic!("{}: every scavenging candidate is used by the instruction", mf.name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::machine::InstrDesc;

    static MOV: InstrDesc = InstrDesc::new(0, "mov").defs();
    static RET: InstrDesc = InstrDesc::new(1, "ret").returns().uses(&[R0]);

    const R0: PhysReg = PhysReg::new(0, 0);
    const R1: PhysReg = PhysReg::new(0, 1);
    const IP: PhysReg = PhysReg::new(0, 12);

    #[test]
    fn test_prefers_scratch_register() {
        let mf = MachineFunction::new("f");
        let mut rs = RegScavenger::new(&[IP], &[R0]);
        let inst = MachineInstr::new(&MOV).reg(R1).reg(R0);
        assert_eq!(rs.scavenge_register(&mf, &inst), Scavenged::Free(IP));
    }

    #[test]
    fn test_fallback_must_be_unused_in_function() {
        let mut mf = MachineFunction::new("f");
        let entry = mf.add_block("entry");
        mf.block_mut(entry)
            .push(MachineInstr::new(&MOV).reg(R0).reg(R0));
        mf.block_mut(entry)
            .push(MachineInstr::new(&MOV).reg(IP).reg(R0));

        let inst = mf.block(entry).insts[1].clone();
        let mut rs = RegScavenger::new(&[IP], &[R0, R1]);
        assert_eq!(rs.scavenge_register(&mf, &inst), Scavenged::Free(R1));
    }

    #[test]
    fn test_spills_to_emergency_slot() {
        let mut mf = MachineFunction::new("f");
        let slot = mf.frame_info.create_scavenging_slot(4, 4);
        let entry = mf.add_block("entry");
        mf.block_mut(entry)
            .push(MachineInstr::new(&MOV).reg(R0).reg(R0));

        let mut rs = RegScavenger::new(&[IP], &[R0]);
        rs.add_scavenging_frame_index(slot);

        // ip is named by the instruction and r0 is live elsewhere.
        let inst = MachineInstr::new(&MOV).reg(IP).reg(R1);
        let got = rs.scavenge_register(&mf, &inst);
        assert_eq!(got, Scavenged::Spilled { reg: R0, slot });
        assert_eq!(got.reg(), R0);
        assert_eq!(rs.spill_count(), 1);
    }

    #[test]
    fn test_return_value_register_is_not_free() {
        let mut mf = MachineFunction::new("id");
        let slot = mf.frame_info.create_scavenging_slot(4, 4);
        let entry = mf.add_block("entry");
        mf.block_mut(entry)
            .push(MachineInstr::new(&MOV).reg(IP).reg(R1));
        mf.block_mut(entry).push(MachineInstr::new(&RET));

        let mut rs = RegScavenger::new(&[IP], &[R1, R0]);
        rs.add_scavenging_frame_index(slot);

        // r0 is never named explicitly but carries the return value.
        let inst = mf.block(entry).insts[0].clone();
        assert_eq!(rs.scavenge_register(&mf, &inst), Scavenged::Spilled { reg: R0, slot });
    }
}
