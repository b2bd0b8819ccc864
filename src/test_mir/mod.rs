//! Textual machine IR (MIR) for tests and the `riscpi-pei` driver.
//!
//! The format mirrors what frame lowering works on: physical registers, stack objects
//! addressed through `%stack.N` frame indices, and call-frame pseudos.
//!
//! # MIR Format
//!
//! ```text
//! ; Comments start with semicolon
//! function callee_user {
//!   attr frame-pointer-all
//!   stack 16 align 8
//! entry:
//!   adjcallstackdown #8
//!   str r4, [%stack.0, #4]
//!   bl @helper
//!   adjcallstackup #8
//!   b ^exit
//! exit:
//!   ret
//! }
//! ```

pub mod parser;

pub use parser::parse_module;

use crate::core::machine::{MachineFunction, MachineInstr, Operand};
use crate::core::target_info::TargetRegisterInfo;
use std::fmt::Write;

pub(crate) const ATTR_FRAME_POINTER_ALL: &str = "frame-pointer-all";
pub(crate) const ATTR_NO_REALIGN: &str = "no-realign";
pub(crate) const ATTR_VAR_SIZED: &str = "var-sized";
pub(crate) const ATTR_FRAME_ADDRESS_TAKEN: &str = "frame-address-taken";
pub(crate) const ATTR_HAS_CALLS: &str = "has-calls";

/// Prints machine functions back in the format `parse_module` reads.
pub struct MirPrinter<'a> {
    tri: &'a dyn TargetRegisterInfo,
    frame_summary: bool,
}

impl<'a> MirPrinter<'a> {
    pub fn new(tri: &'a dyn TargetRegisterInfo) -> Self {
        Self {
            tri,
            frame_summary: false,
        }
    }

    /// Also print the computed frame layout as a comment block.
    pub fn with_frame_summary(mut self, enabled: bool) -> Self {
        self.frame_summary = enabled;
        self
    }

    pub fn print_module(&self, functions: &[MachineFunction]) -> String {
        let mut output = String::new();
        for (i, mf) in functions.iter().enumerate() {
            if i > 0 {
                output.push('\n');
            }
            output.push_str(&self.print_function(mf));
        }
        output
    }

    pub fn print_function(&self, mf: &MachineFunction) -> String {
        let mut output = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_function(&mut output, mf);
        output
    }

    fn write_function(&self, out: &mut String, mf: &MachineFunction) -> std::fmt::Result {
        writeln!(out, "function {} {{", mf.name)?;

        let fi = &mf.frame_info;
        let attrs = [
            (mf.attrs.frame_pointer_all, ATTR_FRAME_POINTER_ALL),
            (mf.attrs.no_realign_stack, ATTR_NO_REALIGN),
            (fi.has_var_sized_objects, ATTR_VAR_SIZED),
            (fi.frame_address_taken, ATTR_FRAME_ADDRESS_TAKEN),
            (fi.has_calls, ATTR_HAS_CALLS),
        ];
        for (_, name) in attrs.iter().filter(|(set, _)| *set) {
            writeln!(out, "  attr {name}")?;
        }

        if self.frame_summary {
            self.write_frame_summary(out, mf)?;
        }

        // Stack declarations must keep their numbering, so every object is printed,
        // including scavenging slots added during lowering.
        for (_, object) in fi.objects() {
            writeln!(out, "  stack {} align {}", object.size, object.align)?;
        }

        for (_, block) in mf.blocks() {
            writeln!(out, "{}:", block.name)?;
            for inst in &block.insts {
                write!(out, "  ")?;
                self.write_instr(out, mf, inst)?;
                writeln!(out)?;
            }
        }
        writeln!(out, "}}")
    }

    fn write_frame_summary(&self, out: &mut String, mf: &MachineFunction) -> std::fmt::Result {
        let fi = &mf.frame_info;
        let facts = mf.frame_facts().unwrap_or_default();
        writeln!(
            out,
            "  ; frame: size={} fp={} reserved-call-frame={} realign={} max-call-frame={}",
            fi.stack_size,
            facts.has_fp,
            facts.reserved_call_frame,
            facts.realign_stack,
            fi.max_call_frame_size
        )?;
        for (index, object) in fi.objects() {
            match object.offset {
                Some(offset) => writeln!(
                    out,
                    "  ; {index}: size={} align={} offset={offset}",
                    object.size, object.align
                )?,
                None => writeln!(
                    out,
                    "  ; {index}: size={} align={} unplaced",
                    object.size, object.align
                )?,
            }
        }
        for csi in &fi.callee_saved_info {
            writeln!(
                out,
                "  ; saved {} at {}",
                self.tri.reg_name(csi.reg),
                csi.spill_offset
            )?;
        }
        Ok(())
    }

    fn write_instr(
        &self,
        out: &mut String,
        mf: &MachineFunction,
        inst: &MachineInstr,
    ) -> std::fmt::Result {
        let desc = inst.desc();
        write!(out, "{}", desc.name)?;

        let operands = &inst.operands;
        if desc.is_memory_access() && operands.len() >= 2 {
            write!(out, " ")?;
            self.write_operand(out, mf, &operands[0])?;
            write!(out, ", [")?;
            for (i, op) in operands[1..].iter().enumerate() {
                if i > 0 {
                    write!(out, ", ")?;
                }
                self.write_operand(out, mf, op)?;
            }
            write!(out, "]")?;
        } else {
            for (i, op) in operands.iter().enumerate() {
                write!(out, "{}", if i == 0 { " " } else { ", " })?;
                self.write_operand(out, mf, op)?;
            }
        }

        for (i, reg) in inst.implicit_defs.iter().enumerate() {
            let sep = if i == 0 && operands.is_empty() { " " } else { ", " };
            write!(out, "{sep}implicit-def {}", self.tri.reg_name(*reg))?;
        }

        if inst.flags.frame_setup {
            write!(out, " ; frame-setup")?;
        } else if inst.flags.frame_destroy {
            write!(out, " ; frame-destroy")?;
        }
        Ok(())
    }

    fn write_operand(&self, out: &mut String, mf: &MachineFunction, op: &Operand) -> std::fmt::Result {
        match op {
            Operand::Reg(reg) => write!(out, "{}", self.tri.reg_name(*reg)),
            Operand::Imm(imm) => write!(out, "#{imm}"),
            Operand::FrameIndex(index) => write!(out, "{index}"),
            Operand::Block(block) => write!(out, "^{}", mf.block(*block).name),
            Operand::Symbol(name) => write!(out, "@{name}"),
        }
    }
}
