// This module defines the machine-function abstraction the frame-lowering hooks operate on.
// A MachineFunction owns ordered basic blocks of MachineInstrs, the function's frame
// information, its attributes, and the frame facts and phase recorded while the
// prologue/epilogue inserter runs. Instructions carry a reference to a static InstrDesc
// supplied by the target's opcode table, so target-independent code can ask whether an
// instruction is a call, a return, a terminator, or a call-frame pseudo without knowing
// the target's opcode numbering. Blocks support index-based insertion and erasure; an
// index plays the role of an instruction iterator.

//! Machine functions, basic blocks and instructions.

use super::frame_info::{FrameFacts, FrameIndex, MachineFrameInfo};
use super::regs::PhysReg;
use std::fmt;

/// Static description of a target opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrDesc {
    pub opcode: u16,
    pub name: &'static str,
    pub is_terminator: bool,
    pub is_return: bool,
    pub is_call: bool,
    /// The first operand, when it is a register, is written.
    pub defines_first: bool,
    pub is_frame_setup_pseudo: bool,
    pub is_frame_destroy_pseudo: bool,
    pub may_load: bool,
    pub may_store: bool,
    /// Registers every instance of this opcode writes.
    pub implicit_defs: &'static [PhysReg],
    /// Registers every instance of this opcode reads.
    pub implicit_uses: &'static [PhysReg],
}

impl InstrDesc {
    pub const fn new(opcode: u16, name: &'static str) -> Self {
        Self {
            opcode,
            name,
            is_terminator: false,
            is_return: false,
            is_call: false,
            defines_first: false,
            is_frame_setup_pseudo: false,
            is_frame_destroy_pseudo: false,
            may_load: false,
            may_store: false,
            implicit_defs: &[],
            implicit_uses: &[],
        }
    }

    pub const fn defs(mut self) -> Self {
        self.defines_first = true;
        self
    }

    pub const fn terminator(mut self) -> Self {
        self.is_terminator = true;
        self
    }

    pub const fn returns(mut self) -> Self {
        self.is_terminator = true;
        self.is_return = true;
        self
    }

    pub const fn call(mut self) -> Self {
        self.is_call = true;
        self
    }

    pub const fn loads(mut self) -> Self {
        self.may_load = true;
        self
    }

    pub const fn stores(mut self) -> Self {
        self.may_store = true;
        self
    }

    pub const fn clobbers(mut self, regs: &'static [PhysReg]) -> Self {
        self.implicit_defs = regs;
        self
    }

    pub const fn uses(mut self, regs: &'static [PhysReg]) -> Self {
        self.implicit_uses = regs;
        self
    }

    pub const fn frame_setup_pseudo(mut self) -> Self {
        self.is_frame_setup_pseudo = true;
        self
    }

    pub const fn frame_destroy_pseudo(mut self) -> Self {
        self.is_frame_destroy_pseudo = true;
        self
    }

    pub fn is_call_frame_pseudo(&self) -> bool {
        self.is_frame_setup_pseudo || self.is_frame_destroy_pseudo
    }

    pub fn is_memory_access(&self) -> bool {
        self.may_load || self.may_store
    }
}

/// Identifies a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// A machine instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(PhysReg),
    Imm(i64),
    FrameIndex(FrameIndex),
    Block(BlockId),
    Symbol(String),
}

/// Flags marking instructions emitted by frame lowering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MIFlags {
    pub frame_setup: bool,
    pub frame_destroy: bool,
}

impl MIFlags {
    pub const NONE: MIFlags = MIFlags {
        frame_setup: false,
        frame_destroy: false,
    };
    pub const FRAME_SETUP: MIFlags = MIFlags {
        frame_setup: true,
        frame_destroy: false,
    };
    pub const FRAME_DESTROY: MIFlags = MIFlags {
        frame_setup: false,
        frame_destroy: true,
    };
}

/// A single machine instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInstr {
    desc: &'static InstrDesc,
    pub operands: Vec<Operand>,
    pub implicit_defs: Vec<PhysReg>,
    pub flags: MIFlags,
}

impl MachineInstr {
    pub fn new(desc: &'static InstrDesc) -> Self {
        Self {
            desc,
            operands: Vec::new(),
            implicit_defs: Vec::new(),
            flags: MIFlags::NONE,
        }
    }

    pub fn desc(&self) -> &'static InstrDesc {
        self.desc
    }

    pub fn opcode(&self) -> u16 {
        self.desc.opcode
    }

    /// Replace the opcode, keeping operands and flags.
    pub fn set_desc(&mut self, desc: &'static InstrDesc) {
        self.desc = desc;
    }

    pub fn reg(mut self, reg: PhysReg) -> Self {
        self.operands.push(Operand::Reg(reg));
        self
    }

    pub fn imm(mut self, imm: i64) -> Self {
        self.operands.push(Operand::Imm(imm));
        self
    }

    pub fn frame_index(mut self, index: FrameIndex) -> Self {
        self.operands.push(Operand::FrameIndex(index));
        self
    }

    pub fn block(mut self, block: BlockId) -> Self {
        self.operands.push(Operand::Block(block));
        self
    }

    pub fn symbol(mut self, name: impl Into<String>) -> Self {
        self.operands.push(Operand::Symbol(name.into()));
        self
    }

    pub fn implicit_def(mut self, reg: PhysReg) -> Self {
        self.implicit_defs.push(reg);
        self
    }

    pub fn with_flags(mut self, flags: MIFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Registers written by this instruction.
    pub fn defs(&self) -> impl Iterator<Item = PhysReg> + '_ {
        let explicit = match self.operands.first() {
            Some(Operand::Reg(reg)) if self.desc.defines_first => Some(*reg),
            _ => None,
        };
        explicit
            .into_iter()
            .chain(self.desc.implicit_defs.iter().copied())
            .chain(self.implicit_defs.iter().copied())
    }

    /// True if `reg` appears anywhere in the instruction.
    pub fn references(&self, reg: PhysReg) -> bool {
        self.implicit_defs.contains(&reg)
            || self.desc.implicit_defs.contains(&reg)
            || self.desc.implicit_uses.contains(&reg)
            || self
                .operands
                .iter()
                .any(|op| matches!(op, Operand::Reg(r) if *r == reg))
    }

    /// Immediate operand at `index`, if there is one.
    pub fn imm_operand(&self, index: usize) -> Option<i64> {
        match self.operands.get(index) {
            Some(Operand::Imm(imm)) => Some(*imm),
            _ => None,
        }
    }

    pub fn is_call_frame_pseudo(&self) -> bool {
        self.desc.is_call_frame_pseudo()
    }
}

/// A basic block: a name and an ordered list of instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineBasicBlock {
    pub name: String,
    pub insts: Vec<MachineInstr>,
}

impl MachineBasicBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            insts: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn push(&mut self, inst: MachineInstr) {
        self.insts.push(inst);
    }

    /// Insert `inst` before position `at`.
    pub fn insert(&mut self, at: usize, inst: MachineInstr) {
        self.insts.insert(at, inst);
    }

    /// Insert a sequence before position `at`, returning how many were inserted.
    pub fn insert_all(&mut self, at: usize, insts: Vec<MachineInstr>) -> usize {
        let count = insts.len();
        self.insts.splice(at..at, insts);
        count
    }

    /// Remove the instruction at `at`, returning the position of its successor.
    pub fn erase(&mut self, at: usize) -> usize {
        self.insts.remove(at);
        at
    }

    /// Position of the first terminator, or the block length if there is none.
    pub fn first_terminator(&self) -> usize {
        self.insts
            .iter()
            .position(|inst| inst.desc().is_terminator)
            .unwrap_or(self.insts.len())
    }

    /// Position of the return instruction, or of the first terminator if the block
    /// does not return.
    pub fn return_position(&self) -> usize {
        self.insts
            .iter()
            .position(|inst| inst.desc().is_return)
            .unwrap_or_else(|| self.first_terminator())
    }

    pub fn is_return_block(&self) -> bool {
        self.insts.iter().any(|inst| inst.desc().is_return)
    }
}

/// Function-level attributes that influence frame lowering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionAttrs {
    /// Keep a frame pointer regardless of optimization settings.
    pub frame_pointer_all: bool,
    /// Never realign the stack for this function.
    pub no_realign_stack: bool,
}

/// Progress of a function through frame lowering.
///
/// Hooks assert in debug builds that they run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FramePhase {
    Unanalyzed,
    Analyzed,
    CalleeSavesDetermined,
    PrologueEmitted,
    EpilogueEmitted,
    CallFramePseudosEliminated,
}

/// A function being compiled.
#[derive(Debug, Clone)]
pub struct MachineFunction {
    pub name: String,
    blocks: Vec<MachineBasicBlock>,
    pub frame_info: MachineFrameInfo,
    pub attrs: FunctionAttrs,
    frame_facts: Option<FrameFacts>,
    phase: FramePhase,
}

impl MachineFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            frame_info: MachineFrameInfo::new(),
            attrs: FunctionAttrs::default(),
            frame_facts: None,
            phase: FramePhase::Unanalyzed,
        }
    }

    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(MachineBasicBlock::new(name));
        id
    }

    pub fn entry_block(&self) -> BlockId {
        debug_assert!(!self.blocks.is_empty(), "function {} has no blocks", self.name);
        BlockId(0)
    }

    pub fn block(&self, id: BlockId) -> &MachineBasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut MachineBasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &MachineBasicBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, block)| (BlockId(i as u32), block))
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|block| block.name == name)
            .map(|i| BlockId(i as u32))
    }

    /// Blocks ending the function with a return.
    pub fn return_blocks(&self) -> Vec<BlockId> {
        self.blocks()
            .filter(|(_, block)| block.is_return_block())
            .map(|(id, _)| id)
            .collect()
    }

    /// Every instruction of the function in block order.
    pub fn instrs(&self) -> impl Iterator<Item = &MachineInstr> {
        self.blocks.iter().flat_map(|block| block.insts.iter())
    }

    pub fn instr_count(&self) -> usize {
        self.blocks.iter().map(MachineBasicBlock::len).sum()
    }

    /// True if the frame info says so or any instruction is a call.
    pub fn has_calls(&self) -> bool {
        self.frame_info.has_calls || self.instrs().any(|inst| inst.desc().is_call)
    }

    pub fn frame_facts(&self) -> Option<FrameFacts> {
        self.frame_facts
    }

    pub fn set_frame_facts(&mut self, facts: FrameFacts) {
        debug_assert!(
            self.frame_facts.is_none() || self.frame_facts == Some(facts),
            "frame facts of {} changed after analysis",
            self.name
        );
        self.frame_facts = Some(facts);
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Move to `next`, which must not precede the current phase.
    pub fn advance_phase(&mut self, next: FramePhase) {
        debug_assert!(
            next >= self.phase,
            "{}: frame phase {:?} requested after {:?}",
            self.name,
            next,
            self.phase
        );
        self.phase = next;
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb.{}", self.0)
    }
}
