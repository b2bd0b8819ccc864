// This module holds the per-function frame state that frame lowering reads and writes:
// stack objects addressed through frame indices, the flags the pipeline records about the
// function (variable-sized allocations, frame address taken, calls), the outgoing call
// frame size, the callee-saved registers chosen for spilling together with their offsets,
// and the final stack size. The layout pass in pei.rs assigns object offsets; frame
// lowering only consumes them. Offsets are relative to the stack pointer after the
// prologue has run, growing towards higher addresses.

//! Frame information owned by a machine function.

use super::regs::PhysReg;
use std::fmt;

/// Index of a stack object within a function's frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameIndex(pub u32);

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%stack.{}", self.0)
    }
}

/// What a stack object is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackObjectKind {
    /// A local variable or spill slot requested by the collaborator.
    Local,
    /// Emergency slot reserved for the register scavenger.
    ScavengingSlot,
}

/// A fixed-size object in the function's frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackObject {
    pub size: u32,
    pub align: u32,
    pub kind: StackObjectKind,
    /// SP-relative offset, assigned by frame layout.
    pub offset: Option<i32>,
}

/// A callee-saved register together with its slot in the save area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalleeSavedInfo {
    pub reg: PhysReg,
    /// Offset of the slot from the bottom of the callee-saved area.
    pub spill_offset: u32,
    pub size: u32,
}

/// Frame facts fixed by frame analysis before any code is emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFacts {
    pub has_fp: bool,
    pub reserved_call_frame: bool,
    pub realign_stack: bool,
}

/// Per-function frame state.
#[derive(Debug, Clone, Default)]
pub struct MachineFrameInfo {
    objects: Vec<StackObject>,
    /// The function contains dynamically sized stack allocations.
    pub has_var_sized_objects: bool,
    /// The address of the function's own frame escapes.
    pub frame_address_taken: bool,
    /// The function contains calls (set by the pipeline or discovered by scanning).
    pub has_calls: bool,
    /// Largest outgoing argument area of any call in the function.
    pub max_call_frame_size: u32,
    /// Largest alignment requested by any stack object.
    pub max_alignment: u32,
    /// Total size of the frame allocated by the prologue.
    pub stack_size: u32,
    /// Registers the prologue saves, in save order.
    pub callee_saved_info: Vec<CalleeSavedInfo>,
    /// Size of the callee-saved area at the top of the frame.
    pub callee_saved_area_size: u32,
}

impl MachineFrameInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a local stack object and return its frame index.
    pub fn create_stack_object(&mut self, size: u32, align: u32) -> FrameIndex {
        self.push_object(size, align, StackObjectKind::Local)
    }

    /// Create an emergency spill slot for the register scavenger.
    pub fn create_scavenging_slot(&mut self, size: u32, align: u32) -> FrameIndex {
        self.push_object(size, align, StackObjectKind::ScavengingSlot)
    }

    fn push_object(&mut self, size: u32, align: u32, kind: StackObjectKind) -> FrameIndex {
        let align = align.max(1);
        debug_assert!(align.is_power_of_two(), "stack object alignment must be a power of two");
        self.max_alignment = self.max_alignment.max(align);
        let index = FrameIndex(self.objects.len() as u32);
        self.objects.push(StackObject {
            size,
            align,
            kind,
            offset: None,
        });
        index
    }

    pub fn object(&self, index: FrameIndex) -> &StackObject {
        &self.objects[index.0 as usize]
    }

    pub fn objects(&self) -> impl Iterator<Item = (FrameIndex, &StackObject)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, obj)| (FrameIndex(i as u32), obj))
    }

    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn set_object_offset(&mut self, index: FrameIndex, offset: i32) {
        self.objects[index.0 as usize].offset = Some(offset);
    }

    /// SP-relative offset of an object. Only valid after frame layout.
    pub fn object_offset(&self, index: FrameIndex) -> i32 {
        let obj = self.object(index);
        debug_assert!(obj.offset.is_some(), "{index} used before frame layout");
        obj.offset.unwrap_or(0)
    }

    /// Sum of all local objects, each rounded up to its alignment.
    pub fn estimate_local_size(&self) -> u32 {
        self.objects
            .iter()
            .fold(0u32, |acc, obj| align_to(acc, obj.align).saturating_add(obj.size))
    }

    pub fn callee_saved_regs(&self) -> impl Iterator<Item = PhysReg> + '_ {
        self.callee_saved_info.iter().map(|info| info.reg)
    }
}

/// Largest total size of local objects a frame may declare. The rest of the `i32`
/// offset range is left for the callee-saved area, call frames and realignment.
pub const MAX_LOCAL_FRAME_SIZE: u32 = 1 << 30;

/// Round `value` up to the next multiple of `align` (a power of two), saturating at the
/// largest multiple that fits in a `u32`.
pub fn align_to(value: u32, align: u32) -> u32 {
    let mask = align.max(1) - 1;
    value.checked_add(mask).unwrap_or(u32::MAX) & !mask
}
