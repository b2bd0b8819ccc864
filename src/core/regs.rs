// This module defines the physical register model shared by every target: PhysReg names a
// register by bank and id, and RegSet is a fixed-size bit set over all banks. Frame lowering
// uses RegSet for the callee-saved set handed to determine_callee_saves, for reserved
// registers, and for the register scavenger's candidate list. Iteration is always in
// ascending (bank, id) order so that every consumer of a set (spill slot assignment,
// prologue emission, printing) produces the same output regardless of insertion order.

//! Physical registers and register sets.

use std::fmt;

/// Maximum number of register banks supported (GP, FP, ...).
pub const MAX_REGISTER_BANKS: usize = 4;

/// Maximum number of registers per bank.
pub const MAX_REGISTERS_PER_BANK: usize = 64;

/// Type for register bank indices.
pub type RegBank = u8;

/// Type for register IDs within a bank.
pub type RegId = u8;

/// A physical machine register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysReg {
    pub bank: RegBank,
    pub id: RegId,
}

impl PhysReg {
    pub const fn new(bank: RegBank, id: RegId) -> Self {
        Self { bank, id }
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}:{}", self.bank, self.id)
    }
}

/// Bit set for efficiently tracking register sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegSet {
    /// Bit mask for each register bank.
    banks: [u64; MAX_REGISTER_BANKS],
}

impl RegSet {
    /// Create empty register set.
    pub const fn new() -> Self {
        Self {
            banks: [0; MAX_REGISTER_BANKS],
        }
    }

    /// Build a set from a slice of registers.
    pub fn from_regs(regs: &[PhysReg]) -> Self {
        let mut set = Self::new();
        for &reg in regs {
            set.insert(reg);
        }
        set
    }

    fn in_range(reg: PhysReg) -> bool {
        (reg.bank as usize) < MAX_REGISTER_BANKS && (reg.id as usize) < MAX_REGISTERS_PER_BANK
    }

    /// Check if register is set.
    pub fn contains(&self, reg: PhysReg) -> bool {
        Self::in_range(reg) && (self.banks[reg.bank as usize] & (1u64 << reg.id)) != 0
    }

    /// Add a register. Returns true if it was not present before.
    pub fn insert(&mut self, reg: PhysReg) -> bool {
        if !Self::in_range(reg) {
            return false;
        }
        let was_set = self.contains(reg);
        self.banks[reg.bank as usize] |= 1u64 << reg.id;
        !was_set
    }

    /// Remove a register.
    pub fn remove(&mut self, reg: PhysReg) {
        if Self::in_range(reg) {
            self.banks[reg.bank as usize] &= !(1u64 << reg.id);
        }
    }

    /// Set union with another set.
    pub fn union_with(&mut self, other: &RegSet) {
        for i in 0..MAX_REGISTER_BANKS {
            self.banks[i] |= other.banks[i];
        }
    }

    /// Remove every register of `other` from this set.
    pub fn subtract(&mut self, other: &RegSet) {
        for i in 0..MAX_REGISTER_BANKS {
            self.banks[i] &= !other.banks[i];
        }
    }

    /// True if every register of this set is also in `other`.
    pub fn is_subset(&self, other: &RegSet) -> bool {
        self.banks
            .iter()
            .zip(other.banks.iter())
            .all(|(a, b)| a & !b == 0)
    }

    pub fn is_empty(&self) -> bool {
        self.banks.iter().all(|&b| b == 0)
    }

    /// Number of registers in the set.
    pub fn len(&self) -> usize {
        self.banks.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Count number of set registers in bank.
    pub fn count_in_bank(&self, bank: RegBank) -> u32 {
        if bank as usize >= MAX_REGISTER_BANKS {
            return 0;
        }
        self.banks[bank as usize].count_ones()
    }

    /// Clear all registers.
    pub fn clear(&mut self) {
        self.banks.fill(0);
    }

    /// Iterate registers in ascending (bank, id) order.
    pub fn iter(&self) -> RegSetIter {
        RegSetIter {
            banks: self.banks,
            bank: 0,
        }
    }
}

impl FromIterator<PhysReg> for RegSet {
    fn from_iter<I: IntoIterator<Item = PhysReg>>(iter: I) -> Self {
        let mut set = RegSet::new();
        for reg in iter {
            set.insert(reg);
        }
        set
    }
}

impl Extend<PhysReg> for RegSet {
    fn extend<I: IntoIterator<Item = PhysReg>>(&mut self, iter: I) {
        for reg in iter {
            self.insert(reg);
        }
    }
}

impl<'a> IntoIterator for &'a RegSet {
    type Item = PhysReg;
    type IntoIter = RegSetIter;

    fn into_iter(self) -> RegSetIter {
        self.iter()
    }
}

/// Ordered iterator over a [`RegSet`].
pub struct RegSetIter {
    banks: [u64; MAX_REGISTER_BANKS],
    bank: usize,
}

impl Iterator for RegSetIter {
    type Item = PhysReg;

    fn next(&mut self) -> Option<PhysReg> {
        while self.bank < MAX_REGISTER_BANKS {
            let bits = self.banks[self.bank];
            if bits != 0 {
                let id = bits.trailing_zeros();
                self.banks[self.bank] &= bits - 1;
                return Some(PhysReg::new(self.bank as RegBank, id as RegId));
            }
            self.bank += 1;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regset_operations() {
        let mut set = RegSet::new();
        let reg = PhysReg::new(0, 5);

        assert!(!set.contains(reg));
        assert!(set.insert(reg));
        assert!(!set.insert(reg));
        assert!(set.contains(reg));
        set.remove(reg);
        assert!(!set.contains(reg));
        assert!(set.is_empty());
    }

    #[test]
    fn test_iteration_is_ordered() {
        let set: RegSet = [
            PhysReg::new(1, 9),
            PhysReg::new(0, 14),
            PhysReg::new(0, 4),
            PhysReg::new(1, 8),
        ]
        .into_iter()
        .collect();

        let regs: Vec<_> = set.iter().collect();
        assert_eq!(
            regs,
            vec![
                PhysReg::new(0, 4),
                PhysReg::new(0, 14),
                PhysReg::new(1, 8),
                PhysReg::new(1, 9),
            ]
        );
        assert_eq!(set.len(), 4);
        assert_eq!(set.count_in_bank(1), 2);
    }

    #[test]
    fn test_subset_and_subtract() {
        let small = RegSet::from_regs(&[PhysReg::new(0, 4)]);
        let mut big = RegSet::from_regs(&[PhysReg::new(0, 4), PhysReg::new(0, 5)]);

        assert!(small.is_subset(&big));
        assert!(!big.is_subset(&small));

        big.subtract(&small);
        assert_eq!(big.iter().collect::<Vec<_>>(), vec![PhysReg::new(0, 5)]);
    }

    #[test]
    fn test_out_of_range_registers_are_ignored() {
        let mut set = RegSet::new();
        assert!(!set.insert(PhysReg::new(7, 0)));
        assert!(!set.contains(PhysReg::new(7, 0)));
        assert!(set.is_empty());
    }
}
