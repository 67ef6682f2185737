use std::fmt;

use serde::{Deserialize, Serialize};

/// Index into the register table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegId(pub u8);

impl fmt::Display for RegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r#{}", self.0)
    }
}

/// Byte value an optional register slot holds when it is unused.
pub const NONE_REG: u8 = 0xFF;

pub const REG_NAMES: &[&str] = &[
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", // general purpose
    "sp", "bp", "ip", "flags",
    "CS", "DS", // segments, CS first and DS last
];

pub static REGISTERS: RegisterTable = RegisterTable { names: REG_NAMES };

#[derive(Debug, Clone, Copy)]
pub struct RegisterTable {
    names: &'static [&'static str],
}

impl RegisterTable {
    pub const fn new(names: &'static [&'static str]) -> Self {
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, reg: RegId) -> Option<&'static str> {
        self.names.get(reg.0 as usize).copied()
    }

    pub fn lookup(&self, name: &str) -> Option<RegId> {
        self.names
            .iter()
            .position(|n| *n == name)
            .map(|i| RegId(i as u8))
    }

    pub fn contains(&self, reg: RegId) -> bool {
        (reg.0 as usize) < self.names.len()
    }

    /// Lowest canonical segment register.
    pub fn code_sreg(&self) -> Option<RegId> {
        self.lookup("CS")
    }

    /// Highest canonical segment register.
    pub fn data_sreg(&self) -> Option<RegId> {
        self.lookup("DS")
    }
}
