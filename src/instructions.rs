use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::isa::cpr::Encoding;

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature: u16 {
const USE1 = 1 << 0;   // first operand slot is used
const USE2 = 1 << 1;   // second operand slot is used
const JUMP = 1 << 2;   // transfers control to the first operand
const STOP = 1 << 3;   // no fallthrough
const UNCOND = 1 << 4; // jump never falls through
const CALL = 1 << 5;   // jump that returns to the fallthrough
}
}

#[derive(Debug, Clone, Copy)]
pub struct InstrDesc {
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub feature: Feature,
    pub enc: Encoding,
}

impl InstrDesc {
    pub fn is_jump(&self) -> bool {
        self.feature.contains(Feature::JUMP)
    }

    pub fn is_stop(&self) -> bool {
        self.feature.contains(Feature::STOP)
    }

    pub fn is_uncond(&self) -> bool {
        self.feature.contains(Feature::UNCOND)
    }

    pub fn is_call(&self) -> bool {
        self.feature.contains(Feature::CALL)
    }

    /// Operand count implied by the feature bits.
    pub fn arity(&self) -> usize {
        match (
            self.feature.contains(Feature::USE1),
            self.feature.contains(Feature::USE2),
        ) {
            (false, _) => 0,
            (true, false) => 1,
            (true, true) => 2,
        }
    }
}

/// Mnemonics older listings treated as never falling through.
pub const LEGACY_UNCOND_MNEMONICS: &[&str] = &["jmp", "vm_jmp"];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TableError {
    #[error("opcode {opcode:#04x} defined by both `{first}` and `{second}`")]
    DuplicateOpcode {
        opcode: u8,
        first: &'static str,
        second: &'static str,
    },
    #[error("`{mnemonic}` is a jump but its first operand is not an address")]
    JumpWithoutTarget { mnemonic: &'static str },
    #[error("`{mnemonic}` declares {declared} operand(s) but its encoding yields {encoded}")]
    ArityMismatch {
        mnemonic: &'static str,
        declared: usize,
        encoded: usize,
    },
    #[error("`{mnemonic}` disagrees with the legacy unconditional-jump list")]
    UncondMismatch { mnemonic: &'static str },
}

const fn d(opcode: u8, mnemonic: &'static str, feature: Feature, enc: Encoding) -> InstrDesc {
    InstrDesc {
        opcode,
        mnemonic,
        feature,
        enc,
    }
}

const NONE: Feature = Feature::empty();
const U1: Feature = Feature::USE1;
const U12: Feature = Feature::USE1.union(Feature::USE2);
const JCC: Feature = Feature::USE1.union(Feature::JUMP);
const JMP: Feature = JCC.union(Feature::UNCOND);
const CALL: Feature = JCC.union(Feature::CALL);
const STOP: Feature = Feature::STOP;

/// The instruction set, in matching order.
pub const TABLE: &[InstrDesc] = &[
    d(0x00, "nop", NONE, Encoding::None),
    d(0x01, "halt", STOP, Encoding::None),
    d(0x02, "ret", STOP, Encoding::None),
    // data movement
    d(0x10, "mov", U12, Encoding::RegReg),
    d(0x11, "mov", U12, Encoding::RegImm32),
    d(0x12, "ld", U12, Encoding::RegDispl),
    d(0x13, "st", U12, Encoding::DisplReg),
    d(0x14, "ldm", U12, Encoding::RegMem),
    d(0x15, "stm", U12, Encoding::MemReg),
    d(0x16, "vm_ld", U12, Encoding::RegSum),
    d(0x17, "vm_st", U12, Encoding::SumReg),
    d(0x18, "lea", U12, Encoding::RegSum),
    // arithmetic and logic
    d(0x20, "add", U12, Encoding::RegReg),
    d(0x21, "sub", U12, Encoding::RegReg),
    d(0x22, "xor", U12, Encoding::RegReg),
    d(0x23, "and", U12, Encoding::RegReg),
    d(0x24, "or", U12, Encoding::RegReg),
    d(0x25, "shl", U12, Encoding::RegImm8),
    d(0x26, "shr", U12, Encoding::RegImm8),
    d(0x27, "not", U1, Encoding::Reg),
    d(0x28, "inc", U1, Encoding::Reg),
    d(0x29, "dec", U1, Encoding::Reg),
    d(0x2A, "addi", U12, Encoding::RegImm32),
    d(0x2B, "cmp", U12, Encoding::RegReg),
    d(0x2C, "cmpi", U12, Encoding::RegImm32),
    // stack
    d(0x30, "push", U1, Encoding::Imm8),
    d(0x31, "push", U1, Encoding::Reg),
    d(0x32, "pop", U1, Encoding::Reg),
    d(0x33, "pushd", U1, Encoding::Imm32),
    // control flow
    d(0x40, "jmp", JMP, Encoding::Near16),
    d(0x41, "jz", JCC, Encoding::Near16),
    d(0x42, "jnz", JCC, Encoding::Near16),
    d(0x43, "jl", JCC, Encoding::Near16),
    d(0x44, "jg", JCC, Encoding::Near16),
    d(0x45, "call", CALL, Encoding::Near16),
    d(0x46, "vm_jmp", JMP, Encoding::Far32),
    d(0x47, "vm_call", CALL, Encoding::Far32),
    // host interface
    d(0x50, "vmcall", U1, Encoding::Imm8),
    d(0x51, "vm_exit", STOP, Encoding::None),
];

/// Check the invariants the resolver and renderer rely on.
pub fn validate(table: &[InstrDesc]) -> Result<(), TableError> {
    let mut seen: [Option<&'static str>; 256] = [None; 256];
    for desc in table {
        if let Some(first) = seen[desc.opcode as usize] {
            return Err(TableError::DuplicateOpcode {
                opcode: desc.opcode,
                first,
                second: desc.mnemonic,
            });
        }
        seen[desc.opcode as usize] = Some(desc.mnemonic);

        let encoded = desc.enc.operand_count();
        if desc.arity() != encoded {
            return Err(TableError::ArityMismatch {
                mnemonic: desc.mnemonic,
                declared: desc.arity(),
                encoded,
            });
        }
        if desc.is_jump() && !desc.enc.first_is_address() {
            return Err(TableError::JumpWithoutTarget {
                mnemonic: desc.mnemonic,
            });
        }
        let legacy = LEGACY_UNCOND_MNEMONICS.contains(&desc.mnemonic);
        if desc.is_jump() && legacy != desc.is_uncond() {
            return Err(TableError::UncondMismatch {
                mnemonic: desc.mnemonic,
            });
        }
    }
    Ok(())
}
