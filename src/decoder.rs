use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::instructions::{validate, InstrDesc, TableError};
use crate::isa::cpr::{FieldError, MAX_INSN_LEN};
use crate::isa::regs::{RegId, RegisterTable};
use crate::memory::ByteSource;

/// Size qualifier of a register-sum memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataWidth {
    Unspecified,
    Byte,
    Word,
    Dword,
}

impl DataWidth {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Byte),
            2 => Some(Self::Word),
            4 => Some(Self::Dword),
            _ => None,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Unspecified => "",
            Self::Byte => "byte ptr ",
            Self::Word => "word ptr ",
            Self::Dword => "dword ptr ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    Imm { value: u32 },
    Reg { reg: RegId },
    /// `[base + index + offset]`
    Displ {
        base: RegId,
        index: Option<RegId>,
        offset: u32,
    },
    /// Absolute code or data address.
    Direct { target: u32 },
    /// `[base + extra.. + offset]`, up to four registers summed.
    Sum {
        width: DataWidth,
        base: RegId,
        extra: [Option<RegId>; 3],
        offset: u32,
    },
}

impl Operand {
    pub fn target(&self) -> Option<u32> {
        match self {
            Operand::Direct { target } => Some(*target),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded {
    pub address: u32,
    pub itype: usize,
    pub size: u8,
    pub operands: Vec<Operand>,
}

impl Decoded {
    pub fn next(&self) -> u32 {
        self.address.wrapping_add(self.size as u32)
    }

    pub fn op(&self, n: usize) -> Option<&Operand> {
        self.operands.get(n)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no byte mapped at {addr:#010x}")]
    Unmapped { addr: u32 },
    #[error("unrecognized opcode {byte:#04x} at {addr:#010x}")]
    UnrecognizedOpcode { addr: u32, byte: u8 },
    #[error("`{mnemonic}` at {addr:#010x} needs {need} bytes, only {avail} available")]
    Truncated {
        addr: u32,
        mnemonic: &'static str,
        need: u8,
        avail: u8,
    },
    #[error("invalid register byte {reg:#04x} in instruction at {addr:#010x}")]
    BadRegister { addr: u32, reg: u8 },
    #[error("invalid width tag {tag:#04x} in instruction at {addr:#010x}")]
    BadWidth { addr: u32, tag: u8 },
}

impl DecodeError {
    pub fn addr(&self) -> u32 {
        match *self {
            DecodeError::Unmapped { addr }
            | DecodeError::UnrecognizedOpcode { addr, .. }
            | DecodeError::Truncated { addr, .. }
            | DecodeError::BadRegister { addr, .. }
            | DecodeError::BadWidth { addr, .. } => addr,
        }
    }

    /// Whether the host may treat the byte at `addr()` as data and move on.
    pub fn is_data(&self) -> bool {
        !matches!(self, DecodeError::Unmapped { .. })
    }
}

/// Opcode byte to instruction definition, built once from an ordered table.
pub struct Matcher {
    table: &'static [InstrDesc],
    regs: &'static RegisterTable,
    index: [Option<u16>; 256],
}

impl Matcher {
    /// Builds the lookup map. When two definitions share an opcode the first
    /// one in table order wins and the later one is unreachable.
    pub fn new(table: &'static [InstrDesc], regs: &'static RegisterTable) -> Self {
        let mut index = [None; 256];
        for (itype, desc) in table.iter().enumerate() {
            let slot = &mut index[desc.opcode as usize];
            match *slot {
                None => *slot = Some(itype as u16),
                Some(first) => warn!(
                    opcode = desc.opcode,
                    kept = table[first as usize].mnemonic,
                    shadowed = desc.mnemonic,
                    "duplicate opcode in instruction table"
                ),
            }
        }
        Self {
            table,
            regs,
            index,
        }
    }

    /// Like `new`, but rejects a table that breaks any definition invariant.
    pub fn strict(
        table: &'static [InstrDesc],
        regs: &'static RegisterTable,
    ) -> Result<Self, TableError> {
        validate(table)?;
        Ok(Self::new(table, regs))
    }

    pub fn desc(&self, itype: usize) -> Option<&'static InstrDesc> {
        self.table.get(itype)
    }

    pub fn lookup(&self, opcode: u8) -> Option<usize> {
        self.index[opcode as usize].map(|i| i as usize)
    }

    pub fn analyze<B: ByteSource + ?Sized>(
        &self,
        bus: &B,
        addr: u32,
    ) -> Result<Decoded, DecodeError> {
        let byte = bus.read_u8(addr).ok_or(DecodeError::Unmapped { addr })?;
        let Some(itype) = self.lookup(byte) else {
            debug!(addr, byte, "unrecognized opcode");
            return Err(DecodeError::UnrecognizedOpcode { addr, byte });
        };
        let desc = &self.table[itype];
        let size = desc.enc.size();

        let mut buf = [0u8; MAX_INSN_LEN];
        let bytes = &mut buf[..size as usize];
        let avail = bus.read_into(addr, bytes);
        if avail < bytes.len() {
            return Err(DecodeError::Truncated {
                addr,
                mnemonic: desc.mnemonic,
                need: size,
                avail: avail as u8,
            });
        }

        let operands = desc.enc.decode(bytes, self.regs).map_err(|e| match e {
            FieldError::Register(reg) => DecodeError::BadRegister { addr, reg },
            FieldError::Width(tag) => DecodeError::BadWidth { addr, tag },
            FieldError::Overrun => DecodeError::Truncated {
                addr,
                mnemonic: desc.mnemonic,
                need: size,
                avail: size,
            },
        })?;
        trace!(addr, mnemonic = desc.mnemonic, size, "decoded");

        Ok(Decoded {
            address: addr,
            itype,
            size,
            operands,
        })
    }
}
