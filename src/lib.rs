pub mod decoder;
pub mod disasm;
pub mod emu;
pub mod instructions;
pub mod memory;
pub mod processor;

pub mod isa {
    pub mod cpr; // operand layouts
    pub mod regs;
}

pub use decoder::{DataWidth, DecodeError, Decoded, Matcher, Operand};
pub use disasm::{HexStyle, Line, NameResolver, NoNames, Syntax};
pub use emu::{Xref, XrefKind};
pub use instructions::{Feature, InstrDesc, TABLE};
pub use isa::regs::{RegId, REGISTERS};
pub use memory::{ByteSource, LinearMemory};
pub use processor::{ProcConfig, Processor};
