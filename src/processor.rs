use serde::{Deserialize, Serialize};

use crate::decoder::{DecodeError, Decoded, Matcher, Operand};
use crate::disasm::{Line, NameResolver, Printer, Syntax};
use crate::emu::{emulate, Xref};
use crate::instructions::{InstrDesc, TableError, TABLE};
use crate::isa::regs::{RegisterTable, REGISTERS};
use crate::memory::ByteSource;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcConfig {
    pub syntax: Syntax,
}

impl ProcConfig {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// The entry points a host disassembler calls per address.
pub struct Processor {
    matcher: Matcher,
    regs: &'static RegisterTable,
    pub cfg: ProcConfig,
}

impl Processor {
    /// The built-in instruction set, validated.
    pub fn new(cfg: ProcConfig) -> Result<Self, TableError> {
        Self::with_tables(TABLE, &REGISTERS, cfg)
    }

    pub fn with_tables(
        table: &'static [InstrDesc],
        regs: &'static RegisterTable,
        cfg: ProcConfig,
    ) -> Result<Self, TableError> {
        Ok(Self {
            matcher: Matcher::strict(table, regs)?,
            regs,
            cfg,
        })
    }

    pub fn registers(&self) -> &'static RegisterTable {
        self.regs
    }

    pub fn syntax(&self) -> &Syntax {
        &self.cfg.syntax
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn desc(&self, itype: usize) -> Option<&'static InstrDesc> {
        self.matcher.desc(itype)
    }

    pub fn analyze<B: ByteSource + ?Sized>(
        &self,
        bus: &B,
        addr: u32,
    ) -> Result<Decoded, DecodeError> {
        self.matcher.analyze(bus, addr)
    }

    pub fn emulate(&self, insn: &Decoded) -> Vec<Xref> {
        match self.desc(insn.itype) {
            Some(desc) => emulate(desc, insn),
            None => Vec::new(),
        }
    }

    fn printer<'a>(&'a self, names: &'a dyn NameResolver) -> Printer<'a> {
        Printer {
            regs: self.regs,
            syntax: &self.cfg.syntax,
            names,
        }
    }

    pub fn out_operand(&self, op: &Operand, names: &dyn NameResolver) -> Line {
        self.printer(names).operand(op)
    }

    pub fn out_insn(&self, insn: &Decoded, names: &dyn NameResolver) -> Line {
        match self.desc(insn.itype) {
            Some(desc) => self.printer(names).insn(desc, insn),
            None => Line::default(),
        }
    }
}
