use crate::decoder::{DataWidth, Operand};
use crate::isa::regs::{RegId, RegisterTable, NONE_REG};

/// Longest encoding in the instruction set.
pub const MAX_INSN_LEN: usize = 11;

/// Operand layout of an instruction. The layout fixes the byte length.
///
/// All multi-byte fields are little-endian and follow the opcode byte in the
/// order listed. A register-sum field is `width r1 r2 r3 r4 off32`, with
/// `0xff` in an unused `r2..r4` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// `op`
    None,
    /// `op imm8`
    Imm8,
    /// `op imm32`
    Imm32,
    /// `op r`
    Reg,
    /// `op r r`
    RegReg,
    /// `op r imm8`
    RegImm8,
    /// `op r imm32`
    RegImm32,
    /// `op r base index off16`
    RegDispl,
    /// `op base index off16 r`
    DisplReg,
    /// `op r addr32`
    RegMem,
    /// `op addr32 r`
    MemReg,
    /// `op addr16`
    Near16,
    /// `op addr32`
    Far32,
    /// `op r sum`
    RegSum,
    /// `op sum r`
    SumReg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    Register(u8),
    Width(u8),
    Overrun,
}

impl Encoding {
    pub const fn size(self) -> u8 {
        match self {
            Encoding::None => 1,
            Encoding::Imm8 | Encoding::Reg => 2,
            Encoding::RegReg | Encoding::RegImm8 | Encoding::Near16 => 3,
            Encoding::Imm32 | Encoding::Far32 => 5,
            Encoding::RegImm32
            | Encoding::RegDispl
            | Encoding::DisplReg
            | Encoding::RegMem
            | Encoding::MemReg => 6,
            Encoding::RegSum | Encoding::SumReg => 11,
        }
    }

    pub const fn operand_count(self) -> usize {
        match self {
            Encoding::None => 0,
            Encoding::Imm8
            | Encoding::Imm32
            | Encoding::Reg
            | Encoding::Near16
            | Encoding::Far32 => 1,
            _ => 2,
        }
    }

    pub const fn first_is_address(self) -> bool {
        matches!(self, Encoding::Near16 | Encoding::Far32)
    }

    /// Decode the operands from the complete instruction bytes (opcode
    /// included). `bytes` must be exactly `size()` long.
    pub fn decode(self, bytes: &[u8], regs: &RegisterTable) -> Result<Vec<Operand>, FieldError> {
        let mut f = Fields {
            bytes,
            pos: 1,
            regs,
        };
        let ops = match self {
            Encoding::None => vec![],
            Encoding::Imm8 => vec![Operand::Imm { value: f.u8()? as u32 }],
            Encoding::Imm32 => vec![Operand::Imm { value: f.u32()? }],
            Encoding::Reg => vec![f.reg_op()?],
            Encoding::RegReg => vec![f.reg_op()?, f.reg_op()?],
            Encoding::RegImm8 => vec![f.reg_op()?, Operand::Imm { value: f.u8()? as u32 }],
            Encoding::RegImm32 => vec![f.reg_op()?, Operand::Imm { value: f.u32()? }],
            Encoding::RegDispl => vec![f.reg_op()?, f.displ()?],
            Encoding::DisplReg => vec![f.displ()?, f.reg_op()?],
            Encoding::RegMem => vec![f.reg_op()?, Operand::Direct { target: f.u32()? }],
            Encoding::MemReg => vec![Operand::Direct { target: f.u32()? }, f.reg_op()?],
            Encoding::Near16 => vec![Operand::Direct { target: f.u16()? as u32 }],
            Encoding::Far32 => vec![Operand::Direct { target: f.u32()? }],
            Encoding::RegSum => vec![f.reg_op()?, f.sum()?],
            Encoding::SumReg => vec![f.sum()?, f.reg_op()?],
        };
        debug_assert_eq!(f.pos, bytes.len(), "{self:?} left bytes unread");
        Ok(ops)
    }
}

struct Fields<'a> {
    bytes: &'a [u8],
    pos: usize,
    regs: &'a RegisterTable,
}

impl Fields<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], FieldError> {
        let end = self.pos + N;
        let slice = self.bytes.get(self.pos..end).ok_or(FieldError::Overrun)?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, FieldError> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, FieldError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> Result<u32, FieldError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn reg(&mut self) -> Result<RegId, FieldError> {
        let raw = self.u8()?;
        let reg = RegId(raw);
        if self.regs.contains(reg) {
            Ok(reg)
        } else {
            Err(FieldError::Register(raw))
        }
    }

    fn opt_reg(&mut self) -> Result<Option<RegId>, FieldError> {
        let raw = self.u8()?;
        if raw == NONE_REG {
            return Ok(None);
        }
        let reg = RegId(raw);
        if self.regs.contains(reg) {
            Ok(Some(reg))
        } else {
            Err(FieldError::Register(raw))
        }
    }

    fn reg_op(&mut self) -> Result<Operand, FieldError> {
        Ok(Operand::Reg { reg: self.reg()? })
    }

    fn displ(&mut self) -> Result<Operand, FieldError> {
        let base = self.reg()?;
        let index = self.opt_reg()?;
        let offset = self.u16()? as u32;
        Ok(Operand::Displ {
            base,
            index,
            offset,
        })
    }

    fn sum(&mut self) -> Result<Operand, FieldError> {
        let tag = self.u8()?;
        let width = DataWidth::from_tag(tag).ok_or(FieldError::Width(tag))?;
        let base = self.reg()?;
        let extra = [self.opt_reg()?, self.opt_reg()?, self.opt_reg()?];
        let offset = self.u32()?;
        Ok(Operand::Sum {
            width,
            base,
            extra,
            offset,
        })
    }
}
