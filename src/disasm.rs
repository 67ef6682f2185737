use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::decoder::{Decoded, Operand};
use crate::instructions::{Feature, InstrDesc};
use crate::isa::regs::{RegId, RegisterTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HexStyle {
    /// `1f`
    Bare,
    /// `0x1f`
    CStyle,
    /// `1fh`, with a leading `0` when the first digit is a letter
    Suffix,
}

/// Listing conventions owned by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Syntax {
    pub hex: HexStyle,
    pub uppercase: bool,
    pub lbracket: String,
    pub rbracket: String,
    /// Starts a trailing remark on a listing line.
    pub comment: String,
    /// Directive for a byte shown as data.
    pub data_byte: String,
}

impl Default for Syntax {
    fn default() -> Self {
        Self {
            hex: HexStyle::Bare,
            uppercase: false,
            lbracket: "[".into(),
            rbracket: "]".into(),
            comment: ";".into(),
            data_byte: "db".into(),
        }
    }
}

impl Syntax {
    pub fn hex(&self, v: u32) -> String {
        let digits = if self.uppercase {
            format!("{v:X}")
        } else {
            format!("{v:x}")
        };
        match self.hex {
            HexStyle::Bare => digits,
            HexStyle::CStyle => format!("0x{digits}"),
            HexStyle::Suffix => {
                let lead = if digits.starts_with(|c: char| c.is_ascii_alphabetic()) {
                    "0"
                } else {
                    ""
                };
                format!("{lead}{digits}h")
            }
        }
    }

    /// `db 1f` for a byte the host could not decode.
    pub fn data(&self, b: u8) -> String {
        format!("{} {}", self.data_byte, self.hex(b as u32))
    }

    /// `text` as a trailing remark.
    pub fn remark(&self, text: &str) -> String {
        format!("{} {text}", self.comment)
    }
}

/// Symbolic names the host knows for addresses.
pub trait NameResolver {
    fn name_of(&self, addr: u32) -> Option<String>;
}

pub struct NoNames;

impl NameResolver for NoNames {
    fn name_of(&self, _addr: u32) -> Option<String> {
        None
    }
}

impl NameResolver for HashMap<u32, String> {
    fn name_of(&self, addr: u32) -> Option<String> {
        self.get(&addr).cloned()
    }
}

impl NameResolver for BTreeMap<u32, String> {
    fn name_of(&self, addr: u32) -> Option<String> {
        self.get(&addr).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Mnemonic,
    Register,
    Punct,
    Number,
    Symbol,
    /// A literal the listing should flag, e.g. an address with no name.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

/// Rendered text as a token sequence; `Display` gives the plain listing form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Line(pub Vec<Token>);

impl Line {
    fn push(&mut self, kind: TokenKind, text: impl Into<String>) {
        self.0.push(Token {
            kind,
            text: text.into(),
        });
    }

    fn append(&mut self, other: Line) {
        self.0.extend(other.0);
    }

    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|t| t.kind == TokenKind::Error)
    }

    /// Plain text with error literals in red for a terminal.
    pub fn ansi(&self) -> String {
        let mut s = String::new();
        for t in &self.0 {
            match t.kind {
                TokenKind::Error => {
                    s.push_str("\x1b[31m");
                    s.push_str(&t.text);
                    s.push_str("\x1b[0m");
                }
                _ => s.push_str(&t.text),
            }
        }
        s
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.0 {
            f.write_str(&t.text)?;
        }
        Ok(())
    }
}

pub struct Printer<'a> {
    pub regs: &'a RegisterTable,
    pub syntax: &'a Syntax,
    pub names: &'a dyn NameResolver,
}

impl Printer<'_> {
    fn reg(&self, line: &mut Line, reg: RegId) {
        match self.regs.name(reg) {
            Some(name) => line.push(TokenKind::Register, name),
            None => line.push(TokenKind::Error, reg.to_string()),
        }
    }

    fn term(&self, line: &mut Line, reg: Option<RegId>) {
        if let Some(reg) = reg {
            self.reg(line, reg);
            line.push(TokenKind::Punct, " + ");
        }
    }

    pub fn operand(&self, op: &Operand) -> Line {
        let mut line = Line::default();
        match *op {
            Operand::Imm { value } => line.push(TokenKind::Number, self.syntax.hex(value)),
            Operand::Reg { reg } => self.reg(&mut line, reg),
            Operand::Displ {
                base,
                index,
                offset,
            } => {
                line.push(TokenKind::Punct, self.syntax.lbracket.as_str());
                self.term(&mut line, Some(base));
                self.term(&mut line, index);
                line.push(TokenKind::Number, self.syntax.hex(offset));
                line.push(TokenKind::Punct, self.syntax.rbracket.as_str());
            }
            Operand::Direct { target } => match self.names.name_of(target) {
                Some(name) => line.push(TokenKind::Symbol, name),
                None => line.push(TokenKind::Error, self.syntax.hex(target)),
            },
            Operand::Sum {
                width,
                base,
                extra,
                offset,
            } => {
                let prefix = width.prefix();
                if !prefix.is_empty() {
                    line.push(TokenKind::Punct, prefix);
                }
                line.push(TokenKind::Punct, self.syntax.lbracket.as_str());
                self.term(&mut line, Some(base));
                for reg in extra {
                    self.term(&mut line, reg);
                }
                line.push(TokenKind::Number, self.syntax.hex(offset));
                line.push(TokenKind::Punct, self.syntax.rbracket.as_str());
            }
        }
        line
    }

    /// Mnemonic followed by the operands the definition declares.
    pub fn insn(&self, desc: &InstrDesc, insn: &Decoded) -> Line {
        let mut line = Line::default();
        line.push(TokenKind::Mnemonic, desc.mnemonic);
        if desc.feature.contains(Feature::USE1) {
            if let Some(op) = insn.op(0) {
                line.push(TokenKind::Punct, " ");
                line.append(self.operand(op));
            }
            if desc.feature.contains(Feature::USE2) {
                if let Some(op) = insn.op(1) {
                    line.push(TokenKind::Punct, ", ");
                    line.append(self.operand(op));
                }
            }
        }
        line
    }
}
