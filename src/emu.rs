use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::decoder::Decoded;
use crate::instructions::InstrDesc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XrefKind {
    /// Ordinary fallthrough to the next instruction.
    Flow,
    /// Transfer to an operand-derived target.
    Jump,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Xref {
    pub from: u32,
    pub to: u32,
    pub kind: XrefKind,
}

/// Code successors of one decoded instruction, jump edge first.
///
/// Memory operands produce no references.
pub fn emulate(desc: &InstrDesc, insn: &Decoded) -> Vec<Xref> {
    let flow = Xref {
        from: insn.address,
        to: insn.next(),
        kind: XrefKind::Flow,
    };
    if desc.is_jump() {
        let mut out = Vec::with_capacity(2);
        match insn.op(0).and_then(|op| op.target()) {
            Some(to) => out.push(Xref {
                from: insn.address,
                to,
                kind: XrefKind::Jump,
            }),
            None => warn!(
                addr = insn.address,
                mnemonic = desc.mnemonic,
                "jump without an address operand"
            ),
        }
        if !desc.is_uncond() {
            out.push(flow);
        }
        out
    } else if !desc.is_stop() {
        vec![flow]
    } else {
        Vec::new()
    }
}
