use pretty_assertions::assert_eq;

use cpr_rs::emu::emulate;
use cpr_rs::instructions::{InstrDesc, LEGACY_UNCOND_MNEMONICS, TABLE};
use cpr_rs::{Decoded, LinearMemory, Operand, ProcConfig, Processor, Xref, XrefKind};

fn cpu() -> Processor {
    Processor::new(ProcConfig::default()).unwrap()
}

fn at(cpu: &Processor, base: u32, bytes: &[u8]) -> Decoded {
    let mut mem = LinearMemory::new(0x1000);
    assert!(mem.write(base, bytes));
    cpu.analyze(&mem, base).unwrap()
}

fn jump(from: u32, to: u32) -> Xref {
    Xref { from, to, kind: XrefKind::Jump }
}

fn flow(from: u32, to: u32) -> Xref {
    Xref { from, to, kind: XrefKind::Flow }
}

#[test]
fn unconditional_jmp_has_only_the_jump_edge() {
    let cpu = cpu();
    // jmp 0x200 at 0x100
    let d = at(&cpu, 0x100, &[0x40, 0x00, 0x02]);
    assert_eq!(d.size, 3);
    assert_eq!(d.operands, vec![Operand::Direct { target: 0x200 }]);
    assert_eq!(cpu.emulate(&d), vec![jump(0x100, 0x200)]);
}

#[test]
fn vm_jmp_is_unconditional_too() {
    let cpu = cpu();
    let d = at(&cpu, 0x10, &[0x46, 0x00, 0x00, 0x01, 0x00]);
    assert_eq!(cpu.emulate(&d), vec![jump(0x10, 0x1_0000)]);
}

#[test]
fn conditional_jump_then_fallthrough() {
    let cpu = cpu();
    let d = at(&cpu, 0x20, &[0x41, 0x80, 0x00]);
    assert_eq!(cpu.emulate(&d), vec![jump(0x20, 0x80), flow(0x20, 0x23)]);
}

#[test]
fn call_falls_through() {
    let cpu = cpu();
    let d = at(&cpu, 0x30, &[0x47, 0x00, 0x04, 0x00, 0x00]);
    assert_eq!(cpu.emulate(&d), vec![jump(0x30, 0x400), flow(0x30, 0x35)]);
}

#[test]
fn ordinary_instruction_flows_to_next() {
    let cpu = cpu();
    let d = at(&cpu, 0x40, &[0x11, 0x01, 0xEF, 0xBE, 0xAD, 0xDE]);
    assert_eq!(cpu.emulate(&d), vec![flow(0x40, 0x46)]);
}

#[test]
fn stop_instructions_end_the_path() {
    let cpu = cpu();
    for op in [0x01u8, 0x02, 0x51] {
        let d = at(&cpu, 0x50, &[op]);
        assert_eq!(cpu.emulate(&d), vec![], "opcode {op:#04x}");
    }
}

#[test]
fn edge_counts_follow_feature_flags_for_every_definition() {
    for (itype, desc) in TABLE.iter().enumerate() {
        let operands = match desc.arity() {
            0 => vec![],
            1 if desc.is_jump() => vec![Operand::Direct { target: 0x999 }],
            1 => vec![Operand::Imm { value: 1 }],
            _ => vec![Operand::Imm { value: 1 }, Operand::Imm { value: 2 }],
        };
        let d = Decoded { address: 0x100, itype, size: desc.enc.size(), operands };
        let edges = emulate(desc, &d);
        let next = 0x100 + desc.enc.size() as u32;
        let expected = if desc.is_jump() && LEGACY_UNCOND_MNEMONICS.contains(&desc.mnemonic) {
            vec![jump(0x100, 0x999)]
        } else if desc.is_jump() {
            vec![jump(0x100, 0x999), flow(0x100, next)]
        } else if desc.is_stop() {
            vec![]
        } else {
            vec![flow(0x100, next)]
        };
        assert_eq!(edges, expected, "{}", desc.mnemonic);
    }
}

#[test]
fn fallthrough_wraps_at_top_of_address_space() {
    let desc: &InstrDesc = &TABLE[0];
    let d = Decoded { address: u32::MAX, itype: 0, size: 1, operands: vec![] };
    assert_eq!(emulate(desc, &d), vec![flow(u32::MAX, 0)]);
}
