use std::collections::HashMap;

use pretty_assertions::assert_eq;

use cpr_rs::disasm::TokenKind;
use cpr_rs::{DataWidth, Decoded, HexStyle, NoNames, Operand, ProcConfig, Processor, RegId, Syntax};

fn cpu() -> Processor {
    Processor::new(ProcConfig::default()).unwrap()
}

fn reg(cpu: &Processor, name: &str) -> RegId {
    cpu.registers().lookup(name).unwrap()
}

fn text(cpu: &Processor, op: &Operand) -> String {
    cpu.out_operand(op, &NoNames).to_string()
}

#[test]
fn immediate_and_register() {
    let cpu = cpu();
    assert_eq!(text(&cpu, &Operand::Imm { value: 5 }), "5");
    assert_eq!(text(&cpu, &Operand::Imm { value: 0xBEEF }), "beef");
    assert_eq!(text(&cpu, &Operand::Reg { reg: reg(&cpu, "sp") }), "sp");
}

#[test]
fn displacement_without_index_has_no_dangling_plus() {
    let cpu = cpu();
    let op = Operand::Displ { base: reg(&cpu, "r1"), index: None, offset: 0x10 };
    assert_eq!(text(&cpu, &op), "[r1 + 10]");
}

#[test]
fn displacement_with_index() {
    let cpu = cpu();
    let op = Operand::Displ { base: reg(&cpu, "bp"), index: Some(reg(&cpu, "r2")), offset: 0 };
    assert_eq!(text(&cpu, &op), "[bp + r2 + 0]");
}

#[test]
fn sum_with_single_register() {
    let cpu = cpu();
    let op = Operand::Sum {
        width: DataWidth::Byte,
        base: reg(&cpu, "r0"),
        extra: [None, None, None],
        offset: 0x2c,
    };
    assert_eq!(text(&cpu, &op), "byte ptr [r0 + 2c]");
}

#[test]
fn sum_skips_absent_slots_without_gaps() {
    let cpu = cpu();
    let mk = |width, extra| Operand::Sum { width, base: RegId(1), extra, offset: 4 };
    assert_eq!(
        text(&cpu, &mk(DataWidth::Word, [None, Some(RegId(3)), None])),
        "word ptr [r1 + r3 + 4]"
    );
    assert_eq!(
        text(&cpu, &mk(DataWidth::Dword, [Some(RegId(2)), Some(RegId(3)), Some(RegId(4))])),
        "dword ptr [r1 + r2 + r3 + r4 + 4]"
    );
    assert_eq!(
        text(&cpu, &mk(DataWidth::Unspecified, [None, None, Some(RegId(7))])),
        "[r1 + r7 + 4]"
    );
}

#[test]
fn direct_address_uses_symbol_when_known() {
    let cpu = cpu();
    let mut names = HashMap::new();
    names.insert(0x200u32, "loc_200".to_string());
    let line = cpu.out_operand(&Operand::Direct { target: 0x200 }, &names);
    assert_eq!(line.to_string(), "loc_200");
    assert!(!line.has_errors());
}

#[test]
fn unresolved_address_is_flagged_as_error_literal() {
    let cpu = cpu();
    let line = cpu.out_operand(&Operand::Direct { target: 0x1234 }, &NoNames);
    assert_eq!(line.to_string(), "1234");
    assert_eq!(line.tokens()[0].kind, TokenKind::Error);
    assert_eq!(line.ansi(), "\x1b[31m1234\x1b[0m");
}

#[test]
fn unknown_register_does_not_abort_rendering() {
    let cpu = cpu();
    let op = Operand::Displ { base: RegId(0x7f), index: None, offset: 1 };
    let line = cpu.out_operand(&op, &NoNames);
    assert_eq!(line.to_string(), "[r#127 + 1]");
    assert!(line.has_errors());
}

#[test]
fn instruction_with_zero_one_two_operands() {
    let cpu = cpu();
    let nop = cpu.analyze(&[0x00u8], 0).unwrap();
    assert_eq!(cpu.out_insn(&nop, &NoNames).to_string(), "nop");

    let push = cpu.analyze(&[0x30u8, 0x05], 0).unwrap();
    assert_eq!(cpu.out_insn(&push, &NoNames).to_string(), "push 5");

    let ld = cpu.analyze(&[0x12u8, 0x00, 0x09, 0x01, 0x08, 0x00], 0).unwrap();
    assert_eq!(cpu.out_insn(&ld, &NoNames).to_string(), "ld r0, [bp + r1 + 8]");

    let st = cpu.analyze(&[0x17u8, 0x01, 0x08, 0xFF, 0xFF, 0xFF, 0x10, 0, 0, 0, 0x03], 0).unwrap();
    assert_eq!(cpu.out_insn(&st, &NoNames).to_string(), "vm_st byte ptr [sp + 10], r3");
}

#[test]
fn operand_count_comes_from_flags_not_from_operands() {
    let cpu = cpu();
    // halt declares no operands; a stray operand is not rendered
    let halt = Decoded { address: 0, itype: 1, size: 1, operands: vec![Operand::Imm { value: 9 }] };
    assert_eq!(cpu.out_insn(&halt, &NoNames).to_string(), "halt");
}

#[test]
fn jump_target_renders_unresolved_then_symbolic() {
    let cpu = cpu();
    let d = cpu.analyze(&[0x41u8, 0x00, 0x02], 0).unwrap();
    assert_eq!(cpu.out_insn(&d, &NoNames).to_string(), "jz 200");
    let names: HashMap<u32, String> = [(0x200, "done".to_string())].into_iter().collect();
    assert_eq!(cpu.out_insn(&d, &names).to_string(), "jz done");
}

#[test]
fn hex_styles_follow_config() {
    let mut syntax = Syntax::default();
    assert_eq!(syntax.hex(0xff), "ff");
    syntax.hex = HexStyle::CStyle;
    assert_eq!(syntax.hex(0xff), "0xff");
    syntax.hex = HexStyle::Suffix;
    syntax.uppercase = true;
    assert_eq!(syntax.hex(0xff), "0FFh");
    assert_eq!(syntax.hex(0x10), "10h");
}

#[test]
fn config_from_json_changes_listing() {
    let cfg = ProcConfig::from_json(r#"{ "syntax": { "hex": "cstyle", "lbracket": "(", "rbracket": ")" } }"#)
        .unwrap();
    assert_eq!(cfg.syntax.comment, ";");
    assert_eq!(cfg.syntax.data_byte, "db");
    let cpu = Processor::new(cfg).unwrap();
    let op = Operand::Displ { base: RegId(1), index: None, offset: 0x10 };
    assert_eq!(text(&cpu, &op), "(r1 + 0x10)");
}

#[test]
fn data_and_comment_directives_follow_config() {
    let cfg = ProcConfig::from_json(r#"{ "syntax": { "comment": "//", "data_byte": ".byte", "uppercase": true } }"#)
        .unwrap();
    let cpu = Processor::new(cfg).unwrap();
    assert_eq!(cpu.syntax().data(0xee), ".byte EE");
    assert_eq!(cpu.syntax().remark("unmapped"), "// unmapped");

    let default = Syntax::default();
    assert_eq!(default.data(0x7), "db 7");
    assert_eq!(default.remark("x"), "; x");
}
