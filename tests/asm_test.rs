mod common;
use basic::asm::{self, AsmToken};
use basic::lang::{compile, ErrorCode};
use basic::mach::{Instruction, Opcode, Operand, Program, Register, Syscall, Val};
use common::*;

fn assemble(source: &str) -> Program {
    asm::assemble(&asm::parse(source).unwrap()).unwrap()
}

/// One instruction per line, as the assembler reads them.
fn disassemble(program: &Program) -> String {
    let mut listing = String::new();
    let mut addr = 0;
    while addr < program.len() {
        let (inst, next) = program.instruction(addr).unwrap();
        listing.push_str(&format!("    {}\n", inst));
        addr = next;
    }
    listing
}

#[test]
fn test_every_operand_kind() {
    let source = r#"
        NOP
        PUSHI -3
        PUSHF 1.5
        LOAD 12
        PUSH @7
        PUSH UNSET
        PUSH 2
        PUSH -0.25
        SYSCALL SOUND, C
        SETS "A\tB"
"#;
    let program = assemble(source);
    let mut decoded = vec![];
    let mut addr = 0;
    while addr < program.len() {
        let (inst, next) = program.instruction(addr).unwrap();
        decoded.push(inst);
        addr = next;
    }
    let expected = vec![
        (Opcode::Nop, Operand::None),
        (Opcode::PushI, Operand::Short(-3)),
        (Opcode::PushF, Operand::Float(1.5)),
        (Opcode::Load, Operand::Pointer(12)),
        (Opcode::Push, Operand::Value(Val::Pointer(7))),
        (Opcode::Push, Operand::Value(Val::Unset)),
        (Opcode::Push, Operand::Value(Val::Integer(2))),
        (Opcode::Push, Operand::Value(Val::Float(-0.25))),
        (Opcode::Syscall, Operand::Syscall(Syscall::Sound, Register::C)),
        (Opcode::SetS, Operand::String("A\tB".into())),
    ];
    let expected: Vec<Instruction> = expected
        .into_iter()
        .map(|(opcode, operand)| Instruction { opcode, operand })
        .collect();
    assert_eq!(decoded, expected);
    assert_eq!(assemble(&disassemble(&program)).code(), program.code());
}

#[test]
fn test_compiled_programs_reassemble() {
    let sources = [
        "10 PRINT \"HELLO\", 1.5; -2\n20 GOTO 10",
        r#"
10 DEF FN F(X, Y) = X * Y + 0.5
20 DIM A(4, 2)
30 FOR I = 0 TO 3 STEP 1
40 A(I, 1) = FN F(I, 2)
50 NEXT
60 DATA 1, "TWO", -3.25
70 READ P, Q$, R
80 IF P < R THEN 30 ELSE PRINT Q$
90 ON P GOSUB 100
100 RETURN
"#,
        "10 INPUT \"NAME\"; N$\n20 PSET 1, 2: LINE 0, 0, 5, 5, 3, B: SOUND 0, 440, 10",
    ];
    for source in sources.iter() {
        let program = compile(source).unwrap();
        let listing = disassemble(&program);
        let again = assemble(&listing);
        assert_eq!(again.code(), program.code(), "{}", listing);
    }
}

#[test]
fn test_case_and_comments() {
    let program = assemble("  pushi 1 ; one\n\n; nothing\n popa\n syscall print, a\n halt");
    let mut recorder = Recorder::default();
    run_program(&program, &mut recorder, 100).unwrap();
    assert_eq!(recorder.output, "1");
}

#[test]
fn test_countdown() {
    let program = assemble(
        r#"
; print 3 2 1
.static 1
.entry start
start:  PUSHI 3
        STORE 0
loop:   LOAD 0
        POPA
        SYSCALL PRINT, A
        LOAD 0
        PUSHI 1
        SUB
        DUP
        STORE 0
        JNZ loop
        HALT
"#,
    );
    let mut recorder = Recorder::default();
    run_program(&program, &mut recorder, 3).unwrap();
    assert_eq!(recorder.output, "321");
}

#[test]
fn test_syscall_by_number() {
    let tokens = asm::parse("SYSCALL 1, B").unwrap();
    match &tokens[..] {
        [AsmToken::Instruction(inst)] => {
            assert_eq!(inst.operand, Operand::Syscall(Syscall::Write, Register::B))
        }
        other => panic!("{:?}", other),
    }
}

#[test]
fn test_parse_errors() {
    let e = asm::parse("PUSHI").unwrap_err();
    assert_eq!(e.code(), ErrorCode::SyntaxError);
    let e = asm::parse("NOP\nPUSHI 99999").unwrap_err();
    assert_eq!(e.code(), ErrorCode::SyntaxError);
    assert_eq!(e.line_number(), Some(2));
    let e = asm::parse("SYSCALL NOPE, A").unwrap_err();
    assert_eq!(e.code(), ErrorCode::SyntaxError);
    let e = asm::parse("SETS \"open").unwrap_err();
    assert_eq!(e.code(), ErrorCode::SyntaxError);
    let e = asm::parse("FROB 1").unwrap_err();
    assert_eq!(e.code(), ErrorCode::UnknownMnemonic);
}
