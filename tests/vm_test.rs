mod common;
use basic::asm;
use basic::lang::ErrorCode;
use basic::mach::{Config, Debugger, Opcode, Program, Register, Runtime, Snapshot, Val};
use common::*;

fn assemble(source: &str) -> Program {
    asm::assemble(&asm::parse(source).unwrap()).unwrap()
}

fn run(runtime: &mut Runtime, recorder: &mut Recorder, program: &Program, budget: usize) -> bool {
    runtime.run(recorder, program, budget, None).unwrap()
}

#[test]
fn test_halt_resets_machine() {
    let program = assemble("PUSHI 5\n STORE 3\n PUSHI 1\n POPA\n PUSHI 2\n HALT");
    let mut runtime = Runtime::default();
    let mut recorder = Recorder::default();
    assert!(run(&mut runtime, &mut recorder, &program, 1000));
    assert_eq!(runtime.memory()[3], Val::Unset);
    assert!(runtime.stack().is_empty());
    assert_eq!(runtime.register(Register::A), Val::Unset);
    assert_eq!(runtime.pc(), 0);
}

#[test]
fn test_yield_preserves_state() {
    let source = "PUSHI 5\n PUSHI 6\n POPA\n PUSHI 7\n POPB\n PUSHF 1.5\n POPC\n SETIDX 42\n YIELD\n POPB\n HALT";
    let program = assemble(source);
    let mut runtime = Runtime::default();
    let mut recorder = Recorder::default();
    assert!(!run(&mut runtime, &mut recorder, &program, 1000));
    assert_eq!(runtime.stack(), &[Val::Integer(5)]);
    assert_eq!(runtime.register(Register::A), Val::Integer(6));
    assert_eq!(runtime.register(Register::B), Val::Integer(7));
    assert_eq!(runtime.register(Register::C), Val::Float(1.5));
    assert_eq!(runtime.idx(), 42);
    assert!(runtime.is_running());
    assert!(!run(&mut runtime, &mut recorder, &program, 0));
    assert_eq!(runtime.idx(), 42);
    assert_eq!(runtime.register(Register::B), Val::Integer(7));
    assert!(run(&mut runtime, &mut recorder, &program, 1000));
}

#[test]
fn test_budget_is_exact() {
    let program = assemble("top: JMP top");
    let mut runtime = Runtime::default();
    let mut recorder = Recorder::default();
    assert!(!run(&mut runtime, &mut recorder, &program, 100));
    assert_eq!(runtime.clock(), 100);
    assert!(!run(&mut runtime, &mut recorder, &program, 7));
    assert_eq!(runtime.clock(), 107);
}

#[test]
fn test_nop_is_free() {
    let program = assemble("NOP\n NOP\n NOP\n HALT");
    let mut runtime = Runtime::default();
    let mut recorder = Recorder::default();
    assert!(run(&mut runtime, &mut recorder, &program, 1));
}

#[test]
fn test_zero_budget_does_nothing() {
    let program = assemble("PUSHI 1\n HALT");
    let mut runtime = Runtime::default();
    let mut recorder = Recorder::default();
    assert!(!run(&mut runtime, &mut recorder, &program, 0));
    assert!(runtime.stack().is_empty());
    assert!(run(&mut runtime, &mut recorder, &program, 2));
}

#[test]
fn test_stack_errors() {
    let mut recorder = Recorder::default();
    let e = Runtime::default()
        .run(&mut recorder, &assemble("POP"), 10, None)
        .unwrap_err();
    assert_eq!(e.code(), ErrorCode::StackUnderflow);
    assert_eq!(e.address(), Some(0));

    let e = Runtime::default()
        .run(&mut recorder, &assemble("top: CALL top"), 1000, None)
        .unwrap_err();
    assert_eq!(e.code(), ErrorCode::StackOverflow);

    let config = Config {
        stack_size: 2,
        ..Config::default()
    };
    let e = Runtime::new(config)
        .run(&mut recorder, &assemble("PUSHI 1\n PUSHI 2\n PUSHI 3"), 10, None)
        .unwrap_err();
    assert_eq!(e.code(), ErrorCode::StackOverflow);
    assert_eq!(e.address(), Some(6));
}

#[test]
fn test_ret_without_call() {
    let mut recorder = Recorder::default();
    let e = Runtime::default()
        .run(&mut recorder, &assemble("RET"), 10, None)
        .unwrap_err();
    assert_eq!(e.code(), ErrorCode::ReturnWithoutGosub);
}

#[test]
fn test_call_and_return() {
    let program = assemble(
        r#"
        CALL sub
        PUSHI 2
        YIELD
sub:    PUSHI 1
        RET
"#,
    );
    let mut runtime = Runtime::default();
    let mut recorder = Recorder::default();
    assert!(!run(&mut runtime, &mut recorder, &program, 100));
    assert_eq!(runtime.stack(), &[Val::Integer(1), Val::Integer(2)]);
    assert_eq!(runtime.call_depth(), 0);
}

#[test]
fn test_fault_sticks_until_reset() {
    let program = assemble("POP");
    let mut runtime = Runtime::default();
    let mut recorder = Recorder::default();
    assert!(runtime.run(&mut recorder, &program, 10, None).is_err());
    let e = runtime.run(&mut recorder, &program, 10, None).unwrap_err();
    assert_eq!(e.code(), ErrorCode::InternalError);
    runtime.reset();
    let e = runtime.run(&mut recorder, &program, 10, None).unwrap_err();
    assert_eq!(e.code(), ErrorCode::StackUnderflow);
}

#[test]
fn test_memory_limits() {
    let mut recorder = Recorder::default();
    let e = Runtime::default()
        .run(&mut recorder, &assemble(".static 20000\n HALT"), 10, None)
        .unwrap_err();
    assert_eq!(e.code(), ErrorCode::OutOfMemory);

    let e = Runtime::default()
        .run(&mut recorder, &assemble(".static 16000\n ALLOC 1000"), 10, None)
        .unwrap_err();
    assert_eq!(e.code(), ErrorCode::OutOfMemory);

    let e = Runtime::default()
        .run(&mut recorder, &assemble("LOAD 20000"), 10, None)
        .unwrap_err();
    assert_eq!(e.code(), ErrorCode::MemoryFault);
}

#[test]
fn test_heap_grows_down() {
    let program = assemble(".static 10\n ALLOC 4\n PUSHIDX\n YIELD");
    let mut runtime = Runtime::default();
    let mut recorder = Recorder::default();
    assert!(!run(&mut runtime, &mut recorder, &program, 10));
    let top = runtime.config().memory_size - 4;
    assert_eq!(runtime.stack(), &[Val::Pointer(top)]);
    assert_eq!(runtime.heap(), top);
}

#[test]
fn test_unknown_opcode() {
    let code = [0xFFu8];
    let mut image = b"BVM\0".to_vec();
    image.extend_from_slice(&1u16.to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes());
    image.extend_from_slice(&1u32.to_le_bytes());
    image.extend_from_slice(&crc::crc32::checksum_ieee(&code).to_le_bytes());
    image.extend_from_slice(&code);
    let program = Program::from_image(&image).unwrap();
    let mut recorder = Recorder::default();
    let e = Runtime::default()
        .run(&mut recorder, &program, 10, None)
        .unwrap_err();
    assert_eq!(e.code(), ErrorCode::UnknownOpcode);
}

#[test]
fn test_interrupts() {
    let program = assemble("IRQ 7\n POPA\n YIELD\n IRQ 8");
    let mut runtime = Runtime::default();
    runtime.add_interrupt(7, |rt| rt.push(Val::Integer(42)));
    let mut recorder = Recorder::default();
    assert!(!run(&mut runtime, &mut recorder, &program, 100));
    assert_eq!(runtime.register(Register::A), Val::Integer(42));
    let e = runtime.run(&mut recorder, &program, 100, None).unwrap_err();
    assert_eq!(e.code(), ErrorCode::IllegalFunctionCall);
}

#[test]
fn test_trace_hook() {
    let program = assemble("NOP\n PUSHI 1\n TRACE\n POP\n HALT");
    let mut runtime = Runtime::default();
    runtime.set_tracing(true);
    let mut seen: Vec<Snapshot> = vec![];
    let mut hook = |snapshot: &Snapshot| seen.push(snapshot.clone());
    let debugger: &mut dyn Debugger = &mut hook;
    let mut recorder = Recorder::default();
    assert!(runtime
        .run(&mut recorder, &program, 100, Some(debugger))
        .unwrap());
    let ops: Vec<Opcode> = seen.iter().map(|s| s.opcode).collect();
    assert_eq!(ops, vec![Opcode::Nop, Opcode::PushI, Opcode::Trace]);
    assert_eq!(seen[2].stack_depth, 1);
    assert_eq!(seen[1].pc, 1);
}

#[test]
fn test_jump_before_first_run() {
    let program = assemble("PUSHI 1\n YIELD\nother: PUSHI 2\n YIELD");
    let mut runtime = Runtime::default();
    runtime.jump(program.get_label("other").unwrap());
    let mut recorder = Recorder::default();
    assert!(!run(&mut runtime, &mut recorder, &program, 100));
    assert_eq!(runtime.stack(), &[Val::Integer(2)]);
}

#[test]
fn test_puts_string() {
    let program = assemble(
        r#"
        SETIDX 10
        SETS "HI"
        PUSHP 10
        POPA
        SYSCALL PUTS, A
        HALT
"#,
    );
    let mut recorder = Recorder::default();
    run_program(&program, &mut recorder, 100).unwrap();
    assert_eq!(recorder.output, "HI");
}

#[test]
fn test_reads_suspends_until_newline() {
    let program = assemble(
        r#"
        SETIDX 100
        SYSCALL READS, B
        PUSHB
        POPA
        SYSCALL PUTS, A
        HALT
"#,
    );
    let mut runtime = Runtime::default();
    let mut recorder = Recorder::default();
    assert!(!run(&mut runtime, &mut recorder, &program, 100));
    assert_eq!(runtime.pc(), 4);
    recorder.keys.extend(b"H".iter());
    assert!(!run(&mut runtime, &mut recorder, &program, 100));
    recorder.keys.extend(b"I\n".iter());
    assert!(run(&mut runtime, &mut recorder, &program, 100));
    assert_eq!(recorder.output, "HI\nHI");
}

#[test]
fn test_reads_respects_budget() {
    let program = assemble("SETIDX 100\n SYSCALL READS, A\n HALT");
    let mut runtime = Runtime::default();
    let mut recorder = Recorder::with_keys("ABCDEF\n");
    assert!(!run(&mut runtime, &mut recorder, &program, 3));
    assert!(runtime.clock() <= 3);
    while !run(&mut runtime, &mut recorder, &program, 3) {}
    assert_eq!(recorder.output, "ABCDEF\n");
}

#[test]
fn test_gets_allocates() {
    let program = assemble("SYSCALL GETS, A\n SYSCALL PUTS, A\n PUSHA\n LEN\n YIELD");
    let mut runtime = Runtime::default();
    let mut recorder = Recorder::with_lines(&["HELLO"]);
    assert!(!run(&mut runtime, &mut recorder, &program, 100));
    assert_eq!(recorder.output, "HELLO");
    assert_eq!(runtime.stack(), &[Val::Integer(5)]);
    assert_eq!(runtime.heap(), runtime.config().memory_size - 6);
}

#[test]
fn test_print_values() {
    let program = assemble(
        r#"
        PUSH 2.5
        POPA
        SYSCALL PRINT, A
        PUSHF 3.0
        POPC
        SYSCALL PRINT, C
        PUSHI -7
        POPB
        SYSCALL PRINT, B
        HALT
"#,
    );
    let mut recorder = Recorder::default();
    run_program(&program, &mut recorder, 100).unwrap();
    assert_eq!(recorder.output, "2.53-7");
}

#[test]
fn test_print_unset() {
    let mut recorder = Recorder::default();
    let e = Runtime::default()
        .run(&mut recorder, &assemble("SYSCALL PRINT, A"), 10, None)
        .unwrap_err();
    assert_eq!(e.code(), ErrorCode::TypeMismatch);
}

#[test]
fn test_strict_comparison_rejects_mixed() {
    let mut recorder = Recorder::default();
    let e = Runtime::default()
        .run(&mut recorder, &assemble("PUSHI 1\n PUSHF 1.0\n EQ"), 10, None)
        .unwrap_err();
    assert_eq!(e.code(), ErrorCode::TypeMismatch);

    let program = assemble("PUSHI 1\n PUSHF 1.0\n CMP\n YIELD");
    let mut runtime = Runtime::default();
    assert!(!run(&mut runtime, &mut recorder, &program, 10));
    assert_eq!(runtime.stack(), &[Val::Integer(0)]);
}

#[test]
fn test_fail_raises_code() {
    let mut recorder = Recorder::default();
    let e = Runtime::default()
        .run(&mut recorder, &assemble("NOP\n FAIL 4"), 10, None)
        .unwrap_err();
    assert_eq!(e.code(), ErrorCode::OutOfData);
    assert_eq!(e.address(), Some(1));
}

#[test]
fn test_image_round_trip_runs() {
    let program = basic::lang::compile("10 PRINT 6 * 7").unwrap();
    let image = program.to_image();
    let loaded = Program::from_image(&image).unwrap();
    assert_eq!(loaded.code(), program.code());
    let mut recorder = Recorder::default();
    run_program(&loaded, &mut recorder, 100).unwrap();
    assert_eq!(recorder.output, "42\n");

    let mut broken = image.clone();
    let last = broken.len() - 1;
    broken[last] ^= 0xFF;
    let e = Program::from_image(&broken).unwrap_err();
    assert_eq!(e.code(), ErrorCode::BadImage);
}
