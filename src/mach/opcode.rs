use crate::error;
use crate::lang::Error;
use std::collections::HashMap;
use std::convert::TryFrom;

type Result<T> = std::result::Result<T, Error>;

/// Width and meaning of the bytes that follow an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    None,
    /// 2-byte signed, little endian.
    Short,
    /// 4-byte IEEE single.
    Float,
    /// 3-byte address, top bit masked off.
    Pointer,
    /// 4-byte NaN-boxed [`Val`](super::Val).
    Value,
    /// 2-byte syscall id then 2-byte register.
    Syscall,
    /// Null terminated bytes.
    String,
}

impl OperandKind {
    pub fn width(self) -> Option<usize> {
        match self {
            OperandKind::None => Some(0),
            OperandKind::Short => Some(2),
            OperandKind::Float => Some(4),
            OperandKind::Pointer => Some(3),
            OperandKind::Value => Some(4),
            OperandKind::Syscall => Some(4),
            OperandKind::String => None,
        }
    }
}

macro_rules! opcodes {
    ($($(#[$doc:meta])* $name:ident = $byte:literal, $mnemonic:literal, $kind:ident;)*) => {
        /// ## Virtual machine instruction set
        ///
        /// Expressions run on the value stack; registers A, B and C carry
        /// syscall arguments and IDX addresses memory.
        ///
        /// For example: `LET R=10+A*2` with A at cell 5 and R at cell 6
        /// compiles to `[PUSHI 10, LOAD 5, PUSHI 2, MUL, ADD, STORE 6]`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($(#[$doc])* $name = $byte,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)*];

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            pub fn operand(self) -> OperandKind {
                match self {
                    $(Opcode::$name => OperandKind::$kind,)*
                }
            }
        }

        impl TryFrom<u8> for Opcode {
            type Error = Error;
            fn try_from(byte: u8) -> Result<Opcode> {
                match byte {
                    $($byte => Ok(Opcode::$name),)*
                    _ => Err(error!(UnknownOpcode; format!("{:#04X}", byte))),
                }
            }
        }
    };
}

opcodes! {
    /// Costs no cycles.
    Nop = 0x00, "NOP", None;
    Halt = 0x01, "HALT", None;
    Yield = 0x02, "YIELD", None;
    /// Toggle the debugger hook.
    Trace = 0x03, "TRACE", None;
    Irq = 0x04, "IRQ", Short;
    Syscall = 0x05, "SYSCALL", Syscall;
    /// Raise the error number in the operand.
    Fail = 0x06, "FAIL", Short;

    Push = 0x10, "PUSH", Value;
    PushI = 0x11, "PUSHI", Short;
    PushF = 0x12, "PUSHF", Float;
    PushP = 0x13, "PUSHP", Pointer;
    Pop = 0x14, "POP", None;
    Dup = 0x15, "DUP", None;
    Swap = 0x16, "SWAP", None;
    PushA = 0x18, "PUSHA", None;
    PushB = 0x19, "PUSHB", None;
    PushC = 0x1A, "PUSHC", None;
    PopA = 0x1B, "POPA", None;
    PopB = 0x1C, "POPB", None;
    PopC = 0x1D, "POPC", None;

    Load = 0x20, "LOAD", Pointer;
    Store = 0x21, "STORE", Pointer;
    /// Push memory[IDX].
    LoadI = 0x22, "LOADI", None;
    /// Pop into memory[IDX].
    StoreI = 0x23, "STOREI", None;
    /// Push memory[IDX + n].
    LoadX = 0x24, "LOADX", Short;
    /// Pop into memory[IDX + n].
    StoreX = 0x25, "STOREX", Short;
    SetIdx = 0x26, "SETIDX", Pointer;
    PushIdx = 0x27, "PUSHIDX", None;
    PopIdx = 0x28, "POPIDX", None;
    /// IDX = memory[IDX + n], which must be a Pointer.
    Deref = 0x29, "DEREF", Short;
    /// Move the heap down n cells and point IDX at them.
    Alloc = 0x2A, "ALLOC", Short;
    /// Like ALLOC with the count popped and the cells zeroed.
    Calloc = 0x2B, "CALLOC", None;
    /// Zero n cells from IDX.
    Clr = 0x2C, "CLR", Short;
    /// Store a string at IDX; IDX ends one past the terminator.
    SetS = 0x2D, "SETS", String;

    Add = 0x30, "ADD", None;
    Sub = 0x31, "SUB", None;
    Mul = 0x32, "MUL", None;
    Div = 0x33, "DIV", None;
    IDiv = 0x34, "IDIV", None;
    Mod = 0x35, "MOD", None;
    Exp = 0x36, "EXP", None;
    Neg = 0x37, "NEG", None;
    And = 0x38, "AND", None;
    Or = 0x39, "OR", None;
    Not = 0x3A, "NOT", None;

    Eq = 0x40, "EQ", None;
    Ne = 0x41, "NE", None;
    Gt = 0x42, "GT", None;
    Ge = 0x43, "GE", None;
    Lt = 0x44, "LT", None;
    Le = 0x45, "LE", None;
    /// Push -1, 0 or 1.
    Cmp = 0x46, "CMP", None;

    Int = 0x50, "INT", None;
    Flt = 0x51, "FLT", None;
    Ptr = 0x52, "PTR", None;
    Abs = 0x53, "ABS", None;
    Sqr = 0x54, "SQR", None;
    Sin = 0x55, "SIN", None;
    Cos = 0x56, "COS", None;
    Tan = 0x57, "TAN", None;
    Atn = 0x58, "ATN", None;
    Log = 0x59, "LOG", None;
    Rnd = 0x5A, "RND", None;
    Seed = 0x5B, "SEED", None;
    Len = 0x5C, "LEN", None;
    /// Push the cycle clock.
    Clock = 0x5D, "CLOCK", None;

    Jmp = 0x60, "JMP", Short;
    /// Pop and jump when zero.
    Jz = 0x61, "JZ", Short;
    /// Pop and jump when not zero.
    Jnz = 0x62, "JNZ", Short;
    Call = 0x63, "CALL", Short;
    Ret = 0x64, "RET", None;
}

impl Opcode {
    pub fn cost(self) -> usize {
        match self {
            Opcode::Nop => 0,
            _ => 1,
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Opcode> {
        thread_local!(
            static MNEMONICS: HashMap<&'static str, Opcode> =
                Opcode::ALL.iter().map(|op| (op.mnemonic(), *op)).collect();
        );
        MNEMONICS.with(|m| m.get(s).copied())
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// Register named by a SYSCALL operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    A = 0,
    B = 1,
    C = 2,
}

impl Register {
    pub fn from_name(s: &str) -> Option<Register> {
        match s {
            "A" => Some(Register::A),
            "B" => Some(Register::B),
            "C" => Some(Register::C),
            _ => None,
        }
    }
}

impl TryFrom<u16> for Register {
    type Error = Error;
    fn try_from(n: u16) -> Result<Register> {
        match n {
            0 => Ok(Register::A),
            1 => Ok(Register::B),
            2 => Ok(Register::C),
            _ => Err(error!(IllegalFunctionCall; format!("NO REGISTER {}", n))),
        }
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Register::A => write!(f, "A"),
            Register::B => write!(f, "B"),
            Register::C => write!(f, "C"),
        }
    }
}

/// ## Host calls
///
/// The register operand carries the first argument or receives the
/// result. Remaining arguments are popped from the value stack with the
/// last argument on top.
///
/// | call     | register     | stack                                     |
/// |----------|--------------|-------------------------------------------|
/// | CLS      |              |                                           |
/// | WRITE    | byte         |                                           |
/// | READ     | ← byte       |                                           |
/// | READKEY  | ← byte       |                                           |
/// | KEYSET   | key → 1/0    |                                           |
/// | PUTS     | pointer      |                                           |
/// | GETS     | ← pointer    |                                           |
/// | READS    | ← pointer    | (line read into IDX, may suspend)         |
/// | PRINT    | any value    |                                           |
/// | INPUT    | ← number     |                                           |
/// | PALETTE  | id           |                                           |
/// | COLOURS  |              | fg bg                                     |
/// | SETPIXEL |              | x y colour                                |
/// | GETPIXEL | ← colour     | x y                                       |
/// | CURSOR   |              | row col                                   |
/// | BLIT     | pointer      | x y len                                   |
/// | SOUND    |              | voice freq ms                             |
/// | VOICE    |              | voice wave vol attack decay sustain release |
/// | LINE     |              | x1 y1 x2 y2 colour                        |
/// | BOX      |              | x1 y1 x2 y2 colour                        |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Cls = 0,
    Write = 1,
    Read = 2,
    ReadKey = 3,
    KeySet = 4,
    Puts = 5,
    Gets = 6,
    ReadS = 7,
    Print = 8,
    Input = 9,
    Palette = 10,
    Colours = 11,
    SetPixel = 12,
    GetPixel = 13,
    Cursor = 14,
    Blit = 15,
    Sound = 16,
    Voice = 17,
    Line = 18,
    Box = 19,
}

impl Syscall {
    pub const ALL: &'static [Syscall] = &[
        Syscall::Cls,
        Syscall::Write,
        Syscall::Read,
        Syscall::ReadKey,
        Syscall::KeySet,
        Syscall::Puts,
        Syscall::Gets,
        Syscall::ReadS,
        Syscall::Print,
        Syscall::Input,
        Syscall::Palette,
        Syscall::Colours,
        Syscall::SetPixel,
        Syscall::GetPixel,
        Syscall::Cursor,
        Syscall::Blit,
        Syscall::Sound,
        Syscall::Voice,
        Syscall::Line,
        Syscall::Box,
    ];

    pub fn name(self) -> &'static str {
        use Syscall::*;
        match self {
            Cls => "CLS",
            Write => "WRITE",
            Read => "READ",
            ReadKey => "READKEY",
            KeySet => "KEYSET",
            Puts => "PUTS",
            Gets => "GETS",
            ReadS => "READS",
            Print => "PRINT",
            Input => "INPUT",
            Palette => "PALETTE",
            Colours => "COLOURS",
            SetPixel => "SETPIXEL",
            GetPixel => "GETPIXEL",
            Cursor => "CURSOR",
            Blit => "BLIT",
            Sound => "SOUND",
            Voice => "VOICE",
            Line => "LINE",
            Box => "BOX",
        }
    }

    pub fn from_name(s: &str) -> Option<Syscall> {
        Syscall::ALL.iter().copied().find(|sc| sc.name() == s)
    }
}

impl TryFrom<u16> for Syscall {
    type Error = Error;
    fn try_from(n: u16) -> Result<Syscall> {
        Syscall::ALL
            .get(n as usize)
            .copied()
            .ok_or_else(|| error!(IllegalFunctionCall; format!("NO SYSCALL {}", n)))
    }
}

impl std::fmt::Display for Syscall {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
