use super::{Address, Opcode, OperandKind, Register, Syscall, Val, MAX_POINTER};
use crate::error;
use crate::lang::Error;
use std::collections::HashMap;
use std::convert::TryFrom;

type Result<T> = std::result::Result<T, Error>;

const IMAGE_MAGIC: &[u8; 4] = b"BVM\0";
const IMAGE_VERSION: u16 = 1;
const IMAGE_HEADER_LEN: usize = 4 + 2 + 4 + 4 + 4 + 4;

/// ## Bytecode container
///
/// An append-only byte buffer of `opcode [operand]` instructions, a label
/// table and an entry point. Compilers write it; the runtime only reads.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    code: Vec<u8>,
    labels: HashMap<String, Address>,
    entry: Address,
    static_size: Address,
}

/// Decoded operand of one instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Short(i16),
    Float(f32),
    Pointer(Address),
    Value(Val),
    Syscall(Syscall, Register),
    String(String),
}

/// One decoded instruction, as produced by [`Program::instruction`].
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Operand,
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn entry(&self) -> Address {
        self.entry
    }

    pub fn set_entry(&mut self, addr: Address) {
        self.entry = addr;
    }

    /// Memory cells below this are reserved for globals and the data segment.
    /// The runtime heap may not grow into them.
    pub fn static_size(&self) -> Address {
        self.static_size
    }

    pub fn set_static_size(&mut self, size: Address) {
        self.static_size = size;
    }

    pub fn add_label<S: Into<String>>(&mut self, name: S, addr: Address) {
        self.labels.insert(name.into(), addr);
    }

    pub fn get_label(&self, name: &str) -> Result<Address> {
        match self.labels.get(name) {
            Some(addr) => Ok(*addr),
            None => Err(error!(UndefinedLabel; name.to_string())),
        }
    }

    pub fn labels(&self) -> &HashMap<String, Address> {
        &self.labels
    }

    fn emit(&mut self, op: Opcode, kind: OperandKind) -> Address {
        debug_assert_eq!(op.operand(), kind, "{}", op);
        let addr = self.code.len();
        self.code.push(op as u8);
        addr
    }

    pub fn add(&mut self, op: Opcode) -> Address {
        self.emit(op, OperandKind::None)
    }

    pub fn add_short(&mut self, op: Opcode, n: i16) -> Address {
        let addr = self.emit(op, OperandKind::Short);
        self.code.extend_from_slice(&n.to_le_bytes());
        addr
    }

    pub fn add_float(&mut self, op: Opcode, n: f32) -> Address {
        let addr = self.emit(op, OperandKind::Float);
        self.code.extend_from_slice(&n.to_le_bytes());
        addr
    }

    pub fn add_pointer(&mut self, op: Opcode, ptr: Address) -> Address {
        let addr = self.emit(op, OperandKind::Pointer);
        self.code.extend_from_slice(&pointer_bytes(ptr));
        addr
    }

    pub fn add_value(&mut self, op: Opcode, val: Val) -> Address {
        let addr = self.emit(op, OperandKind::Value);
        self.code.extend_from_slice(&val.to_bits().to_le_bytes());
        addr
    }

    pub fn add_syscall(&mut self, call: Syscall, reg: Register) -> Address {
        let addr = self.emit(Opcode::Syscall, OperandKind::Syscall);
        self.code.extend_from_slice(&(call as u16).to_le_bytes());
        self.code.extend_from_slice(&(reg as u16).to_le_bytes());
        addr
    }

    pub fn add_string(&mut self, op: Opcode, s: &str) -> Address {
        let addr = self.emit(op, OperandKind::String);
        self.code.extend(s.bytes().filter(|b| *b != 0));
        self.code.push(0);
        addr
    }

    fn patch_site(&self, addr: Address, kind: OperandKind) -> Result<Address> {
        let op = Opcode::try_from(self.fetch(addr))?;
        if op.operand() != kind || addr >= self.code.len() {
            return Err(error!(InternalError; format!("NO {:?} OPERAND AT {:04X}", kind, addr)));
        }
        Ok(addr + 1)
    }

    /// Overwrite the operand of the instruction at `addr`. The opcode byte is untouched.
    pub fn update_short(&mut self, addr: Address, n: i16) -> Result<()> {
        let at = self.patch_site(addr, OperandKind::Short)?;
        self.code[at..at + 2].copy_from_slice(&n.to_le_bytes());
        Ok(())
    }

    pub fn update_float(&mut self, addr: Address, n: f32) -> Result<()> {
        let at = self.patch_site(addr, OperandKind::Float)?;
        self.code[at..at + 4].copy_from_slice(&n.to_le_bytes());
        Ok(())
    }

    pub fn update_pointer(&mut self, addr: Address, ptr: Address) -> Result<()> {
        let at = self.patch_site(addr, OperandKind::Pointer)?;
        self.code[at..at + 3].copy_from_slice(&pointer_bytes(ptr));
        Ok(())
    }

    pub fn update_value(&mut self, addr: Address, val: Val) -> Result<()> {
        let at = self.patch_site(addr, OperandKind::Value)?;
        self.code[at..at + 4].copy_from_slice(&val.to_bits().to_le_bytes());
        Ok(())
    }

    fn byte(&self, addr: Address) -> u8 {
        self.code.get(addr).copied().unwrap_or(0)
    }

    /// Opcode byte at `addr`; past the end of the code this is `HALT`.
    pub fn fetch(&self, addr: Address) -> u8 {
        match self.code.get(addr) {
            Some(b) => *b,
            None => Opcode::Halt as u8,
        }
    }

    pub fn read_short(&self, addr: Address) -> i16 {
        i16::from_le_bytes([self.byte(addr), self.byte(addr + 1)])
    }

    pub fn read_float(&self, addr: Address) -> f32 {
        f32::from_le_bytes(self.read_4(addr))
    }

    pub fn read_pointer(&self, addr: Address) -> Address {
        let bytes = [self.byte(addr), self.byte(addr + 1), self.byte(addr + 2) & 0x7F, 0];
        u32::from_le_bytes(bytes) as Address
    }

    pub fn read_value(&self, addr: Address) -> Val {
        Val::from_bits(u32::from_le_bytes(self.read_4(addr)))
    }

    pub fn read_syscall(&self, addr: Address) -> Result<(Syscall, Register)> {
        let call = u16::from_le_bytes([self.byte(addr), self.byte(addr + 1)]);
        let reg = u16::from_le_bytes([self.byte(addr + 2), self.byte(addr + 3)]);
        Ok((Syscall::try_from(call)?, Register::try_from(reg)?))
    }

    /// Bytes up to the terminator and the number of bytes consumed including it.
    pub fn read_string(&self, addr: Address) -> (&[u8], usize) {
        let tail = self.code.get(addr..).unwrap_or(&[]);
        match tail.iter().position(|b| *b == 0) {
            Some(len) => (&tail[..len], len + 1),
            None => (tail, tail.len()),
        }
    }

    fn read_4(&self, addr: Address) -> [u8; 4] {
        [
            self.byte(addr),
            self.byte(addr + 1),
            self.byte(addr + 2),
            self.byte(addr + 3),
        ]
    }

    /// Decode the instruction at `addr`, returning it with the address of the next one.
    pub fn instruction(&self, addr: Address) -> Result<(Instruction, Address)> {
        let opcode = Opcode::try_from(self.fetch(addr))?;
        let at = addr + 1;
        let (operand, next) = match opcode.operand() {
            OperandKind::None => (Operand::None, at),
            OperandKind::Short => (Operand::Short(self.read_short(at)), at + 2),
            OperandKind::Float => (Operand::Float(self.read_float(at)), at + 4),
            OperandKind::Pointer => (Operand::Pointer(self.read_pointer(at)), at + 3),
            OperandKind::Value => (Operand::Value(self.read_value(at)), at + 4),
            OperandKind::Syscall => {
                let (call, reg) = self.read_syscall(at)?;
                (Operand::Syscall(call, reg), at + 4)
            }
            OperandKind::String => {
                let (bytes, len) = self.read_string(at);
                let s = String::from_utf8_lossy(bytes).into_owned();
                (Operand::String(s), at + len)
            }
        };
        Ok((Instruction { opcode, operand }, next))
    }

    /// Serialize to a self-checking image: header, CRC-32 of the code, code.
    pub fn to_image(&self) -> Vec<u8> {
        let mut image = Vec::with_capacity(IMAGE_HEADER_LEN + self.code.len());
        image.extend_from_slice(IMAGE_MAGIC);
        image.extend_from_slice(&IMAGE_VERSION.to_le_bytes());
        image.extend_from_slice(&(self.entry as u32).to_le_bytes());
        image.extend_from_slice(&(self.static_size as u32).to_le_bytes());
        image.extend_from_slice(&(self.code.len() as u32).to_le_bytes());
        image.extend_from_slice(&crc::crc32::checksum_ieee(&self.code).to_le_bytes());
        image.extend_from_slice(&self.code);
        image
    }

    pub fn from_image(image: &[u8]) -> Result<Program> {
        if image.len() < IMAGE_HEADER_LEN || &image[0..4] != IMAGE_MAGIC {
            return Err(error!(BadImage; "NOT AN IMAGE"));
        }
        let word = |at: usize| {
            u32::from_le_bytes([image[at], image[at + 1], image[at + 2], image[at + 3]]) as usize
        };
        let version = u16::from_le_bytes([image[4], image[5]]);
        if version != IMAGE_VERSION {
            return Err(error!(BadImage; format!("VERSION {}", version)));
        }
        let entry = word(6);
        let static_size = word(10);
        let len = word(14);
        let crc = word(18) as u32;
        let code = &image[IMAGE_HEADER_LEN..];
        if code.len() != len {
            return Err(error!(BadImage; "TRUNCATED"));
        }
        if crc::crc32::checksum_ieee(code) != crc {
            return Err(error!(BadImage; "CHECKSUM"));
        }
        Ok(Program {
            code: code.to_vec(),
            labels: HashMap::new(),
            entry,
            static_size,
        })
    }
}

fn pointer_bytes(ptr: Address) -> [u8; 3] {
    let bytes = ((ptr & MAX_POINTER) as u32).to_le_bytes();
    [bytes[0], bytes[1], bytes[2] & 0x7F]
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Short(n) => write!(f, " {}", n),
            Operand::Float(n) => write!(f, " {:?}", n),
            Operand::Pointer(p) => write!(f, " {}", p),
            Operand::Value(v) => write!(f, " {}", v),
            Operand::Syscall(call, reg) => write!(f, " {}, {}", call, reg),
            Operand::String(s) => write!(f, " {:?}", s),
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}{}", self.opcode, self.operand)
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut by_addr: HashMap<Address, Vec<&str>> = HashMap::new();
        for (name, addr) in &self.labels {
            by_addr.entry(*addr).or_default().push(name);
        }
        let mut addr = 0;
        while addr < self.code.len() {
            if addr == self.entry {
                writeln!(f, "      .entry")?;
            }
            if let Some(names) = by_addr.get_mut(&addr) {
                names.sort_unstable();
                for name in names {
                    writeln!(f, "      {}:", name)?;
                }
            }
            match self.instruction(addr) {
                Ok((inst, next)) => {
                    writeln!(f, "{:04X}    {}", addr, inst)?;
                    addr = next;
                }
                Err(_) => {
                    writeln!(f, "{:04X}    ?? {:#04X}", addr, self.code[addr])?;
                    addr += 1;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::ErrorCode;

    #[test]
    fn test_add_returns_opcode_offset() {
        let mut p = Program::new();
        assert_eq!(p.add(Opcode::Nop), 0);
        assert_eq!(p.add_short(Opcode::PushI, 7), 1);
        assert_eq!(p.add_float(Opcode::PushF, 1.5), 4);
        assert_eq!(p.add_pointer(Opcode::Load, 300), 9);
        assert_eq!(p.add(Opcode::Halt), 13);
    }

    #[test]
    fn test_update_only_touches_operand() {
        let mut p = Program::new();
        p.add(Opcode::Nop);
        let jmp = p.add_short(Opcode::Jmp, -1);
        let push = p.add_value(Opcode::Push, Val::Unset);
        p.update_short(jmp, 42).unwrap();
        p.update_value(push, Val::Float(2.5)).unwrap();
        assert_eq!(p.fetch(jmp), Opcode::Jmp as u8);
        assert_eq!(p.read_short(jmp + 1), 42);
        assert_eq!(p.fetch(push), Opcode::Push as u8);
        assert_eq!(p.read_value(push + 1), Val::Float(2.5));
        assert_eq!(p.fetch(0), Opcode::Nop as u8);
    }

    #[test]
    fn test_update_checks_operand_kind() {
        let mut p = Program::new();
        let pop = p.add(Opcode::Pop);
        assert!(p.update_short(pop, 1).is_err());
        assert!(p.update_short(99, 1).is_err());
    }

    #[test]
    fn test_fetch_past_end_is_halt() {
        let p = Program::new();
        assert_eq!(p.fetch(1000), Opcode::Halt as u8);
    }

    #[test]
    fn test_pointer_top_bit_masked() {
        let mut p = Program::new();
        p.add_pointer(Opcode::SetIdx, 0x12_3456);
        assert_eq!(p.read_pointer(1), 0x12_3456 & 0x7F_FFFF & MAX_POINTER);
    }

    #[test]
    fn test_undefined_label() {
        let mut p = Program::new();
        p.add_label("10", 4);
        assert_eq!(p.get_label("10").unwrap(), 4);
        assert_eq!(
            p.get_label("20").unwrap_err().code(),
            ErrorCode::UndefinedLabel
        );
    }

    #[test]
    fn test_image() {
        let mut p = Program::new();
        p.add_string(Opcode::SetS, "HELLO");
        p.add(Opcode::Halt);
        p.set_entry(7);
        p.set_static_size(12);
        let mut image = p.to_image();
        let q = Program::from_image(&image).unwrap();
        assert_eq!(q.code(), p.code());
        assert_eq!(q.entry(), 7);
        assert_eq!(q.static_size(), 12);
        let last = image.len() - 2;
        image[last] ^= 0x55;
        assert_eq!(
            Program::from_image(&image).unwrap_err().code(),
            ErrorCode::BadImage
        );
        assert!(Program::from_image(b"nope").is_err());
    }

    #[test]
    fn test_listing() {
        let mut p = Program::new();
        p.add_label("START", 0);
        p.add_syscall(Syscall::Print, Register::A);
        p.add_short(Opcode::Jmp, 0);
        let s = p.to_string();
        assert!(s.contains("START:"));
        assert!(s.contains("0000    SYSCALL PRINT, A"));
        assert!(s.contains("0005    JMP 0"));
    }
}
