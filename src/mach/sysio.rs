use super::{Address, Opcode, Val};

/// ## Host capabilities
///
/// Everything the machine can do to the outside world goes through
/// this trait, handed to each [`Runtime::run`](super::Runtime::run) call.

pub trait Sysio {
    fn cls(&mut self);
    fn write(&mut self, byte: u8);
    /// Next input byte, or 0 when nothing is waiting.
    fn read(&mut self, noecho: bool) -> u8;
    /// Is this key currently held down.
    fn keyset(&mut self, key: u8) -> bool;
    fn puts(&mut self, s: &str);
    fn gets(&mut self) -> String;
    fn palette(&mut self, id: u8);
    fn set_colours(&mut self, fg: u8, bg: u8);
    fn set_pixel(&mut self, x: i16, y: i16, colour: u8);
    fn get_pixel(&mut self, x: i16, y: i16) -> u8;
    fn set_cursor(&mut self, row: u8, col: u8);
    fn blit(&mut self, x: i16, y: i16, buffer: &[u8]);
    fn sound(&mut self, voice: u8, frequency: u16, duration_ms: u16);
    #[allow(clippy::too_many_arguments)]
    fn voice(
        &mut self,
        voice: u8,
        waveform: u8,
        volume: u8,
        attack: u8,
        decay: u8,
        sustain: u8,
        release: u8,
    );
}

/// Machine state handed to a [`Debugger`] before each instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub opcode: Opcode,
    pub pc: Address,
    pub stack_depth: usize,
    pub a: Val,
    pub b: Val,
    pub c: Val,
    pub idx: Address,
    /// Address of `memory[0]`.
    pub window: Address,
    pub memory: Vec<Val>,
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{:04X} {:<8} SP={} A={} B={} C={} IDX={}",
            self.pc, self.opcode, self.stack_depth, self.a, self.b, self.c, self.idx
        )?;
        if !self.memory.is_empty() {
            write!(f, " [{}]", self.window)?;
            for val in &self.memory {
                write!(f, " {}", val)?;
            }
        }
        Ok(())
    }
}

pub trait Debugger {
    fn trace(&mut self, snapshot: &Snapshot);
}

impl<F: FnMut(&Snapshot)> Debugger for F {
    fn trace(&mut self, snapshot: &Snapshot) {
        self(snapshot)
    }
}
