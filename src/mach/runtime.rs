use super::{
    Address, Debugger, Opcode, Operation, Program, Register, Snapshot, Stack, Syscall, Sysio, Val,
    MAX_POINTER,
};
use crate::error;
use crate::lang::{Error, ErrorCode};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::HashMap;
use std::convert::TryFrom;
use std::rc::Rc;

type Result<T> = std::result::Result<T, Error>;

/// Host callback reached through the `IRQ` instruction.
pub type Interrupt = Rc<dyn Fn(&mut Runtime) -> Result<()>>;

const DEFAULT_SEED: u64 = 0x5EED;
const SNAPSHOT_WINDOW: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Cells of linear memory.
    pub memory_size: usize,
    /// Values on the expression stack.
    pub stack_size: usize,
    /// Return addresses on the call stack.
    pub call_depth: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            memory_size: 16384,
            stack_size: 256,
            call_depth: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Running,
    Faulted,
}

enum Step {
    Continue,
    Yield,
    Halt,
}

/// ## Virtual machine
///
/// Owns every piece of mutable execution state. The host calls
/// [`run`](Runtime::run) once per tick with a cycle budget; state is
/// kept between calls so execution resumes exactly where it stopped.

pub struct Runtime {
    config: Config,
    a: Val,
    b: Val,
    c: Val,
    idx: Address,
    pc: Address,
    start: Option<Address>,
    stack: Stack<Val>,
    calls: Stack<Address>,
    memory: Vec<Val>,
    heap: Address,
    floor: Address,
    interrupts: HashMap<u16, Interrupt>,
    tracing: bool,
    state: State,
    read_cursor: usize,
    rng: StdRng,
    clock: u64,
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::new(Config::default())
    }
}

impl Runtime {
    pub fn new(config: Config) -> Runtime {
        let config = Config {
            memory_size: config.memory_size.min(MAX_POINTER + 1),
            ..config
        };
        Runtime {
            config,
            a: Val::Unset,
            b: Val::Unset,
            c: Val::Unset,
            idx: 0,
            pc: 0,
            start: None,
            stack: Stack::new(config.stack_size, "VALUE STACK"),
            calls: Stack::new(config.call_depth, "CALL STACK"),
            memory: vec![Val::Unset; config.memory_size],
            heap: config.memory_size,
            floor: 0,
            interrupts: HashMap::new(),
            tracing: false,
            state: State::Ready,
            read_cursor: 0,
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
            clock: 0,
        }
    }

    /// Return to the pristine state. Interrupt handlers stay registered.
    pub fn reset(&mut self) {
        self.a = Val::Unset;
        self.b = Val::Unset;
        self.c = Val::Unset;
        self.idx = 0;
        self.pc = 0;
        self.start = None;
        self.stack.clear();
        self.calls.clear();
        for cell in self.memory.iter_mut() {
            *cell = Val::Unset;
        }
        self.heap = self.memory.len();
        self.floor = 0;
        self.tracing = false;
        self.state = State::Ready;
        self.read_cursor = 0;
        self.rng = StdRng::seed_from_u64(DEFAULT_SEED);
        self.clock = 0;
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Force the program counter. Before the first `run` this replaces the entry point.
    pub fn jump(&mut self, addr: Address) {
        match self.state {
            State::Ready => self.start = Some(addr),
            _ => self.pc = addr,
        }
    }

    pub fn add_interrupt<F>(&mut self, id: u16, handler: F)
    where
        F: Fn(&mut Runtime) -> Result<()> + 'static,
    {
        self.interrupts.insert(id, Rc::new(handler));
    }

    pub fn set_tracing(&mut self, tracing: bool) {
        self.tracing = tracing;
    }

    pub fn is_tracing(&self) -> bool {
        self.tracing
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    pub fn pc(&self) -> Address {
        self.pc
    }

    pub fn idx(&self) -> Address {
        self.idx
    }

    pub fn heap(&self) -> Address {
        self.heap
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn register(&self, reg: Register) -> Val {
        match reg {
            Register::A => self.a,
            Register::B => self.b,
            Register::C => self.c,
        }
    }

    pub fn set_register(&mut self, reg: Register, val: Val) {
        match reg {
            Register::A => self.a = val,
            Register::B => self.b = val,
            Register::C => self.c = val,
        }
    }

    pub fn stack(&self) -> &[Val] {
        self.stack.as_slice()
    }

    pub fn push(&mut self, val: Val) -> Result<()> {
        self.stack.push(val)
    }

    pub fn pop(&mut self) -> Result<Val> {
        self.stack.pop()
    }

    pub fn call_depth(&self) -> usize {
        self.calls.len()
    }

    pub fn memory(&self) -> &[Val] {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut [Val] {
        &mut self.memory
    }

    pub fn snapshot(&self, opcode: Opcode) -> Snapshot {
        let window = self.idx.min(self.memory.len());
        let end = (window + SNAPSHOT_WINDOW).min(self.memory.len());
        Snapshot {
            opcode,
            pc: self.pc,
            stack_depth: self.stack.len(),
            a: self.a,
            b: self.b,
            c: self.c,
            idx: self.idx,
            window,
            memory: self.memory[window..end].to_vec(),
        }
    }

    /// Execute until HALT (returns true), YIELD or the budget is spent (false).
    /// An error leaves the machine faulted until [`reset`](Runtime::reset).
    pub fn run(
        &mut self,
        sysio: &mut dyn Sysio,
        program: &Program,
        cycle_budget: usize,
        mut debugger: Option<&mut dyn Debugger>,
    ) -> Result<bool> {
        match self.state {
            State::Faulted => {
                return Err(error!(InternalError; "MACHINE FAULTED; RESET REQUIRED"));
            }
            State::Ready => {
                if program.static_size() > self.memory.len() {
                    self.state = State::Faulted;
                    return Err(error!(OutOfMemory; "STATIC SEGMENT"));
                }
                self.floor = program.static_size();
                self.pc = self.start.take().unwrap_or_else(|| program.entry());
                self.state = State::Running;
            }
            State::Running => {}
        }
        let mut cycles = 0;
        while cycles < cycle_budget {
            let addr = self.pc;
            if self.tracing {
                if let Some(debugger) = debugger.as_mut() {
                    if let Ok(op) = Opcode::try_from(program.fetch(addr)) {
                        debugger.trace(&self.snapshot(op));
                    }
                }
            }
            match self.step(sysio, program, &mut cycles, cycle_budget) {
                Ok(Step::Continue) => {}
                Ok(Step::Yield) => return Ok(false),
                Ok(Step::Halt) => {
                    self.reset();
                    return Ok(true);
                }
                Err(error) => {
                    self.state = State::Faulted;
                    return Err(error.at_address(addr));
                }
            }
        }
        Ok(false)
    }

    fn cell(&self, addr: Address) -> Result<Val> {
        match self.memory.get(addr) {
            Some(val) => Ok(*val),
            None => Err(error!(MemoryFault; format!("ADDRESS {}", addr))),
        }
    }

    fn cell_mut(&mut self, addr: Address) -> Result<&mut Val> {
        match self.memory.get_mut(addr) {
            Some(val) => Ok(val),
            None => Err(error!(MemoryFault; format!("ADDRESS {}", addr))),
        }
    }

    fn indexed(&self, n: i16) -> Result<Address> {
        let addr = self.idx as i64 + n as i64;
        if addr < 0 {
            return Err(error!(MemoryFault; format!("ADDRESS {}", addr)));
        }
        Ok(addr as Address)
    }

    fn alloc(&mut self, n: usize) -> Result<()> {
        match self.heap.checked_sub(n) {
            Some(top) if top >= self.floor => {
                self.heap = top;
                self.idx = top;
                Ok(())
            }
            _ => Err(error!(OutOfMemory; "HEAP")),
        }
    }

    fn pop_2(&mut self) -> Result<(Val, Val)> {
        self.stack.pop_2()
    }

    fn unary(&mut self, f: fn(Val) -> Result<Val>) -> Result<()> {
        let val = self.stack.pop()?;
        self.stack.push(f(val)?)
    }

    fn binary(&mut self, f: fn(Val, Val) -> Result<Val>) -> Result<()> {
        let (lhs, rhs) = self.pop_2()?;
        self.stack.push(f(lhs, rhs)?)
    }

    fn relation(&mut self, f: fn(Val, Val, &[Val]) -> Result<Val>) -> Result<()> {
        let (lhs, rhs) = self.pop_2()?;
        let val = f(lhs, rhs, &self.memory)?;
        self.stack.push(val)
    }

    fn step(
        &mut self,
        sysio: &mut dyn Sysio,
        program: &Program,
        cycles: &mut usize,
        budget: usize,
    ) -> Result<Step> {
        let addr = self.pc;
        let op = Opcode::try_from(program.fetch(addr))?;
        let at = addr + 1;
        self.pc = match op.operand().width() {
            Some(width) => at + width,
            None => at + program.read_string(at).1,
        };
        *cycles += op.cost();
        self.clock += op.cost() as u64;

        use Opcode::*;
        match op {
            Nop => {}
            Halt => return Ok(Step::Halt),
            Yield => return Ok(Step::Yield),
            Trace => self.tracing = !self.tracing,
            Irq => {
                let id = program.read_short(at) as u16;
                let handler = match self.interrupts.get(&id) {
                    Some(handler) => Rc::clone(handler),
                    None => return Err(error!(IllegalFunctionCall; format!("NO INTERRUPT {}", id))),
                };
                (*handler)(self)?;
            }
            Opcode::Syscall => {
                let (call, reg) = program.read_syscall(at)?;
                if !self.syscall(sysio, call, reg, cycles, budget)? {
                    self.pc = addr;
                    return Ok(Step::Yield);
                }
            }
            Fail => {
                let n = program.read_short(at);
                return Err(match ErrorCode::from_number(n) {
                    Some(code) => Error::new(code),
                    None => error!(IllegalFunctionCall; format!("ERROR {}", n)),
                });
            }

            Push => self.stack.push(program.read_value(at))?,
            PushI => self.stack.push(Val::Integer(program.read_short(at)))?,
            PushF => self.stack.push(Val::Float(program.read_float(at)))?,
            PushP => self.stack.push(Val::Pointer(program.read_pointer(at)))?,
            Pop => {
                self.stack.pop()?;
            }
            Dup => {
                let val = self.stack.pop()?;
                self.stack.push(val)?;
                self.stack.push(val)?;
            }
            Swap => {
                let (one, two) = self.pop_2()?;
                self.stack.push(two)?;
                self.stack.push(one)?;
            }
            PushA => self.stack.push(self.a)?,
            PushB => self.stack.push(self.b)?,
            PushC => self.stack.push(self.c)?,
            PopA => self.a = self.stack.pop()?,
            PopB => self.b = self.stack.pop()?,
            PopC => self.c = self.stack.pop()?,

            Load => {
                let val = self.cell(program.read_pointer(at))?;
                self.stack.push(val)?;
            }
            Store => {
                let val = self.stack.pop()?;
                *self.cell_mut(program.read_pointer(at))? = val;
            }
            LoadI => {
                let val = self.cell(self.idx)?;
                self.stack.push(val)?;
            }
            StoreI => {
                let val = self.stack.pop()?;
                *self.cell_mut(self.idx)? = val;
            }
            LoadX => {
                let val = self.cell(self.indexed(program.read_short(at))?)?;
                self.stack.push(val)?;
            }
            StoreX => {
                let addr = self.indexed(program.read_short(at))?;
                let val = self.stack.pop()?;
                *self.cell_mut(addr)? = val;
            }
            SetIdx => self.idx = program.read_pointer(at),
            PushIdx => self.stack.push(Val::Pointer(self.idx))?,
            PopIdx => self.idx = self.stack.pop()?.as_pointer()?,
            Deref => {
                let addr = self.indexed(program.read_short(at))?;
                self.idx = self.cell(addr)?.as_pointer()?;
            }
            Alloc => {
                let n = program.read_short(at);
                if n < 0 {
                    return Err(error!(IllegalFunctionCall; "NEGATIVE ALLOC"));
                }
                self.alloc(n as usize)?;
            }
            Calloc => {
                let n = match self.stack.pop()? {
                    Val::Integer(n) if n >= 0 => n as usize,
                    Val::Float(n) if n >= 0.0 => n as usize,
                    _ => return Err(error!(IllegalFunctionCall; "BAD ALLOC")),
                };
                self.alloc(n)?;
                for cell in &mut self.memory[self.idx..self.idx + n] {
                    *cell = Val::Integer(0);
                }
            }
            Clr => {
                let n = program.read_short(at);
                for i in 0..n.max(0) {
                    *self.cell_mut(self.indexed(i)?)? = Val::Integer(0);
                }
            }
            SetS => {
                let (bytes, _) = program.read_string(at);
                for b in bytes {
                    *self.cell_mut(self.idx)? = Val::Integer(*b as i16);
                    self.idx += 1;
                }
                *self.cell_mut(self.idx)? = Val::Integer(0);
                self.idx += 1;
            }

            Add => self.binary(Operation::sum)?,
            Sub => self.binary(Operation::subtract)?,
            Mul => self.binary(Operation::multiply)?,
            Div => self.binary(Operation::divide)?,
            IDiv => self.binary(Operation::divide_int)?,
            Mod => self.binary(Operation::remainder)?,
            Exp => self.binary(Operation::power)?,
            Neg => self.unary(Operation::negate)?,
            And => self.binary(Operation::and)?,
            Or => self.binary(Operation::or)?,
            Not => self.unary(Operation::not)?,

            Eq => self.relation(Operation::equal)?,
            Ne => self.relation(Operation::not_equal)?,
            Gt => self.relation(Operation::greater)?,
            Ge => self.relation(Operation::greater_equal)?,
            Lt => self.relation(Operation::less)?,
            Le => self.relation(Operation::less_equal)?,
            Cmp => self.relation(Operation::compare)?,

            Int => self.unary(Operation::floor)?,
            Flt => self.unary(Operation::to_float)?,
            Ptr => self.unary(Operation::to_pointer)?,
            Abs => self.unary(Operation::abs)?,
            Sqr => self.unary(Operation::sqr)?,
            Sin => self.unary(Operation::sin)?,
            Cos => self.unary(Operation::cos)?,
            Tan => self.unary(Operation::tan)?,
            Atn => self.unary(Operation::atn)?,
            Log => self.unary(Operation::log)?,
            Rnd => {
                let scale = self.stack.pop()?.as_number()?;
                let n: f32 = self.rng.gen();
                self.stack.push(Val::Float(n * scale))?;
            }
            Seed => {
                let seed = self.stack.pop()?.to_bits();
                self.rng = StdRng::seed_from_u64(seed as u64);
            }
            Len => {
                let ptr = self.stack.pop()?.as_pointer()?;
                let len = Operation::string(&self.memory, ptr)?.len();
                if len > i16::MAX as usize {
                    return Err(error!(Overflow));
                }
                self.stack.push(Val::Integer(len as i16))?;
            }
            Clock => self.stack.push(Val::Float(self.clock as f32))?,

            Jmp => self.pc = program.read_short(at) as u16 as Address,
            Jz => {
                if !self.stack.pop()?.is_truthy()? {
                    self.pc = program.read_short(at) as u16 as Address;
                }
            }
            Jnz => {
                if self.stack.pop()?.is_truthy()? {
                    self.pc = program.read_short(at) as u16 as Address;
                }
            }
            Call => {
                self.calls.push(self.pc)?;
                self.pc = program.read_short(at) as u16 as Address;
            }
            Ret => {
                self.pc = match self.calls.pop() {
                    Ok(addr) => addr,
                    Err(_) => return Err(error!(ReturnWithoutGosub)),
                };
            }
        }
        Ok(Step::Continue)
    }

    fn string_at(&self, addr: Address) -> Result<String> {
        let cells = Operation::string(&self.memory, addr)?;
        Ok(cells.iter().map(|n| *n as u8 as char).collect())
    }

    /// Store `s` on the heap as a terminated string.
    fn alloc_string(&mut self, s: &str) -> Result<Address> {
        let bytes: Vec<u8> = s.bytes().filter(|b| *b != 0).collect();
        let saved = self.idx;
        self.alloc(bytes.len() + 1)?;
        let addr = self.idx;
        self.idx = saved;
        for (i, b) in bytes.iter().enumerate() {
            self.memory[addr + i] = Val::Integer(*b as i16);
        }
        self.memory[addr + bytes.len()] = Val::Integer(0);
        Ok(addr)
    }

    fn pop_byte(&mut self) -> Result<u8> {
        self.stack.pop()?.as_byte()
    }

    fn pop_coord(&mut self) -> Result<i16> {
        match self.stack.pop()? {
            Val::Integer(n) => Ok(n),
            Val::Float(n) if n >= i16::MIN as f32 && n <= i16::MAX as f32 => Ok(n as i16),
            Val::Float(_) => Err(error!(Overflow)),
            _ => Err(error!(TypeMismatch)),
        }
    }

    fn pop_u16(&mut self) -> Result<u16> {
        match self.stack.pop()? {
            Val::Integer(n) if n >= 0 => Ok(n as u16),
            Val::Float(n) if n >= 0.0 && n <= u16::MAX as f32 => Ok(n as u16),
            Val::Integer(_) | Val::Float(_) => Err(error!(IllegalFunctionCall)),
            _ => Err(error!(TypeMismatch)),
        }
    }

    /// Returns false when the call must run again on the next tick.
    fn syscall(
        &mut self,
        sysio: &mut dyn Sysio,
        call: Syscall,
        reg: Register,
        cycles: &mut usize,
        budget: usize,
    ) -> Result<bool> {
        let arg = self.register(reg);
        match call {
            Syscall::Cls => sysio.cls(),
            Syscall::Write => sysio.write(arg.as_byte()?),
            Syscall::Read => self.set_register(reg, Val::Integer(sysio.read(false) as i16)),
            Syscall::ReadKey => self.set_register(reg, Val::Integer(sysio.read(true) as i16)),
            Syscall::KeySet => {
                let down = sysio.keyset(arg.as_byte()?);
                self.set_register(reg, Val::from(down));
            }
            Syscall::Puts => sysio.puts(&self.string_at(arg.as_pointer()?)?),
            Syscall::Gets => {
                let line = sysio.gets();
                let addr = self.alloc_string(&line)?;
                self.set_register(reg, Val::Pointer(addr));
            }
            Syscall::ReadS => loop {
                let ch = sysio.read(false);
                if ch == 0 {
                    return Ok(false);
                }
                let addr = self.idx + self.read_cursor;
                if ch == b'\n' || ch == b'\r' {
                    *self.cell_mut(addr)? = Val::Integer(0);
                    self.read_cursor = 0;
                    self.set_register(reg, Val::Pointer(self.idx));
                    break;
                }
                *self.cell_mut(addr)? = Val::Integer(ch as i16);
                self.read_cursor += 1;
                *cycles += 1;
                self.clock += 1;
                if *cycles >= budget {
                    return Ok(false);
                }
            },
            Syscall::Print => {
                let text = match arg {
                    Val::Integer(n) => n.to_string(),
                    Val::Float(n) => n.to_string(),
                    Val::Pointer(addr) => self.string_at(addr)?,
                    Val::Unset => return Err(error!(TypeMismatch; "PRINT UNSET")),
                };
                sysio.puts(&text);
            }
            Syscall::Input => {
                let line = sysio.gets();
                let line = line.trim();
                let val = if let Ok(n) = line.parse::<i16>() {
                    Val::Integer(n)
                } else if let Ok(n) = line.parse::<f32>() {
                    Val::Float(n)
                } else {
                    Val::Integer(0)
                };
                self.set_register(reg, val);
            }
            Syscall::Palette => sysio.palette(arg.as_byte()?),
            Syscall::Colours => {
                let bg = self.pop_byte()?;
                let fg = self.pop_byte()?;
                sysio.set_colours(fg, bg);
            }
            Syscall::SetPixel => {
                let colour = self.pop_byte()?;
                let y = self.pop_coord()?;
                let x = self.pop_coord()?;
                sysio.set_pixel(x, y, colour);
            }
            Syscall::GetPixel => {
                let y = self.pop_coord()?;
                let x = self.pop_coord()?;
                let colour = sysio.get_pixel(x, y);
                self.set_register(reg, Val::Integer(colour as i16));
            }
            Syscall::Cursor => {
                let col = self.pop_byte()?;
                let row = self.pop_byte()?;
                sysio.set_cursor(row, col);
            }
            Syscall::Blit => {
                let len = self.pop_u16()? as usize;
                let y = self.pop_coord()?;
                let x = self.pop_coord()?;
                let start = arg.as_pointer()?;
                let cells = match self.memory.get(start..start + len) {
                    Some(cells) => cells,
                    None => return Err(error!(MemoryFault; "BLIT")),
                };
                let buffer = cells
                    .iter()
                    .map(|val| val.as_byte())
                    .collect::<Result<Vec<u8>>>()?;
                sysio.blit(x, y, &buffer);
            }
            Syscall::Sound => {
                let ms = self.pop_u16()?;
                let freq = self.pop_u16()?;
                let voice = self.pop_byte()?;
                sysio.sound(voice, freq, ms);
            }
            Syscall::Voice => {
                let release = self.pop_byte()?;
                let sustain = self.pop_byte()?;
                let decay = self.pop_byte()?;
                let attack = self.pop_byte()?;
                let volume = self.pop_byte()?;
                let waveform = self.pop_byte()?;
                let voice = self.pop_byte()?;
                sysio.voice(voice, waveform, volume, attack, decay, sustain, release);
            }
            Syscall::Line | Syscall::Box => {
                let colour = self.pop_byte()?;
                let y2 = self.pop_coord()?;
                let x2 = self.pop_coord()?;
                let y1 = self.pop_coord()?;
                let x1 = self.pop_coord()?;
                if call == Syscall::Line {
                    draw_line(sysio, (x1, y1), (x2, y2), colour);
                } else {
                    draw_line(sysio, (x1, y1), (x2, y1), colour);
                    draw_line(sysio, (x2, y1), (x2, y2), colour);
                    draw_line(sysio, (x2, y2), (x1, y2), colour);
                    draw_line(sysio, (x1, y2), (x1, y1), colour);
                }
            }
        }
        Ok(true)
    }
}

/// Bresenham, inclusive of both ends.
fn draw_line(sysio: &mut dyn Sysio, from: (i16, i16), to: (i16, i16), colour: u8) {
    let (mut x, mut y) = (from.0 as i32, from.1 as i32);
    let (x2, y2) = (to.0 as i32, to.1 as i32);
    let dx = (x2 - x).abs();
    let dy = -(y2 - y).abs();
    let sx = if x < x2 { 1 } else { -1 };
    let sy = if y < y2 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        sysio.set_pixel(x as i16, y as i16, colour);
        if x == x2 && y == y2 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}
