#![allow(dead_code)]
use basic::lang::{compile, Error, ErrorCode};
use basic::mach::{Program, Runtime, Sysio};
use std::collections::{HashMap, VecDeque};

const MAX_SLICES: usize = 100_000;

/// Host that records everything a program does.
#[derive(Debug, Default)]
pub struct Recorder {
    pub output: String,
    pub lines: VecDeque<String>,
    pub keys: VecDeque<u8>,
    pub held: Vec<u8>,
    pub pixels: HashMap<(i16, i16), u8>,
    pub colours: Option<(u8, u8)>,
    pub cursor: Option<(u8, u8)>,
    pub palette: Option<u8>,
    pub sounds: Vec<(u8, u16, u16)>,
    pub voices: Vec<[u8; 7]>,
    pub blits: Vec<(i16, i16, Vec<u8>)>,
    pub cleared: usize,
}

impl Recorder {
    pub fn with_lines(lines: &[&str]) -> Recorder {
        Recorder {
            lines: lines.iter().map(|s| s.to_string()).collect(),
            ..Recorder::default()
        }
    }

    pub fn with_keys(keys: &str) -> Recorder {
        Recorder {
            keys: keys.bytes().collect(),
            ..Recorder::default()
        }
    }
}

impl Sysio for Recorder {
    fn cls(&mut self) {
        self.cleared += 1;
    }
    fn write(&mut self, byte: u8) {
        self.output.push(byte as char);
    }
    fn read(&mut self, noecho: bool) -> u8 {
        match self.keys.pop_front() {
            Some(byte) => {
                if !noecho {
                    self.output.push(byte as char);
                }
                byte
            }
            None => 0,
        }
    }
    fn keyset(&mut self, key: u8) -> bool {
        self.held.contains(&key)
    }
    fn puts(&mut self, s: &str) {
        self.output.push_str(s);
    }
    fn gets(&mut self) -> String {
        self.lines.pop_front().unwrap_or_default()
    }
    fn palette(&mut self, id: u8) {
        self.palette = Some(id);
    }
    fn set_colours(&mut self, fg: u8, bg: u8) {
        self.colours = Some((fg, bg));
    }
    fn set_pixel(&mut self, x: i16, y: i16, colour: u8) {
        self.pixels.insert((x, y), colour);
    }
    fn get_pixel(&mut self, x: i16, y: i16) -> u8 {
        self.pixels.get(&(x, y)).copied().unwrap_or(0)
    }
    fn set_cursor(&mut self, row: u8, col: u8) {
        self.cursor = Some((row, col));
    }
    fn blit(&mut self, x: i16, y: i16, buffer: &[u8]) {
        self.blits.push((x, y, buffer.to_vec()));
    }
    fn sound(&mut self, voice: u8, frequency: u16, duration_ms: u16) {
        self.sounds.push((voice, frequency, duration_ms));
    }
    fn voice(
        &mut self,
        voice: u8,
        waveform: u8,
        volume: u8,
        attack: u8,
        decay: u8,
        sustain: u8,
        release: u8,
    ) {
        self.voices
            .push([voice, waveform, volume, attack, decay, sustain, release]);
    }
}

/// Run to HALT in slices of `cycles`.
pub fn run_program(program: &Program, sysio: &mut Recorder, cycles: usize) -> Result<(), Error> {
    let mut runtime = Runtime::default();
    for _ in 0..MAX_SLICES {
        if runtime.run(sysio, program, cycles, None)? {
            return Ok(());
        }
    }
    Err(Error::new(ErrorCode::InternalError).message("NEVER HALTED"))
}

pub fn exec_with(source: &str, sysio: &mut Recorder, cycles: usize) -> Result<(), Error> {
    let program = compile(source)?;
    run_program(&program, sysio, cycles)
}

/// Output of a BASIC program, with any error appended on its own line.
pub fn exec(source: &str) -> String {
    exec_n(source, 5000)
}

pub fn exec_n(source: &str, cycles: usize) -> String {
    let mut recorder = Recorder::default();
    if let Err(error) = exec_with(source, &mut recorder, cycles) {
        recorder.output.push_str(&format!("{}\n", error));
    }
    recorder.output
}

/// Error code a BASIC program stops with, compile time or run time.
pub fn fails(source: &str) -> ErrorCode {
    let mut recorder = Recorder::default();
    match exec_with(source, &mut recorder, 5000) {
        Ok(()) => panic!("program ran cleanly: {:?}", recorder.output),
        Err(error) => error.code(),
    }
}
