use basic::mach::Sysio;
use mortal::{Color, Event, Key, PrepareConfig, PrepareState, Terminal};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const COLOURS: [Color; 8] = [
    Color::Black,
    Color::Blue,
    Color::Green,
    Color::Cyan,
    Color::Red,
    Color::Magenta,
    Color::Yellow,
    Color::White,
];

/// Host for a running program on the attached terminal.
///
/// The terminal is in raw mode while a `Console` exists. Ctrl-C arrives
/// as a key and raises the shared interrupt flag. Pixels are kept in
/// memory since a text terminal has nowhere to draw them. The first
/// terminal error is held until the next `poll`.
pub struct Console {
    terminal: Terminal,
    state: Option<PrepareState>,
    keys: VecDeque<u8>,
    interrupted: Arc<AtomicBool>,
    pixels: HashMap<(i16, i16), u8>,
    palette: u8,
    error: Option<io::Error>,
}

impl Console {
    pub fn new(interrupted: Arc<AtomicBool>) -> io::Result<Console> {
        let terminal = Terminal::new()?;
        let state = terminal.prepare(PrepareConfig::default())?;
        Ok(Console {
            terminal,
            state: Some(state),
            keys: VecDeque::new(),
            interrupted,
            pixels: HashMap::new(),
            palette: 0,
            error: None,
        })
    }

    /// Drain pending terminal events without blocking and report the
    /// first terminal error since the last poll.
    pub fn poll(&mut self) -> io::Result<()> {
        self.drain();
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn drain(&mut self) {
        loop {
            match self.terminal.read_event(Some(Duration::from_millis(0))) {
                Ok(Some(event)) => self.event(event),
                Ok(None) => break,
                Err(error) => {
                    self.record(Err(error));
                    break;
                }
            }
        }
    }

    fn record(&mut self, result: io::Result<()>) {
        if let Err(error) = result {
            if self.error.is_none() {
                self.error = Some(error);
            }
        }
    }

    fn event(&mut self, event: Event) {
        match event {
            Event::Key(Key::Ctrl('c')) => self.interrupted.store(true, Ordering::SeqCst),
            Event::Key(key) => {
                if let Some(byte) = key_byte(key) {
                    self.keys.push_back(byte);
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, s: &str) {
        let result = self.terminal.write_str(&s.replace('\n', "\r\n"));
        self.record(result);
    }

    /// Home the cursor with relative moves, then step down and across.
    fn move_to(&self, line: usize, column: usize) -> io::Result<()> {
        let size = self.terminal.size()?;
        self.terminal.move_to_first_column()?;
        self.terminal.move_up(size.lines)?;
        self.terminal.move_down(line.min(size.lines.saturating_sub(1)))?;
        self.terminal.move_right(column.min(size.columns.saturating_sub(1)))
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            if let Err(error) = self.terminal.restore(state) {
                eprintln!("{}", error);
            }
        }
    }
}

fn key_byte(key: Key) -> Option<u8> {
    match key {
        Key::Char(ch) if ch.is_ascii() => Some(ch as u8),
        Key::Enter => Some(b'\n'),
        Key::Tab => Some(b'\t'),
        Key::Backspace => Some(8),
        Key::Escape => Some(27),
        _ => None,
    }
}

fn colour(n: u8) -> Color {
    COLOURS[(n % 8) as usize]
}

impl Sysio for Console {
    fn cls(&mut self) {
        let result = self.terminal.clear_screen();
        self.record(result);
        self.pixels.clear();
    }

    fn write(&mut self, byte: u8) {
        self.text(&(byte as char).to_string());
    }

    fn read(&mut self, noecho: bool) -> u8 {
        self.drain();
        match self.keys.pop_front() {
            Some(byte) => {
                if !noecho {
                    self.write(byte);
                }
                byte
            }
            None => 0,
        }
    }

    fn keyset(&mut self, key: u8) -> bool {
        self.drain();
        self.keys.contains(&key)
    }

    fn puts(&mut self, s: &str) {
        self.text(s);
    }

    fn gets(&mut self) -> String {
        let mut line = String::new();
        loop {
            if self.interrupted.load(Ordering::SeqCst) {
                break;
            }
            let byte = match self.keys.pop_front() {
                Some(byte) => byte,
                None => {
                    match self.terminal.read_event(None) {
                        Ok(Some(event)) => self.event(event),
                        Ok(None) => {}
                        Err(error) => {
                            self.record(Err(error));
                            break;
                        }
                    }
                    continue;
                }
            };
            match byte {
                b'\n' | b'\r' => {
                    self.text("\n");
                    break;
                }
                8 | 127 => {
                    if line.pop().is_some() {
                        self.text("\x08 \x08");
                    }
                }
                32..=126 => {
                    line.push(byte as char);
                    self.write(byte);
                }
                _ => {}
            }
        }
        line
    }

    fn palette(&mut self, id: u8) {
        self.palette = id;
    }

    fn set_colours(&mut self, fg: u8, bg: u8) {
        let result = self
            .terminal
            .set_fg(colour(fg))
            .and_then(|_| self.terminal.set_bg(colour(bg)));
        self.record(result);
    }

    fn set_pixel(&mut self, x: i16, y: i16, colour: u8) {
        self.pixels.insert((x, y), colour);
    }

    fn get_pixel(&mut self, x: i16, y: i16) -> u8 {
        self.pixels.get(&(x, y)).copied().unwrap_or(0)
    }

    fn set_cursor(&mut self, row: u8, col: u8) {
        let result = self.move_to(row as usize, col as usize);
        self.record(result);
    }

    fn blit(&mut self, x: i16, y: i16, buffer: &[u8]) {
        for (i, colour) in buffer.iter().enumerate() {
            if let Some(x) = x.checked_add(i as i16) {
                self.pixels.insert((x, y), *colour);
            }
        }
    }

    fn sound(&mut self, _voice: u8, _frequency: u16, _duration_ms: u16) {
        self.text("\x07");
    }

    fn voice(
        &mut self,
        _voice: u8,
        _waveform: u8,
        _volume: u8,
        _attack: u8,
        _decay: u8,
        _sustain: u8,
        _release: u8,
    ) {
    }
}
