use super::token::AsmToken;
use crate::error;
use crate::lang::Error;
use crate::mach::{Instruction, Opcode, Operand, OperandKind, Register, Syscall, Val, MAX_POINTER};
use std::convert::TryFrom;

type Result<T> = std::result::Result<T, Error>;

const COMMENT_CHAR: char = ';';
const LABEL_SUFFIX: char = ':';

/// Parse one line of assembly. A line holds any number of labels
/// followed by at most one instruction or directive.
pub fn parse_line(line: &str) -> Result<Vec<AsmToken>> {
    let pieces = AsmLexer {
        chars: line.chars().peekable(),
    }
    .collect::<Result<Vec<Piece>>>()?;
    let mut pieces = pieces.into_iter().peekable();
    let mut tokens = vec![];
    while let Some(Piece::Word(word)) = pieces.peek() {
        if !word.ends_with(LABEL_SUFFIX) {
            break;
        }
        let name = &word[..word.len() - 1];
        if !is_label(name) {
            return Err(error!(SyntaxError; format!("BAD LABEL {}", word)));
        }
        tokens.push(AsmToken::Label(name.to_string()));
        pieces.next();
    }
    let word = match pieces.next() {
        None => return Ok(tokens),
        Some(Piece::Word(word)) => word,
        Some(piece) => return Err(error!(SyntaxError; format!("UNEXPECTED {}", piece))),
    };
    let operands: Vec<Piece> = pieces.collect();
    let token = match word.as_str() {
        ".entry" | ".ENTRY" => match operands.as_slice() {
            [Piece::Word(label)] if is_label(label) => AsmToken::Entry(label.clone()),
            _ => return Err(error!(SyntaxError; "EXPECTED .entry LABEL")),
        },
        ".static" | ".STATIC" => match operands.as_slice() {
            [Piece::Word(n)] => match n.parse::<usize>() {
                Ok(n) if n <= MAX_POINTER + 1 => AsmToken::Static(n),
                _ => return Err(error!(SyntaxError; format!("BAD SIZE {}", n))),
            },
            _ => return Err(error!(SyntaxError; "EXPECTED .static CELLS")),
        },
        _ => {
            let opcode = match Opcode::from_mnemonic(&word.to_ascii_uppercase()) {
                Some(opcode) => opcode,
                None => return Err(error!(UnknownMnemonic; word)),
            };
            instruction(opcode, &operands)?
        }
    };
    tokens.push(token);
    Ok(tokens)
}

fn instruction(opcode: Opcode, operands: &[Piece]) -> Result<AsmToken> {
    let operand = match (opcode.operand(), operands) {
        (OperandKind::None, []) => Operand::None,
        (OperandKind::Short, [Piece::Word(s)]) => match s.parse::<i16>() {
            Ok(n) => Operand::Short(n),
            Err(_) if is_label(s) => return Ok(AsmToken::Jump(opcode, s.clone())),
            Err(_) => return Err(error!(SyntaxError; format!("BAD SHORT {}", s))),
        },
        (OperandKind::Float, [Piece::Word(s)]) => match s.parse::<f32>() {
            Ok(n) => Operand::Float(n),
            Err(_) => return Err(error!(SyntaxError; format!("BAD FLOAT {}", s))),
        },
        (OperandKind::Pointer, [Piece::Word(s)]) => Operand::Pointer(pointer(s)?),
        (OperandKind::Value, [Piece::Word(s)]) => Operand::Value(value(s)?),
        (OperandKind::Syscall, [Piece::Word(call), Piece::Comma, Piece::Word(reg)]) => {
            Operand::Syscall(syscall(call)?, register(reg)?)
        }
        (OperandKind::String, [Piece::Text(s)]) => Operand::String(s.clone()),
        (_, []) => return Err(error!(SyntaxError; format!("{} NEEDS AN OPERAND", opcode))),
        (_, pieces) => {
            let text: Vec<String> = pieces.iter().map(|p| p.to_string()).collect();
            return Err(error!(SyntaxError; format!("BAD OPERAND {}", text.join(" "))));
        }
    };
    Ok(AsmToken::Instruction(Instruction { opcode, operand }))
}

fn is_label(s: &str) -> bool {
    match s.chars().next() {
        Some(ch) if ch.is_ascii_alphabetic() || ch == '_' || ch == '.' => s
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "_.$:".contains(ch)),
        _ => false,
    }
}

fn pointer(s: &str) -> Result<usize> {
    let digits = s.strip_prefix('@').unwrap_or(s);
    match digits.parse::<usize>() {
        Ok(n) if n <= MAX_POINTER => Ok(n),
        _ => Err(error!(SyntaxError; format!("BAD POINTER {}", s))),
    }
}

/// `42`, `1.5`, `@100` or `UNSET`.
fn value(s: &str) -> Result<Val> {
    if s.eq_ignore_ascii_case("UNSET") {
        return Ok(Val::Unset);
    }
    if s.starts_with('@') {
        return Ok(Val::Pointer(pointer(s)?));
    }
    if let Ok(n) = s.parse::<i16>() {
        return Ok(Val::Integer(n));
    }
    let looks_float = s.contains(|c: char| c == '.' || c == 'e' || c == 'E') || s.contains("inf");
    match s.parse::<f32>() {
        Ok(n) if looks_float && !n.is_nan() => Ok(Val::Float(n)),
        _ => Err(error!(SyntaxError; format!("BAD VALUE {}", s))),
    }
}

fn syscall(s: &str) -> Result<Syscall> {
    if let Ok(n) = s.parse::<u16>() {
        return Syscall::try_from(n);
    }
    match Syscall::from_name(&s.to_ascii_uppercase()) {
        Some(call) => Ok(call),
        None => Err(error!(SyntaxError; format!("BAD SYSCALL {}", s))),
    }
}

fn register(s: &str) -> Result<Register> {
    match Register::from_name(&s.to_ascii_uppercase()) {
        Some(reg) => Ok(reg),
        None => Err(error!(SyntaxError; format!("BAD REGISTER {}", s))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Word(String),
    Text(String),
    Comma,
}

impl std::fmt::Display for Piece {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Piece::Word(s) => write!(f, "{}", s),
            Piece::Text(s) => write!(f, "{:?}", s),
            Piece::Comma => write!(f, ","),
        }
    }
}

struct AsmLexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> AsmLexer<'a> {
    fn word(&mut self) -> String {
        let mut s = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch.is_whitespace() || ch == ',' || ch == '"' || ch == COMMENT_CHAR {
                break;
            }
            s.push(ch);
            self.chars.next();
        }
        s
    }

    fn text(&mut self) -> Result<String> {
        let mut s = String::new();
        self.chars.next();
        loop {
            match self.chars.next() {
                Some('"') => return Ok(s),
                Some('\\') => s.push(self.escape()?),
                Some(ch) => s.push(ch),
                None => return Err(error!(SyntaxError; "UNTERMINATED STRING")),
            }
        }
    }

    fn escape(&mut self) -> Result<char> {
        match self.chars.next() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('\\') => Ok('\\'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('u') => {
                let mut hex = String::new();
                if self.chars.next() != Some('{') {
                    return Err(error!(SyntaxError; "BAD ESCAPE"));
                }
                loop {
                    match self.chars.next() {
                        Some('}') => break,
                        Some(ch) => hex.push(ch),
                        None => return Err(error!(SyntaxError; "BAD ESCAPE")),
                    }
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(std::char::from_u32)
                    .ok_or_else(|| error!(SyntaxError; format!("BAD ESCAPE \\u{{{}}}", hex)))
            }
            Some(ch) => Err(error!(SyntaxError; format!("BAD ESCAPE \\{}", ch))),
            None => Err(error!(SyntaxError; "BAD ESCAPE")),
        }
    }
}

impl<'a> Iterator for AsmLexer<'a> {
    type Item = Result<Piece>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.chars.next();
        }
        match *self.chars.peek()? {
            COMMENT_CHAR => None,
            ',' => {
                self.chars.next();
                Some(Ok(Piece::Comma))
            }
            '"' => Some(self.text().map(Piece::Text)),
            _ => Some(Ok(Piece::Word(self.word()))),
        }
    }
}
