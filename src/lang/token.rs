use super::builtin::Builtin;
use std::collections::HashMap;

thread_local!(
    static STRING_TO_TOKEN: HashMap<&'static str, Token> = Word::ALL
        .iter()
        .map(|w| (w.name(), Token::Word(*w)))
        .chain(
            Operator::WORDS
                .iter()
                .map(|op| (op.name(), Token::Operator(*op))),
        )
        .chain(Builtin::ALL.iter().map(|b| (b.name(), Token::Builtin(*b))))
        .chain(std::iter::once(("INKEY$", Token::Builtin(Builtin::Inkey))))
        .collect();
);

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Integer(i16),
    Float(f32),
    String(String),
    /// Case is preserved; a trailing `$` is part of the name.
    Ident(String),
    Word(Word),
    Operator(Operator),
    Builtin(Builtin),
    LParen,
    RParen,
    Comma,
    Colon,
    Semicolon,
}

impl Token {
    /// Keyword lookup; `s` must already be uppercase.
    pub fn from_keyword(s: &str) -> Option<Token> {
        STRING_TO_TOKEN.with(|stt| stt.get(s).cloned())
    }

    /// Left binding power for the expression parser. Zero ends an expression.
    pub fn lbp(&self) -> u8 {
        match self {
            Token::Operator(op) => op.lbp(),
            _ => 0,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Token::*;
        match self {
            Integer(n) => write!(f, "{}", n),
            Float(n) => write!(f, "{:?}", n),
            String(s) => write!(f, "{:?}", s),
            Ident(s) => write!(f, "{}", s),
            Word(w) => write!(f, "{}", w.name()),
            Operator(op) => write!(f, "{}", op.name()),
            Builtin(b) => write!(f, "{}", b.name()),
            LParen => write!(f, "("),
            RParen => write!(f, ")"),
            Comma => write!(f, ","),
            Colon => write!(f, ":"),
            Semicolon => write!(f, ";"),
        }
    }
}

macro_rules! words {
    ($($name:ident => $s:literal,)*) => {
        #[derive(Debug, PartialEq, Eq, Clone, Copy)]
        pub enum Word {
            $($name,)*
        }

        impl Word {
            pub const ALL: &'static [Word] = &[$(Word::$name,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Word::$name => $s,)*
                }
            }
        }
    };
}

words! {
    Beep => "BEEP",
    Cls => "CLS",
    Color => "COLOR",
    Data => "DATA",
    Def => "DEF",
    Dim => "DIM",
    Else => "ELSE",
    End => "END",
    Fn => "FN",
    For => "FOR",
    Gosub => "GOSUB",
    Goto => "GOTO",
    If => "IF",
    Input => "INPUT",
    Let => "LET",
    Line => "LINE",
    Locate => "LOCATE",
    Next => "NEXT",
    On => "ON",
    Poke => "POKE",
    Print => "PRINT",
    Pset => "PSET",
    Put => "PUT",
    Randomize => "RANDOMIZE",
    Read => "READ",
    Rem => "REM",
    Restore => "RESTORE",
    Return => "RETURN",
    Sound => "SOUND",
    Step => "STEP",
    Swap => "SWAP",
    Then => "THEN",
    To => "TO",
    Voice => "VOICE",
    Wait => "WAIT",
    Wend => "WEND",
    While => "WHILE",
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Operator {
    Caret,
    Multiply,
    Divide,
    DivideInt,
    Modulus,
    Plus,
    Minus,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Not,
    And,
    Or,
}

pub const BP_OR: u8 = 10;
pub const BP_AND: u8 = 20;
pub const BP_EQUALITY: u8 = 30;
pub const BP_COMPARISON: u8 = 40;
pub const BP_TERM: u8 = 50;
pub const BP_FACTOR: u8 = 60;
pub const BP_POWER: u8 = 70;

impl Operator {
    /// Operators spelled as words.
    pub const WORDS: &'static [Operator] =
        &[Operator::Modulus, Operator::Not, Operator::And, Operator::Or];

    pub fn lbp(self) -> u8 {
        use Operator::*;
        match self {
            Or => BP_OR,
            And => BP_AND,
            Equal | NotEqual => BP_EQUALITY,
            Less | LessEqual | Greater | GreaterEqual => BP_COMPARISON,
            Plus | Minus => BP_TERM,
            Multiply | Divide | DivideInt | Modulus => BP_FACTOR,
            Caret => BP_POWER,
            Not => 0,
        }
    }

    pub fn name(self) -> &'static str {
        use Operator::*;
        match self {
            Caret => "^",
            Multiply => "*",
            Divide => "/",
            DivideInt => "\\",
            Modulus => "MOD",
            Plus => "+",
            Minus => "-",
            Equal => "=",
            NotEqual => "<>",
            Less => "<",
            LessEqual => "<=",
            Greater => ">",
            GreaterEqual => ">=",
            Not => "NOT",
            And => "AND",
            Or => "OR",
        }
    }
}
