use crate::mach::Address;

pub struct Error {
    code: ErrorCode,
    line_number: Option<usize>,
    address: Option<Address>,
    message: String,
}

#[doc(hidden)]
#[macro_export]
macro_rules! error {
    ($err:ident) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
    };
    ($err:ident; $msg:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err).message($msg)
    };
    ($err:ident, $line:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err).in_line_number($line)
    };
    ($err:ident, $line:expr; $msg:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
            .in_line_number($line)
            .message($msg)
    };
}

impl Error {
    pub fn new(code: ErrorCode) -> Error {
        Error {
            code,
            line_number: None,
            address: None,
            message: String::new(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn line_number(&self) -> Option<usize> {
        self.line_number
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    pub fn in_line_number(self, line: usize) -> Error {
        Error {
            line_number: self.line_number.or(Some(line)),
            ..self
        }
    }

    pub fn at_address(self, addr: Address) -> Error {
        Error {
            address: self.address.or(Some(addr)),
            ..self
        }
    }

    pub fn message<S: Into<String>>(self, message: S) -> Error {
        debug_assert!(self.message.is_empty());
        Error {
            message: message.into(),
            ..self
        }
    }
}

/// Error numbers follow the classic BASIC table where one exists.
/// Codes from 70 up belong to the bytecode machine and the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NextWithoutFor = 1,
    SyntaxError = 2,
    ReturnWithoutGosub = 3,
    OutOfData = 4,
    IllegalFunctionCall = 5,
    Overflow = 6,
    OutOfMemory = 7,
    UndefinedLine = 8,
    SubscriptOutOfRange = 9,
    RedimensionedArray = 10,
    DivisionByZero = 11,
    TypeMismatch = 13,
    UndefinedUserFunction = 18,
    ForWithoutNext = 26,
    WhileWithoutWend = 29,
    WendWithoutWhile = 30,
    InternalError = 51,
    UndefinedVariable = 70,
    UnknownMnemonic = 71,
    UndefinedLabel = 72,
    UnknownOpcode = 73,
    StackUnderflow = 74,
    StackOverflow = 75,
    MemoryFault = 76,
    BadImage = 77,
}

impl ErrorCode {
    /// Used by the `FAIL` opcode, which carries a raw error number.
    pub fn from_number(n: i16) -> Option<ErrorCode> {
        use ErrorCode::*;
        Some(match n {
            1 => NextWithoutFor,
            2 => SyntaxError,
            3 => ReturnWithoutGosub,
            4 => OutOfData,
            5 => IllegalFunctionCall,
            6 => Overflow,
            7 => OutOfMemory,
            8 => UndefinedLine,
            9 => SubscriptOutOfRange,
            10 => RedimensionedArray,
            11 => DivisionByZero,
            13 => TypeMismatch,
            18 => UndefinedUserFunction,
            26 => ForWithoutNext,
            29 => WhileWithoutWend,
            30 => WendWithoutWhile,
            51 => InternalError,
            70 => UndefinedVariable,
            71 => UnknownMnemonic,
            72 => UndefinedLabel,
            73 => UnknownOpcode,
            74 => StackUnderflow,
            75 => StackOverflow,
            76 => MemoryFault,
            77 => BadImage,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use ErrorCode::*;
        let s = match self {
            NextWithoutFor => "NEXT WITHOUT FOR",
            SyntaxError => "SYNTAX ERROR",
            ReturnWithoutGosub => "RETURN WITHOUT GOSUB",
            OutOfData => "OUT OF DATA",
            IllegalFunctionCall => "ILLEGAL FUNCTION CALL",
            Overflow => "OVERFLOW",
            OutOfMemory => "OUT OF MEMORY",
            UndefinedLine => "UNDEFINED LINE",
            SubscriptOutOfRange => "SUBSCRIPT OUT OF RANGE",
            RedimensionedArray => "REDIMENSIONED ARRAY",
            DivisionByZero => "DIVISION BY ZERO",
            TypeMismatch => "TYPE MISMATCH",
            UndefinedUserFunction => "UNDEFINED USER FUNCTION",
            ForWithoutNext => "FOR WITHOUT NEXT",
            WhileWithoutWend => "WHILE WITHOUT WEND",
            WendWithoutWhile => "WEND WITHOUT WHILE",
            InternalError => "INTERNAL ERROR",
            UndefinedVariable => "UNDEFINED VARIABLE",
            UnknownMnemonic => "UNKNOWN MNEMONIC",
            UndefinedLabel => "UNDEFINED LABEL",
            UnknownOpcode => "UNKNOWN OPCODE",
            StackUnderflow => "STACK UNDERFLOW",
            StackOverflow => "STACK OVERFLOW",
            MemoryFault => "MEMORY FAULT",
            BadImage => "BAD IMAGE",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error {{ {} }}", self.to_string())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut suffix = String::new();
        if let Some(line_number) = self.line_number {
            suffix.push_str(&format!(" IN {}", line_number));
        }
        if let Some(address) = self.address {
            suffix.push_str(&format!(" AT {:04X}", address));
        }
        if !self.message.is_empty() {
            suffix.push_str(&format!("; {}", self.message));
        }
        write!(f, "{}{}", self.code, suffix)
    }
}

impl std::error::Error for Error {}
