use super::Address;
use crate::error;
use crate::lang::Error;
use std::convert::TryFrom;

type Result<T> = std::result::Result<T, Error>;

/// ## Tagged machine word
///
/// Every memory cell, register and stack slot holds one `Val`.
/// In memory it is a plain enum; in bytecode it is packed into
/// four bytes by hiding the tag inside the negative quiet-NaN space
/// of an `f32`:
///
/// ```text
/// Float    any non-NaN f32 bits; every NaN becomes 7FC0_0000
/// Integer  FFC0_0000 | i16 as u16
/// Pointer  FFE0_0000 | 21-bit address
/// Unset    FFDF_FFFF
/// ```
///
/// Floats whose bits already fall in FFC0_0000..=FFFF_FFFF (negative
/// quiet NaNs with a payload) cannot be represented and decode as NaN.
/// A "byte" is an Integer in 0..=255, not a separate tag.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Val {
    Unset,
    Integer(i16),
    Float(f32),
    Pointer(Address),
}

impl Default for Val {
    fn default() -> Val {
        Val::Unset
    }
}

const CANONICAL_NAN: u32 = 0x7FC0_0000;
const TAG_MASK: u32 = 0xFFE0_0000;
const INT_TAG: u32 = 0xFFC0_0000;
const PTR_TAG: u32 = 0xFFE0_0000;
const INT_SPARE: u32 = 0x001F_0000;
const UNSET_BITS: u32 = 0xFFDF_FFFF;

/// Largest address a Pointer can carry through the packed encoding.
pub const MAX_POINTER: Address = 0x1F_FFFF;

impl Val {
    pub fn from_int(n: i16) -> Val {
        Val::Integer(n)
    }

    pub fn from_float(n: f32) -> Val {
        Val::Float(n)
    }

    pub fn from_pointer(addr: Address) -> Val {
        Val::Pointer(addr)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Val::Integer(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Val::Float(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Val::Pointer(_))
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Val::Unset)
    }

    pub fn as_int(&self) -> Result<i16> {
        match self {
            Val::Integer(n) => Ok(*n),
            _ => Err(error!(TypeMismatch; "EXPECTED INTEGER")),
        }
    }

    pub fn as_float(&self) -> Result<f32> {
        match self {
            Val::Float(n) => Ok(*n),
            _ => Err(error!(TypeMismatch; "EXPECTED FLOAT")),
        }
    }

    pub fn as_pointer(&self) -> Result<Address> {
        match self {
            Val::Pointer(addr) => Ok(*addr),
            _ => Err(error!(TypeMismatch; "EXPECTED POINTER")),
        }
    }

    /// Integer or Float widened to f32; used by the maths built-ins.
    pub fn as_number(&self) -> Result<f32> {
        match self {
            Val::Integer(n) => Ok(*n as f32),
            Val::Float(n) => Ok(*n),
            _ => Err(error!(TypeMismatch; "EXPECTED NUMBER")),
        }
    }

    /// Byte convention: an Integer in 0..=255. Floats are truncated first
    /// so that BASIC arguments like `COLOR 2.0` behave.
    pub fn as_byte(&self) -> Result<u8> {
        let n = match self {
            Val::Integer(n) => *n as i32,
            Val::Float(n) => *n as i32,
            _ => return Err(error!(TypeMismatch; "EXPECTED BYTE")),
        };
        u8::try_from(n).map_err(|_| error!(IllegalFunctionCall; "BYTE OUT OF RANGE"))
    }

    pub fn is_truthy(&self) -> Result<bool> {
        match self {
            Val::Integer(n) => Ok(*n != 0),
            Val::Float(n) => Ok(*n != 0.0),
            _ => Err(error!(TypeMismatch; "EXPECTED NUMBER")),
        }
    }

    pub fn to_bits(&self) -> u32 {
        match self {
            Val::Unset => UNSET_BITS,
            Val::Integer(n) => INT_TAG | (*n as u16 as u32),
            Val::Float(n) => {
                if n.is_nan() {
                    CANONICAL_NAN
                } else {
                    n.to_bits()
                }
            }
            Val::Pointer(addr) => PTR_TAG | (*addr as u32 & MAX_POINTER as u32),
        }
    }

    pub fn from_bits(bits: u32) -> Val {
        if bits == UNSET_BITS {
            return Val::Unset;
        }
        match bits & TAG_MASK {
            PTR_TAG => Val::Pointer((bits & MAX_POINTER as u32) as Address),
            INT_TAG if bits & INT_SPARE == 0 => Val::Integer(bits as u16 as i16),
            INT_TAG => Val::Float(f32::NAN),
            _ => Val::Float(f32::from_bits(bits)),
        }
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Val {
        Val::Integer(if b { 1 } else { 0 })
    }
}

impl std::fmt::Display for Val {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Val::Unset => write!(f, "UNSET"),
            Val::Integer(n) => write!(f, "{}", n),
            Val::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Val::Pointer(addr) => write!(f, "@{}", addr),
        }
    }
}
