use super::{Address, Val, MAX_POINTER};
use crate::error;
use crate::lang::Error;
use std::cmp::Ordering;

type Result<T> = std::result::Result<T, Error>;

/// ## Arithmetic and comparison
///
/// Integer results that leave the 16-bit range become Float for
/// ADD, SUB, MUL, EXP and NEG. IDIV overflow is an error.

pub struct Operation {}

/// Integer result, or Float when it does not fit.
fn promote(n: i32) -> Val {
    if n >= i16::MIN as i32 && n <= i16::MAX as i32 {
        Val::Integer(n as i16)
    } else {
        Val::Float(n as f32)
    }
}

fn offset(addr: Address, n: i32) -> Result<Val> {
    let target = addr as i64 + n as i64;
    if target < 0 || target > MAX_POINTER as i64 {
        Err(error!(MemoryFault; "POINTER ARITHMETIC"))
    } else {
        Ok(Val::Pointer(target as Address))
    }
}

fn to_i16(n: f32) -> Result<i16> {
    let n = n.trunc();
    if n >= i16::MIN as f32 && n <= i16::MAX as f32 {
        Ok(n as i16)
    } else {
        Err(error!(Overflow))
    }
}

fn logical(val: Val) -> Result<i16> {
    match val {
        Val::Integer(n) => Ok(n),
        Val::Float(n) => to_i16(n),
        _ => Err(error!(TypeMismatch)),
    }
}

fn bool_val(b: bool) -> Result<Val> {
    Ok(Val::from(b))
}

impl Operation {
    pub fn negate(val: Val) -> Result<Val> {
        use Val::*;
        match val {
            Integer(n) => Ok(promote(-(n as i32))),
            Float(n) => Ok(Float(-n)),
            _ => Err(error!(TypeMismatch)),
        }
    }

    pub fn sum(lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        match (lhs, rhs) {
            (Integer(l), Integer(r)) => Ok(promote(l as i32 + r as i32)),
            (Integer(l), Float(r)) => Ok(Float(l as f32 + r)),
            (Float(l), Integer(r)) => Ok(Float(l + r as f32)),
            (Float(l), Float(r)) => Ok(Float(l + r)),
            (Pointer(p), Integer(n)) | (Integer(n), Pointer(p)) => offset(p, n as i32),
            _ => Err(error!(TypeMismatch)),
        }
    }

    pub fn subtract(lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        match (lhs, rhs) {
            (Integer(l), Integer(r)) => Ok(promote(l as i32 - r as i32)),
            (Integer(l), Float(r)) => Ok(Float(l as f32 - r)),
            (Float(l), Integer(r)) => Ok(Float(l - r as f32)),
            (Float(l), Float(r)) => Ok(Float(l - r)),
            (Pointer(p), Integer(n)) => offset(p, -(n as i32)),
            _ => Err(error!(TypeMismatch)),
        }
    }

    pub fn multiply(lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        match (lhs, rhs) {
            (Integer(l), Integer(r)) => Ok(promote(l as i32 * r as i32)),
            (Integer(l), Float(r)) => Ok(Float(l as f32 * r)),
            (Float(l), Integer(r)) => Ok(Float(l * r as f32)),
            (Float(l), Float(r)) => Ok(Float(l * r)),
            _ => Err(error!(TypeMismatch)),
        }
    }

    /// Always Float; division by zero gives an infinity or NaN.
    pub fn divide(lhs: Val, rhs: Val) -> Result<Val> {
        Ok(Val::Float(lhs.as_number()? / rhs.as_number()?))
    }

    pub fn divide_int(lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        match (lhs, rhs) {
            (Integer(l), Integer(r)) => match l.checked_div(r) {
                Some(i) => Ok(Integer(i)),
                None => {
                    if r == 0 {
                        Err(error!(DivisionByZero))
                    } else {
                        Err(error!(Overflow))
                    }
                }
            },
            _ => {
                let l = lhs.as_number()?.trunc();
                let r = rhs.as_number()?.trunc();
                if r == 0.0 {
                    return Err(error!(DivisionByZero));
                }
                Ok(Integer(to_i16(l / r)?))
            }
        }
    }

    pub fn remainder(lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        match (lhs, rhs) {
            (Integer(_), Integer(0)) => Err(error!(DivisionByZero)),
            (Integer(l), Integer(r)) => Ok(Integer(l.checked_rem(r).unwrap_or(0))),
            _ => {
                let r = rhs.as_number()?;
                if r == 0.0 {
                    return Err(error!(DivisionByZero));
                }
                Ok(Float(lhs.as_number()? % r))
            }
        }
    }

    pub fn power(lhs: Val, rhs: Val) -> Result<Val> {
        use Val::*;
        match (lhs, rhs) {
            (Integer(l), Integer(r)) if r >= 0 => {
                let n = (l as f64).powi(r as i32);
                if n >= i16::MIN as f64 && n <= i16::MAX as f64 {
                    Ok(Integer(n as i16))
                } else {
                    Ok(Float(n as f32))
                }
            }
            _ => Ok(Float(lhs.as_number()?.powf(rhs.as_number()?))),
        }
    }

    pub fn and(lhs: Val, rhs: Val) -> Result<Val> {
        Ok(Val::Integer(logical(lhs)? & logical(rhs)?))
    }

    pub fn or(lhs: Val, rhs: Val) -> Result<Val> {
        Ok(Val::Integer(logical(lhs)? | logical(rhs)?))
    }

    /// Logical not: booleans are 1 and 0.
    pub fn not(val: Val) -> Result<Val> {
        bool_val(!val.is_truthy()?)
    }

    /// Same-kind ordering; pointers compare the strings they point at.
    fn order(lhs: Val, rhs: Val, memory: &[Val], mixed: bool) -> Result<Option<Ordering>> {
        use Val::*;
        match (lhs, rhs) {
            (Integer(l), Integer(r)) => Ok(Some(l.cmp(&r))),
            (Float(l), Float(r)) => Ok(l.partial_cmp(&r)),
            (Integer(l), Float(r)) if mixed => Ok((l as f32).partial_cmp(&r)),
            (Float(l), Integer(r)) if mixed => Ok(l.partial_cmp(&(r as f32))),
            (Pointer(l), Pointer(r)) => {
                let l = Operation::string(memory, l)?;
                let r = Operation::string(memory, r)?;
                Ok(Some(l.cmp(&r)))
            }
            _ => Err(error!(TypeMismatch)),
        }
    }

    pub fn equal(lhs: Val, rhs: Val, memory: &[Val]) -> Result<Val> {
        bool_val(Operation::order(lhs, rhs, memory, false)? == Some(Ordering::Equal))
    }

    pub fn not_equal(lhs: Val, rhs: Val, memory: &[Val]) -> Result<Val> {
        bool_val(Operation::order(lhs, rhs, memory, false)? != Some(Ordering::Equal))
    }

    pub fn greater(lhs: Val, rhs: Val, memory: &[Val]) -> Result<Val> {
        bool_val(Operation::order(lhs, rhs, memory, false)? == Some(Ordering::Greater))
    }

    pub fn greater_equal(lhs: Val, rhs: Val, memory: &[Val]) -> Result<Val> {
        let ord = Operation::order(lhs, rhs, memory, false)?;
        bool_val(matches!(ord, Some(Ordering::Greater) | Some(Ordering::Equal)))
    }

    pub fn less(lhs: Val, rhs: Val, memory: &[Val]) -> Result<Val> {
        bool_val(Operation::order(lhs, rhs, memory, false)? == Some(Ordering::Less))
    }

    pub fn less_equal(lhs: Val, rhs: Val, memory: &[Val]) -> Result<Val> {
        let ord = Operation::order(lhs, rhs, memory, false)?;
        bool_val(matches!(ord, Some(Ordering::Less) | Some(Ordering::Equal)))
    }

    /// -1, 0 or 1. Accepts mixed Integer and Float.
    pub fn compare(lhs: Val, rhs: Val, memory: &[Val]) -> Result<Val> {
        match Operation::order(lhs, rhs, memory, true)? {
            Some(Ordering::Less) => Ok(Val::Integer(-1)),
            Some(Ordering::Equal) => Ok(Val::Integer(0)),
            Some(Ordering::Greater) => Ok(Val::Integer(1)),
            None => Err(error!(IllegalFunctionCall; "NAN")),
        }
    }

    /// Null-terminated Integer cells starting at `addr`.
    pub fn string(memory: &[Val], addr: Address) -> Result<Vec<i16>> {
        let mut s = vec![];
        let mut at = addr;
        loop {
            match memory.get(at) {
                Some(Val::Integer(0)) => return Ok(s),
                Some(Val::Integer(n)) => s.push(*n),
                Some(_) => return Err(error!(TypeMismatch; "NOT A STRING")),
                None => return Err(error!(MemoryFault; "UNTERMINATED STRING")),
            }
            at += 1;
        }
    }

    /// BASIC INT: the floor, as an Integer when it fits.
    pub fn floor(val: Val) -> Result<Val> {
        use Val::*;
        match val {
            Integer(_) => Ok(val),
            Float(n) => {
                let n = n.floor();
                if n >= i16::MIN as f32 && n <= i16::MAX as f32 {
                    Ok(Integer(n as i16))
                } else {
                    Ok(Float(n))
                }
            }
            Pointer(p) if p <= i16::MAX as Address => Ok(Integer(p as i16)),
            Pointer(_) => Err(error!(Overflow)),
            Unset => Err(error!(TypeMismatch)),
        }
    }

    pub fn to_float(val: Val) -> Result<Val> {
        Ok(Val::Float(val.as_number()?))
    }

    pub fn to_pointer(val: Val) -> Result<Val> {
        use Val::*;
        match val {
            Pointer(_) => Ok(val),
            Integer(n) if n >= 0 => Ok(Pointer(n as Address)),
            Float(n) if n >= 0.0 && n <= MAX_POINTER as f32 => Ok(Pointer(n as Address)),
            Unset => Err(error!(TypeMismatch)),
            _ => Err(error!(IllegalFunctionCall; "NOT AN ADDRESS")),
        }
    }

    pub fn abs(val: Val) -> Result<Val> {
        use Val::*;
        match val {
            Integer(n) => Ok(promote((n as i32).abs())),
            Float(n) => Ok(Float(n.abs())),
            _ => Err(error!(TypeMismatch)),
        }
    }

    pub fn sqr(val: Val) -> Result<Val> {
        let n = val.as_number()?;
        if n < 0.0 {
            return Err(error!(IllegalFunctionCall; "SQR"));
        }
        Ok(Val::Float(n.sqrt()))
    }

    pub fn log(val: Val) -> Result<Val> {
        let n = val.as_number()?;
        if n <= 0.0 {
            return Err(error!(IllegalFunctionCall; "LOG"));
        }
        Ok(Val::Float(n.ln()))
    }

    pub fn sin(val: Val) -> Result<Val> {
        Ok(Val::Float(val.as_number()?.sin()))
    }

    pub fn cos(val: Val) -> Result<Val> {
        Ok(Val::Float(val.as_number()?.cos()))
    }

    pub fn tan(val: Val) -> Result<Val> {
        Ok(Val::Float(val.as_number()?.tan()))
    }

    pub fn atn(val: Val) -> Result<Val> {
        Ok(Val::Float(val.as_number()?.atan()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::ErrorCode;

    fn text(s: &str) -> Vec<Val> {
        let mut v: Vec<Val> = s.bytes().map(|b| Val::Integer(b as i16)).collect();
        v.push(Val::Integer(0));
        v
    }

    #[test]
    fn test_sum_promotes() {
        assert_eq!(
            Operation::sum(Val::Integer(1), Val::Integer(2)).unwrap(),
            Val::Integer(3)
        );
        assert_eq!(
            Operation::sum(Val::Integer(32767), Val::Integer(1)).unwrap(),
            Val::Float(32768.0)
        );
        assert_eq!(
            Operation::multiply(Val::Integer(-300), Val::Integer(300)).unwrap(),
            Val::Float(-90000.0)
        );
        assert_eq!(
            Operation::negate(Val::Integer(i16::MIN)).unwrap(),
            Val::Float(32768.0)
        );
    }

    #[test]
    fn test_pointer_arithmetic() {
        assert_eq!(
            Operation::sum(Val::Integer(3), Val::Pointer(10)).unwrap(),
            Val::Pointer(13)
        );
        assert_eq!(
            Operation::subtract(Val::Pointer(10), Val::Integer(4)).unwrap(),
            Val::Pointer(6)
        );
        assert!(Operation::sum(Val::Pointer(1), Val::Pointer(2)).is_err());
        assert_eq!(
            Operation::subtract(Val::Pointer(1), Val::Integer(2))
                .unwrap_err()
                .code(),
            ErrorCode::MemoryFault
        );
    }

    #[test]
    fn test_integer_division() {
        assert_eq!(
            Operation::divide_int(Val::Integer(7), Val::Integer(2)).unwrap(),
            Val::Integer(3)
        );
        assert_eq!(
            Operation::divide_int(Val::Integer(i16::MIN), Val::Integer(-1))
                .unwrap_err()
                .code(),
            ErrorCode::Overflow
        );
        assert_eq!(
            Operation::divide_int(Val::Integer(1), Val::Integer(0))
                .unwrap_err()
                .code(),
            ErrorCode::DivisionByZero
        );
        assert_eq!(
            Operation::divide(Val::Integer(7), Val::Integer(2)).unwrap(),
            Val::Float(3.5)
        );
    }

    #[test]
    fn test_power() {
        assert_eq!(
            Operation::power(Val::Integer(2), Val::Integer(10)).unwrap(),
            Val::Integer(1024)
        );
        assert_eq!(
            Operation::power(Val::Integer(2), Val::Integer(16)).unwrap(),
            Val::Float(65536.0)
        );
        assert_eq!(
            Operation::power(Val::Integer(2), Val::Integer(-1)).unwrap(),
            Val::Float(0.5)
        );
    }

    #[test]
    fn test_strict_comparison_rejects_mixed() {
        let mem: [Val; 0] = [];
        assert_eq!(
            Operation::equal(Val::Integer(1), Val::Float(1.0), &mem)
                .unwrap_err()
                .code(),
            ErrorCode::TypeMismatch
        );
        assert_eq!(
            Operation::compare(Val::Integer(1), Val::Float(1.5), &mem).unwrap(),
            Val::Integer(-1)
        );
        assert!(Operation::compare(Val::Unset, Val::Integer(1), &mem).is_err());
    }

    #[test]
    fn test_pointers_compare_strings() {
        let mut mem = text("BOB");
        mem.extend(text("ALICE"));
        mem.extend(text("BOB"));
        let bob = Val::Pointer(0);
        let alice = Val::Pointer(4);
        let bob2 = Val::Pointer(10);
        assert_eq!(Operation::equal(bob, bob2, &mem).unwrap(), Val::Integer(1));
        assert_eq!(Operation::less(alice, bob, &mem).unwrap(), Val::Integer(1));
        assert_eq!(Operation::greater(alice, bob, &mem).unwrap(), Val::Integer(0));
        assert_eq!(Operation::compare(bob, alice, &mem).unwrap(), Val::Integer(1));
    }

    #[test]
    fn test_unterminated_string() {
        let mem = [Val::Integer(65)];
        assert_eq!(
            Operation::string(&mem, 0).unwrap_err().code(),
            ErrorCode::MemoryFault
        );
    }

    #[test]
    fn test_floor() {
        assert_eq!(Operation::floor(Val::Float(-1.5)).unwrap(), Val::Integer(-2));
        assert_eq!(
            Operation::floor(Val::Float(1e6)).unwrap(),
            Val::Float(1e6)
        );
    }
}
