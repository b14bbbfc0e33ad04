//! Run-time value representation

use crate::runtime::RuntimeError;
use crate::types::ValueType;
use fhex::ToHex;
use std::fmt;

/// A value on the operand stack, in a local, global or table slot.
///
/// Builder-level `bool` values are `I32` holding 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// A function index, or null.
    FuncRef(Option<u32>),
}

impl Value {
    /// Run-time type of this value
    pub fn typ(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::I64(_) => ValueType::I64,
            Value::F32(_) => ValueType::F32,
            Value::F64(_) => ValueType::F64,
            Value::FuncRef(_) => ValueType::FuncRef,
        }
    }

    /// Zero value of `ty`; used for fresh locals and imported global
    /// placeholders.
    pub fn default_for(ty: ValueType) -> Value {
        match ty {
            ValueType::I32 | ValueType::Bool => Value::I32(0),
            ValueType::I64 => Value::I64(0),
            ValueType::F32 => Value::F32(0.0),
            ValueType::F64 => Value::F64(0.0),
            ValueType::FuncRef => Value::FuncRef(None),
        }
    }

    /// Whether this value may be stored where `ty` is expected. A `Bool`
    /// slot accepts only `I32(0)` and `I32(1)`.
    pub fn matches(&self, ty: ValueType) -> bool {
        match (ty, self) {
            (ValueType::Bool, Value::I32(v)) => *v == 0 || *v == 1,
            _ => self.typ() == ty.runtime(),
        }
    }

    /// Checks this value against `ty`, failing with `TypeMismatch`.
    pub(crate) fn check(&self, ty: ValueType) -> Result<(), RuntimeError> {
        if self.matches(ty) {
            return Ok(());
        }
        let actual = match self {
            Value::I32(_) if ty == ValueType::Bool => self.to_string(),
            _ => self.typ().to_string(),
        };
        Err(RuntimeError::TypeMismatch {
            expected: ty.to_string(),
            actual,
        })
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Outer `None` if this is not a reference.
    pub fn as_func_ref(&self) -> Option<Option<u32>> {
        match self {
            Value::FuncRef(v) => Some(*v),
            _ => None,
        }
    }

    /// Bitwise equality; unlike `==`, NaNs with the same payload are equal.
    pub fn bits_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::I32(v as i32)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "i32:{v}"),
            Value::I64(v) => write!(f, "i64:{v}"),
            Value::F32(v) => write!(f, "f32:{}", v.to_hex()),
            Value::F64(v) => write!(f, "f64:{}", v.to_hex()),
            Value::FuncRef(None) => write!(f, "funcref:null"),
            Value::FuncRef(Some(i)) => write!(f, "funcref:{i}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type() {
        assert_eq!(Value::I32(42).typ(), ValueType::I32);
        assert_eq!(Value::I64(42).typ(), ValueType::I64);
        assert_eq!(Value::F32(42.0).typ(), ValueType::F32);
        assert_eq!(Value::F64(42.0).typ(), ValueType::F64);
        assert_eq!(Value::FuncRef(None).typ(), ValueType::FuncRef);
        assert_eq!(ValueType::of(&Value::from(true)), ValueType::I32);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::I32(42).as_i32(), Some(42));
        assert_eq!(Value::I32(42).as_i64(), None);
        assert_eq!(Value::I64(42).as_i64(), Some(42));
        assert_eq!(Value::F32(42.0).as_f32(), Some(42.0));
        assert_eq!(Value::F64(42.0).as_f64(), Some(42.0));
        assert_eq!(Value::FuncRef(Some(3)).as_func_ref(), Some(Some(3)));
    }

    #[test]
    fn test_bool_accepts_i32() {
        assert!(Value::I32(0).matches(ValueType::Bool));
        assert!(Value::I32(1).matches(ValueType::Bool));
        assert!(!Value::I32(2).matches(ValueType::Bool));
        assert!(!Value::I32(-1).matches(ValueType::Bool));
        assert!(!Value::I64(1).matches(ValueType::Bool));
        assert!(Value::I32(2).matches(ValueType::I32));
        assert_eq!(Value::default_for(ValueType::Bool), Value::I32(0));
    }

    #[test]
    fn test_bits_eq() {
        let nan = f32::from_bits(0x7fc0_0001);
        assert_ne!(Value::F32(nan), Value::F32(nan));
        assert!(Value::F32(nan).bits_eq(&Value::F32(nan)));
        assert!(!Value::F64(0.0).bits_eq(&Value::F64(-0.0)));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Value::I32(42)), "i32:42");
        assert_eq!(format!("{}", Value::I64(-1)), "i64:-1");
        assert_eq!(format!("{}", Value::FuncRef(None)), "funcref:null");
        let f32_str = format!("{}", Value::F32(42.0));
        assert!(f32_str.starts_with("f32:"));
    }
}
