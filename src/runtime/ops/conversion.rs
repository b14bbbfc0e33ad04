//! Conversions (`0xA7..=0xBF`) and saturating truncations (`0xFC 0..=7`)
//!
//! Trapping truncations reject NaN and any value whose truncation falls
//! outside the target range. Saturating truncations clamp instead and map
//! NaN to 0.

use super::{try_unary, unary, RuntimeError, Stack};
use crate::opcode;

/// Truncates `value` toward zero and checks it lies in `[min, max)`.
///
/// Bounds are powers of two (or zero), so they are exact in `f64` and the
/// check is exact for every `f32` and `f64` input.
fn trunc_checked(value: f64, min: f64, max: f64) -> Result<f64, RuntimeError> {
    if value.is_nan() {
        return Err(RuntimeError::InvalidConversion(
            "invalid conversion: NaN to integer".to_string(),
        ));
    }
    let truncated = value.trunc();
    if !(min..max).contains(&truncated) {
        return Err(RuntimeError::InvalidConversion("integer overflow".to_string()));
    }
    Ok(truncated)
}

const TWO_31: f64 = 2147483648.0;
const TWO_32: f64 = 4294967296.0;
const TWO_63: f64 = 9223372036854775808.0;
const TWO_64: f64 = 18446744073709551616.0;

fn i32_trunc_s(value: f64) -> Result<i32, RuntimeError> {
    Ok(trunc_checked(value, -TWO_31, TWO_31)? as i32)
}

fn i32_trunc_u(value: f64) -> Result<i32, RuntimeError> {
    Ok(trunc_checked(value, 0.0, TWO_32)? as u32 as i32)
}

fn i64_trunc_s(value: f64) -> Result<i64, RuntimeError> {
    Ok(trunc_checked(value, -TWO_63, TWO_63)? as i64)
}

fn i64_trunc_u(value: f64) -> Result<i64, RuntimeError> {
    Ok(trunc_checked(value, 0.0, TWO_64)? as u64 as i64)
}

/// Executes a plain conversion opcode.
pub fn execute(stack: &mut Stack, op: u8) -> Result<(), RuntimeError> {
    match op {
        0xA7 => unary(stack, |c: i64| c as i32),
        0xA8 => try_unary(stack, |c: f32| i32_trunc_s(c as f64)),
        0xA9 => try_unary(stack, |c: f32| i32_trunc_u(c as f64)),
        0xAA => try_unary(stack, i32_trunc_s),
        0xAB => try_unary(stack, i32_trunc_u),
        0xAC => unary(stack, |c: i32| c as i64),
        0xAD => unary(stack, |c: i32| c as u32 as i64),
        0xAE => try_unary(stack, |c: f32| i64_trunc_s(c as f64)),
        0xAF => try_unary(stack, |c: f32| i64_trunc_u(c as f64)),
        0xB0 => try_unary(stack, i64_trunc_s),
        0xB1 => try_unary(stack, i64_trunc_u),
        0xB2 => unary(stack, |c: i32| c as f32),
        0xB3 => unary(stack, |c: i32| c as u32 as f32),
        0xB4 => unary(stack, |c: i64| c as f32),
        0xB5 => unary(stack, |c: i64| c as u64 as f32),
        0xB6 => unary(stack, |c: f64| c as f32),
        0xB7 => unary(stack, |c: i32| c as f64),
        0xB8 => unary(stack, |c: i32| c as u32 as f64),
        0xB9 => unary(stack, |c: i64| c as f64),
        0xBA => unary(stack, |c: i64| c as u64 as f64),
        0xBB => unary(stack, |c: f32| c as f64),
        0xBC => unary(stack, |c: f32| c.to_bits() as i32),
        0xBD => unary(stack, |c: f64| c.to_bits() as i64),
        0xBE => unary(stack, |c: i32| f32::from_bits(c as u32)),
        0xBF => unary(stack, |c: i64| f64::from_bits(c as u64)),
        other => Err(RuntimeError::UnimplementedInstruction(opcode::describe(other))),
    }
}

/// Executes a saturating truncation (`0xFC` sub-opcodes 0 to 7). Rust's
/// float-to-int `as` casts saturate and map NaN to 0.
pub fn execute_prefixed(stack: &mut Stack, sub: u32) -> Result<(), RuntimeError> {
    match sub {
        0 => unary(stack, |c: f32| c as i32),
        1 => unary(stack, |c: f32| c as u32 as i32),
        2 => unary(stack, |c: f64| c as i32),
        3 => unary(stack, |c: f64| c as u32 as i32),
        4 => unary(stack, |c: f32| c as i64),
        5 => unary(stack, |c: f32| c as u64 as i64),
        6 => unary(stack, |c: f64| c as i64),
        7 => unary(stack, |c: f64| c as u64 as i64),
        other => Err(RuntimeError::UnimplementedInstruction(format!("0xfc {other}"))),
    }
}
