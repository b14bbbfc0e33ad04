//! Arithmetic and bitwise instructions (`0x67..=0xA6`, `0xC0..=0xC4`)
//!
//! Integer arithmetic wraps modulo 2^N. Division and remainder trap on a
//! zero divisor, and signed division traps on `MIN / -1`. Shift and rotate
//! counts are taken modulo the bit width.

use super::{binary, try_binary, unary, RuntimeError, Stack};
use crate::opcode;

// ============================================================================
// Trapping integer division
// ============================================================================

/// i32.div_s
/// 1. If c2 is 0, trap
/// 2. If c1 is INT32_MIN and c2 is -1, trap (2^31 doesn't fit in i32)
/// 3. Otherwise divide, truncating toward zero
pub fn i32_div_s(c1: i32, c2: i32) -> Result<i32, RuntimeError> {
    if c2 == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    c1.checked_div(c2).ok_or(RuntimeError::IntegerOverflow)
}

/// i32.div_u
pub fn i32_div_u(c1: i32, c2: i32) -> Result<i32, RuntimeError> {
    if c2 == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok(((c1 as u32) / (c2 as u32)) as i32)
}

/// i32.rem_s
/// The sign of the result follows the dividend; `INT32_MIN rem -1` is 0.
pub fn i32_rem_s(c1: i32, c2: i32) -> Result<i32, RuntimeError> {
    if c2 == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok(c1.wrapping_rem(c2))
}

/// i32.rem_u
pub fn i32_rem_u(c1: i32, c2: i32) -> Result<i32, RuntimeError> {
    if c2 == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok(((c1 as u32) % (c2 as u32)) as i32)
}

/// i64.div_s
pub fn i64_div_s(c1: i64, c2: i64) -> Result<i64, RuntimeError> {
    if c2 == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    c1.checked_div(c2).ok_or(RuntimeError::IntegerOverflow)
}

/// i64.div_u
pub fn i64_div_u(c1: i64, c2: i64) -> Result<i64, RuntimeError> {
    if c2 == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok(((c1 as u64) / (c2 as u64)) as i64)
}

/// i64.rem_s
pub fn i64_rem_s(c1: i64, c2: i64) -> Result<i64, RuntimeError> {
    if c2 == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok(c1.wrapping_rem(c2))
}

/// i64.rem_u
pub fn i64_rem_u(c1: i64, c2: i64) -> Result<i64, RuntimeError> {
    if c2 == 0 {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok(((c1 as u64) % (c2 as u64)) as i64)
}

// ============================================================================
// Float min/max
// ============================================================================

/// f32.min
/// NaN if either operand is NaN; -0.0 is less than +0.0.
pub fn f32_min(c1: f32, c2: f32) -> f32 {
    if c1.is_nan() || c2.is_nan() {
        f32::NAN
    } else if c1 == 0.0 && c2 == 0.0 {
        if c1.is_sign_negative() {
            c1
        } else {
            c2
        }
    } else {
        c1.min(c2)
    }
}

/// f32.max
/// NaN if either operand is NaN; +0.0 is greater than -0.0.
pub fn f32_max(c1: f32, c2: f32) -> f32 {
    if c1.is_nan() || c2.is_nan() {
        f32::NAN
    } else if c1 == 0.0 && c2 == 0.0 {
        if c1.is_sign_positive() {
            c1
        } else {
            c2
        }
    } else {
        c1.max(c2)
    }
}

/// f64.min
pub fn f64_min(c1: f64, c2: f64) -> f64 {
    if c1.is_nan() || c2.is_nan() {
        f64::NAN
    } else if c1 == 0.0 && c2 == 0.0 {
        if c1.is_sign_negative() {
            c1
        } else {
            c2
        }
    } else {
        c1.min(c2)
    }
}

/// f64.max
pub fn f64_max(c1: f64, c2: f64) -> f64 {
    if c1.is_nan() || c2.is_nan() {
        f64::NAN
    } else if c1 == 0.0 && c2 == 0.0 {
        if c1.is_sign_positive() {
            c1
        } else {
            c2
        }
    } else {
        c1.max(c2)
    }
}

/// Executes an arithmetic or bitwise opcode.
pub fn execute(stack: &mut Stack, op: u8) -> Result<(), RuntimeError> {
    match op {
        // i32
        0x67 => unary(stack, |c: i32| c.leading_zeros() as i32),
        0x68 => unary(stack, |c: i32| c.trailing_zeros() as i32),
        0x69 => unary(stack, |c: i32| c.count_ones() as i32),
        0x6A => binary(stack, |c1: i32, c2| c1.wrapping_add(c2)),
        0x6B => binary(stack, |c1: i32, c2| c1.wrapping_sub(c2)),
        0x6C => binary(stack, |c1: i32, c2| c1.wrapping_mul(c2)),
        0x6D => try_binary(stack, i32_div_s),
        0x6E => try_binary(stack, i32_div_u),
        0x6F => try_binary(stack, i32_rem_s),
        0x70 => try_binary(stack, i32_rem_u),
        0x71 => binary(stack, |c1: i32, c2| c1 & c2),
        0x72 => binary(stack, |c1: i32, c2| c1 | c2),
        0x73 => binary(stack, |c1: i32, c2| c1 ^ c2),
        0x74 => binary(stack, |c1: i32, c2| c1.wrapping_shl(c2 as u32)),
        0x75 => binary(stack, |c1: i32, c2| c1.wrapping_shr(c2 as u32)),
        0x76 => binary(stack, |c1: i32, c2| (c1 as u32).wrapping_shr(c2 as u32) as i32),
        0x77 => binary(stack, |c1: i32, c2| c1.rotate_left(c2 as u32 % 32)),
        0x78 => binary(stack, |c1: i32, c2| c1.rotate_right(c2 as u32 % 32)),

        // i64
        0x79 => unary(stack, |c: i64| c.leading_zeros() as i64),
        0x7A => unary(stack, |c: i64| c.trailing_zeros() as i64),
        0x7B => unary(stack, |c: i64| c.count_ones() as i64),
        0x7C => binary(stack, |c1: i64, c2| c1.wrapping_add(c2)),
        0x7D => binary(stack, |c1: i64, c2| c1.wrapping_sub(c2)),
        0x7E => binary(stack, |c1: i64, c2| c1.wrapping_mul(c2)),
        0x7F => try_binary(stack, i64_div_s),
        0x80 => try_binary(stack, i64_div_u),
        0x81 => try_binary(stack, i64_rem_s),
        0x82 => try_binary(stack, i64_rem_u),
        0x83 => binary(stack, |c1: i64, c2| c1 & c2),
        0x84 => binary(stack, |c1: i64, c2| c1 | c2),
        0x85 => binary(stack, |c1: i64, c2| c1 ^ c2),
        0x86 => binary(stack, |c1: i64, c2| c1.wrapping_shl(c2 as u32)),
        0x87 => binary(stack, |c1: i64, c2| c1.wrapping_shr(c2 as u32)),
        0x88 => binary(stack, |c1: i64, c2| (c1 as u64).wrapping_shr(c2 as u32) as i64),
        0x89 => binary(stack, |c1: i64, c2| c1.rotate_left((c2 as u64 % 64) as u32)),
        0x8A => binary(stack, |c1: i64, c2| c1.rotate_right((c2 as u64 % 64) as u32)),

        // f32
        0x8B => unary(stack, |c: f32| c.abs()),
        0x8C => unary(stack, |c: f32| -c),
        0x8D => unary(stack, |c: f32| c.ceil()),
        0x8E => unary(stack, |c: f32| c.floor()),
        0x8F => unary(stack, |c: f32| c.trunc()),
        0x90 => unary(stack, |c: f32| c.round_ties_even()),
        0x91 => unary(stack, |c: f32| c.sqrt()),
        0x92 => binary(stack, |c1: f32, c2| c1 + c2),
        0x93 => binary(stack, |c1: f32, c2| c1 - c2),
        0x94 => binary(stack, |c1: f32, c2| c1 * c2),
        0x95 => binary(stack, |c1: f32, c2| c1 / c2),
        0x96 => binary(stack, f32_min),
        0x97 => binary(stack, f32_max),
        0x98 => binary(stack, |c1: f32, c2: f32| c1.copysign(c2)),

        // f64
        0x99 => unary(stack, |c: f64| c.abs()),
        0x9A => unary(stack, |c: f64| -c),
        0x9B => unary(stack, |c: f64| c.ceil()),
        0x9C => unary(stack, |c: f64| c.floor()),
        0x9D => unary(stack, |c: f64| c.trunc()),
        0x9E => unary(stack, |c: f64| c.round_ties_even()),
        0x9F => unary(stack, |c: f64| c.sqrt()),
        0xA0 => binary(stack, |c1: f64, c2| c1 + c2),
        0xA1 => binary(stack, |c1: f64, c2| c1 - c2),
        0xA2 => binary(stack, |c1: f64, c2| c1 * c2),
        0xA3 => binary(stack, |c1: f64, c2| c1 / c2),
        0xA4 => binary(stack, f64_min),
        0xA5 => binary(stack, f64_max),
        0xA6 => binary(stack, |c1: f64, c2: f64| c1.copysign(c2)),

        // Sign extension
        0xC0 => unary(stack, |c: i32| c as i8 as i32),
        0xC1 => unary(stack, |c: i32| c as i16 as i32),
        0xC2 => unary(stack, |c: i64| c as i8 as i64),
        0xC3 => unary(stack, |c: i64| c as i16 as i64),
        0xC4 => unary(stack, |c: i64| c as i32 as i64),

        other => Err(RuntimeError::UnimplementedInstruction(opcode::describe(other))),
    }
}
