//! Tests and comparisons (`0x45..=0x66`)
//!
//! Every comparison pushes an `i32` 0 or 1. Float comparisons follow
//! IEEE 754: any comparison with NaN is false except `ne`.

use super::{binary, unary, RuntimeError, Stack};
use crate::opcode;

/// Executes a test or comparison opcode.
pub fn execute(stack: &mut Stack, op: u8) -> Result<(), RuntimeError> {
    match op {
        // i32
        0x45 => unary(stack, |c: i32| c == 0),
        0x46 => binary(stack, |c1: i32, c2| c1 == c2),
        0x47 => binary(stack, |c1: i32, c2| c1 != c2),
        0x48 => binary(stack, |c1: i32, c2| c1 < c2),
        0x49 => binary(stack, |c1: i32, c2| (c1 as u32) < (c2 as u32)),
        0x4A => binary(stack, |c1: i32, c2| c1 > c2),
        0x4B => binary(stack, |c1: i32, c2| (c1 as u32) > (c2 as u32)),
        0x4C => binary(stack, |c1: i32, c2| c1 <= c2),
        0x4D => binary(stack, |c1: i32, c2| (c1 as u32) <= (c2 as u32)),
        0x4E => binary(stack, |c1: i32, c2| c1 >= c2),
        0x4F => binary(stack, |c1: i32, c2| (c1 as u32) >= (c2 as u32)),

        // i64
        0x50 => unary(stack, |c: i64| c == 0),
        0x51 => binary(stack, |c1: i64, c2| c1 == c2),
        0x52 => binary(stack, |c1: i64, c2| c1 != c2),
        0x53 => binary(stack, |c1: i64, c2| c1 < c2),
        0x54 => binary(stack, |c1: i64, c2| (c1 as u64) < (c2 as u64)),
        0x55 => binary(stack, |c1: i64, c2| c1 > c2),
        0x56 => binary(stack, |c1: i64, c2| (c1 as u64) > (c2 as u64)),
        0x57 => binary(stack, |c1: i64, c2| c1 <= c2),
        0x58 => binary(stack, |c1: i64, c2| (c1 as u64) <= (c2 as u64)),
        0x59 => binary(stack, |c1: i64, c2| c1 >= c2),
        0x5A => binary(stack, |c1: i64, c2| (c1 as u64) >= (c2 as u64)),

        // f32
        0x5B => binary(stack, |c1: f32, c2| c1 == c2),
        0x5C => binary(stack, |c1: f32, c2| c1 != c2),
        0x5D => binary(stack, |c1: f32, c2| c1 < c2),
        0x5E => binary(stack, |c1: f32, c2| c1 > c2),
        0x5F => binary(stack, |c1: f32, c2| c1 <= c2),
        0x60 => binary(stack, |c1: f32, c2| c1 >= c2),

        // f64
        0x61 => binary(stack, |c1: f64, c2| c1 == c2),
        0x62 => binary(stack, |c1: f64, c2| c1 != c2),
        0x63 => binary(stack, |c1: f64, c2| c1 < c2),
        0x64 => binary(stack, |c1: f64, c2| c1 > c2),
        0x65 => binary(stack, |c1: f64, c2| c1 <= c2),
        0x66 => binary(stack, |c1: f64, c2| c1 >= c2),

        other => Err(RuntimeError::UnimplementedInstruction(opcode::describe(other))),
    }
}
