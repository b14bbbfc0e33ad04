//! Binary encoding primitives.
//!
//! LEB128 integers and little-endian IEEE 754 floats, in both directions.
//! Writers append to a caller-provided `Vec<u8>`; readers pull bytes from a
//! closure so they work over any byte source. [`CodeReader`] wraps a code
//! slice with a cursor for the interpreter.

use byteorder::{ByteOrder, LittleEndian};
use std::io;

// ---------------------------------------------------------------------------
// Unsigned LEB128
// ---------------------------------------------------------------------------

fn write_vu(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Appends the unsigned LEB128 encoding of a u32 value to `buf`.
pub fn write_vu32(buf: &mut Vec<u8>, v: u32) {
    write_vu(buf, v as u64);
}

/// Appends the unsigned LEB128 encoding of a u64 value to `buf`.
pub fn write_vu64(buf: &mut Vec<u8>, v: u64) {
    write_vu(buf, v);
}

// ---------------------------------------------------------------------------
// Signed LEB128
// ---------------------------------------------------------------------------

fn write_vs(buf: &mut Vec<u8>, mut value: i64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        // Done once the remaining bits are pure sign extension of bit 6.
        let sign_clear = byte & 0x40 == 0;
        if (value == 0 && sign_clear) || (value == -1 && !sign_clear) {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

/// Appends the signed LEB128 encoding of an i32 value to `buf`.
pub fn write_vs32(buf: &mut Vec<u8>, v: i32) {
    write_vs(buf, v as i64);
}

/// Appends the signed LEB128 encoding of an i64 value to `buf`.
pub fn write_vs64(buf: &mut Vec<u8>, v: i64) {
    write_vs(buf, v);
}

// ---------------------------------------------------------------------------
// IEEE 754 floats (little-endian)
// ---------------------------------------------------------------------------

pub fn write_f32(buf: &mut Vec<u8>, v: f32) {
    let mut bytes = [0u8; 4];
    LittleEndian::write_f32(&mut bytes, v);
    buf.extend_from_slice(&bytes);
}

pub fn write_f64(buf: &mut Vec<u8>, v: f64) {
    let mut bytes = [0u8; 8];
    LittleEndian::write_f64(&mut bytes, v);
    buf.extend_from_slice(&bytes);
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn read_vu<F>(reader: &mut F, bits: u32) -> Result<u64, io::Error>
where
    F: FnMut() -> Result<u8, io::Error>,
{
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = reader()?;
        let low = (byte & 0x7f) as u64;
        if shift + 7 > bits && low >> (bits - shift) != 0 {
            return Err(invalid("integer too large"));
        }
        result |= low << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        if shift >= bits {
            return Err(invalid("integer representation too long"));
        }
    }
}

fn read_vs<F>(reader: &mut F, bits: u32) -> Result<i64, io::Error>
where
    F: FnMut() -> Result<u8, io::Error>,
{
    let max_bytes = bits.div_ceil(7);
    let mut result: i64 = 0;
    let mut shift = 0u32;
    for _ in 0..max_bytes {
        let byte = reader()?;
        if shift == 63 && byte != 0x00 && byte != 0x7f {
            return Err(invalid("integer too large"));
        }
        result |= ((byte & 0x7f) as i64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && byte & 0x40 != 0 {
                result |= -1i64 << shift;
            }
            if bits < 64 {
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                if result < min || result > max {
                    return Err(invalid("integer too large"));
                }
            }
            return Ok(result);
        }
    }
    Err(invalid("integer representation too long"))
}

pub fn read_vu32<F>(reader: &mut F) -> Result<u32, io::Error>
where
    F: FnMut() -> Result<u8, io::Error>,
{
    Ok(read_vu(reader, 32)? as u32)
}

pub fn read_vu64<F>(reader: &mut F) -> Result<u64, io::Error>
where
    F: FnMut() -> Result<u8, io::Error>,
{
    read_vu(reader, 64)
}

pub fn read_vs32<F>(reader: &mut F) -> Result<i32, io::Error>
where
    F: FnMut() -> Result<u8, io::Error>,
{
    Ok(read_vs(reader, 32)? as i32)
}

pub fn read_vs64<F>(reader: &mut F) -> Result<i64, io::Error>
where
    F: FnMut() -> Result<u8, io::Error>,
{
    read_vs(reader, 64)
}

/// Cursor over a function body's code bytes.
#[derive(Debug, Clone)]
pub struct CodeReader<'a> {
    code: &'a [u8],
    pos: usize,
}

impl<'a> CodeReader<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        CodeReader { code, pos: 0 }
    }

    /// A reader positioned at `pos`.
    pub fn at(code: &'a [u8], pos: usize) -> Self {
        CodeReader { code, pos }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.code.len()
    }

    pub fn read_u8(&mut self) -> Result<u8, io::Error> {
        let byte = self.code.get(self.pos).copied().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "no more bytes to read")
        })?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.code.get(self.pos).copied()
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], io::Error> {
        let end = self.pos + N;
        let slice = self.code.get(self.pos..end).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "not enough bytes to read")
        })?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    pub fn read_f32(&mut self) -> Result<f32, io::Error> {
        Ok(LittleEndian::read_f32(&self.read_array::<4>()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, io::Error> {
        Ok(LittleEndian::read_f64(&self.read_array::<8>()?))
    }

    pub fn read_vu32(&mut self) -> Result<u32, io::Error> {
        read_vu32(&mut || self.read_u8())
    }

    pub fn read_vs32(&mut self) -> Result<i32, io::Error> {
        read_vs32(&mut || self.read_u8())
    }

    pub fn read_vs64(&mut self) -> Result<i64, io::Error> {
        read_vs64(&mut || self.read_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_eq_with_diag<T: std::fmt::Debug + std::cmp::PartialEq>(actual: T, expected: T) {
        assert!(
            actual == expected,
            "Assertion failed. Actual: {actual:?}, Expected: {expected:?}",
        );
    }

    fn encode_vu32(v: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        write_vu32(&mut buf, v);
        buf
    }

    fn encode_vs32(v: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        write_vs32(&mut buf, v);
        buf
    }

    fn encode_vs64(v: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_vs64(&mut buf, v);
        buf
    }

    #[test]
    fn test_write_vu32() {
        assert_eq_with_diag(encode_vu32(0), vec![0]);
        assert_eq_with_diag(encode_vu32(127), vec![0x7f]);
        assert_eq_with_diag(encode_vu32(128), vec![0x80, 0x01]);
        assert_eq_with_diag(encode_vu32(624485), vec![0b11100101, 0b10001110, 0b00100110]);
        assert_eq_with_diag(encode_vu32(16256), vec![0x80, 0x7f]);
        assert_eq_with_diag(encode_vu32(0xffffffff), vec![0xff, 0xff, 0xff, 0xff, 0xf]);
        assert_eq_with_diag(encode_vu32(0x80000000), vec![128, 128, 128, 128, 8]);
    }

    #[test]
    fn test_write_vs32() {
        assert_eq_with_diag(encode_vs32(0), vec![0]);
        assert_eq_with_diag(encode_vs32(63), vec![0x3f]);
        // 64 has bit 6 set, so it needs a second byte to stay positive.
        assert_eq_with_diag(encode_vs32(64), vec![0xc0, 0x00]);
        assert_eq_with_diag(encode_vs32(-1), vec![0x7f]);
        assert_eq_with_diag(encode_vs32(-64), vec![0x40]);
        assert_eq_with_diag(encode_vs32(-65), vec![0xbf, 0x7f]);
        assert_eq_with_diag(encode_vs32(-128), vec![0x80, 0x7f]);
        assert_eq_with_diag(encode_vs32(-123456), vec![0xc0, 0xbb, 0x78]);
        assert_eq_with_diag(encode_vs32(i32::MIN), vec![0x80, 0x80, 0x80, 0x80, 0x78]);
        assert_eq_with_diag(encode_vs32(i32::MAX), vec![0xff, 0xff, 0xff, 0xff, 0x07]);
    }

    #[test]
    fn test_write_vs64() {
        assert_eq_with_diag(encode_vs64(-1), vec![0x7f]);
        assert_eq_with_diag(
            encode_vs64(i64::MIN),
            vec![0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x7f],
        );
        assert_eq_with_diag(
            encode_vs64(i64::MAX),
            vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00],
        );
    }

    #[test]
    fn test_read_known_vectors() {
        let read_u = |v: Vec<u8>| CodeReader::new(&v).read_vu32().expect("vu32");
        assert_eq!(read_u(vec![0x8c, 0x08]), 0x40c);
        assert_eq!(read_u(vec![0b11100101, 0b10001110, 0b00100110]), 624485);
        // Padded but still valid encoding of 3.
        assert_eq!(read_u(vec![0x83, 0x80, 0x00]), 3);

        let read_s = |v: Vec<u8>| CodeReader::new(&v).read_vs32().expect("vs32");
        assert_eq!(read_s(vec![0x7f]), -1);
        assert_eq!(read_s(vec![0x80, 0x7f]), -128);
        assert_eq!(read_s(vec![0xff, 0xff, 0xff, 0xff, 0x7f]), -1);
    }

    #[test]
    fn test_read_rejects_overlong() {
        let bytes = vec![0x80, 0x80, 0x80, 0x80, 0x80, 0x00];
        assert!(CodeReader::new(&bytes).read_vu32().is_err());
        assert!(CodeReader::new(&bytes).read_vs32().is_err());
        // Fifth byte carries bits beyond 32.
        let bytes = vec![0xff, 0xff, 0xff, 0xff, 0x1f];
        assert!(CodeReader::new(&bytes).read_vu32().is_err());
        let truncated: Vec<u8> = vec![0x80];
        assert!(CodeReader::new(&truncated).read_vu32().is_err());
    }

    #[test]
    fn test_rt_signed_random() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut values: Vec<i64> = vec![0, 1, -1, 63, 64, -64, -65, i64::MIN, i64::MAX];
        for _ in 0..200 {
            values.push(rng.gen::<i64>());
            values.push(rng.gen::<i32>() as i64);
        }
        for expected in values {
            let bytes = encode_vs64(expected);
            let actual = CodeReader::new(&bytes).read_vs64().expect("vs64");
            assert_eq_with_diag(actual, expected);
            if let Ok(v32) = i32::try_from(expected) {
                let bytes = encode_vs32(v32);
                let actual = CodeReader::new(&bytes).read_vs32().expect("vs32");
                assert_eq_with_diag(actual, v32);
            }
        }
    }

    #[test]
    fn test_rt_unsigned_random() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let expected = rng.gen::<u32>();
            let bytes = encode_vu32(expected);
            assert_eq_with_diag(CodeReader::new(&bytes).read_vu32().expect("vu32"), expected);
        }
    }

    #[test]
    fn test_floats() {
        let mut buf = Vec::new();
        write_f32(&mut buf, 1.5);
        write_f64(&mut buf, -0.0);
        assert_eq!(&buf[..4], &[0x00, 0x00, 0xc0, 0x3f]);
        let mut reader = CodeReader::new(&buf);
        assert_eq!(reader.read_f32().expect("f32"), 1.5);
        let z = reader.read_f64().expect("f64");
        assert!(z == 0.0 && z.is_sign_negative());
        assert!(reader.is_at_end());
    }
}
