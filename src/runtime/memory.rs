//! Linear memory
//!
//! Byte-addressed, little-endian, sized in 64KiB pages. Every access is
//! bounds checked; addresses are 64-bit so that `base + offset` can never
//! wrap before the check.

use byteorder::{ByteOrder, LittleEndian};

use super::RuntimeError;

/// Page size in bytes (64KiB)
pub const PAGE_SIZE: usize = 65536;

/// Maximum number of pages (4GiB of 32-bit address space)
pub const MAX_PAGES: u32 = 65536;

#[derive(Debug)]
pub struct Memory {
    data: Vec<u8>,
    current_pages: u32,
    max_pages: Option<u32>,
}

impl Memory {
    /// Create a zeroed memory of `initial_pages`.
    ///
    /// # Errors
    /// - Initial pages exceeds the given maximum
    /// - Either bound exceeds [`MAX_PAGES`]
    pub fn new(initial_pages: u32, max_pages: Option<u32>) -> Result<Self, RuntimeError> {
        if initial_pages > MAX_PAGES {
            return Err(RuntimeError::MemoryError(format!(
                "Initial memory size {initial_pages} pages exceeds maximum {MAX_PAGES} pages"
            )));
        }
        if let Some(max) = max_pages {
            if initial_pages > max {
                return Err(RuntimeError::MemoryError(format!(
                    "Initial size {initial_pages} pages exceeds specified maximum {max} pages"
                )));
            }
            if max > MAX_PAGES {
                return Err(RuntimeError::MemoryError(format!(
                    "Maximum size {max} pages exceeds system maximum {MAX_PAGES} pages"
                )));
            }
        }

        Ok(Memory {
            data: vec![0u8; initial_pages as usize * PAGE_SIZE],
            current_pages: initial_pages,
            max_pages,
        })
    }

    /// Current size in pages
    pub fn size(&self) -> u32 {
        self.current_pages
    }

    pub fn max_pages(&self) -> Option<u32> {
        self.max_pages
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Grow by `delta_pages`, zero filling.
    ///
    /// Returns the previous size in pages, or -1 if the limit would be
    /// exceeded or allocation fails.
    pub fn grow(&mut self, delta_pages: u32) -> i32 {
        let current = self.current_pages;
        let Some(new_pages) = current.checked_add(delta_pages) else {
            return -1;
        };
        if new_pages > self.max_pages.unwrap_or(MAX_PAGES) {
            return -1;
        }

        let new_bytes = new_pages as usize * PAGE_SIZE;
        match self.data.try_reserve(new_bytes - self.data.len()) {
            Ok(()) => {
                self.data.resize(new_bytes, 0);
                self.current_pages = new_pages;
                current as i32
            }
            Err(_) => -1,
        }
    }

    /// Range `[addr, addr + size)` as a `usize` start, if in bounds.
    #[inline]
    fn check_bounds(&self, addr: u64, size: usize) -> Result<usize, RuntimeError> {
        let end = addr.checked_add(size as u64).ok_or_else(|| {
            RuntimeError::MemoryError(format!(
                "Memory access overflow: address {addr} + size {size} overflows"
            ))
        })?;
        if end > self.data.len() as u64 {
            return Err(RuntimeError::MemoryError("out of bounds memory access".to_string()));
        }
        Ok(addr as usize)
    }

    pub fn read_u8(&self, addr: u64) -> Result<u8, RuntimeError> {
        let addr = self.check_bounds(addr, 1)?;
        Ok(self.data[addr])
    }

    pub fn read_u16(&self, addr: u64) -> Result<u16, RuntimeError> {
        let addr = self.check_bounds(addr, 2)?;
        Ok(LittleEndian::read_u16(&self.data[addr..addr + 2]))
    }

    pub fn read_u32(&self, addr: u64) -> Result<u32, RuntimeError> {
        let addr = self.check_bounds(addr, 4)?;
        Ok(LittleEndian::read_u32(&self.data[addr..addr + 4]))
    }

    pub fn read_u64(&self, addr: u64) -> Result<u64, RuntimeError> {
        let addr = self.check_bounds(addr, 8)?;
        Ok(LittleEndian::read_u64(&self.data[addr..addr + 8]))
    }

    pub fn read_f32(&self, addr: u64) -> Result<f32, RuntimeError> {
        let addr = self.check_bounds(addr, 4)?;
        Ok(LittleEndian::read_f32(&self.data[addr..addr + 4]))
    }

    pub fn read_f64(&self, addr: u64) -> Result<f64, RuntimeError> {
        let addr = self.check_bounds(addr, 8)?;
        Ok(LittleEndian::read_f64(&self.data[addr..addr + 8]))
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> Result<(), RuntimeError> {
        let addr = self.check_bounds(addr, 1)?;
        self.data[addr] = value;
        Ok(())
    }

    pub fn write_u16(&mut self, addr: u64, value: u16) -> Result<(), RuntimeError> {
        let addr = self.check_bounds(addr, 2)?;
        LittleEndian::write_u16(&mut self.data[addr..addr + 2], value);
        Ok(())
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), RuntimeError> {
        let addr = self.check_bounds(addr, 4)?;
        LittleEndian::write_u32(&mut self.data[addr..addr + 4], value);
        Ok(())
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) -> Result<(), RuntimeError> {
        let addr = self.check_bounds(addr, 8)?;
        LittleEndian::write_u64(&mut self.data[addr..addr + 8], value);
        Ok(())
    }

    pub fn write_f32(&mut self, addr: u64, value: f32) -> Result<(), RuntimeError> {
        let addr = self.check_bounds(addr, 4)?;
        LittleEndian::write_f32(&mut self.data[addr..addr + 4], value);
        Ok(())
    }

    pub fn write_f64(&mut self, addr: u64, value: f64) -> Result<(), RuntimeError> {
        let addr = self.check_bounds(addr, 8)?;
        LittleEndian::write_f64(&mut self.data[addr..addr + 8], value);
        Ok(())
    }

    /// Copy `bytes` into memory starting at `addr`. Used for data segments.
    pub fn write_bytes(&mut self, addr: u64, bytes: &[u8]) -> Result<(), RuntimeError> {
        let addr = self.check_bounds(addr, bytes.len())?;
        self.data[addr..addr + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_bytes(&self, addr: u64, len: usize) -> Result<&[u8], RuntimeError> {
        let addr = self.check_bounds(addr, len)?;
        Ok(&self.data[addr..addr + len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_limits() {
        assert!(Memory::new(2, Some(1)).is_err());
        assert!(Memory::new(MAX_PAGES + 1, None).is_err());
        assert!(Memory::new(1, Some(MAX_PAGES + 1)).is_err());
        let mem = Memory::new(1, Some(2)).unwrap();
        assert_eq!(mem.size(), 1);
        assert_eq!(mem.len(), PAGE_SIZE);
    }

    #[test]
    fn test_grow() {
        let mut mem = Memory::new(1, Some(3)).unwrap();
        assert_eq!(mem.grow(1), 1);
        assert_eq!(mem.grow(0), 2);
        assert_eq!(mem.grow(2), -1);
        assert_eq!(mem.size(), 2);
        assert_eq!(mem.read_u8((2 * PAGE_SIZE - 1) as u64).unwrap(), 0);
    }

    #[test]
    fn test_little_endian() {
        let mut mem = Memory::new(1, None).unwrap();
        mem.write_u32(0, 0x0403_0201).unwrap();
        assert_eq!(mem.read_bytes(0, 4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(mem.read_u16(1).unwrap(), 0x0302);
        mem.write_f64(8, -1.5).unwrap();
        assert_eq!(mem.read_f64(8).unwrap(), -1.5);
        assert_eq!(mem.read_u64(8).unwrap(), (-1.5f64).to_bits());
    }

    #[test]
    fn test_bounds() {
        let mut mem = Memory::new(1, None).unwrap();
        let last = (PAGE_SIZE - 4) as u64;
        mem.write_u32(last, 7).unwrap();
        assert_eq!(mem.read_u32(last).unwrap(), 7);
        let err = mem.read_u32(last + 1).unwrap_err();
        assert!(err.to_string().contains("out of bounds memory access"));
        assert!(mem.write_bytes(last, &[0; 5]).is_err());
        assert!(mem.read_u8(u64::MAX).is_err());
        assert!(Memory::new(0, None).unwrap().read_u8(0).is_err());
    }
}
