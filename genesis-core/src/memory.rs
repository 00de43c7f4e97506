//! RAM backing stores

/// Power-of-two sized RAM block. Offsets wrap at the block size.
#[derive(Clone)]
pub struct Ram {
    data: Vec<u8>,
    mask: usize,
}

impl Ram {
    pub fn new(size: usize) -> Self {
        debug_assert!(size.is_power_of_two());
        Self {
            data: vec![0; size],
            mask: size - 1,
        }
    }

    #[inline]
    pub fn read(&self, offset: u32) -> u8 {
        self.data[offset as usize & self.mask]
    }

    #[inline]
    pub fn write(&mut self, offset: u32, val: u8) {
        self.data[offset as usize & self.mask] = val;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ram_wraps() {
        let mut ram = Ram::new(0x2000);
        ram.write(0x2001, 0x42);
        assert_eq!(ram.read(0x0001), 0x42);
        assert_eq!(ram.len(), 0x2000);
    }

    #[test]
    fn test_ram_clear() {
        let mut ram = Ram::new(16);
        ram.write(3, 0xAA);
        ram.clear();
        assert!(ram.as_slice().iter().all(|&b| b == 0));
    }
}
