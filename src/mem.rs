use std::ops::{Index, IndexMut};

pub const MEM_LEN: usize = 256;

pub(crate) mod addrs {
    // The stack grows down from here; register 7 holds this at reset.
    pub const SP_INIT: u8 = 0xF4;
}

/// 256 bytes of RAM shared by code, data and the stack.
///
/// Addresses are `u8`, so every access wraps modulo 256 by construction.
/// No distinction is enforced between the code and data regions.
#[derive(Clone, Debug)]
pub struct Memory {
    ram: [u8; MEM_LEN],
}

impl Memory {
    pub fn new() -> Memory {
        Memory { ram: [0; MEM_LEN] }
    }

    /// Builds a memory with `image` copied in starting at address 0 and
    /// the remaining cells left at 0. The image must fit; the loader
    /// enforces this before calling.
    pub fn from_image(image: &[u8]) -> Memory {
        let mut mem = Memory::new();
        mem.ram[..image.len()].copy_from_slice(image);
        mem
    }
}

impl Default for Memory {
    fn default() -> Memory {
        Memory::new()
    }
}

impl Index<u8> for Memory {
    type Output = u8;

    fn index(&self, addr: u8) -> &Self::Output {
        &self.ram[addr as usize]
    }
}

impl IndexMut<u8> for Memory {
    fn index_mut(&mut self, addr: u8) -> &mut Self::Output {
        &mut self.ram[addr as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_fills_from_zero() {
        let mem = Memory::from_image(&[0x82, 0x00, 0x08]);
        assert_eq!(mem[0], 0x82);
        assert_eq!(mem[2], 0x08);
        assert_eq!(mem[3], 0);
        assert_eq!(mem[255], 0);
    }

    #[test]
    fn writes_stick() {
        let mut mem = Memory::new();
        mem[0xF3] = 42;
        assert_eq!(mem[0xF3], 42);
    }
}
