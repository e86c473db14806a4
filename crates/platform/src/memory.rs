//! DMA-visible memory.
//!
//! Every buffer a DMA chain touches is described by a [`Region`]: a base
//! address and a byte length in the SoC's address space. The CPU side
//! reaches the same bytes through [`Memory`], so producers, consumers and
//! the DMA engine all agree on addresses instead of sharing Rust slices
//! with hardware.
//!
//! | Region        | Writer            | Reader            |
//! |---------------|-------------------|-------------------|
//! | USB endpoint  | USB SIE           | usb DMA channel   |
//! | audio ring    | byte-swap DMA     | CPU, I2S DMA      |
//! | serial TX ring| CPU               | UART TX DMA       |
//! | serial RX ring| spy DMA           | CPU               |

/// A byte range of SRAM addressable by the DMA controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Region {
    base: u32,
    len: u16,
}

impl Region {
    /// Describe `len` bytes starting at `base`.
    pub const fn new(base: u32, len: u16) -> Self {
        Self { base, len }
    }

    /// First address of the region.
    pub const fn base(self) -> u32 {
        self.base
    }

    /// Length in bytes.
    pub const fn len(self) -> u16 {
        self.len
    }

    /// Whether the region is zero-length.
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Address of the byte at `offset`.
    pub const fn addr(self, offset: u16) -> u32 {
        self.base.wrapping_add(offset as u32)
    }

    /// Whether `addr` falls inside the region.
    pub const fn contains(self, addr: u32) -> bool {
        addr >= self.base && addr.wrapping_sub(self.base) < self.len as u32
    }
}

/// CPU access to DMA-visible memory.
pub trait Memory {
    /// Copy `out.len()` bytes starting at `addr` into `out`.
    fn read(&self, addr: u32, out: &mut [u8]);

    /// Copy `data` to memory starting at `addr`.
    fn write(&mut self, addr: u32, data: &[u8]);

    /// Read one byte.
    fn read_u8(&self, addr: u32) -> u8 {
        let mut byte = [0u8; 1];
        self.read(addr, &mut byte);
        byte[0]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn region_address_arithmetic() {
        let r = Region::new(0x2000_0100, 16);
        assert_eq!(r.addr(0), 0x2000_0100);
        assert_eq!(r.addr(15), 0x2000_010F);
        assert!(r.contains(0x2000_0100));
        assert!(r.contains(0x2000_010F));
        assert!(!r.contains(0x2000_0110));
        assert!(!r.contains(0x2000_00FF));
    }

    #[test]
    fn empty_region_contains_nothing() {
        let r = Region::new(0x2000_0000, 0);
        assert!(r.is_empty());
        assert!(!r.contains(0x2000_0000));
    }
}
