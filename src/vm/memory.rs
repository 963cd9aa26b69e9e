use std::fmt;

use crate::error::VmError;

use super::PAddr;

/// A memory-mapped device window.
///
/// Offsets are relative to the start of the window the device was mapped at.
pub trait Device {
    fn name(&self) -> &str;
    fn read(&self, offset: PAddr, len: usize) -> u64;
    fn write(&mut self, offset: PAddr, len: usize, data: u64);
}

struct MmioWindow {
    base: PAddr,
    len: PAddr,
    device: Box<dyn Device>,
}

impl MmioWindow {
    fn contains(&self, addr: PAddr, len: usize) -> bool {
        let start = addr as u64;
        let base = self.base as u64;
        start >= base && start + len as u64 <= base + self.len as u64
    }
}

/// Flat little-endian physical memory starting at `base`.
pub struct Memory {
    base: PAddr,
    bytes: Vec<u8>,
    windows: Vec<MmioWindow>,
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("left", &format_args!("{:#010x}", self.left()))
            .field("right", &format_args!("{:#010x}", self.right()))
            .field(
                "devices",
                &self
                    .windows
                    .iter()
                    .map(|w| w.device.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn check_width(len: usize) -> Result<(), VmError> {
    match len {
        1 | 2 | 4 | 8 => Ok(()),
        _ => Err(VmError::BadWidth(len)),
    }
}

impl Memory {
    pub fn new(base: PAddr, size: usize) -> Self {
        log::info!(
            "physical memory area [{:#010x}, {:#010x}]",
            base,
            base as u64 + size as u64 - 1
        );
        Self {
            base,
            bytes: vec![0; size],
            windows: Vec::new(),
        }
    }

    pub fn left(&self) -> PAddr {
        self.base
    }

    /// Last valid physical address (inclusive).
    pub fn right(&self) -> PAddr {
        (self.base as u64 + self.bytes.len() as u64 - 1) as PAddr
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn in_pmem(&self, addr: PAddr, len: usize) -> bool {
        let start = addr as u64;
        let base = self.base as u64;
        start >= base && start + len as u64 <= base + self.bytes.len() as u64
    }

    /// Maps `device` at `[base, base + len)`. Windows are consulted only for
    /// addresses outside physical memory.
    pub fn map_device(&mut self, base: PAddr, len: PAddr, device: Box<dyn Device>) {
        log::info!(
            "add mmio map '{}' at [{:#010x}, {:#010x}]",
            device.name(),
            base,
            base as u64 + len as u64 - 1
        );
        self.windows.push(MmioWindow { base, len, device });
    }

    fn out_of_bound(&self, addr: PAddr) -> VmError {
        VmError::OutOfBound {
            addr,
            left: self.left(),
            right: self.right(),
            pc: 0,
        }
    }

    fn offset(&self, addr: PAddr) -> usize {
        (addr - self.base) as usize
    }

    pub fn read(&self, addr: PAddr, len: usize) -> Result<u64, VmError> {
        check_width(len)?;
        if self.in_pmem(addr, len) {
            let start = self.offset(addr);
            let mut buf = [0u8; 8];
            buf[..len].copy_from_slice(&self.bytes[start..start + len]);
            return Ok(u64::from_le_bytes(buf));
        }
        match self.windows.iter().find(|w| w.contains(addr, len)) {
            Some(window) => Ok(window.device.read(addr - window.base, len)),
            None => Err(self.out_of_bound(addr)),
        }
    }

    pub fn write(&mut self, addr: PAddr, len: usize, data: u64) -> Result<(), VmError> {
        check_width(len)?;
        if self.in_pmem(addr, len) {
            let start = self.offset(addr);
            self.bytes[start..start + len].copy_from_slice(&data.to_le_bytes()[..len]);
            return Ok(());
        }
        match self.windows.iter_mut().find(|w| w.contains(addr, len)) {
            Some(window) => {
                let offset = addr - window.base;
                window.device.write(offset, len, data);
                Ok(())
            }
            None => Err(self.out_of_bound(addr)),
        }
    }

    /// Copies a raw image into physical memory at `addr`.
    pub fn load(&mut self, image: &[u8], addr: PAddr) -> Result<(), VmError> {
        if image.is_empty() {
            return Ok(());
        }
        if !self.in_pmem(addr, image.len()) {
            let last = addr as u64 + image.len() as u64 - 1;
            let bad = if self.in_pmem(addr, 1) { last as PAddr } else { addr };
            return Err(self.out_of_bound(bad));
        }
        let start = self.offset(addr);
        self.bytes[start..start + image.len()].copy_from_slice(image);
        Ok(())
    }
}
