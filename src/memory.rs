use serde::{Deserialize, Serialize};

/// Read-only view of the host address space.
///
/// `None` means the address is not backed by any byte (outside every loaded
/// segment). The matcher never asks for more bytes than the instruction it
/// matched declares.
pub trait ByteSource {
    fn read_u8(&self, addr: u32) -> Option<u8>;

    /// Copy `out.len()` bytes starting at `addr`. Returns how many leading
    /// bytes were available; a short count means the stream ended.
    fn read_into(&self, addr: u32, out: &mut [u8]) -> usize {
        for (i, slot) in out.iter_mut().enumerate() {
            match self.read_u8(addr.wrapping_add(i as u32)) {
                Some(b) => *slot = b,
                None => return i,
            }
        }
        out.len()
    }
}

/// A single flat byte buffer mapped at `base`.
#[derive(Clone, Serialize, Deserialize)]
pub struct LinearMemory {
    pub mem: Vec<u8>,
    pub base: u32,
}

impl LinearMemory {
    pub fn new(size: usize) -> Self {
        Self {
            mem: vec![0; size],
            base: 0,
        }
    }

    fn offset(&self, addr: u32) -> Option<usize> {
        let off = addr.checked_sub(self.base)? as usize;
        (off < self.mem.len()).then_some(off)
    }

    pub fn write(&mut self, addr: u32, bytes: &[u8]) -> bool {
        let Some(off) = self.offset(addr) else { return false };
        if off + bytes.len() > self.mem.len() {
            return false;
        }
        self.mem[off..off + bytes.len()].copy_from_slice(bytes);
        true
    }
}

impl ByteSource for LinearMemory {
    fn read_u8(&self, addr: u32) -> Option<u8> {
        self.offset(addr).map(|off| self.mem[off])
    }
}

impl ByteSource for [u8] {
    fn read_u8(&self, addr: u32) -> Option<u8> {
        self.get(addr as usize).copied()
    }
}

impl<const N: usize> ByteSource for [u8; N] {
    fn read_u8(&self, addr: u32) -> Option<u8> {
        self.get(addr as usize).copied()
    }
}

impl ByteSource for Vec<u8> {
    fn read_u8(&self, addr: u32) -> Option<u8> {
        self.get(addr as usize).copied()
    }
}
