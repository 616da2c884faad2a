//! A reference [`HartPort`] implementation backing both the unit tests
//! throughout `isa/` and the `emulate` binary.
//!
//! Grounded on the teacher's `Memory` (`src/memory.rs`): a sparse
//! byte-addressed map rather than a flat array, since a simulated
//! address space is usually mostly unmapped. Everything this module
//! adds beyond memory — the CSR file, fence log, and LR/SC reservation
//! — are the concrete backing stores for the abstract channels
//! [`crate::port::HartPort`] declares.

use std::collections::HashMap;

use crate::port::{Channel, HartPort, PortError};

/// Number of low bits ignored by the fetch loop's page-straddle check.
/// 4 KiB pages, matching the teacher's PMA granularity.
const PGMASK: u32 = !0xfff;

/// A flat, single-hart platform: sparse memory, a CSR file addressed by
/// the full 12-bit CSR number, a fence-operand log, and a single LR/SC
/// reservation slot. Identity-maps virtual to physical addresses and
/// vectors every trap to address zero, which is enough to drive and
/// observe the core without modelling an MMU or PLIC.
pub struct SimplePort {
    memory: HashMap<u32, u8>,
    csrs: HashMap<u32, u32>,
    fence_log: [u32; 4],
    reservation: Option<u32>,
    last_trap: Option<(u32, u32)>,
    disass: Vec<(u32, String)>,
}

impl SimplePort {
    pub fn new() -> Self {
        SimplePort {
            memory: HashMap::new(),
            csrs: HashMap::new(),
            fence_log: [0; 4],
            reservation: None,
            last_trap: None,
            disass: Vec::new(),
        }
    }

    /// Seed memory at `addr` with `bytes`, little-endian-as-given
    /// (i.e. `bytes` is exactly what will be read back).
    pub fn load_bytes(&mut self, addr: u32, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.memory.insert(addr.wrapping_add(i as u32), *b);
        }
    }

    /// The `(cause, trap_id)` pair of the most recent call to
    /// [`HartPort::enter_trap`], or `None` if no trap has occurred yet.
    pub fn last_trap(&self) -> Option<(u32, u32)> {
        self.last_trap
    }

    /// The four fence-log slots written by FENCE/FENCE.I/SFENCE.VMA.
    pub fn fence_log(&self) -> [u32; 4] {
        self.fence_log
    }

    /// Text emitted via `disass_output`, oldest first.
    pub fn disass_log(&self) -> &[(u32, String)] {
        &self.disass
    }
}

impl Default for SimplePort {
    fn default() -> Self {
        Self::new()
    }
}

impl HartPort for SimplePort {
    fn pgmask(&self) -> u32 {
        PGMASK
    }

    fn v2p(&mut self, vaddr: u32) -> Result<u32, PortError> {
        Ok(vaddr)
    }

    fn read(&mut self, paddr: u32, dst: &mut [u8]) -> Result<(), PortError> {
        for (i, slot) in dst.iter_mut().enumerate() {
            *slot = *self.memory.get(&paddr.wrapping_add(i as u32)).unwrap_or(&0);
        }
        Ok(())
    }

    fn write(&mut self, paddr: u32, src: &[u8]) -> Result<(), PortError> {
        self.load_bytes(paddr, src);
        Ok(())
    }

    fn read_channel(&mut self, channel: Channel, key: u32) -> u32 {
        match channel {
            Channel::Csr => *self.csrs.get(&key).unwrap_or(&0),
            Channel::Fence => self.fence_log.get(key as usize).copied().unwrap_or(0),
            Channel::Res => match self.reservation {
                Some(addr) if addr == key => 0xffff_ffff,
                _ => 0,
            },
        }
    }

    fn write_channel(&mut self, channel: Channel, key: u32, word: u32) {
        match channel {
            Channel::Csr => {
                self.csrs.insert(key, word);
            }
            Channel::Fence => {
                if let Some(slot) = self.fence_log.get_mut(key as usize) {
                    *slot = word;
                }
            }
            Channel::Res => {
                self.reservation = if word == 0 { None } else { Some(key) };
            }
        }
    }

    fn enter_trap(&mut self, trap_state: u32, epc: u32) -> u32 {
        let (cause, trap_id) = crate::trap::unpack(trap_state);
        self.last_trap = Some((cause, trap_id));
        // Every trap lands in M-mode (no delegation modelled), so the
        // restored PC belongs in mepc: (3 << 8) | 0x41, matching what
        // `leave_trap_to(.., 3)` (MRET) reads back.
        self.csrs.insert(0x341, epc);
        self.reservation = None;
        0
    }

    fn leave_trap(&mut self, _level: u8) {
        self.reservation = None;
    }

    fn wait_until(&mut self, _kind: u32) {}

    fn disass_output(&mut self, pc: u32, text: &str) {
        self.disass.push((pc, text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_roundtrips() {
        let mut port = SimplePort::new();
        port.write(0x1000, &0xdead_beefu32.to_le_bytes()).unwrap();
        let mut buf = [0u8; 4];
        port.read(0x1000, &mut buf).unwrap();
        assert_eq!(u32::from_le_bytes(buf), 0xdead_beef);
    }

    #[test]
    fn unmapped_memory_reads_as_zero() {
        let mut port = SimplePort::new();
        let mut buf = [0xff; 4];
        port.read(0x5000, &mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 0]);
    }

    #[test]
    fn reservation_is_cleared_by_a_non_matching_write() {
        let mut port = SimplePort::new();
        port.write_channel(Channel::Res, 0x2000, 0xffff_ffff);
        assert_eq!(port.read_channel(Channel::Res, 0x2000), 0xffff_ffff);
        port.write_channel(Channel::Res, 0x2000, 0);
        assert_eq!(port.read_channel(Channel::Res, 0x2000), 0);
    }

    #[test]
    fn enter_trap_records_cause_and_trap_id() {
        let mut port = SimplePort::new();
        let packed = crate::trap::pack(crate::trap::TRAP_ID_ILLEGAL, crate::trap::CAUSE_ILLEGAL_INSTRUCTION);
        port.enter_trap(packed, 0x1000);
        assert_eq!(port.last_trap(), Some((crate::trap::CAUSE_ILLEGAL_INSTRUCTION, crate::trap::TRAP_ID_ILLEGAL)));
    }
}
