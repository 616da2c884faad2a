//! The hart collaborator interface (§6 of the design).
//!
//! The core is written entirely against this trait: it owns no memory,
//! no CSR file, and no trap-vector policy. A concrete platform (the
//! `demo` module in this crate, or a real platform elsewhere) implements
//! it once and drives a [`crate::hart::Hart`] with it.
use thiserror::Error;

/// The abstract channels a port exposes beyond raw memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// 12-bit CSR number as the key.
    Csr,
    /// Keys 0..=3: data-fence operands, i-fence immediate, sfence.rs1, sfence.rs2.
    Fence,
    /// Load-reserved / store-conditional reservation state, keyed by
    /// effective address. Reads return 0 ("no reservation") or
    /// `0xFFFF_FFFF` ("reserved"); writes set or clear the reservation.
    Res,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PortError {
    #[error("bus access fault at physical address {0:#010x}")]
    AccessFault(u32),
}

/// External collaborator consumed by [`crate::hart::Hart`]. See §6.
///
/// Kept object-safe (no generics, no associated consts) so the decode
/// table's handler function pointers have a single concrete type:
/// `fn(&mut Hart, &mut dyn HartPort, u32)`, independent of which port
/// implementation is in use.
pub trait HartPort {
    /// The page mask used by the fetch loop's straddle check.
    fn pgmask(&self) -> u32;

    /// Translate a virtual address to a physical one.
    fn v2p(&mut self, vaddr: u32) -> Result<u32, PortError>;

    /// Read `dst.len()` bytes (little-endian) from physical memory.
    fn read(&mut self, paddr: u32, dst: &mut [u8]) -> Result<(), PortError>;

    /// Write `src` (little-endian) to physical memory.
    fn write(&mut self, paddr: u32, src: &[u8]) -> Result<(), PortError>;

    /// Read a word from an abstract channel.
    fn read_channel(&mut self, channel: Channel, key: u32) -> u32;

    /// Write a word to an abstract channel.
    fn write_channel(&mut self, channel: Channel, key: u32, word: u32);

    /// Called once per instruction when `TRAP_STATE` becomes non-zero.
    /// `trap_state` is the packed field (see [`crate::trap`]); `epc` is
    /// the PC of the trapping instruction. Returns the trap-vector
    /// address the core should resume fetching from; the core has no
    /// notion of vector base or privilege level itself.
    fn enter_trap(&mut self, trap_state: u32, epc: u32) -> u32;

    /// Called by xRET handlers before they read the restored PC back
    /// out of the CSR channel.
    fn leave_trap(&mut self, level: u8);

    /// Called by WFI to park the hart until an interrupt of `kind` is
    /// pending (1 = ordinary WFI wait). May block the calling thread.
    fn wait_until(&mut self, kind: u32);

    /// Optional observability sink; only called when disassembly is on.
    fn disass_output(&mut self, pc: u32, text: &str);
}
