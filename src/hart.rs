//! The hart: architectural state plus the fetch/execute loop (§3, §4.7).
//!
//! `Hart` owns no memory and no CSR file — those live behind a
//! [`HartPort`] the caller supplies to [`Hart::step`]. What it owns is
//! exactly the state §3 names: the register file, PC/NEXT_PC,
//! LAST_BRANCH, TRAP_STATE, and the decode tables built once at
//! construction time.

use crate::decode::{self, DecodeTables};
use crate::isa;
use crate::port::{Channel, HartPort, PortError};
use crate::trap;

/// LAST_BRANCH value for an ordinary sequential instruction.
pub const BRANCH_SEQUENTIAL: u32 = 0;
/// LAST_BRANCH value for a taken direct branch/jump to a statically known target.
pub const BRANCH_TAKEN_DIRECT: u32 = 1;
/// LAST_BRANCH value for an indirect jump or trap entry.
pub const BRANCH_INDIRECT_OR_TRAP: u32 = 0xFFFF_FFFF;

/// 32-bit encoding of `j .` (`jal x0, 0`) — the simulation-stop sentinel.
pub const STOP_SENTINEL_32: u32 = 0x0000_006F;
/// 16-bit encoding of `c.j .` — the compressed simulation-stop sentinel.
pub const STOP_SENTINEL_16: u32 = 0xA001;

/// How much extra state-consistency checking the fetch/execute loop
/// performs around each instruction (§6). `None` is the fast path and
/// what every existing test in this crate runs with; the other levels
/// are a hook for a future debug build rather than anything `step`
/// branches on today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncLevel {
    #[default]
    None,
    Pre,
    Post,
    All,
}

/// Behaviour knobs threaded into [`Hart::with_config`] (§6): whether the
/// disassembly hook fires, how aggressively to cross-check state, and a
/// debug-enable flag consumed by the `emulate` binary's stepper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HartConfig {
    pub disass_enabled: bool,
    pub sync_level: SyncLevel,
    pub debug_enabled: bool,
}

/// Outcome of a single [`Hart::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The instruction executed (possibly entering a trap internally);
    /// the loop should keep calling `step`.
    Continue,
    /// A stop-sentinel encoding was fetched; execution should end normally.
    Stopped,
}

/// A single hardware thread executing RV32IMAC.
///
/// `registers[0]` always reads zero; [`Hart::set_x`] silently discards
/// writes to it, matching the teacher's `Registers` invariant.
pub struct Hart {
    pub registers: [u32; 32],
    pub pc: u32,
    pub next_pc: u32,
    pub last_branch: u32,
    pub trap_state: u32,
    tables: DecodeTables,
    config: HartConfig,
}

impl Hart {
    /// Build a hart with all registers and PC at zero, the decode tables
    /// expanded from the full RV32IMAC descriptor list, and the default
    /// (all-disabled) [`HartConfig`]. Use [`Hart::with_config`] to enable
    /// the disassembly hook or a non-default sync level.
    pub fn new() -> Self {
        Hart::with_config(HartConfig::default())
    }

    /// As [`Hart::new`], with an explicit [`HartConfig`].
    pub fn with_config(config: HartConfig) -> Self {
        let descriptors = isa::descriptors();
        decode::validate(&descriptors).expect("static descriptor table is malformed");
        Hart {
            registers: [0; 32],
            pc: 0,
            next_pc: 0,
            last_branch: BRANCH_SEQUENTIAL,
            trap_state: 0,
            tables: DecodeTables::build(&descriptors),
            config,
        }
    }

    /// Start execution at a given address, state otherwise as [`Hart::new`].
    pub fn at(pc: u32) -> Self {
        let mut hart = Hart::new();
        hart.pc = pc;
        hart
    }

    /// Read a general-purpose register; `x0` always reads zero.
    pub fn x(&self, n: u8) -> u32 {
        self.registers[n as usize]
    }

    /// Write a general-purpose register; writes to `x0` are discarded.
    pub fn set_x(&mut self, n: u8, value: u32) {
        if n != 0 {
            self.registers[n as usize] = value;
        }
    }

    /// Compose and latch a pending trap (§4.6). Leaves `NEXT_PC` at the
    /// sentinel so the post-handler check never advances PC into the
    /// faulting instruction; the fetch loop replaces it with whatever
    /// `enter_trap` returns before committing.
    pub fn raise_trap(&mut self, trap_id: u32, cause: u32) {
        self.trap_state = trap::pack(trap_id, cause);
        self.next_pc = trap::NEXT_PC_TRAP_SENTINEL;
    }

    /// Read a CSR through the port's CSR channel.
    pub fn read_csr(&self, port: &mut dyn HartPort, csr: u32) -> u32 {
        port.read_channel(Channel::Csr, csr)
    }

    /// Write a CSR through the port's CSR channel.
    pub fn write_csr(&self, port: &mut dyn HartPort, csr: u32, value: u32) {
        port.write_channel(Channel::Csr, csr, value);
    }

    /// Run one fetch/decode/dispatch/execute cycle (§4.7).
    ///
    /// Returns `Ok(StepOutcome::Stopped)` on a stop sentinel without
    /// mutating PC further, `Ok(StepOutcome::Continue)` after an
    /// ordinary or trapping instruction has committed its new PC, and
    /// `Err` if a memory access (fetch, or one issued by the handler)
    /// failed — per §7, hart state is indeterminate after that and the
    /// caller owns recovery.
    pub fn step(&mut self, port: &mut dyn HartPort) -> Result<StepOutcome, PortError> {
        let start_pc = self.pc;
        let instr = self.fetch(port)?;

        let is_32bit = instr & 0b11 == 0b11;
        if (is_32bit && instr == STOP_SENTINEL_32) || (!is_32bit && instr == STOP_SENTINEL_16) {
            return Ok(StepOutcome::Stopped);
        }

        let descriptor = self.tables.lookup(instr);
        if self.config.disass_enabled {
            let name = descriptor.map(|d| d.name).unwrap_or("<illegal>");
            port.disass_output(start_pc, &format!("{name:<10}{instr:#010x}"));
        }
        match descriptor {
            Some(d) => (d.handler)(self, port, instr)?,
            None => illegal_instruction(self, instr),
        }

        if self.trap_state != 0 {
            self.last_branch = BRANCH_INDIRECT_OR_TRAP;
            let vector = port.enter_trap(self.trap_state, start_pc);
            self.trap_state = 0;
            self.next_pc = vector;
        }
        self.pc = self.next_pc;

        Ok(StepOutcome::Continue)
    }

    /// Page-straddle-aware instruction fetch (§4.7 step 1-2). Returns the
    /// code word at its natural width: a 32-bit instruction's full four
    /// bytes, or a 16-bit instruction zero-extended into a `u32`.
    fn fetch(&mut self, port: &mut dyn HartPort) -> Result<u32, PortError> {
        let pgmask = port.pgmask();
        let pc = self.pc;
        let crosses_page = (pc & !pgmask) != (pc.wrapping_add(2) & !pgmask);

        if crosses_page {
            let paddr_lo = port.v2p(pc)?;
            let mut lo = [0u8; 2];
            port.read(paddr_lo, &mut lo)?;
            let half = u16::from_le_bytes(lo) as u32;
            if half & 0b11 == 0b11 {
                let paddr_hi = port.v2p(pc.wrapping_add(2))?;
                let mut hi = [0u8; 2];
                port.read(paddr_hi, &mut hi)?;
                let upper = u16::from_le_bytes(hi) as u32;
                Ok(half | (upper << 16))
            } else {
                Ok(half)
            }
        } else {
            let paddr = port.v2p(pc)?;
            let mut word = [0u8; 4];
            port.read(paddr, &mut word)?;
            let full = u32::from_le_bytes(word);
            if full & 0b11 == 0b11 {
                Ok(full)
            } else {
                Ok(full & 0xffff)
            }
        }
    }
}

impl Default for Hart {
    fn default() -> Self {
        Hart::new()
    }
}

/// Installed in place of a null decode-table slot (§4.4, §7). Raises a
/// plain illegal-instruction trap; `step`'s trap epilogue takes care of
/// PC (the faulting instruction's own length is irrelevant once
/// `enter_trap`'s vector overwrites NEXT_PC).
fn illegal_instruction(hart: &mut Hart, _instr: u32) {
    hart.raise_trap(trap::TRAP_ID_ILLEGAL, trap::CAUSE_ILLEGAL_INSTRUCTION);
}

/// Sign-extend helper shared by the ISA modules; re-exported here so
/// handler code reads `hart::sign_extend` alongside the register helpers
/// it otherwise calls through `hart`.
pub use crate::bits::sign_extend;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::SimplePort;

    fn write_word(port: &mut SimplePort, addr: u32, word: u32) {
        port.load_bytes(addr, &word.to_le_bytes());
    }

    fn write_half(port: &mut SimplePort, addr: u32, half: u16) {
        port.load_bytes(addr, &half.to_le_bytes());
    }

    #[test]
    fn check_lui() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        // lui x1, 0x12345
        write_word(&mut port, 0x1000, 0x12345_0B7);
        hart.step(&mut port).unwrap();
        assert_eq!(hart.x(1), 0x12345000);
        assert_eq!(hart.pc, 0x1004);
    }

    #[test]
    fn check_addi_sltiu_unsigned_compare() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        // addi x2, x0, -1
        write_word(&mut port, 0x1000, 0xFFF0_0113);
        // sltiu x3, x2, 1
        write_word(&mut port, 0x1004, 0x0011_3193);
        hart.step(&mut port).unwrap();
        assert_eq!(hart.x(2), 0xFFFF_FFFF);
        hart.step(&mut port).unwrap();
        assert_eq!(hart.x(3), 0);
        assert_eq!(hart.pc, 0x1008);
    }

    #[test]
    fn check_div_overflow_special_case() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        hart.set_x(6, 0x8000_0000);
        hart.set_x(7, 0xFFFF_FFFF);
        // div x5, x6, x7
        write_word(&mut port, 0x1000, 0x0273_42B3);
        hart.step(&mut port).unwrap();
        assert_eq!(hart.x(5), 0x8000_0000);
        // rem x5, x6, x7
        write_word(&mut port, 0x1004, 0x0273_62B3);
        hart.step(&mut port).unwrap();
        assert_eq!(hart.x(5), 0);
    }

    #[test]
    fn check_compressed_li_negative_one() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        // c.li x1, -1
        write_half(&mut port, 0x1000, 0x50FD);
        hart.step(&mut port).unwrap();
        assert_eq!(hart.x(1), 0xFFFF_FFFF);
        assert_eq!(hart.pc, 0x1002);
    }

    #[test]
    fn check_lr_sc_pair_succeeds() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        hart.set_x(2, 0x2000);
        write_word(&mut port, 0x2000, 7);
        // lr.w x1, (x2)
        write_word(&mut port, 0x1000, 0x1001_20AF);
        // addi x3, x1, 1
        write_word(&mut port, 0x1004, 0x0010_8193);
        // sc.w x4, x3, (x2)
        write_word(&mut port, 0x1008, 0x1831_222F);
        hart.step(&mut port).unwrap();
        assert_eq!(hart.x(1), 7);
        hart.step(&mut port).unwrap();
        assert_eq!(hart.x(3), 8);
        hart.step(&mut port).unwrap();
        assert_eq!(hart.x(4), 0);
        let mut readback = [0u8; 4];
        port.read(0x2000, &mut readback).unwrap();
        assert_eq!(u32::from_le_bytes(readback), 8);
    }

    #[test]
    fn check_jal_self_stops_simulation() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        write_word(&mut port, 0x1000, STOP_SENTINEL_32);
        let outcome = hart.step(&mut port).unwrap();
        assert_eq!(outcome, StepOutcome::Stopped);
        // PC must not have advanced into the sentinel's "target".
        assert_eq!(hart.pc, 0x1000);
    }

    #[test]
    fn x0_write_is_discarded() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        // addi x0, x0, 5
        write_word(&mut port, 0x1000, 0x0050_0013);
        hart.step(&mut port).unwrap();
        assert_eq!(hart.x(0), 0);
    }

    #[test]
    fn null_decode_slot_raises_illegal_instruction() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        // A reserved 32-bit opcode: all ones is not assigned by any descriptor.
        write_word(&mut port, 0x1000, 0xFFFF_FFFF);
        hart.step(&mut port).unwrap();
        assert_eq!(port.last_trap(), Some((trap::CAUSE_ILLEGAL_INSTRUCTION, trap::TRAP_ID_ILLEGAL)));
    }

    #[test]
    fn disassembly_hook_fires_only_when_enabled() {
        let config = HartConfig { disass_enabled: true, ..HartConfig::default() };
        let mut hart = Hart::with_config(config);
        hart.pc = 0x1000;
        let mut port = SimplePort::new();
        write_word(&mut port, 0x1000, 0x12345_0B7); // lui x1, 0x12345
        hart.step(&mut port).unwrap();
        assert_eq!(port.disass_log().len(), 1);
        assert_eq!(port.disass_log()[0].0, 0x1000);
        assert!(port.disass_log()[0].1.starts_with("lui"));
    }

    #[test]
    fn disassembly_hook_is_silent_by_default() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        write_word(&mut port, 0x1000, 0x12345_0B7);
        hart.step(&mut port).unwrap();
        assert!(port.disass_log().is_empty());
    }

    #[test]
    fn shift_amount_above_31_is_illegal() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        // slli x1, x1, 32 encoded with shamt field = 32 (bit 25 set) - reserved.
        write_word(&mut port, 0x1000, 0x0200_9093);
        hart.step(&mut port).unwrap();
        assert_eq!(port.last_trap(), Some((trap::CAUSE_ILLEGAL_INSTRUCTION, trap::TRAP_ID_ILLEGAL)));
    }
}
