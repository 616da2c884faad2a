//! Decoder builder and decoder (§4.3, §4.4).
//!
//! Four quadrant tables are built once, at [`crate::hart::Hart::new`]
//! time, by expanding every descriptor's mask/value pair into every
//! table slot it matches. Lookup is then a single array index: compute
//! the quadrant from the instruction's low two bits, project the
//! instruction through that quadrant's reduced mask, and read the slot.

use thiserror::Error;

use crate::hart::Hart;
use crate::port::{HartPort, PortError};

use crate::bits::{expand_indices, popcount, project};

/// Raised by [`validate`] when a descriptor's own invariant is broken —
/// always a bug in this crate's static descriptor tables, never a
/// runtime condition, which is why [`crate::hart::Hart::new`] unwraps it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecoderBuildError {
    #[error("descriptor {name:?} has length {length} but sets bits outside its width (mask {mask:#010x})")]
    BitsOutsideWidth { name: &'static str, length: u8, mask: u32 },
}

/// Check the invariant from §3: a 16-bit descriptor's `value`/`mask`
/// must be zero in their high 16 bits.
pub fn validate(descriptors: &[Descriptor]) -> Result<(), DecoderBuildError> {
    for d in descriptors {
        if d.length == 16 && (d.value > 0xffff || d.mask > 0xffff) {
            return Err(DecoderBuildError::BitsOutsideWidth {
                name: d.name,
                length: d.length,
                mask: d.mask,
            });
        }
    }
    Ok(())
}

/// Handler signature shared by every instruction in the descriptor
/// table. `instr` is the raw 16- or 32-bit code word (16-bit code words
/// are zero-extended into the high half). A handler returns `Err` only
/// when a memory access it performed failed; that propagates straight
/// out of [`crate::hart::Hart::step`] and aborts the instruction before
/// TRAP_STATE is consulted or PC is committed.
pub type Handler = fn(&mut Hart, &mut dyn HartPort, instr: u32) -> Result<(), PortError>;

/// A single entry in the static instruction descriptor table.
#[derive(Clone, Copy)]
pub struct Descriptor {
    /// Encoded length in bits: 16 or 32.
    pub length: u8,
    /// The bit pattern that identifies this instruction once masked.
    pub value: u32,
    /// Which bits of `value` are significant for decode.
    pub mask: u32,
    pub handler: Handler,
    /// Mnemonic, used only for the optional disassembly hook.
    pub name: &'static str,
}

impl Descriptor {
    pub const fn new(length: u8, value: u32, mask: u32, handler: Handler, name: &'static str) -> Self {
        Descriptor { length, value, mask, handler, name }
    }
}

/// The four quadrant-indexed dense decode tables.
pub struct DecodeTables {
    tables: [Vec<Option<Descriptor>>; 4],
    /// Reduced (quadrant-select bits removed) mask used to project both
    /// table construction and lookup for each quadrant.
    quadrant_masks: [u32; 4],
}

impl DecodeTables {
    /// Build the dense tables from a descriptor list.
    ///
    /// Descriptors must be given specific-before-general within a
    /// quadrant where their patterns overlap: the builder writes a
    /// handler into a slot only if that slot is still empty, so a
    /// descriptor earlier in the list always wins a shared slot over
    /// one later in the list. See DESIGN.md for why this, rather than a
    /// popcount sort, is the collision-resolution discipline used here.
    pub fn build(descriptors: &[Descriptor]) -> Self {
        let mut quadrant_masks = [0u32; 4];
        for d in descriptors {
            let quadrant = (d.value & 0b11) as usize;
            quadrant_masks[quadrant] |= d.mask >> 2;
        }

        let mut tables: [Vec<Option<Descriptor>>; 4] = Default::default();
        for (q, m) in quadrant_masks.iter().enumerate() {
            let size = 1usize << popcount(*m);
            tables[q] = vec![None; size];
        }

        for d in descriptors {
            let quadrant = (d.value & 0b11) as usize;
            let universe = quadrant_masks[quadrant];
            let fixed = d.mask >> 2;
            let value = d.value >> 2;
            let table = &mut tables[quadrant];
            expand_indices(value, fixed, universe, &mut |idx| {
                let slot = &mut table[idx as usize];
                if slot.is_none() {
                    *slot = Some(*d);
                }
            });
        }

        DecodeTables { tables, quadrant_masks }
    }

    /// Resolve a fetched code word to its descriptor, or `None` for an
    /// illegal/unassigned encoding.
    pub fn lookup(&self, instr: u32) -> Option<Descriptor> {
        let quadrant = (instr & 0b11) as usize;
        let index = project(instr >> 2, self.quadrant_masks[quadrant]);
        self.tables[quadrant][index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hart::Hart;
    use crate::port::HartPort;

    fn noop_handler(hart: &mut Hart, _port: &mut dyn HartPort, _instr: u32) -> Result<(), PortError> {
        hart.next_pc = hart.pc.wrapping_add(4);
        hart.pc = hart.next_pc;
        Ok(())
    }

    fn other_handler(hart: &mut Hart, _port: &mut dyn HartPort, _instr: u32) -> Result<(), PortError> {
        hart.next_pc = hart.pc.wrapping_add(2);
        hart.pc = hart.next_pc;
        Ok(())
    }

    #[test]
    fn specific_wins_over_general_when_listed_first() {
        // Quadrant 3 (32-bit). General: opcode only. Specific: opcode + one more bit forced.
        let descriptors = [
            Descriptor::new(32, 0b11 | (1 << 10), 0b11 | (1 << 10), noop_handler, "specific"),
            Descriptor::new(32, 0b11, 0b11, other_handler, "general"),
        ];
        let tables = DecodeTables::build(&descriptors);
        let specific_instr: u32 = 0b11 | (1 << 10);
        let general_instr: u32 = 0b11; // bit 10 = 0
        assert_eq!(tables.lookup(specific_instr).map(|d| d.name), Some("specific"));
        assert_eq!(tables.lookup(general_instr).map(|d| d.name), Some("general"));
    }

    #[test]
    fn validate_accepts_the_real_descriptor_table() {
        assert_eq!(validate(&crate::isa::descriptors()), Ok(()));
    }

    #[test]
    fn validate_rejects_a_16_bit_descriptor_with_high_bits_set() {
        let bad = [Descriptor::new(16, 0x1_0000, 0xffff, noop_handler, "bogus")];
        assert_eq!(
            validate(&bad),
            Err(DecoderBuildError::BitsOutsideWidth { name: "bogus", length: 16, mask: 0xffff })
        );
    }

    #[test]
    fn unmatched_slot_is_none() {
        let descriptors = [Descriptor::new(32, 0b11, 0b11, noop_handler, "only")];
        let tables = DecodeTables::build(&descriptors);
        // With only one descriptor and mask covering just the quadrant bits,
        // there's only one slot in quadrant 3 and it's claimed.
        assert!(tables.lookup(0b11).is_some());
        // Quadrant 0 has no descriptors at all -> zero-size table, index 0.
        assert!(tables.lookup(0b00).is_none());
    }
}
