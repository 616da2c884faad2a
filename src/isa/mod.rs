//! RV32IMAC instruction descriptors, grouped one module per extension
//! (§4.5). [`descriptors`] concatenates all five lists in the order
//! [`crate::decode::DecodeTables::build`] expects: specific-before-general
//! only matters *within* a module's own overlapping encodings, so the
//! order the modules are concatenated in here doesn't itself matter.

pub mod fields;
pub mod rv32a;
pub mod rv32c;
pub mod rv32i;
pub mod rv32m;
pub mod system;

use crate::decode::Descriptor;

/// The full RV32IMAC descriptor list (99 entries), built once at
/// [`crate::hart::Hart::new`] time.
pub fn descriptors() -> Vec<Descriptor> {
    let mut all = Vec::with_capacity(
        rv32i::DESCRIPTORS.len()
            + system::DESCRIPTORS.len()
            + rv32m::DESCRIPTORS.len()
            + rv32a::DESCRIPTORS.len()
            + rv32c::DESCRIPTORS.len(),
    );
    all.extend_from_slice(rv32i::DESCRIPTORS);
    all.extend_from_slice(system::DESCRIPTORS);
    all.extend_from_slice(rv32m::DESCRIPTORS);
    all.extend_from_slice(rv32a::DESCRIPTORS);
    all.extend_from_slice(rv32c::DESCRIPTORS);
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ninety_nine_descriptors() {
        assert_eq!(descriptors().len(), 99);
    }
}
