//! Instruction field extraction shared by every RV32I/M/A/C handler.
//!
//! Base (32-bit) formats follow the standard R/I/S/B/U/J layout; the
//! compressed helpers at the bottom decode the scattered immediate
//! encodings used by the C extension (§4.5 "Compressed").

use crate::bits::{bit_sub, sign_extend};

pub fn opcode(instr: u32) -> u32 {
    bit_sub(instr, 0, 7)
}

pub fn rd(instr: u32) -> u8 {
    bit_sub(instr, 7, 5) as u8
}

pub fn rs1(instr: u32) -> u8 {
    bit_sub(instr, 15, 5) as u8
}

pub fn rs2(instr: u32) -> u8 {
    bit_sub(instr, 20, 5) as u8
}

pub fn funct3(instr: u32) -> u32 {
    bit_sub(instr, 12, 3)
}

pub fn funct7(instr: u32) -> u32 {
    bit_sub(instr, 25, 7)
}

pub fn funct5(instr: u32) -> u32 {
    bit_sub(instr, 27, 5)
}

/// I-type sign-extended 12-bit immediate.
pub fn imm_i(instr: u32) -> u32 {
    sign_extend(bit_sub(instr, 20, 12), 12)
}

/// S-type sign-extended 12-bit immediate.
pub fn imm_s(instr: u32) -> u32 {
    let hi = bit_sub(instr, 25, 7);
    let lo = bit_sub(instr, 7, 5);
    sign_extend((hi << 5) | lo, 12)
}

/// B-type sign-extended 13-bit immediate (bit 0 always zero).
pub fn imm_b(instr: u32) -> u32 {
    let b12 = bit_sub(instr, 31, 1);
    let b11 = bit_sub(instr, 7, 1);
    let b10_5 = bit_sub(instr, 25, 6);
    let b4_1 = bit_sub(instr, 8, 4);
    sign_extend((b12 << 12) | (b11 << 11) | (b10_5 << 5) | (b4_1 << 1), 13)
}

/// U-type immediate, already placed in bits 31:12 (not further sign-extended;
/// the top bit of the 20-bit field is bit 31, so the result is already the
/// correct 32-bit value).
pub fn imm_u(instr: u32) -> u32 {
    bit_sub(instr, 12, 20) << 12
}

/// J-type sign-extended 21-bit immediate (bit 0 always zero).
pub fn imm_j(instr: u32) -> u32 {
    let b20 = bit_sub(instr, 31, 1);
    let b19_12 = bit_sub(instr, 12, 8);
    let b11 = bit_sub(instr, 20, 1);
    let b10_1 = bit_sub(instr, 21, 10);
    sign_extend((b20 << 20) | (b19_12 << 12) | (b11 << 11) | (b10_1 << 1), 21)
}

/// Shift amount for OP-IMM shifts (bits 24:20; RV32 has no shamt[5]).
pub fn shamt(instr: u32) -> u32 {
    bit_sub(instr, 20, 5)
}

/// 12-bit CSR address (I-type immediate field, unsigned).
pub fn csr(instr: u32) -> u32 {
    bit_sub(instr, 20, 12)
}

/// 5-bit unsigned immediate used by CSRRWI/CSRRSI/CSRRCI (same field as rs1).
pub fn zimm(instr: u32) -> u32 {
    bit_sub(instr, 15, 5)
}

/// Map a compressed 3-bit register field to the full `x8..x15` range.
pub fn creg(field: u32) -> u8 {
    (field & 0b111) as u8 + 8
}

pub fn c_rd_rs1_prime(instr: u32) -> u8 {
    creg(bit_sub(instr, 7, 3))
}

pub fn c_rs2_prime(instr: u32) -> u8 {
    creg(bit_sub(instr, 2, 3))
}

/// The full 5-bit rd/rs1 field used by CR/CI-format instructions.
pub fn c_rd_rs1(instr: u32) -> u8 {
    bit_sub(instr, 7, 5) as u8
}

/// The full 5-bit rs2 field used by CR-format instructions.
pub fn c_rs2(instr: u32) -> u8 {
    bit_sub(instr, 2, 5) as u8
}

/// CIW-type immediate (C.ADDI4SPN): nzuimm[5:4|9:6|2|3], scaled by 4.
pub fn ciw_imm(instr: u32) -> u32 {
    let b5_4 = bit_sub(instr, 11, 2);
    let b9_6 = bit_sub(instr, 7, 4);
    let b2 = bit_sub(instr, 6, 1);
    let b3 = bit_sub(instr, 5, 1);
    (b9_6 << 6) | (b5_4 << 4) | (b3 << 3) | (b2 << 2)
}

/// CL/CS-type word immediate (C.LW/C.SW): uimm[5:3|2|6], scaled by 4.
pub fn cl_imm(instr: u32) -> u32 {
    let b5_3 = bit_sub(instr, 10, 3);
    let b2 = bit_sub(instr, 6, 1);
    let b6 = bit_sub(instr, 5, 1);
    (b6 << 6) | (b5_3 << 3) | (b2 << 2)
}

/// CI-type sign-extended 6-bit immediate (C.ADDI/C.LI/C.SLLI's shift amount
/// uses the unsigned form via [`ci_imm_unsigned`]).
pub fn ci_imm(instr: u32) -> u32 {
    let hi = bit_sub(instr, 12, 1);
    let lo = bit_sub(instr, 2, 5);
    sign_extend((hi << 5) | lo, 6)
}

/// CI-type 6-bit immediate, zero-extended (C.SLLI shift amount).
pub fn ci_imm_unsigned(instr: u32) -> u32 {
    let hi = bit_sub(instr, 12, 1);
    let lo = bit_sub(instr, 2, 5);
    (hi << 5) | lo
}

/// C.LUI's non-zero immediate, placed directly in bits 31:12 and
/// sign-extended from bit 17 (i.e. treat the 6-bit field as the top bits
/// of a 20-bit U-type immediate).
pub fn c_lui_imm(instr: u32) -> u32 {
    let hi = bit_sub(instr, 12, 1);
    let lo = bit_sub(instr, 2, 5);
    let imm18_12 = (hi << 5) | lo; // 6 bits, value's bits [17:12] shifted down by 12
    sign_extend(imm18_12 << 12, 18)
}

/// C.ADDI16SP's scaled, sign-extended immediate: nzimm[9|4|6|8:7|5], *16.
pub fn c_addi16sp_imm(instr: u32) -> u32 {
    let b9 = bit_sub(instr, 12, 1);
    let b4 = bit_sub(instr, 6, 1);
    let b6 = bit_sub(instr, 5, 1);
    let b8_7 = bit_sub(instr, 3, 2);
    let b5 = bit_sub(instr, 2, 1);
    sign_extend((b9 << 9) | (b8_7 << 7) | (b6 << 6) | (b5 << 5) | (b4 << 4), 10)
}

/// CJ-type sign-extended 12-bit jump-target immediate, *2.
pub fn cj_imm(instr: u32) -> u32 {
    let b11 = bit_sub(instr, 12, 1);
    let b4 = bit_sub(instr, 11, 1);
    let b9_8 = bit_sub(instr, 9, 2);
    let b10 = bit_sub(instr, 8, 1);
    let b6 = bit_sub(instr, 7, 1);
    let b7 = bit_sub(instr, 6, 1);
    let b3_1 = bit_sub(instr, 3, 3);
    let b5 = bit_sub(instr, 2, 1);
    let bits = (b11 << 11)
        | (b10 << 10)
        | (b9_8 << 8)
        | (b7 << 7)
        | (b6 << 6)
        | (b5 << 5)
        | (b4 << 4)
        | (b3_1 << 1);
    sign_extend(bits, 12)
}

/// CB-type sign-extended 9-bit branch-target immediate, *2.
pub fn cb_imm(instr: u32) -> u32 {
    let b8 = bit_sub(instr, 12, 1);
    let b4_3 = bit_sub(instr, 10, 2);
    let b7_6 = bit_sub(instr, 5, 2);
    let b2_1 = bit_sub(instr, 3, 2);
    let b5 = bit_sub(instr, 2, 1);
    let bits = (b8 << 8) | (b7_6 << 6) | (b5 << 5) | (b4_3 << 3) | (b2_1 << 1);
    sign_extend(bits, 9)
}

/// CB-type zero-extended 6-bit immediate (C.ANDI/C.SRLI/C.SRAI shift/andi operand).
pub fn cb_shift_imm(instr: u32) -> u32 {
    let hi = bit_sub(instr, 12, 1);
    let lo = bit_sub(instr, 2, 5);
    (hi << 5) | lo
}

/// CB-type sign-extended 6-bit immediate (C.ANDI's operand, unlike the shift
/// amount used by C.SRLI/C.SRAI, is sign-extended).
pub fn cb_andi_imm(instr: u32) -> u32 {
    sign_extend(cb_shift_imm(instr), 6)
}

/// CSS-type word-store immediate (C.SWSP): uimm[5:2|7:6], scaled by 4.
pub fn css_imm(instr: u32) -> u32 {
    let b5_2 = bit_sub(instr, 9, 4);
    let b7_6 = bit_sub(instr, 7, 2);
    (b7_6 << 6) | (b5_2 << 2)
}

/// CI-type word-load immediate (C.LWSP): uimm[5|4:2|7:6], scaled by 4.
pub fn c_lwsp_imm(instr: u32) -> u32 {
    let b5 = bit_sub(instr, 12, 1);
    let b4_2 = bit_sub(instr, 4, 3);
    let b7_6 = bit_sub(instr, 2, 2);
    (b7_6 << 6) | (b5 << 5) | (b4_2 << 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i_type_fields() {
        // addi x3, x1, 1 -> 0x00108193
        let instr = 0x0010_8193u32;
        assert_eq!(opcode(instr), 0b001_0011);
        assert_eq!(rd(instr), 3);
        assert_eq!(rs1(instr), 1);
        assert_eq!(funct3(instr), 0);
        assert_eq!(imm_i(instr), 1);
    }

    #[test]
    fn u_type_field() {
        // lui x1, 0x12345 -> 0x123450B7
        let instr = 0x1234_50B7u32;
        assert_eq!(imm_u(instr), 0x1234_5000);
    }

    #[test]
    fn j_type_field_self_jump() {
        // jal x0, 0 -> 0x0000006F
        assert_eq!(imm_j(0x0000_006F), 0);
    }

    #[test]
    fn ci_imm_sign_extends() {
        // c.li x1, -1 -> 0x50FD: imm bits = 111111
        assert_eq!(ci_imm(0x50FD), 0xffff_ffff);
    }

    #[test]
    fn creg_maps_to_x8_range() {
        assert_eq!(creg(0), 8);
        assert_eq!(creg(7), 15);
    }
}
