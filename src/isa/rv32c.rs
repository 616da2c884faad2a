//! C-extension: 16-bit compressed instructions (§4.5 "Compressed").
//!
//! Every handler here expands to the same architectural effect as its
//! base-ISA counterpart, advancing PC by 2 instead of 4. Register
//! fields in the compact subset (suffixed `_prime` below) address
//! `x8..x15` by adding 8 to a 3-bit field; CR/CI-format instructions
//! that can name any register use the full 5-bit field instead.

use crate::decode::Descriptor;
use crate::hart::{Hart, BRANCH_INDIRECT_OR_TRAP, BRANCH_SEQUENTIAL, BRANCH_TAKEN_DIRECT};
use crate::isa::fields::*;
use crate::port::{HartPort, PortError};
use crate::trap;

const Q0: u32 = 0b00;
const Q1: u32 = 0b01;
const Q2: u32 = 0b10;
const QUADRANT_MASK: u32 = 0b11;
const F3_MASK: u32 = 0b111 << 13;

fn reserved_compressed(hart: &mut Hart) {
    hart.raise_trap(trap::TRAP_ID_ILLEGAL_COMPRESSED, trap::CAUSE_ILLEGAL_INSTRUCTION);
}

fn c_addi4spn(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let imm = ciw_imm(instr);
    if imm == 0 {
        reserved_compressed(hart);
        return Ok(());
    }
    let rd = c_rs2_prime(instr);
    hart.set_x(rd, hart.x(2).wrapping_add(imm));
    Ok(())
}

fn c_lw(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rs1 = c_rd_rs1_prime(instr);
    let rd = c_rs2_prime(instr);
    let addr = hart.x(rs1).wrapping_add(cl_imm(instr));
    let paddr = port.v2p(addr)?;
    let mut buf = [0u8; 4];
    port.read(paddr, &mut buf)?;
    hart.set_x(rd, u32::from_le_bytes(buf));
    Ok(())
}

fn c_sw(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rs1 = c_rd_rs1_prime(instr);
    let rs2 = c_rs2_prime(instr);
    let addr = hart.x(rs1).wrapping_add(cl_imm(instr));
    let paddr = port.v2p(addr)?;
    port.write(paddr, &hart.x(rs2).to_le_bytes())?;
    Ok(())
}

fn c_nop(hart: &mut Hart, _port: &mut dyn HartPort, _instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    Ok(())
}

fn c_addi(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1(instr);
    hart.set_x(rd, hart.x(rd).wrapping_add(ci_imm(instr)));
    Ok(())
}

fn c_jal(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    let link = hart.pc.wrapping_add(2);
    let target = hart.pc.wrapping_add(cj_imm(instr));
    hart.set_x(1, link);
    hart.next_pc = target;
    hart.last_branch = if target != hart.pc { BRANCH_TAKEN_DIRECT } else { BRANCH_SEQUENTIAL };
    Ok(())
}

fn c_li(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1(instr);
    if rd == 0 {
        reserved_compressed(hart);
        return Ok(());
    }
    hart.set_x(rd, ci_imm(instr));
    Ok(())
}

fn c_addi16sp(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    hart.set_x(2, hart.x(2).wrapping_add(c_addi16sp_imm(instr)));
    Ok(())
}

fn c_lui(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1(instr);
    let imm = c_lui_imm(instr);
    if rd == 0 || imm == 0 {
        reserved_compressed(hart);
        return Ok(());
    }
    hart.set_x(rd, imm);
    Ok(())
}

fn c_srli(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1_prime(instr);
    let shamt = cb_shift_imm(instr) & 0x1f;
    hart.set_x(rd, hart.x(rd) >> shamt);
    Ok(())
}

fn c_srai(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1_prime(instr);
    let shamt = cb_shift_imm(instr) & 0x1f;
    hart.set_x(rd, ((hart.x(rd) as i32) >> shamt) as u32);
    Ok(())
}

fn c_andi(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1_prime(instr);
    hart.set_x(rd, hart.x(rd) & cb_andi_imm(instr));
    Ok(())
}

fn c_sub(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1_prime(instr);
    let rs2 = c_rs2_prime(instr);
    hart.set_x(rd, hart.x(rd).wrapping_sub(hart.x(rs2)));
    Ok(())
}

fn c_xor(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1_prime(instr);
    let rs2 = c_rs2_prime(instr);
    hart.set_x(rd, hart.x(rd) ^ hart.x(rs2));
    Ok(())
}

fn c_or(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1_prime(instr);
    let rs2 = c_rs2_prime(instr);
    hart.set_x(rd, hart.x(rd) | hart.x(rs2));
    Ok(())
}

fn c_and(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1_prime(instr);
    let rs2 = c_rs2_prime(instr);
    hart.set_x(rd, hart.x(rd) & hart.x(rs2));
    Ok(())
}

fn c_j(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    let target = hart.pc.wrapping_add(cj_imm(instr));
    hart.next_pc = target;
    hart.last_branch = if target != hart.pc { BRANCH_TAKEN_DIRECT } else { BRANCH_SEQUENTIAL };
    Ok(())
}

fn c_beqz(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    let rs1 = c_rd_rs1_prime(instr);
    if hart.x(rs1) == 0 {
        let target = hart.pc.wrapping_add(cb_imm(instr));
        hart.next_pc = target;
        hart.last_branch = if target != hart.pc { BRANCH_TAKEN_DIRECT } else { BRANCH_SEQUENTIAL };
    } else {
        hart.next_pc = hart.pc.wrapping_add(2);
        hart.last_branch = BRANCH_SEQUENTIAL;
    }
    Ok(())
}

fn c_bnez(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    let rs1 = c_rd_rs1_prime(instr);
    if hart.x(rs1) != 0 {
        let target = hart.pc.wrapping_add(cb_imm(instr));
        hart.next_pc = target;
        hart.last_branch = if target != hart.pc { BRANCH_TAKEN_DIRECT } else { BRANCH_SEQUENTIAL };
    } else {
        hart.next_pc = hart.pc.wrapping_add(2);
        hart.last_branch = BRANCH_SEQUENTIAL;
    }
    Ok(())
}

fn c_slli(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1(instr);
    if rd == 0 {
        reserved_compressed(hart);
        return Ok(());
    }
    let shamt = ci_imm_unsigned(instr) & 0x1f;
    hart.set_x(rd, hart.x(rd) << shamt);
    Ok(())
}

fn c_lwsp(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1(instr);
    let addr = hart.x(2).wrapping_add(c_lwsp_imm(instr));
    let paddr = port.v2p(addr)?;
    let mut buf = [0u8; 4];
    port.read(paddr, &mut buf)?;
    hart.set_x(rd, u32::from_le_bytes(buf));
    Ok(())
}

fn c_jr(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    let rs1 = c_rd_rs1(instr);
    hart.next_pc = hart.x(rs1) & !1u32;
    hart.last_branch = BRANCH_INDIRECT_OR_TRAP;
    Ok(())
}

fn c_mv(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1(instr);
    let rs2 = c_rs2(instr);
    hart.set_x(rd, hart.x(rs2));
    Ok(())
}

fn c_ebreak(hart: &mut Hart, _port: &mut dyn HartPort, _instr: u32) -> Result<(), PortError> {
    hart.raise_trap(0, trap::CAUSE_BREAKPOINT);
    Ok(())
}

fn c_jalr(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    let rs1 = c_rd_rs1(instr);
    let link = hart.pc.wrapping_add(2);
    let target = hart.x(rs1) & !1u32;
    hart.set_x(1, link);
    hart.next_pc = target;
    hart.last_branch = BRANCH_INDIRECT_OR_TRAP;
    Ok(())
}

fn c_add(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rd = c_rd_rs1(instr);
    let rs2 = c_rs2(instr);
    hart.set_x(rd, hart.x(rd).wrapping_add(hart.x(rs2)));
    Ok(())
}

fn c_swsp(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(2);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let rs2 = c_rs2(instr);
    let addr = hart.x(2).wrapping_add(css_imm(instr));
    let paddr = port.v2p(addr)?;
    port.write(paddr, &hart.x(rs2).to_le_bytes())?;
    Ok(())
}

fn dii(hart: &mut Hart, _port: &mut dyn HartPort, _instr: u32) -> Result<(), PortError> {
    reserved_compressed(hart);
    Ok(())
}

pub const DESCRIPTORS: &[Descriptor] = &[
    // DII must be listed before C.ADDI4SPN: both match the all-zero word,
    // and DII's fully-pinned mask should win that one slot.
    Descriptor::new(16, 0x0000, 0xffff, dii, "dii"),
    Descriptor::new(16, Q0 | (0b000 << 13), QUADRANT_MASK | F3_MASK, c_addi4spn, "c.addi4spn"),
    Descriptor::new(16, Q0 | (0b010 << 13), QUADRANT_MASK | F3_MASK, c_lw, "c.lw"),
    Descriptor::new(16, Q0 | (0b110 << 13), QUADRANT_MASK | F3_MASK, c_sw, "c.sw"),
    Descriptor::new(
        16,
        Q1,
        QUADRANT_MASK | F3_MASK | (0x1f << 7) | (1 << 12) | (0x1f << 2),
        c_nop,
        "c.nop",
    ),
    Descriptor::new(16, Q1 | (0b000 << 13), QUADRANT_MASK | F3_MASK, c_addi, "c.addi"),
    Descriptor::new(16, Q1 | (0b001 << 13), QUADRANT_MASK | F3_MASK, c_jal, "c.jal"),
    Descriptor::new(16, Q1 | (0b010 << 13), QUADRANT_MASK | F3_MASK, c_li, "c.li"),
    Descriptor::new(
        16,
        Q1 | (0b011 << 13) | (2 << 7),
        QUADRANT_MASK | F3_MASK | (0x1f << 7),
        c_addi16sp,
        "c.addi16sp",
    ),
    Descriptor::new(16, Q1 | (0b011 << 13), QUADRANT_MASK | F3_MASK, c_lui, "c.lui"),
    Descriptor::new(
        16,
        Q1 | (0b100 << 13) | (0b00 << 10),
        QUADRANT_MASK | F3_MASK | (0b11 << 10),
        c_srli,
        "c.srli",
    ),
    Descriptor::new(
        16,
        Q1 | (0b100 << 13) | (0b01 << 10),
        QUADRANT_MASK | F3_MASK | (0b11 << 10),
        c_srai,
        "c.srai",
    ),
    Descriptor::new(
        16,
        Q1 | (0b100 << 13) | (0b10 << 10),
        QUADRANT_MASK | F3_MASK | (0b11 << 10),
        c_andi,
        "c.andi",
    ),
    Descriptor::new(
        16,
        Q1 | (0b100 << 13) | (0b11 << 10) | (0b00 << 5),
        QUADRANT_MASK | F3_MASK | (0b11 << 10) | (1 << 12) | (0b11 << 5),
        c_sub,
        "c.sub",
    ),
    Descriptor::new(
        16,
        Q1 | (0b100 << 13) | (0b11 << 10) | (0b01 << 5),
        QUADRANT_MASK | F3_MASK | (0b11 << 10) | (1 << 12) | (0b11 << 5),
        c_xor,
        "c.xor",
    ),
    Descriptor::new(
        16,
        Q1 | (0b100 << 13) | (0b11 << 10) | (0b10 << 5),
        QUADRANT_MASK | F3_MASK | (0b11 << 10) | (1 << 12) | (0b11 << 5),
        c_or,
        "c.or",
    ),
    Descriptor::new(
        16,
        Q1 | (0b100 << 13) | (0b11 << 10) | (0b11 << 5),
        QUADRANT_MASK | F3_MASK | (0b11 << 10) | (1 << 12) | (0b11 << 5),
        c_and,
        "c.and",
    ),
    Descriptor::new(16, Q1 | (0b101 << 13), QUADRANT_MASK | F3_MASK, c_j, "c.j"),
    Descriptor::new(16, Q1 | (0b110 << 13), QUADRANT_MASK | F3_MASK, c_beqz, "c.beqz"),
    Descriptor::new(16, Q1 | (0b111 << 13), QUADRANT_MASK | F3_MASK, c_bnez, "c.bnez"),
    Descriptor::new(16, Q2 | (0b000 << 13), QUADRANT_MASK | F3_MASK, c_slli, "c.slli"),
    Descriptor::new(16, Q2 | (0b010 << 13), QUADRANT_MASK | F3_MASK, c_lwsp, "c.lwsp"),
    Descriptor::new(
        16,
        Q2 | (0b100 << 13),
        QUADRANT_MASK | F3_MASK | (1 << 12) | (0x1f << 2),
        c_jr,
        "c.jr",
    ),
    Descriptor::new(
        16,
        Q2 | (0b100 << 13),
        QUADRANT_MASK | F3_MASK | (1 << 12),
        c_mv,
        "c.mv",
    ),
    Descriptor::new(
        16,
        Q2 | (0b100 << 13) | (1 << 12),
        QUADRANT_MASK | F3_MASK | (1 << 12) | (0x1f << 7) | (0x1f << 2),
        c_ebreak,
        "c.ebreak",
    ),
    Descriptor::new(
        16,
        Q2 | (0b100 << 13) | (1 << 12),
        QUADRANT_MASK | F3_MASK | (1 << 12) | (0x1f << 2),
        c_jalr,
        "c.jalr",
    ),
    Descriptor::new(
        16,
        Q2 | (0b100 << 13) | (1 << 12),
        QUADRANT_MASK | F3_MASK | (1 << 12),
        c_add,
        "c.add",
    ),
    Descriptor::new(16, Q2 | (0b110 << 13), QUADRANT_MASK | F3_MASK, c_swsp, "c.swsp"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::SimplePort;

    fn exec(hart: &mut Hart, port: &mut SimplePort, instr: u32) {
        let d = crate::isa::descriptors();
        let tables = crate::decode::DecodeTables::build(&d);
        let handler = tables.lookup(instr).expect("instruction should decode").handler;
        handler(hart, port, instr).unwrap();
        if hart.trap_state == 0 {
            hart.pc = hart.next_pc;
        }
    }

    #[test]
    fn c_li_encodes_negative_one() {
        let mut hart = Hart::at(0);
        let mut port = SimplePort::new();
        // c.li x1, -1 -> 0x50FD
        exec(&mut hart, &mut port, 0x50FD);
        assert_eq!(hart.x(1), 0xFFFF_FFFF);
        assert_eq!(hart.pc, 2);
    }

    #[test]
    fn c_li_rd_zero_is_illegal() {
        let mut hart = Hart::at(0);
        let mut port = SimplePort::new();
        // c.li x0, -1 -> 0x50FD with rd field cleared: 0x5001 (rd bits11:7 = 0)
        exec(&mut hart, &mut port, 0x5001);
        assert_eq!(
            crate::trap::unpack(hart.trap_state),
            (trap::CAUSE_ILLEGAL_INSTRUCTION, trap::TRAP_ID_ILLEGAL_COMPRESSED)
        );
    }

    #[test]
    fn c_jr_and_c_mv_share_the_slot_correctly() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        hart.set_x(1, 0x2000);
        // c.jr x1 -> CR-format 1000_rs1_00000, rs1=1 -> 0x8082 | rs1<<7 = 0x8000 | (1<<7)
        let instr = Q2 | (0b100 << 13) | (1 << 7);
        exec(&mut hart, &mut port, instr);
        assert_eq!(hart.pc, 0x2000);
    }

    #[test]
    fn dii_all_zero_word_is_illegal() {
        let mut hart = Hart::at(0);
        let mut port = SimplePort::new();
        exec(&mut hart, &mut port, 0x0000);
        assert_eq!(
            crate::trap::unpack(hart.trap_state),
            (trap::CAUSE_ILLEGAL_INSTRUCTION, trap::TRAP_ID_ILLEGAL_COMPRESSED)
        );
    }

    #[test]
    fn c_beqz_taken_to_current_pc_is_not_last_branch() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        // c.beqz x8, 0 -- taken (x8 is zero), target equals current PC.
        let instr = Q1 | (0b110 << 13);
        exec(&mut hart, &mut port, instr);
        assert_eq!(hart.pc, 0x1000);
        assert_eq!(hart.last_branch, crate::hart::BRANCH_SEQUENTIAL);
    }

    #[test]
    fn c_addi4spn_builds_stack_pointer_offset() {
        let mut hart = Hart::at(0);
        let mut port = SimplePort::new();
        hart.set_x(2, 0x1000);
        // c.addi4spn x8, 4: nzuimm=4 -> bit6 (b2) set -> 0x0040 | rd'(x8->field0)<<2... quadrant bits=00
        // nzuimm[5:4|9:6|2|3]; value 4 = 0b000100, which is bit2 of the raw imm (b2 position).
        let instr = Q0 | (1 << 6); // b2 bit set -> imm = 4, rd' field = 0 (x8)
        exec(&mut hart, &mut port, instr);
        assert_eq!(hart.x(8), 0x1004);
    }
}
