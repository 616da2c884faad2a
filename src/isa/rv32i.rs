//! RV32I base integer instructions (§4.5 "Integer ALU", "Control
//! transfer", "Memory", "Fences").

use crate::bits::bit_sub;
use crate::decode::Descriptor;
use crate::hart::{sign_extend, Hart, BRANCH_INDIRECT_OR_TRAP, BRANCH_SEQUENTIAL, BRANCH_TAKEN_DIRECT};
use crate::isa::fields::*;
use crate::port::{Channel, HartPort, PortError};
use crate::trap;

const LUI: u32 = 0b0110111;
const AUIPC: u32 = 0b0010111;
const JAL: u32 = 0b1101111;
const JALR: u32 = 0b1100111;
const BRANCH: u32 = 0b1100011;
const LOAD: u32 = 0b0000011;
const STORE: u32 = 0b0100011;
const OP_IMM: u32 = 0b0010011;
const OP: u32 = 0b0110011;
const MISC_MEM: u32 = 0b0001111;

fn lui(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.set_x(rd(instr), imm_u(instr));
    hart.last_branch = BRANCH_SEQUENTIAL;
    Ok(())
}

fn auipc(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.set_x(rd(instr), hart.pc.wrapping_add(imm_u(instr)));
    hart.last_branch = BRANCH_SEQUENTIAL;
    Ok(())
}

fn jal(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    let link = hart.pc.wrapping_add(4);
    let target = hart.pc.wrapping_add(imm_j(instr));
    hart.set_x(rd(instr), link);
    hart.next_pc = target;
    hart.last_branch = if target != hart.pc { BRANCH_TAKEN_DIRECT } else { BRANCH_SEQUENTIAL };
    Ok(())
}

fn jalr(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    let link = hart.pc.wrapping_add(4);
    let target = hart.x(rs1(instr)).wrapping_add(imm_i(instr)) & !1u32;
    hart.set_x(rd(instr), link);
    hart.next_pc = target;
    hart.last_branch = BRANCH_INDIRECT_OR_TRAP;
    Ok(())
}

fn branch_condition(f3: u32, a: u32, b: u32) -> bool {
    match f3 {
        0b000 => a == b,                     // BEQ
        0b001 => a != b,                      // BNE
        0b100 => (a as i32) < (b as i32),     // BLT
        0b101 => (a as i32) >= (b as i32),    // BGE
        0b110 => a < b,                       // BLTU
        0b111 => a >= b,                      // BGEU
        _ => unreachable!("branch funct3 not assigned a descriptor"),
    }
}

fn branch(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    let a = hart.x(rs1(instr));
    let b = hart.x(rs2(instr));
    let taken = branch_condition(funct3(instr), a, b);
    let seq = hart.pc.wrapping_add(4);
    if taken {
        let target = hart.pc.wrapping_add(imm_b(instr));
        hart.next_pc = target;
        hart.last_branch = if target != hart.pc { BRANCH_TAKEN_DIRECT } else { BRANCH_SEQUENTIAL };
    } else {
        hart.next_pc = seq;
        hart.last_branch = BRANCH_SEQUENTIAL;
    }
    Ok(())
}

fn load(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let addr = hart.x(rs1(instr)).wrapping_add(imm_i(instr));
    let paddr = port.v2p(addr)?;
    let value = match funct3(instr) {
        0b000 => {
            let mut b = [0u8; 1];
            port.read(paddr, &mut b)?;
            sign_extend(b[0] as u32, 8)
        }
        0b001 => {
            let mut b = [0u8; 2];
            port.read(paddr, &mut b)?;
            sign_extend(u16::from_le_bytes(b) as u32, 16)
        }
        0b010 => {
            let mut b = [0u8; 4];
            port.read(paddr, &mut b)?;
            u32::from_le_bytes(b)
        }
        0b100 => {
            let mut b = [0u8; 1];
            port.read(paddr, &mut b)?;
            b[0] as u32
        }
        0b101 => {
            let mut b = [0u8; 2];
            port.read(paddr, &mut b)?;
            u16::from_le_bytes(b) as u32
        }
        _ => unreachable!("load funct3 not assigned a descriptor"),
    };
    hart.set_x(rd(instr), value);
    Ok(())
}

fn store(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let addr = hart.x(rs1(instr)).wrapping_add(imm_s(instr));
    let paddr = port.v2p(addr)?;
    let value = hart.x(rs2(instr));
    match funct3(instr) {
        0b000 => port.write(paddr, &value.to_le_bytes()[..1])?,
        0b001 => port.write(paddr, &value.to_le_bytes()[..2])?,
        0b010 => port.write(paddr, &value.to_le_bytes())?,
        _ => unreachable!("store funct3 not assigned a descriptor"),
    }
    Ok(())
}

fn reg_imm(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let a = hart.x(rs1(instr));
    let imm = imm_i(instr);
    let result = match funct3(instr) {
        0b000 => a.wrapping_add(imm),                       // ADDI
        0b010 => ((a as i32) < (imm as i32)) as u32,         // SLTI
        0b011 => (a < imm) as u32,                           // SLTIU (imm sign-extended, compared unsigned)
        0b100 => a ^ imm,                                    // XORI
        0b110 => a | imm,                                    // ORI
        0b111 => a & imm,                                    // ANDI
        _ => unreachable!("OP-IMM funct3 not assigned a descriptor"),
    };
    hart.set_x(rd(instr), result);
    Ok(())
}

fn shift_imm(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let amt = shamt(instr);
    let a = hart.x(rs1(instr));
    let f7 = funct7(instr);
    let result = match (funct3(instr), f7) {
        (0b001, 0b0000000) => a << amt,                          // SLLI
        (0b101, 0b0000000) => a >> amt,                          // SRLI
        (0b101, 0b0100000) => ((a as i32) >> amt) as u32,        // SRAI
        _ => {
            // Reserved encoding (the would-be shamt bit 5 set, modelling a
            // 6-bit RV64 shamt on an RV32 core): illegal instruction.
            hart.raise_trap(trap::TRAP_ID_ILLEGAL, trap::CAUSE_ILLEGAL_INSTRUCTION);
            return Ok(());
        }
    };
    hart.set_x(rd(instr), result);
    Ok(())
}

fn reg_reg(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let a = hart.x(rs1(instr));
    let b = hart.x(rs2(instr));
    let result = match funct3(instr) {
        0b000 if funct7(instr) == 0 => a.wrapping_add(b),           // ADD
        0b000 => a.wrapping_sub(b),                                 // SUB
        0b001 => a << (b & 0x1f),                                   // SLL
        0b010 => ((a as i32) < (b as i32)) as u32,                  // SLT
        0b011 => (a < b) as u32,                                    // SLTU
        0b100 => a ^ b,                                             // XOR
        0b101 if funct7(instr) == 0 => a >> (b & 0x1f),             // SRL
        0b101 => ((a as i32) >> (b & 0x1f)) as u32,                 // SRA
        0b110 => a | b,                                             // OR
        0b111 => a & b,                                             // AND
        _ => unreachable!("OP funct3 not assigned a descriptor"),
    };
    hart.set_x(rd(instr), result);
    Ok(())
}

fn fence(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let pred = bit_sub(instr, 24, 4);
    let succ = bit_sub(instr, 20, 4);
    port.write_channel(Channel::Fence, 0, (pred << 4) | succ);
    Ok(())
}

fn fence_i(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    port.write_channel(Channel::Fence, 1, imm_i(instr));
    Ok(())
}

pub const DESCRIPTORS: &[Descriptor] = &[
    Descriptor::new(32, LUI, 0x7f, lui, "lui"),
    Descriptor::new(32, AUIPC, 0x7f, auipc, "auipc"),
    Descriptor::new(32, JAL, 0x7f, jal, "jal"),
    Descriptor::new(32, JALR | (0b000 << 12), 0x7f | (0x7 << 12), jalr, "jalr"),
    Descriptor::new(32, BRANCH | (0b000 << 12), 0x7f | (0x7 << 12), branch, "beq"),
    Descriptor::new(32, BRANCH | (0b001 << 12), 0x7f | (0x7 << 12), branch, "bne"),
    Descriptor::new(32, BRANCH | (0b100 << 12), 0x7f | (0x7 << 12), branch, "blt"),
    Descriptor::new(32, BRANCH | (0b101 << 12), 0x7f | (0x7 << 12), branch, "bge"),
    Descriptor::new(32, BRANCH | (0b110 << 12), 0x7f | (0x7 << 12), branch, "bltu"),
    Descriptor::new(32, BRANCH | (0b111 << 12), 0x7f | (0x7 << 12), branch, "bgeu"),
    Descriptor::new(32, LOAD | (0b000 << 12), 0x7f | (0x7 << 12), load, "lb"),
    Descriptor::new(32, LOAD | (0b001 << 12), 0x7f | (0x7 << 12), load, "lh"),
    Descriptor::new(32, LOAD | (0b010 << 12), 0x7f | (0x7 << 12), load, "lw"),
    Descriptor::new(32, LOAD | (0b100 << 12), 0x7f | (0x7 << 12), load, "lbu"),
    Descriptor::new(32, LOAD | (0b101 << 12), 0x7f | (0x7 << 12), load, "lhu"),
    Descriptor::new(32, STORE | (0b000 << 12), 0x7f | (0x7 << 12), store, "sb"),
    Descriptor::new(32, STORE | (0b001 << 12), 0x7f | (0x7 << 12), store, "sh"),
    Descriptor::new(32, STORE | (0b010 << 12), 0x7f | (0x7 << 12), store, "sw"),
    Descriptor::new(32, OP_IMM | (0b000 << 12), 0x7f | (0x7 << 12), reg_imm, "addi"),
    Descriptor::new(32, OP_IMM | (0b010 << 12), 0x7f | (0x7 << 12), reg_imm, "slti"),
    Descriptor::new(32, OP_IMM | (0b011 << 12), 0x7f | (0x7 << 12), reg_imm, "sltiu"),
    Descriptor::new(32, OP_IMM | (0b100 << 12), 0x7f | (0x7 << 12), reg_imm, "xori"),
    Descriptor::new(32, OP_IMM | (0b110 << 12), 0x7f | (0x7 << 12), reg_imm, "ori"),
    Descriptor::new(32, OP_IMM | (0b111 << 12), 0x7f | (0x7 << 12), reg_imm, "andi"),
    Descriptor::new(
        32,
        OP_IMM | (0b001 << 12),
        0x7f | (0x7 << 12) | (0x7f << 25),
        shift_imm,
        "slli",
    ),
    Descriptor::new(
        32,
        OP_IMM | (0b101 << 12),
        0x7f | (0x7 << 12) | (0x7f << 25),
        shift_imm,
        "srli",
    ),
    Descriptor::new(
        32,
        OP_IMM | (0b101 << 12) | (0b0100000 << 25),
        0x7f | (0x7 << 12) | (0x7f << 25),
        shift_imm,
        "srai",
    ),
    Descriptor::new(
        32,
        OP | (0b000 << 12),
        0x7f | (0x7 << 12) | (0x7f << 25),
        reg_reg,
        "add",
    ),
    Descriptor::new(
        32,
        OP | (0b000 << 12) | (0b0100000 << 25),
        0x7f | (0x7 << 12) | (0x7f << 25),
        reg_reg,
        "sub",
    ),
    Descriptor::new(
        32,
        OP | (0b001 << 12),
        0x7f | (0x7 << 12) | (0x7f << 25),
        reg_reg,
        "sll",
    ),
    Descriptor::new(
        32,
        OP | (0b010 << 12),
        0x7f | (0x7 << 12) | (0x7f << 25),
        reg_reg,
        "slt",
    ),
    Descriptor::new(
        32,
        OP | (0b011 << 12),
        0x7f | (0x7 << 12) | (0x7f << 25),
        reg_reg,
        "sltu",
    ),
    Descriptor::new(
        32,
        OP | (0b100 << 12),
        0x7f | (0x7 << 12) | (0x7f << 25),
        reg_reg,
        "xor",
    ),
    Descriptor::new(
        32,
        OP | (0b101 << 12),
        0x7f | (0x7 << 12) | (0x7f << 25),
        reg_reg,
        "srl",
    ),
    Descriptor::new(
        32,
        OP | (0b101 << 12) | (0b0100000 << 25),
        0x7f | (0x7 << 12) | (0x7f << 25),
        reg_reg,
        "sra",
    ),
    Descriptor::new(
        32,
        OP | (0b110 << 12),
        0x7f | (0x7 << 12) | (0x7f << 25),
        reg_reg,
        "or",
    ),
    Descriptor::new(
        32,
        OP | (0b111 << 12),
        0x7f | (0x7 << 12) | (0x7f << 25),
        reg_reg,
        "and",
    ),
    Descriptor::new(32, MISC_MEM | (0b000 << 12), 0x7f | (0x7 << 12), fence, "fence"),
    Descriptor::new(32, MISC_MEM | (0b001 << 12), 0x7f | (0x7 << 12), fence_i, "fence.i"),
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
    fn addi_zero_is_identity() {
        let mut hart = Hart::at(0);
        let mut port = SimplePort::new();
        hart.set_x(5, 0xdead_beef);
        // addi x1, x5, 0
        let instr = (OP_IMM) | (1 << 7) | (5 << 15);
        exec(&mut hart, &mut port, instr);
        assert_eq!(hart.x(1), 0xdead_beef);
    }

    #[test]
    fn xori_minus_one_twice_is_identity() {
        let mut hart = Hart::at(0);
        let mut port = SimplePort::new();
        hart.set_x(1, 0x1234_5678);
        // xori x1, x1, -1
        let instr = OP_IMM | (0b100 << 12) | (1 << 7) | (1 << 15) | (0xFFF << 20);
        exec(&mut hart, &mut port, instr);
        exec(&mut hart, &mut port, instr);
        assert_eq!(hart.x(1), 0x1234_5678);
    }

    #[test]
    fn sltu_compares_unsigned() {
        let mut hart = Hart::at(0);
        let mut port = SimplePort::new();
        hart.set_x(2, 0xFFFF_FFFF);
        hart.set_x(3, 1);
        // sltu x1, x2, x3
        let instr = OP | (0b011 << 12) | (1 << 7) | (2 << 15) | (3 << 20);
        exec(&mut hart, &mut port, instr);
        assert_eq!(hart.x(1), 0);
    }

    #[test]
    fn branch_taken_to_current_pc_is_not_last_branch() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        // beq x0, x0, 0 -- taken, but the target equals the current PC.
        let instr = BRANCH | (1 << 15) | (1 << 20);
        let d = crate::isa::descriptors();
        let tables = crate::decode::DecodeTables::build(&d);
        let handler = tables.lookup(instr).expect("instruction should decode").handler;
        handler(&mut hart, &mut port, instr).unwrap();
        assert_eq!(hart.next_pc, 0x1000);
        assert_eq!(hart.last_branch, crate::hart::BRANCH_SEQUENTIAL);
    }

    #[test]
    fn reg_reg_shift_uses_low_five_bits_of_rs2() {
        let mut hart = Hart::at(0);
        let mut port = SimplePort::new();
        hart.set_x(2, 1);
        hart.set_x(3, 33); // 33 & 31 == 1
        // sll x1, x2, x3
        let instr = OP | (0b001 << 12) | (1 << 7) | (2 << 15) | (3 << 20);
        exec(&mut hart, &mut port, instr);
        assert_eq!(hart.x(1), 2);
    }
}
