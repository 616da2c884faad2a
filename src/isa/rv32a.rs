//! A-extension: load-reserved/store-conditional and atomic memory
//! operations, word width only (§4.5 "Atomic (A)").

use crate::decode::Descriptor;
use crate::hart::{Hart, BRANCH_SEQUENTIAL};
use crate::isa::fields::{funct5, rd, rs1, rs2};
use crate::port::{Channel, HartPort, PortError};

const AMO: u32 = 0b0101111;
const WIDTH_W: u32 = 0b010 << 12;

const F5_LR: u32 = 0b00010;
const F5_SC: u32 = 0b00011;
const F5_SWAP: u32 = 0b00001;
const F5_ADD: u32 = 0b00000;
const F5_XOR: u32 = 0b00100;
const F5_AND: u32 = 0b01100;
const F5_OR: u32 = 0b01000;
const F5_MIN: u32 = 0b10000;
const F5_MAX: u32 = 0b10100;
const F5_MINU: u32 = 0b11000;
const F5_MAXU: u32 = 0b11100;

fn lr_w(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let addr = hart.x(rs1(instr));
    let paddr = port.v2p(addr)?;
    let mut buf = [0u8; 4];
    port.read(paddr, &mut buf)?;
    hart.set_x(rd(instr), u32::from_le_bytes(buf));
    port.write_channel(Channel::Res, addr, 0xffff_ffff);
    Ok(())
}

fn sc_w(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let addr = hart.x(rs1(instr));
    let reserved = port.read_channel(Channel::Res, addr) != 0;
    if reserved {
        let paddr = port.v2p(addr)?;
        port.write(paddr, &hart.x(rs2(instr)).to_le_bytes())?;
        hart.set_x(rd(instr), 0);
    } else {
        hart.set_x(rd(instr), 1);
    }
    Ok(())
}

fn amo_combine(f5: u32, old: u32, operand: u32) -> u32 {
    match f5 {
        F5_SWAP => operand,
        F5_ADD => old.wrapping_add(operand),
        F5_XOR => old ^ operand,
        F5_AND => old & operand,
        F5_OR => old | operand,
        F5_MIN => (old as i32).min(operand as i32) as u32,
        F5_MAX => (old as i32).max(operand as i32) as u32,
        F5_MINU => old.min(operand),
        F5_MAXU => old.max(operand),
        _ => unreachable!("AMO funct5 not assigned a descriptor"),
    }
}

fn amo(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let addr = hart.x(rs1(instr));
    let paddr = port.v2p(addr)?;
    let mut buf = [0u8; 4];
    port.read(paddr, &mut buf)?;
    let old = u32::from_le_bytes(buf);
    let operand = hart.x(rs2(instr));
    let new = amo_combine(funct5(instr), old, operand);
    port.write(paddr, &new.to_le_bytes())?;
    hart.set_x(rd(instr), old);
    Ok(())
}

const AMO_MASK: u32 = 0x7f | (0x7 << 12) | (0b11111 << 27);

const fn amo_descriptor(f5: u32, handler: crate::decode::Handler, name: &'static str) -> Descriptor {
    Descriptor::new(32, AMO | WIDTH_W | (f5 << 27), AMO_MASK, handler, name)
}

pub const DESCRIPTORS: &[Descriptor] = &[
    // LR.W additionally pins rs2 to zero (it has none).
    Descriptor::new(
        32,
        AMO | WIDTH_W | (F5_LR << 27),
        AMO_MASK | (0b11111 << 20),
        lr_w,
        "lr.w",
    ),
    amo_descriptor(F5_SC, sc_w, "sc.w"),
    amo_descriptor(F5_SWAP, amo, "amoswap.w"),
    amo_descriptor(F5_ADD, amo, "amoadd.w"),
    amo_descriptor(F5_XOR, amo, "amoxor.w"),
    amo_descriptor(F5_AND, amo, "amoand.w"),
    amo_descriptor(F5_OR, amo, "amoor.w"),
    amo_descriptor(F5_MIN, amo, "amomin.w"),
    amo_descriptor(F5_MAX, amo, "amomax.w"),
    amo_descriptor(F5_MINU, amo, "amominu.w"),
    amo_descriptor(F5_MAXU, amo, "amomaxu.w"),
];
