//! M-extension: integer multiply and divide (§4.5 "Multiply/divide").

use crate::decode::Descriptor;
use crate::hart::{Hart, BRANCH_SEQUENTIAL};
use crate::isa::fields::{funct3, rd, rs1, rs2};
use crate::port::{HartPort, PortError};

const OP: u32 = 0b0110011;
const MULDIV_F7: u32 = 0b0000001;

fn mul(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let a = hart.x(rs1(instr));
    let b = hart.x(rs2(instr));
    hart.set_x(rd(instr), a.wrapping_mul(b));
    Ok(())
}

fn mulh(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let a = hart.x(rs1(instr)) as i32 as i64;
    let b = hart.x(rs2(instr)) as i32 as i64;
    let product = a.wrapping_mul(b);
    hart.set_x(rd(instr), (product >> 32) as u32);
    Ok(())
}

fn mulhsu(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let a = hart.x(rs1(instr)) as i32 as i64;
    let b = hart.x(rs2(instr)) as i64; // zero-extended unsigned
    let product = a.wrapping_mul(b);
    hart.set_x(rd(instr), (product >> 32) as u32);
    Ok(())
}

fn mulhu(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let a = hart.x(rs1(instr)) as u64;
    let b = hart.x(rs2(instr)) as u64;
    let product = a.wrapping_mul(b);
    hart.set_x(rd(instr), (product >> 32) as u32);
    Ok(())
}

fn div(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let a = hart.x(rs1(instr)) as i32;
    let b = hart.x(rs2(instr)) as i32;
    let result = if b == 0 {
        -1i32
    } else if a == i32::MIN && b == -1 {
        i32::MIN
    } else {
        a.wrapping_div(b)
    };
    hart.set_x(rd(instr), result as u32);
    Ok(())
}

fn divu(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let a = hart.x(rs1(instr));
    let b = hart.x(rs2(instr));
    let result = if b == 0 { 0xffff_ffff } else { a.wrapping_div(b) };
    hart.set_x(rd(instr), result);
    Ok(())
}

fn rem(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let a = hart.x(rs1(instr)) as i32;
    let b = hart.x(rs2(instr)) as i32;
    let result = if b == 0 {
        a
    } else if a == i32::MIN && b == -1 {
        0
    } else {
        a.wrapping_rem(b)
    };
    hart.set_x(rd(instr), result as u32);
    Ok(())
}

fn remu(hart: &mut Hart, _port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let a = hart.x(rs1(instr));
    let b = hart.x(rs2(instr));
    let result = if b == 0 { a } else { a.wrapping_rem(b) };
    hart.set_x(rd(instr), result);
    Ok(())
}

pub const DESCRIPTORS: &[Descriptor] = &[
    Descriptor::new(32, OP | (0b000 << 12) | (MULDIV_F7 << 25), 0x7f | (0x7 << 12) | (0x7f << 25), mul, "mul"),
    Descriptor::new(32, OP | (0b001 << 12) | (MULDIV_F7 << 25), 0x7f | (0x7 << 12) | (0x7f << 25), mulh, "mulh"),
    Descriptor::new(32, OP | (0b010 << 12) | (MULDIV_F7 << 25), 0x7f | (0x7 << 12) | (0x7f << 25), mulhsu, "mulhsu"),
    Descriptor::new(32, OP | (0b011 << 12) | (MULDIV_F7 << 25), 0x7f | (0x7 << 12) | (0x7f << 25), mulhu, "mulhu"),
    Descriptor::new(32, OP | (0b100 << 12) | (MULDIV_F7 << 25), 0x7f | (0x7 << 12) | (0x7f << 25), div, "div"),
    Descriptor::new(32, OP | (0b101 << 12) | (MULDIV_F7 << 25), 0x7f | (0x7 << 12) | (0x7f << 25), divu, "divu"),
    Descriptor::new(32, OP | (0b110 << 12) | (MULDIV_F7 << 25), 0x7f | (0x7 << 12) | (0x7f << 25), rem, "rem"),
    Descriptor::new(32, OP | (0b111 << 12) | (MULDIV_F7 << 25), 0x7f | (0x7 << 12) | (0x7f << 25), remu, "remu"),
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
        hart.pc = hart.next_pc;
    }

    #[test]
    fn div_by_zero_yields_all_ones() {
        let mut hart = Hart::at(0);
        let mut port = SimplePort::new();
        hart.set_x(1, 42);
        hart.set_x(2, 0);
        let instr = OP | (0b100 << 12) | (MULDIV_F7 << 25) | (3 << 7) | (1 << 15) | (2 << 20);
        exec(&mut hart, &mut port, instr);
        assert_eq!(hart.x(3), 0xffff_ffff);
    }

    #[test]
    fn div_overflow_returns_dividend_min() {
        let mut hart = Hart::at(0);
        let mut port = SimplePort::new();
        hart.set_x(1, 0x8000_0000);
        hart.set_x(2, 0xFFFF_FFFF); // -1
        let instr = OP | (0b100 << 12) | (MULDIV_F7 << 25) | (3 << 7) | (1 << 15) | (2 << 20);
        exec(&mut hart, &mut port, instr);
        assert_eq!(hart.x(3), 0x8000_0000);
    }

    #[test]
    fn mulhu_takes_high_bits_of_unsigned_product() {
        let mut hart = Hart::at(0);
        let mut port = SimplePort::new();
        hart.set_x(1, 0xFFFF_FFFF);
        hart.set_x(2, 2);
        let instr = OP | (0b011 << 12) | (MULDIV_F7 << 25) | (3 << 7) | (1 << 15) | (2 << 20);
        exec(&mut hart, &mut port, instr);
        // 0xFFFFFFFF * 2 = 0x1_FFFFFFFE -> high 32 bits = 1
        assert_eq!(hart.x(3), 1);
    }
}
