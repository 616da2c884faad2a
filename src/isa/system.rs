//! SYSTEM-opcode instructions: ECALL/EBREAK, xRET, WFI, SFENCE.VMA, and
//! the six CSR read-modify-write forms (§4.5 "System", "CSR").

use crate::decode::Descriptor;
use crate::hart::{Hart, BRANCH_INDIRECT_OR_TRAP, BRANCH_SEQUENTIAL};
use crate::isa::fields::*;
use crate::port::{Channel, HartPort, PortError};
use crate::trap;

const SYSTEM: u32 = 0b1110011;

fn ecall(hart: &mut Hart, _port: &mut dyn HartPort, _instr: u32) -> Result<(), PortError> {
    hart.raise_trap(0, trap::CAUSE_ECALL);
    Ok(())
}

fn ebreak(hart: &mut Hart, _port: &mut dyn HartPort, _instr: u32) -> Result<(), PortError> {
    hart.raise_trap(0, trap::CAUSE_BREAKPOINT);
    Ok(())
}

fn leave_trap_to(hart: &mut Hart, port: &mut dyn HartPort, level: u8) {
    port.leave_trap(level);
    let restored_pc = hart.read_csr(port, ((level as u32) << 8) | 0x41);
    hart.next_pc = restored_pc;
    hart.last_branch = BRANCH_INDIRECT_OR_TRAP;
}

fn uret(hart: &mut Hart, port: &mut dyn HartPort, _instr: u32) -> Result<(), PortError> {
    leave_trap_to(hart, port, 0);
    Ok(())
}

fn sret(hart: &mut Hart, port: &mut dyn HartPort, _instr: u32) -> Result<(), PortError> {
    leave_trap_to(hart, port, 1);
    Ok(())
}

fn mret(hart: &mut Hart, port: &mut dyn HartPort, _instr: u32) -> Result<(), PortError> {
    leave_trap_to(hart, port, 3);
    Ok(())
}

fn wfi(hart: &mut Hart, port: &mut dyn HartPort, _instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    port.wait_until(1);
    Ok(())
}

fn sfence_vma(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    port.write_channel(Channel::Fence, 2, hart.x(rs1(instr)));
    port.write_channel(Channel::Fence, 3, hart.x(rs2(instr)));
    Ok(())
}

fn csrrw(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let old = hart.read_csr(port, csr(instr));
    hart.set_x(rd(instr), old);
    hart.write_csr(port, csr(instr), hart.x(rs1(instr)));
    Ok(())
}

fn csrrs(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let old = hart.read_csr(port, csr(instr));
    hart.set_x(rd(instr), old);
    let mask = hart.x(rs1(instr));
    if mask != 0 {
        hart.write_csr(port, csr(instr), old | mask);
    }
    Ok(())
}

fn csrrc(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let old = hart.read_csr(port, csr(instr));
    hart.set_x(rd(instr), old);
    let mask = hart.x(rs1(instr));
    if mask != 0 {
        hart.write_csr(port, csr(instr), old & !mask);
    }
    Ok(())
}

fn csrrwi(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let old = hart.read_csr(port, csr(instr));
    hart.set_x(rd(instr), old);
    hart.write_csr(port, csr(instr), zimm(instr));
    Ok(())
}

fn csrrsi(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let old = hart.read_csr(port, csr(instr));
    hart.set_x(rd(instr), old);
    let z = zimm(instr);
    if z != 0 {
        hart.write_csr(port, csr(instr), old | z);
    }
    Ok(())
}

fn csrrci(hart: &mut Hart, port: &mut dyn HartPort, instr: u32) -> Result<(), PortError> {
    hart.next_pc = hart.pc.wrapping_add(4);
    hart.last_branch = BRANCH_SEQUENTIAL;
    let old = hart.read_csr(port, csr(instr));
    hart.set_x(rd(instr), old);
    let z = zimm(instr);
    if z != 0 {
        hart.write_csr(port, csr(instr), old & !z);
    }
    Ok(())
}

// SYSTEM/funct3=000 sub-forms distinguish purely on the 12-bit imm field
// (which, for ECALL/EBREAK/xRET/WFI, occupies the same bit range as
// funct7+rs2 in R-type instructions but carries no register operands of
// its own — all 12 bits are architecturally significant here).
const F3_PRIV: u32 = 0b000 << 12;
const IMM12_MASK: u32 = 0xfff << 20;

pub const DESCRIPTORS: &[Descriptor] = &[
    Descriptor::new(32, SYSTEM | F3_PRIV, 0x7f | (0x7 << 12) | IMM12_MASK, ecall, "ecall"),
    Descriptor::new(
        32,
        SYSTEM | F3_PRIV | (0x001 << 20),
        0x7f | (0x7 << 12) | IMM12_MASK,
        ebreak,
        "ebreak",
    ),
    Descriptor::new(
        32,
        SYSTEM | F3_PRIV | (0x002 << 20),
        0x7f | (0x7 << 12) | IMM12_MASK,
        uret,
        "uret",
    ),
    Descriptor::new(
        32,
        SYSTEM | F3_PRIV | (0x102 << 20),
        0x7f | (0x7 << 12) | IMM12_MASK,
        sret,
        "sret",
    ),
    Descriptor::new(
        32,
        SYSTEM | F3_PRIV | (0x302 << 20),
        0x7f | (0x7 << 12) | IMM12_MASK,
        mret,
        "mret",
    ),
    Descriptor::new(
        32,
        SYSTEM | F3_PRIV | (0x105 << 20),
        0x7f | (0x7 << 12) | IMM12_MASK,
        wfi,
        "wfi",
    ),
    Descriptor::new(
        32,
        SYSTEM | F3_PRIV | (0b0001001 << 25),
        0x7f | (0x7 << 12) | (0x7f << 25),
        sfence_vma,
        "sfence.vma",
    ),
    Descriptor::new(32, SYSTEM | (0b001 << 12), 0x7f | (0x7 << 12), csrrw, "csrrw"),
    Descriptor::new(32, SYSTEM | (0b010 << 12), 0x7f | (0x7 << 12), csrrs, "csrrs"),
    Descriptor::new(32, SYSTEM | (0b011 << 12), 0x7f | (0x7 << 12), csrrc, "csrrc"),
    Descriptor::new(32, SYSTEM | (0b101 << 12), 0x7f | (0x7 << 12), csrrwi, "csrrwi"),
    Descriptor::new(32, SYSTEM | (0b110 << 12), 0x7f | (0x7 << 12), csrrsi, "csrrsi"),
    Descriptor::new(32, SYSTEM | (0b111 << 12), 0x7f | (0x7 << 12), csrrci, "csrrci"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::SimplePort;
    use crate::hart::Hart;

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
    fn csrrs_with_x0_does_not_write() {
        let mut hart = Hart::at(0);
        let mut port = SimplePort::new();
        port.write_channel(Channel::Csr, 0x300, 0xABCD);
        // csrrs x1, mstatus(0x300), x0
        let instr = SYSTEM | (0b010 << 12) | (1 << 7) | (0x300 << 20);
        exec(&mut hart, &mut port, instr);
        assert_eq!(hart.x(1), 0xABCD);
        assert_eq!(port.read_channel(Channel::Csr, 0x300), 0xABCD);
    }

    #[test]
    fn ecall_raises_cause_eleven() {
        let mut hart = Hart::at(0x1000);
        let mut port = SimplePort::new();
        let instr = SYSTEM; // ecall
        let tables_src = crate::isa::descriptors();
        let tables = crate::decode::DecodeTables::build(&tables_src);
        let handler = tables.lookup(instr).unwrap().handler;
        handler(&mut hart, &mut port, instr).unwrap();
        assert_eq!(crate::trap::unpack(hart.trap_state), (trap::CAUSE_ECALL, 0));
    }
}
