//! # Illegal Instruction Decoding
//!
//! With the FPU switched off every floating-point instruction raises an
//! illegal instruction exception. This module fetches the faulting
//! instruction and decides whether it belongs to the floating-point
//! classes (and may be retried once the FPU is live) or is a real fault.
//!
//! ## Instruction Length
//!
//! With the C extension instructions are only 2-byte aligned. The two
//! lowest bits of the first halfword tell the length: `0b11` is a 32-bit
//! instruction, anything else a 16-bit one.

use crate::arch::riscv::core::csr;
use crate::arch::riscv::fault::Fault;

/// Low bits of a 32-bit instruction
pub const INSN_32BIT_MASK: u32 = 0b11;

/// Major opcodes (bits 6:2) of 32-bit instructions
pub mod opcode {
    pub const LOAD_FP: u32 = 0b00001;
    pub const STORE_FP: u32 = 0b01001;
    pub const OP_FP: u32 = 0b10100;
    pub const MADD: u32 = 0b10000;
    pub const MSUB: u32 = 0b10001;
    pub const NMSUB: u32 = 0b10010;
    pub const NMADD: u32 = 0b10011;
    pub const SYSTEM: u32 = 0b11100;

    /// Extract the major opcode
    #[inline]
    pub const fn of(insn: u32) -> u32 {
        (insn & 0x7f) >> 2
    }
}

/// CSR instruction encodings (funct3 + opcode)
pub mod system {
    /// funct3 and opcode bits
    pub const MASK_CSR: u32 = 0x707f;
    pub const CSRRW: u32 = 0x1073;
    pub const CSRRS: u32 = 0x2073;
    pub const CSRRC: u32 = 0x3073;
    pub const CSRRWI: u32 = 0x5073;
    pub const CSRRSI: u32 = 0x6073;
    pub const CSRRCI: u32 = 0x7073;
}

/// Floating-point load/store encodings of the C extension
pub mod compressed {
    /// funct3 and quadrant bits
    pub const MASK: u16 = 0xE003;
    pub const C_FLD: u16 = 0x2000;
    pub const C_FSD: u16 = 0xA000;
    pub const C_FLDSP: u16 = 0x2002;
    pub const C_FSDSP: u16 = 0xA002;
    /// RV32 only, the same encodings are C.LD/C.SD/C.LDSP/C.SDSP on RV64
    #[cfg(target_pointer_width = "32")]
    pub const C_FLW: u16 = 0x6000;
    #[cfg(target_pointer_width = "32")]
    pub const C_FSW: u16 = 0xE000;
    #[cfg(target_pointer_width = "32")]
    pub const C_FLWSP: u16 = 0x6002;
    #[cfg(target_pointer_width = "32")]
    pub const C_FSWSP: u16 = 0xE002;
}

// ============================================================================
// Fetch
// ============================================================================

/// Read access to instruction memory
pub trait InstructionMemory {
    /// Read a halfword
    ///
    /// # Safety
    /// `addr` must be 2-byte aligned readable memory.
    unsafe fn read_u16(&self, addr: usize) -> u16;

    /// Read a word
    ///
    /// # Safety
    /// `addr` must be 4-byte aligned readable memory.
    unsafe fn read_u32(&self, addr: usize) -> u32;
}

/// Direct loads from the address space
#[derive(Debug, Default, Clone, Copy)]
pub struct RawMemory;

impl InstructionMemory for RawMemory {
    #[inline]
    unsafe fn read_u16(&self, addr: usize) -> u16 {
        unsafe { core::ptr::read_volatile(addr as *const u16) }
    }

    #[inline]
    unsafe fn read_u32(&self, addr: usize) -> u32 {
        unsafe { core::ptr::read_volatile(addr as *const u32) }
    }
}

/// A fetched instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// 32-bit encoding
    Standard(u32),
    /// 16-bit encoding (C extension)
    Compressed(u16),
}

/// Fetch the instruction at `epc`.
///
/// # Safety
/// `epc` must be the address of an instruction that raised a trap.
pub unsafe fn fetch<M: InstructionMemory + ?Sized>(
    mem: &M,
    epc: usize,
    compressed: bool,
) -> Instruction {
    // SAFETY: caller contract; every read stays within the faulting
    // instruction, aligned to its access size.
    unsafe {
        if !compressed {
            return Instruction::Standard(mem.read_u32(epc));
        }

        if epc & 0x3 == 0 {
            let insn = mem.read_u32(epc);
            if insn & INSN_32BIT_MASK == INSN_32BIT_MASK {
                Instruction::Standard(insn)
            } else {
                Instruction::Compressed(insn as u16)
            }
        } else {
            let low = u32::from(mem.read_u16(epc));
            if low & INSN_32BIT_MASK == INSN_32BIT_MASK {
                let high = u32::from(mem.read_u16(epc + 2));
                Instruction::Standard(low | (high << 16))
            } else {
                Instruction::Compressed(low as u16)
            }
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Kind of floating-point access that trapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpuAccess {
    /// FLW/FLD/FSW/FSD
    LoadStore,
    /// OP-FP and the fused multiply-add family
    Arithmetic,
    /// CSR instruction on fflags, frm or fcsr
    StatusRegister(usize),
    /// C.FLD/C.FSD/C.FLDSP/C.FSDSP, plus C.FLW/C.FSW/C.FLWSP/C.FSWSP on RV32
    Compressed,
}

/// Decide whether a trapped instruction is a floating-point access
pub fn classify(insn: Instruction) -> Result<FpuAccess, Fault> {
    match insn {
        Instruction::Standard(insn) => classify_standard(insn),
        Instruction::Compressed(insn) => classify_compressed(insn),
    }
}

fn classify_standard(insn: u32) -> Result<FpuAccess, Fault> {
    match opcode::of(insn) {
        opcode::LOAD_FP | opcode::STORE_FP => Ok(FpuAccess::LoadStore),
        opcode::OP_FP | opcode::MADD | opcode::MSUB | opcode::NMSUB | opcode::NMADD => {
            Ok(FpuAccess::Arithmetic)
        },
        opcode::SYSTEM => classify_system(insn),
        _ => Err(Fault::IllegalInstruction(insn)),
    }
}

fn classify_system(insn: u32) -> Result<FpuAccess, Fault> {
    match insn & system::MASK_CSR {
        system::CSRRW | system::CSRRS | system::CSRRC | system::CSRRWI | system::CSRRSI
        | system::CSRRCI => {
            let number = (insn >> 20) as usize;
            match number {
                csr::FFLAGS | csr::FRM | csr::FCSR => Ok(FpuAccess::StatusRegister(number)),
                _ => Err(Fault::IllegalCsrAccess { csr: number }),
            }
        },
        _ => Err(Fault::IllegalSystemInstruction(insn)),
    }
}

fn classify_compressed(insn: u16) -> Result<FpuAccess, Fault> {
    match insn & compressed::MASK {
        compressed::C_FLD | compressed::C_FSD | compressed::C_FLDSP | compressed::C_FSDSP => {
            Ok(FpuAccess::Compressed)
        },
        #[cfg(target_pointer_width = "32")]
        compressed::C_FLW | compressed::C_FSW | compressed::C_FLWSP | compressed::C_FSWSP => {
            Ok(FpuAccess::Compressed)
        },
        _ => Err(Fault::IllegalCompressedInstruction(insn)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// Sparse little-endian memory image
    #[derive(Debug, Default)]
    pub(crate) struct FakeMemory {
        pub bytes: BTreeMap<usize, u8>,
    }

    impl FakeMemory {
        pub(crate) fn with_u32(addr: usize, value: u32) -> Self {
            let mut mem = Self::default();
            mem.put_u32(addr, value);
            mem
        }

        pub(crate) fn put_u16(&mut self, addr: usize, value: u16) {
            for (i, b) in value.to_le_bytes().into_iter().enumerate() {
                self.bytes.insert(addr + i, b);
            }
        }

        pub(crate) fn put_u32(&mut self, addr: usize, value: u32) {
            for (i, b) in value.to_le_bytes().into_iter().enumerate() {
                self.bytes.insert(addr + i, b);
            }
        }

        fn byte(&self, addr: usize) -> u8 {
            *self.bytes.get(&addr).unwrap_or(&0)
        }
    }

    impl InstructionMemory for FakeMemory {
        unsafe fn read_u16(&self, addr: usize) -> u16 {
            assert_eq!(addr % 2, 0);
            u16::from_le_bytes([self.byte(addr), self.byte(addr + 1)])
        }

        unsafe fn read_u32(&self, addr: usize) -> u32 {
            assert_eq!(addr % 4, 0);
            u32::from_le_bytes([
                self.byte(addr),
                self.byte(addr + 1),
                self.byte(addr + 2),
                self.byte(addr + 3),
            ])
        }
    }

    // fld fa0, 8(a0)
    pub(crate) const FLD: u32 = 0x0085_3507;
    // fadd.d fa0, fa1, fa2
    const FADD_D: u32 = 0x02c5_8553;
    // fmadd.d fa0, fa1, fa2, fa3
    const FMADD_D: u32 = 0x6ac5_8543;
    // frcsr a0 (csrrs a0, fcsr, zero)
    const FRCSR: u32 = 0x0030_2573;
    // fsflags a0 (csrrw zero, fflags, a0)
    const FSFLAGS: u32 = 0x0015_1073;
    // csrr a0, mstatus
    pub(crate) const CSRR_MSTATUS: u32 = 0x3000_2573;
    // ecall
    const ECALL: u32 = 0x0000_0073;
    // add a0, a0, a1
    pub(crate) const ADD: u32 = 0x00b5_0533;
    // c.fldsp fa0, 8(sp)
    pub(crate) const C_FLDSP: u16 = 0x2522;
    // c.fsd fa0, 0(a1)
    const C_FSD: u16 = 0xa188;
    // c.addi a0, 1
    const C_ADDI: u16 = 0x0505;
    // c.flw fa0, 0(a1) / c.ld a0, 0(a1) on RV64
    const C_FLW: u16 = 0x6188;
    // c.fsw fa0, 0(a1) / c.sd a0, 0(a1) on RV64
    const C_FSW: u16 = 0xe188;
    // c.flwsp fa0, 0(sp) / c.ldsp a0, 0(sp) on RV64
    const C_FLWSP: u16 = 0x6502;
    // c.fswsp fa0, 0(sp) / c.sdsp a0, 0(sp) on RV64
    const C_FSWSP: u16 = 0xe02a;

    #[test]
    fn test_fp_opcode_classes() {
        assert_eq!(classify(Instruction::Standard(FLD)), Ok(FpuAccess::LoadStore));
        assert_eq!(classify(Instruction::Standard(FADD_D)), Ok(FpuAccess::Arithmetic));
        assert_eq!(classify(Instruction::Standard(FMADD_D)), Ok(FpuAccess::Arithmetic));
        assert_eq!(
            classify(Instruction::Standard(FRCSR)),
            Ok(FpuAccess::StatusRegister(csr::FCSR))
        );
        assert_eq!(
            classify(Instruction::Standard(FSFLAGS)),
            Ok(FpuAccess::StatusRegister(csr::FFLAGS))
        );
    }

    #[test]
    fn test_non_fp_opcodes_are_faults() {
        assert_eq!(
            classify(Instruction::Standard(CSRR_MSTATUS)),
            Err(Fault::IllegalCsrAccess { csr: 0x300 })
        );
        assert_eq!(
            classify(Instruction::Standard(ECALL)),
            Err(Fault::IllegalSystemInstruction(ECALL))
        );
        assert_eq!(classify(Instruction::Standard(ADD)), Err(Fault::IllegalInstruction(ADD)));
    }

    #[test]
    fn test_compressed_classes() {
        assert_eq!(classify(Instruction::Compressed(C_FLDSP)), Ok(FpuAccess::Compressed));
        assert_eq!(classify(Instruction::Compressed(C_FSD)), Ok(FpuAccess::Compressed));
        assert_eq!(
            classify(Instruction::Compressed(C_ADDI)),
            Err(Fault::IllegalCompressedInstruction(C_ADDI))
        );
    }

    #[test]
    fn test_compressed_single_precision_width() {
        for insn in [C_FLW, C_FSW, C_FLWSP, C_FSWSP] {
            let class = classify(Instruction::Compressed(insn));
            if cfg!(target_pointer_width = "32") {
                assert_eq!(class, Ok(FpuAccess::Compressed));
            } else {
                assert_eq!(class, Err(Fault::IllegalCompressedInstruction(insn)));
            }
        }
    }

    #[test]
    fn test_fetch_aligned() {
        let mem = FakeMemory::with_u32(0x100, FLD);
        assert_eq!(unsafe { fetch(&mem, 0x100, true) }, Instruction::Standard(FLD));
        assert_eq!(unsafe { fetch(&mem, 0x100, false) }, Instruction::Standard(FLD));

        let mut mem = FakeMemory::default();
        mem.put_u16(0x200, C_FLDSP);
        mem.put_u16(0x202, C_ADDI);
        assert_eq!(unsafe { fetch(&mem, 0x200, true) }, Instruction::Compressed(C_FLDSP));
    }

    #[test]
    fn test_fetch_unaligned_reassembles_halves() {
        let mut mem = FakeMemory::default();
        mem.put_u16(0x300, C_ADDI);
        mem.put_u32(0x302, FLD);
        assert_eq!(unsafe { fetch(&mem, 0x302, true) }, Instruction::Standard(FLD));

        mem.put_u16(0x306, C_FSD);
        assert_eq!(unsafe { fetch(&mem, 0x306, true) }, Instruction::Compressed(C_FSD));
    }
}
