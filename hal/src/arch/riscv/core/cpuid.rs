//! # CPU Identification
//!
//! The unique id is the concatenation of mvendorid, marchid and mimpid
//! in native byte order, one XLEN word each.

use core::mem::size_of;

/// Length of the CPU id in bytes
pub const CPUID_LEN: usize = 3 * size_of::<usize>();

/// Pack the three id registers into `id`
pub fn encode_cpuid(vendor: usize, arch: usize, imp: usize, id: &mut [u8; CPUID_LEN]) {
    let word = size_of::<usize>();
    for (chunk, value) in id.chunks_exact_mut(word).zip([vendor, arch, imp]) {
        chunk.copy_from_slice(&value.to_ne_bytes());
    }
}

/// Read the id of the running hart
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub fn cpuid_get(id: &mut [u8; CPUID_LEN]) {
    use super::csr;
    encode_cpuid(csr::mvendorid(), csr::marchid(), csr::mimpid(), id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpuid_layout() {
        let mut id = [0u8; CPUID_LEN];
        encode_cpuid(0x489, 0x8000_0001, 0x2, &mut id);

        let word = size_of::<usize>();
        assert_eq!(&id[..word], &0x489usize.to_ne_bytes());
        assert_eq!(&id[word..2 * word], &0x8000_0001usize.to_ne_bytes());
        assert_eq!(&id[2 * word..], &2usize.to_ne_bytes());
    }
}
