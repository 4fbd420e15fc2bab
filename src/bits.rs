/// Fixed-length ordered bit sequence used to build ASIC shift-register
/// configuration chains.
///
/// Lifecycle: build, byte-pack with bit reversal, transmit, discard. The
/// probe ASIC shifts each byte MSB-first while the chain is defined
/// LSB-first, so bit `k` of the vector lands in byte `k / 8` at bit
/// position `7 - (k % 8)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitVector {
    bits: Vec<bool>,
}

impl BitVector {
    pub fn new(len: usize) -> Self {
        BitVector {
            bits: vec![false; len],
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn get(&self, index: usize) -> bool {
        self.bits[index]
    }

    pub fn set(&mut self, index: usize, value: bool) {
        self.bits[index] = value;
    }

    pub fn count_ones(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Write an unsigned field of `width` bits starting at `offset`,
    /// least-significant bit first.
    pub fn set_field(&mut self, offset: usize, width: usize, value: u32) {
        for i in 0..width {
            self.bits[offset + i] = (value >> i) & 1 == 1;
        }
    }

    /// Pack into transmit order: one output byte per 8 bits, each byte
    /// bit-reversed. Trailing bits of a partial last byte pad with zeros.
    pub fn pack_reversed(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.bits.len().div_ceil(8)];
        for (k, &bit) in self.bits.iter().enumerate() {
            if bit {
                bytes[k / 8] |= 1 << (7 - (k % 8));
            }
        }
        bytes
    }

    /// Inverse of [`pack_reversed`](Self::pack_reversed) for a known vector
    /// length.
    pub fn unpack_reversed(bytes: &[u8], len: usize) -> Self {
        let mut v = BitVector::new(len);
        for k in 0..len {
            v.bits[k] = bytes[k / 8] & (1 << (7 - (k % 8))) != 0;
        }
        v
    }
}
