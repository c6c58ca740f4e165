//! Deterministic hash helpers for sticky routing.

/// Small non-cryptographic FNV-1a hash used for deterministic assignments.
#[derive(Copy, Clone, Debug)]
pub struct StickyHash(u64);

impl StickyHash {
    /// Create a new hash state with the FNV-1a offset basis.
    pub fn new() -> Self {
        Self(0xcbf2_9ce4_8422_2325)
    }

    /// Feed bytes into the hash function.
    pub fn update(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 = (self.0 ^ (*b as u64)).wrapping_mul(0x0000_0100_0000_01b3);
        }
    }

    /// Finalise the hash and return a 64-bit value.
    pub fn finish64(&self) -> u64 {
        self.0
    }

    /// Map the hash onto the unit interval [0, 1).
    pub fn unit_interval(&self) -> f64 {
        // 53 bits keeps the mapping exact in an f64 mantissa.
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl Default for StickyHash {
    fn default() -> Self {
        Self::new()
    }
}
