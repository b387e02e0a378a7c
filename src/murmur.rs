//! Streaming MurmurHash3 (x86, 32-bit variant).
//!
//! Used as the structural fingerprint of a decoded project and anywhere a
//! fast non-cryptographic hash of binary chunks is needed.

const C1: u32 = 0xcc9e2d51;
const C2: u32 = 0x1b873593;

fn mix(hash: u32, k: u32) -> u32 {
    let mut k = k.wrapping_mul(C1);
    k = k.rotate_left(15);
    k = k.wrapping_mul(C2);

    let mut hash = hash ^ k;
    hash = hash.rotate_left(13);
    hash.wrapping_mul(5).wrapping_add(0xe6546b64)
}

/// Incremental MurmurHash3 x86-32. Feed any number of byte slices with
/// [`add`](MurmurHash3::add), then finish with [`digest`](MurmurHash3::digest).
/// Split points between `add` calls do not affect the result.
#[derive(Debug, Clone)]
pub struct MurmurHash3 {
    hash: u32,
    tail: Vec<u8>,
    total_length: u32,
}

impl MurmurHash3 {
    pub fn new(seed: u32) -> MurmurHash3 {
        MurmurHash3 {
            hash: seed,
            tail: Vec::with_capacity(4),
            total_length: 0,
        }
    }

    pub fn add(&mut self, data: &[u8]) {
        let mut pos = 0;
        let mut hash = self.hash;

        // Top up a partial block left over from a previous call.
        if !self.tail.is_empty() {
            while self.tail.len() < 4 && pos < data.len() {
                self.tail.push(data[pos]);
                pos += 1;
            }
            if self.tail.len() < 4 {
                self.total_length = self.total_length.wrapping_add(data.len() as u32);
                return;
            }
            let k = u32::from_le_bytes([self.tail[0], self.tail[1], self.tail[2], self.tail[3]]);
            hash = mix(hash, k);
            self.tail.clear();
        }

        while pos + 4 <= data.len() {
            let k = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
            hash = mix(hash, k);
            pos += 4;
        }

        self.tail.extend_from_slice(&data[pos..]);

        self.total_length = self.total_length.wrapping_add(data.len() as u32);
        self.hash = hash;
    }

    pub fn digest(&self) -> u32 {
        let mut hash = self.hash;
        let mut k1: u32 = 0;

        if self.tail.len() >= 3 {
            k1 ^= (self.tail[2] as u32) << 16;
        }
        if self.tail.len() >= 2 {
            k1 ^= (self.tail[1] as u32) << 8;
        }
        if !self.tail.is_empty() {
            k1 ^= self.tail[0] as u32;
            k1 = k1.wrapping_mul(C1);
            k1 = k1.rotate_left(15);
            k1 = k1.wrapping_mul(C2);
            hash ^= k1;
        }

        hash ^= self.total_length;
        hash ^= hash >> 16;
        hash = hash.wrapping_mul(0x85ebca6b);
        hash ^= hash >> 13;
        hash = hash.wrapping_mul(0xc2b2ae35);
        hash ^= hash >> 16;

        hash
    }

    /// The digest formatted as 8 lowercase hex digits.
    pub fn hex_digest(&self) -> String {
        format!("{:08x}", self.digest())
    }
}
