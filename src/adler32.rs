//! ADLER-32 (RFC 1950), the checksum zlib streams end with.

const MOD_ADLER: u32 = 65_521;
// Largest n such that 255 * n * (n + 1) / 2 + (n + 1) * (MOD_ADLER - 1) fits in
// a u32, i.e. how many bytes can be summed before reducing.
const NMAX: usize = 5552;

/// Running ADLER-32 state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Default for Adler32 {
    fn default() -> Self {
        Self { a: 1, b: 0 }
    }
}

impl Adler32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(NMAX) {
            for &byte in chunk {
                self.a += u32::from(byte);
                self.b += self.a;
            }
            self.a %= MOD_ADLER;
            self.b %= MOD_ADLER;
        }
    }

    pub fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

pub fn adler32(bytes: &[u8]) -> u32 {
    let mut adler = Adler32::new();
    adler.update(bytes);
    adler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values() {
        assert_eq!(adler32(b""), 1);
        assert_eq!(adler32(b"a"), 0x00620062);
        assert_eq!(adler32(b"hello"), 0x062c0215);
        assert_eq!(adler32(b"Wikipedia"), 0x11e60398);
    }

    #[test]
    fn running_matches_one_shot() {
        let data: Vec<u8> = (0..20_000_u32).map(|i| (i % 256) as u8).collect();
        let mut adler = Adler32::new();
        for piece in data.chunks(777) {
            adler.update(piece);
        }
        assert_eq!(adler.finish(), adler32(&data));
    }

    #[test]
    fn long_runs_of_0xff_do_not_overflow() {
        let data = vec![0xff; 3 * NMAX + 17];
        let (mut a, mut b) = (1_u64, 0_u64);
        for &byte in &data {
            a = (a + u64::from(byte)) % u64::from(MOD_ADLER);
            b = (b + a) % u64::from(MOD_ADLER);
        }
        assert_eq!(adler32(&data), ((b << 16) | a) as u32);
    }
}
