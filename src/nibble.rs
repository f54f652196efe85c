use std::fmt;
use std::ops::{Index, IndexMut};

/// A 4-bit unsigned integer (nibble).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(non_camel_case_types)]
pub struct u4(u8);

impl u4 {
    /// Creates a new `u4` from a `u8`.
    ///
    /// Panics if the value is greater than 0x0F.
    pub const fn new(value: u8) -> Self {
        assert!(value <= 0x0F, "u4 value must be in range 0x0-0xF");
        Self(value)
    }

    /// The low four bits of `byte`.
    pub const fn low(byte: u8) -> Self {
        Self(byte & 0x0F)
    }

    /// The high four bits of `byte`.
    pub const fn high(byte: u8) -> Self {
        Self(byte >> 4)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// All sixteen nibbles in ascending order.
    pub fn all() -> impl Iterator<Item = u4> {
        (0..=0x0F).map(u4)
    }
}

impl From<u4> for usize {
    fn from(v: u4) -> usize {
        v.0 as usize
    }
}

impl From<u4> for u8 {
    fn from(v: u4) -> u8 {
        v.0
    }
}

impl From<u4> for u16 {
    fn from(v: u4) -> u16 {
        v.0 as u16
    }
}

impl fmt::Display for u4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

impl<T> Index<u4> for [T; 16] {
    type Output = T;

    fn index(&self, index: u4) -> &Self::Output {
        &self[index.0 as usize]
    }
}

impl<T> IndexMut<u4> for [T; 16] {
    fn index_mut(&mut self, index: u4) -> &mut Self::Output {
        &mut self[index.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::u4;

    #[test]
    fn splits_a_byte_into_nibbles() {
        assert_eq!(u4::high(0xA7), u4::new(0xA));
        assert_eq!(u4::low(0xA7), u4::new(0x7));
    }

    #[test]
    fn indexes_register_files() {
        let mut regs = [0u8; 16];
        regs[u4::new(0xF)] = 1;
        assert_eq!(regs[15], 1);
        assert_eq!(u4::all().count(), 16);
    }

    #[test]
    #[should_panic]
    fn rejects_values_above_fifteen() {
        let _ = u4::new(0x10);
    }
}
