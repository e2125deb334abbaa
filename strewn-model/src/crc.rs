use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// Order-sensitive combinable checksum used as the cache identity for spawn
/// resources and element results.
///
/// A zero value doubles as "never computed", so validity is carried as an
/// explicit flag instead of being inferred from the value. Combining starts
/// from whatever state the Crc is in and always yields a valid result; only
/// `INVALID` itself must not be used as a cache key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crc {
    value: u32,
    valid: bool,
}

impl Crc {
    pub const INVALID: Crc = Crc {
        value: 0,
        valid: false,
    };

    pub fn from_value(value: u32) -> Crc {
        Crc { value, valid: true }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// True only when both sides are valid and carry the same value. An
    /// invalid Crc matches nothing, not even itself.
    pub fn matches(&self, other: Crc) -> bool {
        self.valid && other.valid && self.value == other.value
    }

    /// Extends the running CRC-32 with `bytes`. Chaining is equivalent to
    /// hashing the concatenated input in one go, and is order-sensitive:
    /// `a.combine_bytes(x).combine_bytes(y)` differs from the swapped order.
    pub fn combine_bytes(self, bytes: &[u8]) -> Crc {
        let mut hasher = crc32fast::Hasher::new_with_initial(self.value);
        hasher.update(bytes);
        Crc {
            value: hasher.finalize(),
            valid: true,
        }
    }

    /// Strings are length-prefixed so that ("ab", "c") and ("a", "bc")
    /// combine to different values.
    pub fn combine_str(self, value: &str) -> Crc {
        self.combine_u32(value.len() as u32).combine_bytes(value.as_bytes())
    }

    pub fn combine_u32(self, value: u32) -> Crc {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.combine_bytes(&buf)
    }

    pub fn combine_u64(self, value: u64) -> Crc {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.combine_bytes(&buf)
    }

    pub fn combine_f32(self, value: f32) -> Crc {
        self.combine_u32(value.to_bits())
    }

    pub fn combine_f32_slice(self, values: &[f32]) -> Crc {
        let mut buf = vec![0u8; values.len() * 4];
        LittleEndian::write_f32_into(values, &mut buf);
        self.combine_bytes(&buf)
    }

    pub fn combine_u32_slice(self, values: &[u32]) -> Crc {
        let mut buf = vec![0u8; values.len() * 4];
        LittleEndian::write_u32_into(values, &mut buf);
        self.combine_bytes(&buf)
    }

    pub fn combine_bool(self, value: bool) -> Crc {
        self.combine_bytes(&[value as u8])
    }
}

impl Default for Crc {
    fn default() -> Self {
        Crc::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn invalid_by_default() {
        assert!(!Crc::default().is_valid());
        assert_eq!(Crc::default(), Crc::INVALID);
        assert!(Crc::from_value(0).is_valid());
        assert_ne!(Crc::from_value(0), Crc::INVALID);
    }

    #[test]
    pub fn invalid_matches_nothing() {
        assert!(!Crc::INVALID.matches(Crc::INVALID));
        assert!(!Crc::INVALID.matches(Crc::from_value(0)));
        assert!(!Crc::from_value(0).matches(Crc::INVALID));
        assert!(Crc::from_value(7).matches(Crc::from_value(7)));
        assert!(!Crc::from_value(7).matches(Crc::from_value(8)));
    }

    #[test]
    pub fn matches_the_crc32_check_value() {
        // Standard CRC-32 check input, expected value per the polynomial spec.
        let crc = Crc::INVALID.combine_bytes(b"123456789");
        assert_eq!(crc.value(), 0xCBF43926);
        assert!(crc.is_valid());
    }

    #[test]
    pub fn chaining_equals_one_shot() {
        let chained = Crc::INVALID.combine_bytes(b"1234").combine_bytes(b"56789");
        let one_shot = Crc::INVALID.combine_bytes(b"123456789");
        assert_eq!(chained, one_shot);
    }

    #[test]
    pub fn order_matters() {
        let ab = Crc::INVALID.combine_str("a").combine_str("b");
        let ba = Crc::INVALID.combine_str("b").combine_str("a");
        assert_ne!(ab, ba);
    }

    #[test]
    pub fn length_prefix_disambiguates_strings() {
        let split_late = Crc::INVALID.combine_str("ab").combine_str("c");
        let split_early = Crc::INVALID.combine_str("a").combine_str("bc");
        assert_ne!(split_late, split_early);
    }

    #[test]
    pub fn deterministic_across_calls() {
        let a = Crc::INVALID.combine_u32(42).combine_str("meshes/rock").combine_bool(true);
        let b = Crc::INVALID.combine_u32(42).combine_str("meshes/rock").combine_bool(true);
        assert_eq!(a, b);
    }
}
