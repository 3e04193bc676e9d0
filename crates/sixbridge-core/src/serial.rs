//! Serial number arithmetic (RFC 1982 §3).
//!
//! Sequence counters on the serial link wrap around, so raw integer comparison
//! gives the wrong answer near the wrap point. These functions compare and
//! advance counters in modular space. Two values exactly half the space apart
//! have no defined order; callers must treat [`SerialOrdering::Undefined`] as
//! "neither before nor after".

/// Result of comparing two serial numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerialOrdering {
    Less,
    Equal,
    Greater,
    /// The operands are exactly `2^(bits-1)` apart.
    Undefined,
}

impl SerialOrdering {
    /// The ordering seen from the other operand.
    pub fn reverse(self) -> Self {
        match self {
            SerialOrdering::Less => SerialOrdering::Greater,
            SerialOrdering::Greater => SerialOrdering::Less,
            other => other,
        }
    }
}

/// An unsigned counter that obeys serial-number arithmetic.
pub trait SerialNumber: Copy + Eq + Ord {
    /// `2^(bits-1)`, the ambiguous distance.
    const HALF: Self;

    /// `(self + n) mod 2^bits`, or `None` when `n >= 2^(bits-1)`.
    fn serial_add(self, n: Self) -> Option<Self>;

    /// Three-way comparison in modular space.
    fn serial_compare(self, other: Self) -> SerialOrdering;
}

macro_rules! impl_serial_number {
    ($($t:ty),*) => {
        $(
            impl SerialNumber for $t {
                const HALF: Self = 1 << (<$t>::BITS - 1);

                fn serial_add(self, n: Self) -> Option<Self> {
                    if n >= Self::HALF {
                        return None;
                    }
                    Some(self.wrapping_add(n))
                }

                fn serial_compare(self, other: Self) -> SerialOrdering {
                    if self == other {
                        return SerialOrdering::Equal;
                    }
                    let distance = other.wrapping_sub(self);
                    if distance == Self::HALF {
                        SerialOrdering::Undefined
                    } else if distance < Self::HALF {
                        SerialOrdering::Less
                    } else {
                        SerialOrdering::Greater
                    }
                }
            }
        )*
    };
}

impl_serial_number!(u8, u16, u32);

/// Add `n` to `s`, returning `None` when the addition is undefined.
pub fn serial_add<T: SerialNumber>(s: T, n: T) -> Option<T> {
    s.serial_add(n)
}

/// Compare `s1` against `s2`.
pub fn serial_compare<T: SerialNumber>(s1: T, s2: T) -> SerialOrdering {
    s1.serial_compare(s2)
}

/// Whether `seq` lies in the closed window `[lo, hi]`.
///
/// An `Undefined` comparison against either bound counts as outside.
pub fn in_window<T: SerialNumber>(seq: T, lo: T, hi: T) -> bool {
    matches!(
        seq.serial_compare(lo),
        SerialOrdering::Equal | SerialOrdering::Greater
    ) && matches!(
        seq.serial_compare(hi),
        SerialOrdering::Equal | SerialOrdering::Less
    )
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn compare_u8_is_antisymmetric(a in any::<u8>(), b in any::<u8>()) {
            prop_assert_eq!(serial_compare(a, b), serial_compare(b, a).reverse());
        }

        #[test]
        fn compare_u16_is_antisymmetric(a in any::<u16>(), b in any::<u16>()) {
            prop_assert_eq!(serial_compare(a, b), serial_compare(b, a).reverse());
        }

        #[test]
        fn compare_u32_is_antisymmetric(a in any::<u32>(), b in any::<u32>()) {
            prop_assert_eq!(serial_compare(a, b), serial_compare(b, a).reverse());
        }

        #[test]
        fn compare_is_reflexive(a in any::<u32>()) {
            prop_assert_eq!(serial_compare(a, a), SerialOrdering::Equal);
            prop_assert_eq!(serial_compare(a as u16, a as u16), SerialOrdering::Equal);
            prop_assert_eq!(serial_compare(a as u8, a as u8), SerialOrdering::Equal);
        }

        #[test]
        fn valid_add_lands_after(s in any::<u16>(), n in 1u16..0x8000) {
            let sum = serial_add(s, n).unwrap();
            prop_assert_eq!(serial_compare(s, sum), SerialOrdering::Less);
        }

        #[test]
        fn add_rejects_upper_half(s in any::<u8>(), n in 128u8..=255) {
            prop_assert_eq!(serial_add(s, n), None);
        }
    }
}
