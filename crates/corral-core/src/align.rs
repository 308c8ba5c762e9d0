//! Alignment arithmetic shared by blocks and large allocations.

/// Round `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. Returns `None` on overflow.
#[inline]
pub fn align_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    let mask = alignment - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Whether `alignment` is usable: non-zero and a power of two.
#[inline]
pub fn is_valid_alignment(alignment: usize) -> bool {
    alignment.is_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn already_aligned_is_unchanged() {
        assert_eq!(align_up(32, 16), Some(32));
        assert_eq!(align_up(0, 8), Some(0));
    }

    #[test]
    fn rounds_up_to_next_multiple() {
        assert_eq!(align_up(1, 16), Some(16));
        assert_eq!(align_up(17, 16), Some(32));
        assert_eq!(align_up(9, 8), Some(16));
    }

    #[test]
    fn overflow_is_reported() {
        assert_eq!(align_up(usize::MAX, 16), None);
    }

    #[test]
    fn zero_and_non_powers_are_invalid() {
        assert!(!is_valid_alignment(0));
        assert!(!is_valid_alignment(24));
        assert!(is_valid_alignment(1));
        assert!(is_valid_alignment(4096));
    }

    proptest! {
        #[test]
        fn aligned_value_is_smallest_multiple(value in 0usize..1 << 40, shift in 0u32..13) {
            let alignment = 1usize << shift;
            let aligned = align_up(value, alignment).unwrap();
            prop_assert_eq!(aligned % alignment, 0);
            prop_assert!(aligned >= value);
            prop_assert!(aligned - value < alignment);
        }
    }
}
