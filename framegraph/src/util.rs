//! Small numeric helpers shared by the allocators.

/// Round `value` up to a multiple of `alignment`, which must be a power of two.
#[inline]
pub(crate) fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two(), "alignment {alignment} is not a power of two");
    value.next_multiple_of(alignment)
}
