// Sequence number helpers. Never compare sequence numbers with signed math.

/// `a + n` modulo 2^32.
#[inline]
pub fn seq_add(a: u32, n: usize) -> u32 {
    a.wrapping_add(n as u32)
}

/// Bytes from `from` forward to `to`, modulo 2^32.
#[inline]
pub fn seq_distance(from: u32, to: u32) -> u32 {
    to.wrapping_sub(from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_add_wraps() {
        assert_eq!(seq_add(0xFFFF_FFEF, 32), 0x0000_000F);
        assert_eq!(seq_add(0xFFFF_FFF0, 32), 0x0000_0010);
        assert_eq!(seq_add(1000, 100), 1100);
    }

    #[test]
    fn test_distance_across_wrap() {
        assert_eq!(seq_distance(0xFFFF_FFF0, 0x0000_0010), 0x20);
        assert_eq!(seq_distance(1100, 1200), 100);
    }

    #[test]
    fn test_backwards_distance_is_huge() {
        // A segment behind the expected point looks like an enormous forward gap
        assert_eq!(seq_distance(1200, 1100), u32::MAX - 99);
    }
}
