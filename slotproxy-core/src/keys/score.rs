//! Byte-wise-monotonic IEEE-754 double encoding, grounded on the
//! sign/mantissa-flip trick used by `marsevilspirit-nimbis`'s `ScoreKey`
//! (`storage_zset.rs`) and restated here in fixed-width big-endian form so
//! ordered KV scans over `SubKey2` (spec.md §3.1) produce members in score
//! order under plain byte comparison.

/// Encode `score` into 8 bytes such that unsigned byte-wise comparison of
/// the output is equivalent to numeric comparison of `score`.
///
/// NaN is rejected by callers at parse time (spec.md §4.1); this function
/// does not special-case it.
pub fn encode_score(score: f64) -> [u8; 8] {
    let bits = score.to_bits();
    let flipped = if (bits >> 63) == 1 {
        // negative: flip all bits so more-negative sorts first
        !bits
    } else {
        // positive (or zero): flip just the sign bit so positives sort
        // after all negatives
        bits | (1u64 << 63)
    };
    flipped.to_be_bytes()
}

/// Inverse of [`encode_score`].
pub fn decode_score(bytes: &[u8]) -> Option<f64> {
    if bytes.len() < 8 {
        return None;
    }
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[..8]);
    let flipped = u64::from_be_bytes(arr);
    let bits = if (flipped >> 63) == 1 {
        flipped & !(1u64 << 63)
    } else {
        !flipped
    };
    Some(f64::from_bits(bits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for v in [
            0.0,
            -0.0,
            1.0,
            -1.0,
            f64::MIN,
            f64::MAX,
            1.5,
            -1.5,
            123456.789,
            -123456.789,
        ] {
            let encoded = encode_score(v);
            let decoded = decode_score(&encoded).unwrap();
            assert_eq!(decoded.to_bits().wrapping_sub(v.to_bits()), 0);
        }
    }

    #[test]
    fn monotonic_ordering() {
        let values = [-1000.0, -1.5, -0.001, 0.0, 0.001, 1.5, 1000.0, f64::MAX];
        for w in values.windows(2) {
            let a = encode_score(w[0]);
            let b = encode_score(w[1]);
            assert!(a < b, "{} should sort before {}", w[0], w[1]);
        }
    }

    proptest::proptest! {
        #[test]
        fn monotonic_prop(a in proptest::num::f64::NORMAL, b in proptest::num::f64::NORMAL) {
            let ea = encode_score(a);
            let eb = encode_score(b);
            if a < b {
                proptest::prop_assert!(ea < eb);
            } else if a > b {
                proptest::prop_assert!(ea > eb);
            } else {
                proptest::prop_assert_eq!(ea, eb);
            }
        }
    }
}
