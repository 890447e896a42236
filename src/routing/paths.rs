//! Candidate path enumeration

use alloy_primitives::Address;

pub type Path = Vec<Address>;

/// Highest hop count the enumerator knows how to build
pub const MAX_SUPPORTED_HOPS: usize = 3;

/// All candidate paths from `token_in` to `token_out`.
///
/// Direct first, then one intermediate (`max_hops >= 2`), then ordered pairs
/// of distinct intermediates (`max_hops >= 3`). Intermediates equal to either
/// endpoint, or repeated, are ignored so no path revisits a token. Identical
/// endpoints yield nothing.
pub fn generate_paths(
    token_in: Address,
    token_out: Address,
    intermediates: &[Address],
    max_hops: usize,
) -> Vec<Path> {
    if token_in == token_out || max_hops == 0 {
        return Vec::new();
    }

    let mut mids: Vec<Address> = Vec::with_capacity(intermediates.len());
    for &mid in intermediates {
        if mid != token_in && mid != token_out && !mids.contains(&mid) {
            mids.push(mid);
        }
    }

    let mut paths = vec![vec![token_in, token_out]];

    if max_hops >= 2 {
        paths.extend(mids.iter().map(|&mid| vec![token_in, mid, token_out]));
    }

    if max_hops >= 3 {
        for &mid1 in &mids {
            for &mid2 in &mids {
                if mid1 != mid2 {
                    paths.push(vec![token_in, mid1, mid2, token_out]);
                }
            }
        }
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn test_path_validity() {
        let (a, b) = (addr(1), addr(2));
        let mids = [addr(3), addr(4), a, addr(5), addr(3)];

        for max_hops in 1..=MAX_SUPPORTED_HOPS {
            let paths = generate_paths(a, b, &mids, max_hops);
            assert!(!paths.is_empty());
            for path in &paths {
                assert!(path.len() >= 2 && path.len() <= max_hops + 1);
                assert_eq!(path[0], a);
                assert_eq!(*path.last().unwrap(), b);
                let unique: HashSet<_> = path.iter().collect();
                assert_eq!(unique.len(), path.len());
            }
        }
    }

    #[test]
    fn test_path_counts() {
        let (a, b) = (addr(1), addr(2));
        let mids = [addr(3), addr(4), addr(5)];

        assert_eq!(generate_paths(a, b, &mids, 1).len(), 1);
        assert_eq!(generate_paths(a, b, &mids, 2).len(), 1 + 3);
        // 3 * 2 ordered pairs
        assert_eq!(generate_paths(a, b, &mids, 3).len(), 1 + 3 + 6);
        assert_eq!(generate_paths(a, b, &mids, 3)[0], vec![a, b]);
    }

    #[test]
    fn test_same_token_has_no_paths() {
        assert!(generate_paths(addr(1), addr(1), &[addr(3)], 3).is_empty());
    }
}
