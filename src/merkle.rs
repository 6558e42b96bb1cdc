use crate::utils::sha256_digest;

/// Computes the Merkle root over the serialized bytes of an ordered list of
/// items. Each leaf is `SHA-256(bytes)`; levels are built bottom-up, pairing
/// adjacent nodes and hashing their concatenation, duplicating the last node
/// whenever a level has an odd count, until a single root remains.
///
/// # Panics
///
/// Panics if `items` is empty — a block always carries at least a coinbase.
#[must_use]
pub fn merkle_root(items: &[Vec<u8>]) -> Vec<u8> {
    assert!(!items.is_empty(), "cannot compute a Merkle root over no items");

    let mut level: Vec<Vec<u8>> = items.iter().map(|item| sha256_digest(item)).collect();

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(level.last().expect("level is non-empty").clone());
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut combined = pair[0].clone();
                combined.extend_from_slice(&pair[1]);
                sha256_digest(&combined)
            })
            .collect();
    }

    level.into_iter().next().expect("level reduces to exactly one root")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(b: u8) -> Vec<u8> {
        vec![b; 4]
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let items = vec![leaf(1)];
        assert_eq!(merkle_root(&items), sha256_digest(&leaf(1)));
    }

    #[test]
    fn two_leaves_hash_their_concatenation() {
        let items = vec![leaf(1), leaf(2)];
        let mut expected = sha256_digest(&leaf(1));
        expected.extend(sha256_digest(&leaf(2)));
        let expected = sha256_digest(&expected);
        assert_eq!(merkle_root(&items), expected);
    }

    #[test]
    fn odd_count_duplicates_last_leaf() {
        let three = merkle_root(&[leaf(1), leaf(2), leaf(3)]);
        let four = merkle_root(&[leaf(1), leaf(2), leaf(3), leaf(3)]);
        assert_eq!(three, four);
    }

    #[test]
    fn order_is_significant() {
        let a = merkle_root(&[leaf(1), leaf(2), leaf(3)]);
        let b = merkle_root(&[leaf(3), leaf(2), leaf(1)]);
        assert_ne!(a, b);
    }

    #[test]
    #[should_panic(expected = "no items")]
    fn empty_input_panics() {
        let empty: Vec<Vec<u8>> = vec![];
        let _ = merkle_root(&empty);
    }
}
