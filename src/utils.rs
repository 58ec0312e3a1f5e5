//! Utility functions for identifiers and index keys

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Join key parts with a zero byte so that `scan_prefix(head ‖ 0x00)` only
/// matches entries of exactly that head.
pub fn index_key(parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::with_capacity(parts.iter().map(|p| p.len() + 1).sum());
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            key.push(0);
        }
        key.extend_from_slice(part);
    }
    key
}

/// The prefix under which every `index_key(&[head, ..])` lives.
pub fn index_prefix(head: &[u8]) -> Vec<u8> {
    let mut key = head.to_vec();
    key.push(0);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_prefixed_unique_ids() {
        let a = new_uuid_to_bech32("book_").unwrap();
        let b = new_uuid_to_bech32("book_").unwrap();

        assert!(a.starts_with("book_1"));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_hrp_is_rejected() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn index_keys_share_their_head_prefix() {
        let key = index_key(&[b"user_a".as_slice(), b"trade_b".as_slice()]);
        assert!(key.starts_with(&index_prefix(b"user_a")));
        // "user_ab" must not collide with "user_a"
        let longer = index_key(&[b"user_ab".as_slice(), b"trade_b".as_slice()]);
        assert!(!longer.starts_with(&index_prefix(b"user_a")));
    }
}
