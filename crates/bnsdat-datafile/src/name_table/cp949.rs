//! CP949 handling for alias strings.
//!
//! `encoding_rs` exposes code page 949 (Unified Hangul Code) under its
//! WHATWG name, EUC-KR.

use std::borrow::Cow;

use encoding_rs::EUC_KR;

use crate::{Error, Result};

/// Encode an alias, failing on characters outside CP949.
pub(crate) fn encode(value: &str) -> Result<Cow<'_, [u8]>> {
    let (bytes, _, had_errors) = EUC_KR.encode(value);
    if had_errors {
        return Err(Error::InvalidString(format!(
            "alias {value:?} cannot be encoded as CP949"
        )));
    }
    Ok(bytes)
}

pub(crate) fn decode(bytes: &[u8]) -> String {
    EUC_KR.decode_without_bom_handling(bytes).0.into_owned()
}

/// Bytes that order aliases the way C `strcmp` orders their CP949 encoding.
pub(crate) fn sort_key(value: &str) -> Vec<u8> {
    let (mut bytes, _, _) = EUC_KR.encode(value);
    // strcmp stops at the first NUL
    if let Some(nul) = memchr::memchr(0, &bytes) {
        bytes.to_mut().truncate(nul);
    }
    bytes.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    fn compare(a: &str, b: &str) -> Ordering {
        sort_key(a).cmp(&sort_key(b))
    }

    #[test]
    fn test_ascii_order_is_bytewise() {
        assert_eq!(compare("item:", "quest:"), Ordering::Less);
        assert_eq!(compare("Z", "a"), Ordering::Less);
        assert_eq!(compare("ab", "a"), Ordering::Greater);
        assert_eq!(compare("shield", "shield"), Ordering::Equal);
        assert_eq!(compare("a\0b", "a"), Ordering::Equal);
    }

    #[test]
    fn test_hangul_sorts_after_ascii() {
        assert_eq!(compare("검", "z"), Ordering::Greater);
        // 가 is b0a1, 나 is b3aa
        assert_eq!(compare("가", "나"), Ordering::Less);
    }

    #[test]
    fn test_roundtrip() {
        let bytes = encode("무기_sword").unwrap();
        assert_eq!(bytes.len(), 10);
        assert_eq!(decode(&bytes), "무기_sword");
    }

    #[test]
    fn test_unencodable() {
        assert!(matches!(encode("\u{1F600}"), Err(Error::InvalidString(_))));
    }
}
