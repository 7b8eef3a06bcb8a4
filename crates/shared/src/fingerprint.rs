use sha2::{Digest, Sha256};

/// Stable identity of an article, derived from its title and link.
///
/// Both parts are trimmed; the `||` separator keeps `("ab", "c")` and
/// `("a", "bc")` apart.
pub fn fingerprint(title: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.trim().as_bytes());
    hasher.update(b"||");
    hasher.update(link.trim().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint("Carbonate ramps", "https://example.org/a");
        let b = fingerprint("Carbonate ramps", "https://example.org/a");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_differs_by_title() {
        let link = "https://example.org/a";
        assert_ne!(fingerprint("Dolomite", link), fingerprint("Limestone", link));
    }

    #[test]
    fn test_fingerprint_ignores_surrounding_whitespace() {
        assert_eq!(
            fingerprint("  Dolomite \n", " https://example.org/a "),
            fingerprint("Dolomite", "https://example.org/a")
        );
    }

    #[test]
    fn test_fingerprint_separator_prevents_concatenation_collisions() {
        assert_ne!(fingerprint("ab", "c"), fingerprint("a", "bc"));
    }

    #[test]
    fn test_fingerprint_accepts_empty_parts() {
        assert_eq!(fingerprint("", ""), fingerprint("   ", ""));
        assert_ne!(fingerprint("", "https://example.org"), fingerprint("", ""));
    }
}
