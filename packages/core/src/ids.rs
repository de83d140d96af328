// ABOUTME: Prefixed ID generation shared by all entity stores
// ABOUTME: IDs look like "rpt-V1StGXR8_Z5jdHi6B-myT" so logs and URLs are self-describing

/// Generate a prefixed unique ID, e.g. `generate_id("rpt")`.
pub fn generate_id(prefix: &str) -> String {
    format!("{}-{}", prefix, nanoid::nanoid!())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_prefix_and_uniqueness() {
        let a = generate_id("rpt");
        let b = generate_id("rpt");
        assert!(a.starts_with("rpt-"));
        assert!(b.starts_with("rpt-"));
        assert_ne!(a, b);

        // nanoid default length is 21
        assert_eq!(a.len(), "rpt-".len() + 21);
    }
}
