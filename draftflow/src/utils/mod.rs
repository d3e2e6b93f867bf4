//! Utility functions for ids, timestamps, hashing and text handling.

pub mod hashing;
pub mod text;
pub mod timestamps;
mod ids;

pub use hashing::{canonical_json, content_hash, sha256_hex, short_hash};
pub use ids::{generate_uuid, generate_uuid_v7};
pub use text::{char_len, count_words, truncate_chars};
pub use timestamps::{elapsed_ms, is_older_than, iso_timestamp, now_utc, Timestamp};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uuid_is_valid() {
        let id = generate_uuid();
        assert_eq!(id.get_version_num(), 4);
    }

    #[test]
    fn test_uuid_v7_is_time_ordered() {
        let a = generate_uuid_v7();
        let b = generate_uuid_v7();
        assert_eq!(a.get_version_num(), 7);
        assert!(a <= b);
    }
}
