//! Random name generation for topics and consumer groups.

use rand::Rng;

use crate::constants::{GROUP_ID_PREFIX, GROUP_ID_SUFFIX_LEN, TOPIC_NAME_LEN};

const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Generate a random lowercase-hex string of exactly `len` characters.
pub fn random_hex_name(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| HEX_CHARS[rng.gen_range(0..HEX_CHARS.len())] as char)
        .collect()
}

/// Generate a topic name.
///
/// Uniqueness within a run is probabilistic, not checked; the namespace is
/// large enough for a benchmarking tool.
pub fn random_topic_name() -> String {
    random_hex_name(TOPIC_NAME_LEN)
}

/// Generate a consumer group id with a fresh random suffix.
///
/// The suffix keeps separate process runs out of each other's groups, so a
/// new run never inherits committed offsets from an earlier one.
pub fn random_group_id() -> String {
    format!("{}{}", GROUP_ID_PREFIX, random_hex_name(GROUP_ID_SUFFIX_LEN))
}
