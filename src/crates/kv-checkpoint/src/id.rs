//! Time-ordered checkpoint ids
//!
//! New ids are UUIDv7 strings. The first 48 bits of a v7 UUID hold the unix
//! timestamp in milliseconds, so the hyphenated form sorts lexically in
//! creation order and the creation time can be recovered from the id alone.
//! Ids written by older runtimes as UUIDv1/v6 are decoded through their
//! gregorian timestamps.

use std::cmp::Ordering;

use uuid::{Uuid, Version};

/// Generate a fresh time-ordered checkpoint id.
pub fn new_checkpoint_id() -> String {
    Uuid::now_v7().to_string()
}

/// Build a checkpoint id embedding the given unix timestamp in milliseconds.
///
/// The random tail comes from a v4 UUID so ids built for the same
/// millisecond stay distinct.
pub fn checkpoint_id_at(unix_millis: u64) -> String {
    let mut random = [0u8; 10];
    random.copy_from_slice(&Uuid::new_v4().as_bytes()[..10]);
    uuid::Builder::from_unix_timestamp_millis(unix_millis, &random)
        .into_uuid()
        .to_string()
}

/// Recover the creation time embedded in a checkpoint id.
///
/// Returns `None` for ids that are not time-based UUIDs.
pub fn decode_timestamp_millis(checkpoint_id: &str) -> Option<u64> {
    let uuid = Uuid::parse_str(checkpoint_id).ok()?;
    match uuid.get_version() {
        Some(Version::SortRand) => {
            let bytes = uuid.as_bytes();
            let mut millis = [0u8; 8];
            millis[2..].copy_from_slice(&bytes[..6]);
            Some(u64::from_be_bytes(millis))
        }
        Some(Version::Mac) | Some(Version::SortMac) => {
            let (secs, nanos) = uuid.get_timestamp()?.to_unix();
            Some(secs * 1000 + u64::from(nanos) / 1_000_000)
        }
        _ => None,
    }
}

/// Order two checkpoint ids by embedded time, oldest first.
///
/// Ids without a decodable timestamp sort before every decodable id; ties
/// fall back to the lexical order of the id strings.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    decode_timestamp_millis(a)
        .cmp(&decode_timestamp_millis(b))
        .then_with(|| a.cmp(b))
}
