#![no_main]

use clusterlens_core::decoder::group::decode_consumer_assignment;
use clusterlens_core::varint::decode_varint_u64;
use clusterlens_core::{decode, FeedKind};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Group log records, consumer assignments and varints must never panic,
    // whatever the bytes claim about lengths and versions.

    // First byte picks the split between key and value
    if let Some((&split, rest)) = data.split_first() {
        let split = (split as usize).min(rest.len());
        let (key, value) = rest.split_at(split);
        let _ = decode(FeedKind::GroupLog, key, Some(value));
        let _ = decode(FeedKind::GroupLog, key, None);
    }

    let _ = decode_consumer_assignment(data);

    let mut cursor = data;
    let _ = decode_varint_u64(&mut cursor);
});
