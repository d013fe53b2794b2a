#![no_main]

use clusterlens_core::decoder::transaction;
use clusterlens_core::{decode, FeedKind};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some((&split, rest)) = data.split_first() {
        let split = (split as usize).min(rest.len());
        let (key, value) = rest.split_at(split);
        let _ = decode(FeedKind::TransactionLog, key, Some(value));
    }

    // Anything that decodes must survive a re-encode
    if let Ok(value) = transaction::decode_value(data) {
        let encoded = transaction::encode_value(&value);
        let decoded = transaction::decode_value(&encoded).unwrap();
        assert_eq!(decoded.state, value.state);
        assert_eq!(decoded.partitions, value.partitions);
    }
});
