#![no_main]

use clusterlens_core::{decode, FeedKind};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Node data is JSON; the path is checked against the known topic layouts.
    for path in [
        "/brokers/topics/orders",
        "/brokers/topics/orders/partitions/0/state",
        "/config/topics/orders",
    ] {
        let _ = decode(FeedKind::Coordination, path.as_bytes(), Some(data));
    }

    // Arbitrary bytes as a path
    let _ = decode(FeedKind::Coordination, data, None);
});
