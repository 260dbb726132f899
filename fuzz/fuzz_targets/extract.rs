#![no_main]

use commit_sigcheck::commit::{Anchoring, SignedCommit};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for anchoring in [Anchoring::FirstMatch, Anchoring::Headers] {
        if let Ok(signed) = SignedCommit::from_bytes_with(data, anchoring) {
            assert_eq!(signed.to_commit_text(), data);
        }
    }
});
