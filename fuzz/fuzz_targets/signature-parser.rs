#![no_main]

use commit_sigcheck::keyring::Keyring;
use commit_sigcheck::verify;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let keyring = Keyring::default();
    verify::verify_detached(b"", data, &keyring).ok();
    verify::verify(b"", data, &keyring).ok();
});
