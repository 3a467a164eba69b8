//! Fuzz target for container header parsing
//!
//! Arbitrary leading bytes must parse into a header or a typed error, and a
//! parsed header must serialize back to the bytes it came from.

#![no_main]

use libfuzzer_sys::fuzz_target;
use oxcrypt_content::fs::{FileHeader, HEADER_SIZE};

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = FileHeader::parse(data) {
        assert!(data.len() >= HEADER_SIZE);
        assert_eq!(&header.to_bytes()[..], &data[..HEADER_SIZE]);
    }
});
