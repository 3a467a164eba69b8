//! Fuzz target for block record decryption
//!
//! Arbitrary records must never decrypt, and a sealed record with one flipped
//! bit must fail authentication rather than yield altered plaintext.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use oxcrypt_content::fs::{BLOCK_SIZE, BlockCodec, FileId};
use oxcrypt_content::{CipherBackend, ContentKey};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    mode: FuzzMode,
    ring: bool,
    block_no: u64,
    file_id: [u8; 16],
    data: Vec<u8>,
}

#[derive(Arbitrary, Debug)]
enum FuzzMode {
    /// Decrypt raw bytes as a record
    RecordRaw,
    /// Seal the input, flip one bit, decrypt
    RoundtripCorrupt { position: usize, bit: u8 },
}

fuzz_target!(|input: FuzzInput| {
    let Ok(key) = ContentKey::new([0x42; 32]) else {
        return;
    };
    let backend = if input.ring {
        CipherBackend::Ring
    } else {
        CipherBackend::RustCrypto
    };
    let Ok(codec) = BlockCodec::new(&key, backend) else {
        return;
    };
    let file_id = FileId::from_bytes(input.file_id);

    match input.mode {
        FuzzMode::RecordRaw => {
            assert!(codec.decrypt_block(&file_id, input.block_no, &input.data).is_err());
        }
        FuzzMode::RoundtripCorrupt { position, bit } => {
            if input.data.is_empty() || input.data.len() > BLOCK_SIZE {
                return;
            }
            let mut record = codec
                .encrypt_block(&file_id, input.block_no, &input.data)
                .expect("sealing a valid block must succeed");
            let decrypted = codec
                .decrypt_block(&file_id, input.block_no, &record)
                .expect("roundtrip of a valid block must succeed");
            assert_eq!(decrypted, input.data);

            let at = position % record.len();
            record[at] ^= 1 << (bit % 8);
            assert!(codec.decrypt_block(&file_id, input.block_no, &record).is_err());
        }
    }
});
