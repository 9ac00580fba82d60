//! Fixed-key AES-128-CBC wrapper for the encrypted part of every frame
//!
//! The sockets use one key for all devices and reuse the key as the
//! initialization vector. Both are kept here so nothing else in the crate
//! depends on how the payload is protected.

use aes::Aes128;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use crate::constants::BLOCK_SIZE;
use crate::error::{Result, WsError};

/// AES-128 key shared by all sockets of the protocol family
pub const PASSKEY: &[u8; 16] = b"0123456789abcdef";

/// CBC initialization vector, identical to the key
pub const INITIALIZATION_VECTOR: &[u8; 16] = PASSKEY;

/// Encrypt `plaintext` with AES-128-CBC. No padding is added.
pub fn encrypt(plaintext: &[u8]) -> Result<Vec<u8>> {
    check_block_size(plaintext.len())?;

    let cipher = Aes128::new(PASSKEY.into());
    let mut output = plaintext.to_vec();
    let mut previous = *INITIALIZATION_VECTOR;

    for chunk in output.chunks_mut(BLOCK_SIZE) {
        xor_in_place(chunk, &previous);
        cipher.encrypt_block(chunk.into());
        previous.copy_from_slice(chunk);
    }

    Ok(output)
}

/// Decrypt `ciphertext` with AES-128-CBC. Padding is left in place.
pub fn decrypt(ciphertext: &[u8]) -> Result<Vec<u8>> {
    check_block_size(ciphertext.len())?;

    let cipher = Aes128::new(PASSKEY.into());
    let mut output = ciphertext.to_vec();
    let mut previous = *INITIALIZATION_VECTOR;

    for chunk in output.chunks_mut(BLOCK_SIZE) {
        let mut current = [0u8; BLOCK_SIZE];
        current.copy_from_slice(chunk);
        cipher.decrypt_block(chunk.into());
        xor_in_place(chunk, &previous);
        previous = current;
    }

    Ok(output)
}

fn check_block_size(len: usize) -> Result<()> {
    if len.is_multiple_of(BLOCK_SIZE) {
        Ok(())
    } else {
        Err(WsError::InvalidBlockSize(len))
    }
}

fn xor_in_place(block: &mut [u8], mask: &[u8; BLOCK_SIZE]) {
    for (byte, m) in block.iter_mut().zip(mask) {
        *byte ^= m;
    }
}
