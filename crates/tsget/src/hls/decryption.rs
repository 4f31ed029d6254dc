// HLS Segment Decryptor: AES-128-ECB with PKCS#7 padding, applied to a
// downloaded segment file in place.

use std::path::Path;
use std::sync::Arc;

use aes::Aes128;
use aes::cipher::{BlockDecryptMut, KeyInit, block_padding::Pkcs7};
use tracing::debug;

use crate::DownloadError;
use crate::hls::key::DecryptionKey;

type Aes128EcbDec = ecb::Decryptor<Aes128>;

const BLOCK_SIZE: usize = 16;

/// Decrypt a whole ciphertext and strip its padding.
pub fn decrypt_bytes(data: &[u8], key: &DecryptionKey) -> Result<Vec<u8>, DownloadError> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(DownloadError::decryption(format!(
            "ciphertext length {} is not a multiple of {BLOCK_SIZE}",
            data.len()
        )));
    }

    let mut buffer = data.to_vec();
    let decrypted_len = Aes128EcbDec::new(key.as_bytes().into())
        .decrypt_padded_mut::<Pkcs7>(&mut buffer)
        .map_err(|e| DownloadError::decryption(format!("invalid padding: {e}")))?
        .len();
    buffer.truncate(decrypted_len);
    Ok(buffer)
}

/// Replace the file at `path` with its decrypted content.
///
/// The cipher work runs on the blocking pool. On error the file is left as it
/// was; the caller decides whether to discard it.
pub async fn decrypt_in_place(path: &Path, key: &Arc<DecryptionKey>) -> Result<(), DownloadError> {
    let ciphertext = tokio::fs::read(path).await?;
    let encrypted_len = ciphertext.len();

    let key = Arc::clone(key);
    let plaintext = tokio::task::spawn_blocking(move || decrypt_bytes(&ciphertext, &key))
        .await
        .map_err(|e| DownloadError::decryption(format!("decryption task failed: {e}")))??;

    tokio::fs::write(path, &plaintext).await?;
    debug!(
        path = %path.display(),
        encrypted_len,
        decrypted_len = plaintext.len(),
        "Segment decrypted"
    );
    Ok(())
}
