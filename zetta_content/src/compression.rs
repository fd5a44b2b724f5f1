//! General purpose compression of asset payloads.

use std::io::{self, Cursor};

/// Compresses `data` with brotli.
pub fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut compressed = Vec::new();
    brotli::BrotliCompress(
        &mut Cursor::new(data),
        &mut compressed,
        &brotli::enc::BrotliEncoderParams {
            quality: 6,
            lgwin: 22,
            ..Default::default()
        },
    )?;
    Ok(compressed)
}

/// Reverses [`compress`].
pub fn decompress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    brotli::BrotliDecompress(&mut Cursor::new(data), &mut decompressed)?;
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_and_decompress() {
        let data = (0..4096u32).map(|i| (i % 17) as u8).collect::<Vec<_>>();
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn empty_input() {
        let compressed = compress(&[]).unwrap();
        assert!(decompress(&compressed).unwrap().is_empty());
    }

    #[test]
    fn truncated_stream_fails_to_decompress() {
        let data = (0..4096u32).map(|i| (i * 31 % 251) as u8).collect::<Vec<_>>();
        let compressed = compress(&data).unwrap();
        assert!(decompress(&compressed[..compressed.len() / 2]).is_err());
    }
}
