//! Streaming MD5 digests over byte buffers, open readers, and paths.
//!
//! The engine reads in fixed-size blocks so memory use stays bounded no
//! matter how large the assembled artifact is. It is used twice per upload:
//! the client declares the whole-file checksum up front, and the server
//! re-digests the fully written artifact at end-of-stream to catch partial
//! writes, truncated transfers, and interleaved chunk corruption.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Block size for streaming reads.
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Digest an in-memory buffer.
pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}

/// Digest everything remaining on an open reader. The handle belongs to the
/// caller and is never closed here.
pub fn digest_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
    let mut context = md5::Context::new();
    let mut block = vec![0u8; BLOCK_SIZE];
    loop {
        let n = reader.read(&mut block)?;
        if n == 0 {
            break;
        }
        context.consume(&block[..n]);
    }
    Ok(hex::encode(context.compute().0))
}

/// Digest a file on disk. Opens its own handle and drops it when done.
pub fn digest_path(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    digest_reader(&mut file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_digest_bytes_known_value() {
        // RFC 1321 test vector.
        assert_eq!(digest_bytes(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(digest_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_digest_reader_matches_digest_bytes() {
        let data: Vec<u8> = (0..BLOCK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let mut cursor = io::Cursor::new(&data);
        assert_eq!(digest_reader(&mut cursor).unwrap(), digest_bytes(&data));
    }

    #[test]
    fn test_digest_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        let mut file = File::create(&path).unwrap();
        file.write_all(b"hello chunked world").unwrap();
        drop(file);

        assert_eq!(
            digest_path(&path).unwrap(),
            digest_bytes(b"hello chunked world")
        );
    }

    #[test]
    fn test_digest_path_missing_file_is_an_error() {
        assert!(digest_path(Path::new("/nonexistent/no-such-file")).is_err());
    }
}
