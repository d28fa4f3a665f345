// Shared Hash Kernel
// Double SHA-256 header hashing shared between the trainer and the host tooling

//! # Hash Kernel
//!
//! Canonical double SHA-256 over 80-byte training headers, plus the header
//! assembly rules that map a record's semantic slots and a candidate nonce
//! into header bytes. Accelerated backends plug in behind [`HashBackend`]
//! and are conformance-checked against the software implementation.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of an assembled training header in bytes.
pub const HEADER_LEN: usize = 80;
/// Length of a hash digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Header version word, little-endian at bytes 0..4.
pub const HEADER_VERSION: u32 = 0x0000_0002;
/// Compact difficulty bits word, little-endian at bytes 72..76.
pub const HEADER_BITS: u32 = 0x1d00_ffff;

pub type HeaderBytes = [u8; HEADER_LEN];
pub type DigestBytes = [u8; DIGEST_LEN];

#[derive(Error, Debug)]
pub enum HashKernelError {
    #[error("backend '{0}' failed conformance check against software hashing")]
    ConformanceFailed(String),
    #[error("batch length mismatch: submitted {submitted}, returned {returned}")]
    BatchMismatch { submitted: usize, returned: usize },
}

/// Canonical double SHA-256 of an 80-byte header.
pub fn double_sha256(header: &HeaderBytes) -> DigestBytes {
    let first = Sha256::digest(header);
    let second = Sha256::digest(first);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&second);
    out
}

/// Big-endian u32 view of the first four digest bytes, used as the probe
/// into the jitter oracle and as the candidate's `hash_output`.
pub fn digest_prefix_u32(digest: &DigestBytes) -> u32 {
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Hex rendering of a digest for logs and checkpoint records.
pub fn digest_hex(digest: &DigestBytes) -> String {
    hex::encode(digest)
}

/// Assemble an 80-byte header from twelve semantic slots and a nonce.
///
/// Layout: version (LE) at 0..4, slots 0..7 big-endian at 4..36, slots 8..11
/// big-endian at 36..52, zero padding at 52..68, timestamp (LE) at 68..72,
/// difficulty bits (LE) at 72..76, nonce big-endian at 76..80.
pub fn assemble_header(slots: &[u32; 12], nonce: u32, timestamp: u32) -> HeaderBytes {
    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(&HEADER_VERSION.to_le_bytes());
    for (i, slot) in slots[0..8].iter().enumerate() {
        header[4 + i * 4..8 + i * 4].copy_from_slice(&slot.to_be_bytes());
    }
    for (i, slot) in slots[8..12].iter().enumerate() {
        header[36 + i * 4..40 + i * 4].copy_from_slice(&slot.to_be_bytes());
    }
    // bytes 52..68 stay zero
    header[68..72].copy_from_slice(&timestamp.to_le_bytes());
    header[72..76].copy_from_slice(&HEADER_BITS.to_le_bytes());
    header[76..80].copy_from_slice(&nonce.to_be_bytes());
    header
}

/// Overwrite one u32 lane of the merkle-root region (bytes 36..52).
///
/// `lane` cycles over 0..4; the value is written big-endian, matching the
/// slot encoding used at assembly time.
pub fn patch_merkle_lane(header: &mut HeaderBytes, lane: usize, value: u32) {
    let lane = lane % 4;
    header[36 + lane * 4..40 + lane * 4].copy_from_slice(&value.to_be_bytes());
}

/// Read the nonce back out of an assembled header.
pub fn header_nonce(header: &HeaderBytes) -> u32 {
    u32::from_be_bytes([header[76], header[77], header[78], header[79]])
}

/// Hash backend capability set.
///
/// `hash_many` is functionally equivalent to mapping `hash`; backends may
/// parallelize as long as output order matches input order bit-for-bit.
pub trait HashBackend: Send + Sync {
    fn name(&self) -> &str;

    fn hash(&self, header: &HeaderBytes) -> DigestBytes;

    fn hash_many(&self, headers: &[HeaderBytes]) -> Vec<DigestBytes> {
        headers.iter().map(|h| self.hash(h)).collect()
    }
}

/// Software reference backend.
#[derive(Debug, Clone, Default)]
pub struct SoftwareBackend;

impl HashBackend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    fn hash(&self, header: &HeaderBytes) -> DigestBytes {
        double_sha256(header)
    }
}

/// Thread-chunked backend for large batches.
///
/// Splits the batch across OS threads; single headers go through the
/// software path directly.
#[derive(Debug, Clone)]
pub struct ThreadedBackend {
    threads: usize,
}

impl ThreadedBackend {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }
}

impl Default for ThreadedBackend {
    fn default() -> Self {
        Self::new(
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        )
    }
}

impl HashBackend for ThreadedBackend {
    fn name(&self) -> &str {
        "threaded"
    }

    fn hash(&self, header: &HeaderBytes) -> DigestBytes {
        double_sha256(header)
    }

    fn hash_many(&self, headers: &[HeaderBytes]) -> Vec<DigestBytes> {
        if headers.len() < self.threads * 4 {
            return headers.iter().map(double_sha256).collect();
        }
        let chunk = headers.len().div_ceil(self.threads);
        let mut out = vec![[0u8; DIGEST_LEN]; headers.len()];
        std::thread::scope(|scope| {
            for (in_chunk, out_chunk) in headers.chunks(chunk).zip(out.chunks_mut(chunk)) {
                scope.spawn(move || {
                    for (header, slot) in in_chunk.iter().zip(out_chunk.iter_mut()) {
                        *slot = double_sha256(header);
                    }
                });
            }
        });
        out
    }
}

/// Fixed headers every backend must reproduce bit-identically.
fn conformance_headers() -> Vec<HeaderBytes> {
    let mut headers = Vec::new();
    headers.push([0u8; HEADER_LEN]);
    let mut ramp = [0u8; HEADER_LEN];
    for (i, byte) in ramp.iter_mut().enumerate() {
        *byte = i as u8;
    }
    headers.push(ramp);
    headers.push(assemble_header(
        &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
        0xDEAD_BEEF,
        1_700_000_000,
    ));
    headers
}

/// Validate a candidate backend against the software reference.
pub fn check_conformance(candidate: &dyn HashBackend) -> Result<(), HashKernelError> {
    let headers = conformance_headers();
    let expected: Vec<DigestBytes> = headers.iter().map(double_sha256).collect();
    let got = candidate.hash_many(&headers);
    if got.len() != expected.len() {
        return Err(HashKernelError::BatchMismatch {
            submitted: expected.len(),
            returned: got.len(),
        });
    }
    for (e, g) in expected.iter().zip(got.iter()) {
        if e != g {
            return Err(HashKernelError::ConformanceFailed(candidate.name().to_string()));
        }
    }
    Ok(())
}

/// Select a backend, failing closed to software on conformance mismatch.
pub fn select_backend(candidate: Box<dyn HashBackend>) -> Box<dyn HashBackend> {
    match check_conformance(candidate.as_ref()) {
        Ok(()) => candidate,
        Err(_) => Box::new(SoftwareBackend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let slots = [1u32, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        let header = assemble_header(&slots, 0xDEAD_BEEF, 1_700_000_000);

        assert_eq!(&header[0..4], &[0x02, 0x00, 0x00, 0x00]);
        assert_eq!(&header[4..8], &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&header[32..36], &[0x00, 0x00, 0x00, 0x08]);
        assert_eq!(&header[36..40], &[0x00, 0x00, 0x00, 0x09]);
        assert_eq!(&header[48..52], &[0x00, 0x00, 0x00, 0x0C]);
        assert_eq!(&header[52..68], &[0u8; 16]);
        assert_eq!(&header[72..76], &[0xFF, 0xFF, 0x00, 0x1D]);
        assert_eq!(&header[76..80], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(header_nonce(&header), 0xDEAD_BEEF);
    }

    #[test]
    fn test_double_sha256_deterministic() {
        let header = [0x42u8; HEADER_LEN];
        let a = double_sha256(&header);
        let b = double_sha256(&header);
        assert_eq!(a, b);
        assert_eq!(a.len(), DIGEST_LEN);
        // Double hashing differs from a single pass
        let single: [u8; 32] = Sha256::digest(header).into();
        assert_ne!(a, single);
    }

    #[test]
    fn test_patch_merkle_lane() {
        let slots = [0u32; 12];
        let mut header = assemble_header(&slots, 0, 0);
        patch_merkle_lane(&mut header, 2, 0xAABB_CCDD);
        assert_eq!(&header[44..48], &[0xAA, 0xBB, 0xCC, 0xDD]);
        // lane index wraps
        patch_merkle_lane(&mut header, 6, 0x1122_3344);
        assert_eq!(&header[44..48], &[0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_threaded_matches_software() {
        let headers: Vec<HeaderBytes> = (0u32..64)
            .map(|n| assemble_header(&[n; 12], n, n))
            .collect();
        let software = SoftwareBackend.hash_many(&headers);
        let threaded = ThreadedBackend::new(4).hash_many(&headers);
        assert_eq!(software, threaded);
    }

    #[test]
    fn test_conformance_fails_closed() {
        struct BrokenBackend;
        impl HashBackend for BrokenBackend {
            fn name(&self) -> &str {
                "broken"
            }
            fn hash(&self, _header: &HeaderBytes) -> DigestBytes {
                [0u8; DIGEST_LEN]
            }
        }

        assert!(check_conformance(&BrokenBackend).is_err());
        let selected = select_backend(Box::new(BrokenBackend));
        assert_eq!(selected.name(), "software");

        let selected = select_backend(Box::new(ThreadedBackend::new(2)));
        assert_eq!(selected.name(), "threaded");
    }

    #[test]
    fn test_digest_prefix_u32() {
        let mut digest = [0u8; DIGEST_LEN];
        digest[0] = 0xAB;
        digest[1] = 0xCD;
        digest[2] = 0xE0;
        digest[3] = 0x00;
        assert_eq!(digest_prefix_u32(&digest), 0xABCD_E000);
    }
}
