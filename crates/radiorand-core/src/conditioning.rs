//! Whitening of raw tuner samples.
//!
//! **All** post-processing of sample bytes lives here. The client hands out
//! raw bytes; this module is the single gateway that turns them into output.
//!
//! # Construction
//!
//! ```text
//! raw ─► k₁ = H(raw) ─► x = raw ⊕ k₁ ─► k₂ = H(x) ─► out = x ⊕ k₂
//! ```
//!
//! Each pass hashes the entire buffer and XORs it with the digest, cycling
//! the digest when the buffer is longer than it. No state is carried from
//! one read to the next, so the same raw input always gives the same output.
//!
//! This flattens DC bias and periodic interference in the I/Q stream. It is
//! a best-effort whitener: no entropy estimate or health test is performed.

use std::io::{self, Read};
use std::marker::PhantomData;

use rand::TryRngCore;
use sha2::{Digest, Sha512};

use crate::error::{RadioError, Result};

/// Scratch size for the integer accessors.
pub const INT_SCRATCH_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Two-pass hash/XOR transform
// ---------------------------------------------------------------------------

/// Whiten `buf` in place with hash `D`.
///
/// The first digest is taken before any byte is modified and the second over
/// the already-masked buffer; changing that order changes the output.
pub fn whiten<D: Digest>(buf: &mut [u8]) {
    if buf.is_empty() {
        return;
    }
    let k1 = D::digest(&*buf);
    xor_cycle(buf, &k1);
    let k2 = D::digest(&*buf);
    xor_cycle(buf, &k2);
}

/// XOR `buf[i]` with `mask[i % mask.len()]`.
fn xor_cycle(buf: &mut [u8], mask: &[u8]) {
    for (b, k) in buf.iter_mut().zip(mask.iter().cycle()) {
        *b ^= k;
    }
}

/// Interpret `bytes` as a big-endian integer and keep its low 64 bits.
fn low_u64_be(bytes: &[u8]) -> u64 {
    let tail = &bytes[bytes.len().saturating_sub(8)..];
    tail.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

// ---------------------------------------------------------------------------
// Whitening reader
// ---------------------------------------------------------------------------

/// Reader adapter that whitens every chunk it returns.
///
/// Also implements [`TryRngCore`] so it can feed anything that consumes a
/// fallible randomness source. A broken sample stream is always an error,
/// never zero or repeated output.
#[derive(Debug)]
pub struct Whitener<R, D = Sha512> {
    inner: R,
    _hash: PhantomData<fn() -> D>,
}

impl<R: Read> Whitener<R> {
    /// Whiten with SHA-512.
    pub fn new(inner: R) -> Self {
        Self::with_hash(inner)
    }
}

impl<R: Read, D: Digest> Whitener<R, D> {
    /// Whiten with an arbitrary digest.
    pub fn with_hash(inner: R) -> Self {
        Self {
            inner,
            _hash: PhantomData,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read once into a 64-byte scratch buffer and decode the whitened bytes
    /// as a big-endian integer truncated to 64 bits.
    pub fn next_u64(&mut self) -> Result<u64> {
        let mut scratch = [0u8; INT_SCRATCH_LEN];
        let n = self.read(&mut scratch)?;
        if n == 0 {
            return Err(eof());
        }
        Ok(low_u64_be(&scratch[..n]))
    }

    /// Signed view of [`Whitener::next_u64`].
    pub fn next_i64(&mut self) -> Result<i64> {
        self.next_u64().map(|v| v as i64)
    }
}

impl<R: Read, D: Digest> Read for Whitener<R, D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        whiten::<D>(&mut buf[..n]);
        Ok(n)
    }
}

impl<R: Read, D: Digest> TryRngCore for Whitener<R, D> {
    type Error = RadioError;

    fn try_next_u32(&mut self) -> Result<u32> {
        self.next_u64().map(|v| v as u32)
    }

    fn try_next_u64(&mut self) -> Result<u64> {
        self.next_u64()
    }

    fn try_fill_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < dst.len() {
            match self.read(&mut dst[filled..]) {
                Ok(0) => return Err(eof()),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn eof() -> RadioError {
    RadioError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "sample stream closed",
    ))
}
