//! Checksums and digests used by the agent: CRC32, CRC64, MD5, SHA-1,
//! SHA-256 and XXH64, all behind one incremental [`Hasher`] interface.

use std::hash::Hasher as _;
use std::io::{self, Read};

use crc::{CRC_32_ISO_HDLC, CRC_64_XZ, Crc};
use md5::Digest as _;
use twox_hash::XxHash64;

use crate::error::{CoreError, ErrorKind, Result};

const CHUNK_SIZE: usize = 64 * 1024;

static CRC32_ALGORITHM: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
static CRC64_ALGORITHM: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// Incremental hash function.
///
/// Feeding data through several [`Hasher::update`] calls yields the same
/// output as one call over the concatenated data.
pub trait Hasher: Default {
    /// Digest type.
    type Output;

    /// Feeds `data` into the hash state.
    fn update(&mut self, data: &[u8]);

    /// Consumes the state and returns the digest.
    fn finalize(self) -> Self::Output;

    /// One-shot digest of `data`.
    fn digest(data: &[u8]) -> Self::Output {
        let mut hasher = Self::default();
        hasher.update(data);
        hasher.finalize()
    }
}

/// CRC-32 (ISO-HDLC, as used by zip and PNG).
pub struct Crc32(crc::Digest<'static, u32>);

impl Default for Crc32 {
    fn default() -> Self {
        Self(CRC32_ALGORITHM.digest())
    }
}

impl Hasher for Crc32 {
    type Output = u32;

    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self) -> u32 {
        self.0.finalize()
    }
}

/// CRC-64 (XZ variant).
pub struct Crc64(crc::Digest<'static, u64>);

impl Default for Crc64 {
    fn default() -> Self {
        Self(CRC64_ALGORITHM.digest())
    }
}

impl Hasher for Crc64 {
    type Output = u64;

    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self) -> u64 {
        self.0.finalize()
    }
}

macro_rules! digest_hasher {
    ($(#[$meta:meta])* $name:ident, $inner:ty, $len:literal) => {
        $(#[$meta])*
        #[derive(Default)]
        pub struct $name($inner);

        impl Hasher for $name {
            type Output = [u8; $len];

            fn update(&mut self, data: &[u8]) {
                self.0.update(data);
            }

            fn finalize(self) -> [u8; $len] {
                let mut output = [0_u8; $len];
                output.copy_from_slice(&self.0.finalize());
                output
            }
        }
    };
}

digest_hasher!(
    /// MD5 digest.
    Md5,
    md5::Md5,
    16
);
digest_hasher!(
    /// SHA-1 digest.
    Sha1,
    sha1::Sha1,
    20
);
digest_hasher!(
    /// SHA-256 digest.
    Sha256,
    sha2::Sha256,
    32
);

/// XXH64 with a configurable seed (zero by default).
pub struct Xxh64(XxHash64);

impl Xxh64 {
    /// Starts a hash with `seed`.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self(XxHash64::with_seed(seed))
    }
}

impl Default for Xxh64 {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl Hasher for Xxh64 {
    type Output = u64;

    fn update(&mut self, data: &[u8]) {
        self.0.write(data);
    }

    fn finalize(self) -> u64 {
        self.0.finish()
    }
}

/// Hashes exactly `size` bytes from `reader`.
///
/// # Errors
///
/// Fails with `NoData` when the stream ends early and with `SystemError`
/// when reading fails.
pub fn hash_reader<H, R>(reader: &mut R, size: u64) -> Result<H::Output>
where
    H: Hasher,
    R: Read + ?Sized,
{
    let mut hasher = H::default();
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    let mut remaining = size;
    while remaining > 0 {
        let wanted = usize::try_from(remaining).map_or(CHUNK_SIZE, |left| left.min(CHUNK_SIZE));
        let read = read_chunk(reader, buffer.get_mut(..wanted).unwrap_or_default())?;
        if read == 0 {
            return Err(CoreError::no_data(format!(
                "stream ended with {remaining} of {size} bytes unread"
            )));
        }
        hasher.update(buffer.get(..read).unwrap_or_default());
        remaining = remaining.saturating_sub(read as u64);
    }
    Ok(hasher.finalize())
}

/// Hashes everything `reader` yields until end of stream.
pub fn hash_reader_to_end<H, R>(reader: &mut R) -> Result<H::Output>
where
    H: Hasher,
    R: Read + ?Sized,
{
    let mut hasher = H::default();
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    loop {
        let read = read_chunk(reader, &mut buffer)?;
        if read == 0 {
            return Ok(hasher.finalize());
        }
        hasher.update(buffer.get(..read).unwrap_or_default());
    }
}

/// Renders a digest as lowercase hexadecimal.
#[must_use]
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut text, byte| {
            text.push_str(&format!("{byte:02x}"));
            text
        })
}

fn read_chunk<R: Read + ?Sized>(reader: &mut R, chunk: &mut [u8]) -> Result<usize> {
    loop {
        match reader.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => {
                return Err(CoreError::new(
                    ErrorKind::SystemError,
                    format!("failed to read stream: {error}"),
                ));
            }
        }
    }
}
