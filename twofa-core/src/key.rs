use std::{fmt, sync::OnceLock};

use data_encoding::{Encoding, BASE32_NOPAD};
use secrecy::{ExposeSecret, Zeroize};

/// Unpadded Base32 that ignores non-zero bits left over in the last character, as many
/// authenticator apps accept secrets with such a tail.
fn lenient_base32() -> &'static Encoding {
    static ENCODING: OnceLock<Encoding> = OnceLock::new();

    ENCODING.get_or_init(|| {
        let mut spec = BASE32_NOPAD.specification();
        spec.check_trailing_bits = false;
        spec.encoding().unwrap_or_else(|_| BASE32_NOPAD.clone())
    })
}

/// The shared secret of an account that should be kept private as much as possible.
///
/// Stored as raw bytes and only ever turned into text through the Base32 codec when an account is
/// rendered back into its URI form.
#[derive(Clone, PartialEq, Eq)]
pub struct Key(Vec<u8>);

impl Key {
    #[must_use]
    pub fn new(content: Vec<u8>) -> Self {
        Self(content)
    }

    /// Decode a secret from unpadded Base32 text (RFC 4648 alphabet).
    pub fn from_base32(text: &str) -> Result<Self, data_encoding::DecodeError> {
        lenient_base32().decode(text.as_bytes()).map(Self)
    }

    /// Encode the secret as unpadded Base32 text.
    #[must_use]
    pub fn to_base32(&self) -> String {
        BASE32_NOPAD.encode(&self.0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl Zeroize for Key {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

impl ExposeSecret<Vec<u8>> for Key {
    fn expose_secret(&self) -> &Vec<u8> {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key([REDACTED {} bytes])", self.0.len())
    }
}
