//! # Twofa Core
//!
//! Core component of **twofa** that is shared between all other components and serves as building
//! block. The main piece of interest is the [`Account`] and its related data. An account describes
//! a single line of the keychain and contains all information needed to create new OTPs.
//!
//! Accounts are created by parsing `otpauth://` provisioning URIs and rendered back into the same
//! canonical form through their [`Display`](std::fmt::Display) implementation.

#![deny(rust_2018_idioms, clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

use std::str::FromStr;

pub use key::Key;
pub use secrecy::ExposeSecret;

pub use self::url::{ErrorKind, ParseError};

mod key;
mod url;

/// Amount of digits used when an URI doesn't specify any.
pub const DEFAULT_DIGITS: u8 = 6;
/// Largest supported amount of digits. Anything above can't be expressed as power of ten in a
/// `u64` modulus together with the 31-bit truncated value.
pub const MAX_DIGITS: u8 = 18;
/// Time step in seconds used for time based accounts when an URI doesn't specify any.
pub const DEFAULT_PERIOD: u64 = 30;

/// A single provisioned OTP account that contains the information to create OTPs for one service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// Free form label to describe this account. Taken verbatim from the URI path, a possible
    /// `issuer:account` convention is not split up.
    pub label: String,
    /// The secret key to generate correct OTPs.
    pub secret: Key,
    /// Amount of digits to produce as OTP.
    pub digits: u8,
    /// The variation of OTP to use.
    pub otp: Otp,
    /// Algorithm that is used to generate OTPs, if explicitly set in the URI.
    ///
    /// Absent or unrecognized values are kept as `None`, which evaluates as [`Algorithm::Sha1`]
    /// but isn't rendered back into the URI.
    pub algorithm: Option<Algorithm>,
    /// Issuer of the OTP account, empty if none was given.
    pub issuer: String,
}

impl Account {
    /// Create a new account with default digits, default algorithm and without issuer.
    #[must_use]
    pub fn new(label: impl Into<String>, secret: Key, otp: Otp) -> Self {
        Self {
            label: label.into(),
            secret,
            digits: DEFAULT_DIGITS,
            otp,
            algorithm: None,
            issuer: String::new(),
        }
    }

    /// The algorithm that is effectively used for code generation.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm.unwrap_or_default()
    }
}

impl FromStr for Account {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::url::parse(s)
    }
}

/// Base information about the OTP used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Otp {
    /// Counter based, using a counter as base of the OTP generation.
    ///
    /// The counter is advanced by `1` **before** each generated code, so the first code of a
    /// freshly provisioned account is derived from `counter + 1`.
    Hotp {
        /// Last used counter value.
        counter: u64,
    },
    /// Time based, using the current time divided into steps of `period` seconds.
    Totp {
        /// Seconds that an OTP is considered valid. Never `0` for accounts created from an URI.
        period: u64,
    },
}

impl Otp {
    /// Name of the variant as used in the host part of an `otpauth://` URI.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hotp { .. } => "hotp",
            Self::Totp { .. } => "totp",
        }
    }
}

impl Default for Otp {
    fn default() -> Self {
        Self::Totp {
            period: DEFAULT_PERIOD,
        }
    }
}

/// Algorithm used in the OTP generation to create the final code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Algorithm {
    /// SHA-1 algorithm, most common.
    #[default]
    Sha1,
    /// SHA(2)-256 algorithm.
    Sha256,
    /// SHA(2)-512 algorithm.
    Sha512,
    /// MD5 algorithm, only for compatibility with old tokens.
    Md5,
}

impl Algorithm {
    /// Look up an algorithm by its name, ignoring case. Returns `None` for unknown names.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(if name.eq_ignore_ascii_case("sha1") {
            Self::Sha1
        } else if name.eq_ignore_ascii_case("sha256") {
            Self::Sha256
        } else if name.eq_ignore_ascii_case("sha512") {
            Self::Sha512
        } else if name.eq_ignore_ascii_case("md5") {
            Self::Md5
        } else {
            return None;
        })
    }

    /// Canonical (uppercase) name as used in the `algorithm` URI parameter.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
            Self::Md5 => "MD5",
        }
    }
}
