//! # Twofa Gen(erator)
//!
//! Generator component of the **twofa** OTP tool. It allows to create new OTPs for any account
//! from the [`twofa_core`] component, following the dynamic truncation of RFC 4226 for counter
//! based accounts and the time steps of RFC 6238 for time based ones.

#![deny(rust_2018_idioms, clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

use std::{
    fmt::{self, Display},
    time::{Duration, SystemTimeError, UNIX_EPOCH},
};

use hmac::{
    digest::{InvalidLength, KeyInit},
    Hmac, Mac,
};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use tracing::debug;
use twofa_core::{Account, Algorithm, ExposeSecret, Otp, MAX_DIGITS};

/// Errors that can occur when generating an OTP.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to get a timestamp from the system.
    #[error("failed to get time since unix epoch")]
    Time(#[from] SystemTimeError),
    /// The provided key was rejected by the HMAC.
    #[error("the given key has an invalid length")]
    KeyLength(#[from] InvalidLength),
    /// The amount of digits is outside of the supported range.
    #[error("{0} digits are not supported, only 1 to {}", MAX_DIGITS)]
    UnsupportedDigits(u8),
    /// A time based account has a period of zero seconds.
    #[error("the period of a time based OTP must be greater than zero")]
    ZeroPeriod,
    /// The counter of a counter based account can't be advanced any further.
    #[error("the counter reached its maximum value")]
    CounterOverflow,
}

/// Source of the current wall clock time, in seconds since the unix epoch.
pub trait Clock {
    fn unix_time(&self) -> Result<u64, Error>;
}

/// The system's wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_time(&self) -> Result<u64, Error> {
        Ok(UNIX_EPOCH.elapsed()?.as_secs())
    }
}

/// A fixed point in time, mostly useful for testing.
impl Clock for u64 {
    fn unix_time(&self) -> Result<u64, Error> {
        Ok(*self)
    }
}

/// Create the next OTP for the given account.
///
/// For counter based accounts the stored counter is advanced by exactly `1` **before** the code
/// is derived, on every call. Callers that want the advance to survive must persist the account
/// afterwards. Use [`peek`] to get the same code without touching the counter.
pub fn evaluate(account: &mut Account, clock: &impl Clock) -> Result<OtpCode, Error> {
    let code = peek(account, clock)?;

    if let Otp::Hotp { counter } = &mut account.otp {
        // `peek` already failed if this overflows.
        *counter += 1;
        debug!(label = %account.label, counter = *counter, "advanced counter");
    }

    Ok(code)
}

/// Create the OTP that [`evaluate`] would return, without modifying the account.
pub fn peek(account: &Account, clock: &impl Clock) -> Result<OtpCode, Error> {
    let digits = account.digits;
    if !(1..=MAX_DIGITS).contains(&digits) {
        return Err(Error::UnsupportedDigits(digits));
    }

    let (counter, remaining) = match account.otp {
        Otp::Hotp { counter } => (counter.checked_add(1).ok_or(Error::CounterOverflow)?, None),
        Otp::Totp { period } => {
            if period == 0 {
                return Err(Error::ZeroPeriod);
            }

            let time = clock.unix_time()?;
            (time / period, Some(remaining(time, period)))
        }
    };

    let code = hotp(
        account.algorithm(),
        account.secret.expose_secret(),
        counter,
        digits,
    )?;

    Ok(OtpCode {
        code,
        digits,
        remaining,
    })
}

/// Time left in the current window of `period` seconds.
fn remaining(time: u64, period: u64) -> Duration {
    Duration::from_secs(period - time % period)
}

/// Derive the raw numeric code for a single counter value.
///
/// The result is already reduced to `digits` decimal places but not zero-padded. Wrap it in an
/// [`OtpCode`] for the final representation.
pub fn hotp(algorithm: Algorithm, key: &[u8], counter: u64, digits: u8) -> Result<u64, Error> {
    if !(1..=MAX_DIGITS).contains(&digits) {
        return Err(Error::UnsupportedDigits(digits));
    }

    let digest = mac(algorithm, key, counter)?;

    Ok(u64::from(truncate(&digest)) % 10_u64.pow(u32::from(digits)))
}

fn mac(algorithm: Algorithm, key: &[u8], counter: u64) -> Result<Vec<u8>, Error> {
    match algorithm {
        Algorithm::Sha1 => mac_with::<Hmac<Sha1>>(key, counter),
        Algorithm::Sha256 => mac_with::<Hmac<Sha256>>(key, counter),
        Algorithm::Sha512 => mac_with::<Hmac<Sha512>>(key, counter),
        Algorithm::Md5 => mac_with::<Hmac<Md5>>(key, counter),
    }
}

fn mac_with<M: Mac + KeyInit>(key: &[u8], counter: u64) -> Result<Vec<u8>, Error> {
    let mut mac = <M as KeyInit>::new_from_slice(key)?;
    mac.update(&counter.to_be_bytes());

    Ok(mac.finalize().into_bytes().to_vec())
}

/// Dynamic truncation of RFC 4226, section 5.3.
///
/// The offset is clamped so the four bytes stay inside of short digests like MD5. SHA digests are
/// never affected by it.
fn truncate(digest: &[u8]) -> u32 {
    let last = digest.len() - 1;
    let offset = usize::from(digest[last] & 0xf).min(digest.len() - 4);

    u32::from_be_bytes([
        digest[offset],
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]) & 0x7fff_ffff
}

/// A generated OTP code that can be used to verify identity against a service.
///
/// It contains the code as well as the amount of digits as the generated code might be shorter than
/// the needed amount of digits and must be shifted with zeroes to fullfill the length.
///
/// Call `to_string()` on an instance to get the final code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OtpCode {
    /// Numeric value of the code, without leading zeroes.
    pub code: u64,
    /// The desired amount of digits of the OTP.
    pub digits: u8,
    /// Time until the code expires, only present for time based accounts.
    pub remaining: Option<Duration>,
}

impl Display for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0>1$}", self.code, usize::from(self.digits))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use twofa_core::{Key, DEFAULT_DIGITS};

    use super::*;

    const SECRET_SHA1: &[u8] = b"12345678901234567890";
    const SECRET_SHA256: &[u8] = b"12345678901234567890123456789012";
    const SECRET_SHA512: &[u8] =
        b"1234567890123456789012345678901234567890123456789012345678901234";

    const RFC4226: [&str; 10] = [
        "755224", "287082", "359152", "969429", "338314", "254676", "287922", "162583", "399871",
        "520489",
    ];

    fn code(algorithm: Algorithm, key: &[u8], counter: u64, digits: u8) -> String {
        OtpCode {
            code: hotp(algorithm, key, counter, digits).unwrap(),
            digits,
            remaining: None,
        }
        .to_string()
    }

    #[test]
    fn digit() {
        let bytes = [
            0x1f, 0x86, 0x98, 0x69, 0x0e, 0x02, 0xca, 0x16, 0x61, 0x85, 0x50, 0xef, 0x7f, 0x19,
            0xda, 0x8e, 0x94, 0x5b, 0x55, 0x5a,
        ];

        assert_eq!(0x50ef_7f19, super::truncate(&bytes));
        assert_eq!(872_921, u64::from(super::truncate(&bytes)) % 1_000_000);
    }

    #[test]
    fn truncate_short_digest() {
        let mut bytes = [0_u8; 16];
        bytes[12..].copy_from_slice(&[0x81, 0x02, 0x03, 0x0f]);

        assert_eq!(0x0102_030f, super::truncate(&bytes));
    }

    #[test]
    fn code_display() {
        let code = OtpCode {
            code: 123,
            digits: 6,
            remaining: None,
        };
        assert_eq!("000123", code.to_string());
    }

    #[test]
    fn rfc4226_vectors() {
        for (counter, expect) in (0..).zip(RFC4226) {
            assert_eq!(
                expect,
                code(Algorithm::Sha1, SECRET_SHA1, counter, DEFAULT_DIGITS)
            );
        }
    }

    #[test]
    fn rfc6238_vectors() {
        let vectors = [
            (59_u64, "94287082", "46119246", "90693936"),
            (1_111_111_109, "07081804", "68084774", "25091201"),
            (1_111_111_111, "14050471", "67062674", "99943326"),
            (1_234_567_890, "89005924", "91819424", "93441116"),
            (2_000_000_000, "69279037", "90698825", "38618901"),
            (20_000_000_000, "65353130", "77737706", "47863826"),
        ];

        for (time, sha1, sha256, sha512) in vectors {
            for (algorithm, secret, expect) in [
                (Algorithm::Sha1, SECRET_SHA1, sha1),
                (Algorithm::Sha256, SECRET_SHA256, sha256),
                (Algorithm::Sha512, SECRET_SHA512, sha512),
            ] {
                let mut account =
                    Account::new("rfc6238", Key::new(secret.to_vec()), Otp::Totp { period: 30 });
                account.algorithm = Some(algorithm);
                account.digits = 8;

                let code = evaluate(&mut account, &time).unwrap();
                assert_eq!(expect, code.to_string(), "{algorithm:?} at {time}");
            }
        }
    }

    #[test]
    fn zero_padding() {
        // Counter 7 truncates to 82162583, which has only 8 digits.
        for digits in 1..=9 {
            assert_eq!(
                usize::from(digits),
                code(Algorithm::Sha1, SECRET_SHA1, 7, digits).len()
            );
        }

        assert_eq!("082162583", code(Algorithm::Sha1, SECRET_SHA1, 7, 9));
        assert_eq!("0082162583", code(Algorithm::Sha1, SECRET_SHA1, 7, 10));
    }

    #[test]
    fn unsupported_digits() {
        assert!(matches!(
            hotp(Algorithm::Sha1, SECRET_SHA1, 0, 0),
            Err(Error::UnsupportedDigits(0))
        ));
        assert!(matches!(
            hotp(Algorithm::Sha1, SECRET_SHA1, 0, 19),
            Err(Error::UnsupportedDigits(19))
        ));
        assert!(hotp(Algorithm::Sha1, SECRET_SHA1, 0, 18).is_ok());
    }

    #[test]
    fn hotp_advances_before_use() {
        let mut account = Account::new(
            "hotp",
            Key::new(SECRET_SHA1.to_vec()),
            Otp::Hotp { counter: 0 },
        );

        for expect in &RFC4226[1..] {
            let code = evaluate(&mut account, &SystemClock).unwrap();
            assert_eq!(*expect, code.to_string());
            assert_eq!(None, code.remaining);
        }

        assert_eq!(Otp::Hotp { counter: 9 }, account.otp);
    }

    #[test]
    fn peek_keeps_counter() {
        let mut account = Account::new(
            "hotp",
            Key::new(SECRET_SHA1.to_vec()),
            Otp::Hotp { counter: 4 },
        );

        let peeked = peek(&account, &0_u64).unwrap();
        assert_eq!(Otp::Hotp { counter: 4 }, account.otp);

        let evaluated = evaluate(&mut account, &0_u64).unwrap();
        assert_eq!(peeked, evaluated);
        assert_eq!("254676", evaluated.to_string());
        assert_eq!(Otp::Hotp { counter: 5 }, account.otp);
    }

    #[test]
    fn counter_overflow_keeps_state() {
        let mut account = Account::new(
            "hotp",
            Key::new(SECRET_SHA1.to_vec()),
            Otp::Hotp { counter: u64::MAX },
        );

        assert!(matches!(
            evaluate(&mut account, &0_u64),
            Err(Error::CounterOverflow)
        ));
        assert_eq!(Otp::Hotp { counter: u64::MAX }, account.otp);
    }

    #[test]
    fn totp_remaining() {
        let mut account = Account::new(
            "totp",
            Key::new(SECRET_SHA1.to_vec()),
            Otp::Totp { period: 30 },
        );

        let code = evaluate(&mut account, &59_u64).unwrap();
        assert_eq!(Some(Duration::from_secs(1)), code.remaining);

        let code = evaluate(&mut account, &60_u64).unwrap();
        assert_eq!(Some(Duration::from_secs(30)), code.remaining);

        assert_eq!(Otp::Totp { period: 30 }, account.otp);
    }

    #[test]
    fn totp_zero_period() {
        let mut account = Account::new(
            "totp",
            Key::new(SECRET_SHA1.to_vec()),
            Otp::Totp { period: 0 },
        );

        assert!(matches!(evaluate(&mut account, &59_u64), Err(Error::ZeroPeriod)));
    }

    #[test]
    fn md5_codes() {
        for counter in 0..1000 {
            let code = code(Algorithm::Md5, SECRET_SHA1, counter, DEFAULT_DIGITS);
            assert_eq!(6, code.len());
        }

        // Digest of counter 0 ends in 0x?f, so the offset is clamped from 15 to 12.
        assert_eq!("01671151", code(Algorithm::Md5, SECRET_SHA1, 0, 8));
        // Digest of counter 1 ends in 0x?0, no clamping involved.
        assert_eq!("78532013", code(Algorithm::Md5, SECRET_SHA1, 1, 8));
    }

    #[test]
    fn algorithms_differ() {
        let sha1 = code(Algorithm::Sha1, SECRET_SHA1, 1, 8);
        let sha256 = code(Algorithm::Sha256, SECRET_SHA1, 1, 8);
        let md5 = code(Algorithm::Md5, SECRET_SHA1, 1, 8);

        assert_ne!(sha1, sha256);
        assert_ne!(sha1, md5);
    }
}
