use std::{
    fmt::{self, Display},
    num::ParseIntError,
    str::FromStr,
};

use percent_encoding::{AsciiSet, CONTROLS};
use tracing::{trace, warn};
use url::{form_urlencoded, Url};

use crate::{Account, Algorithm, Key, Otp, DEFAULT_DIGITS, DEFAULT_PERIOD, MAX_DIGITS};

/// Characters of a label that are escaped when rendering it as URI path.
const LABEL: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Any error that can happen when parsing an [`Account`](crate::Account) from an URL.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The input didn't form a valid URL.
    #[error("the URL is not valid")]
    InvalidUrl(#[from] url::ParseError),
    /// An unknown scheme was used in the URL.
    #[error("the scheme `{0}` is not supported, only `otpauth`")]
    InvalidScheme(String),
    /// The label (path) was no proper UTF-8 after percent decoding.
    #[error("label is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    /// A numeric parameter couldn't be parsed as base-10 integer.
    #[error("parameter `{field}` has the invalid value `{value}`")]
    InvalidField {
        field: &'static str,
        value: String,
        source: ParseIntError,
    },
    /// The `secret` parameter wasn't valid unpadded Base32.
    #[error("{secret}: invalid Base32 secret")]
    InvalidSecret {
        secret: String,
        source: data_encoding::DecodeError,
    },
    /// The `secret` parameter was missing entirely.
    #[error("the `secret` parameter is missing")]
    MissingSecret,
    /// The amount of digits is outside of the supported range.
    #[error("{0} digits are not supported, only 1 to {}", MAX_DIGITS)]
    UnsupportedDigits(u64),
    /// A time based OTP was configured with a period of zero seconds.
    #[error("the period of a time based OTP must be greater than zero")]
    ZeroPeriod,
}

/// Broad classification of a [`ParseError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed URI syntax.
    UriSyntax,
    /// Non-numeric `digits`, `counter` or `period` parameter.
    FieldParse,
    /// Invalid or missing Base32 secret.
    SecretDecode,
    /// Values that are well-formed but outside of the supported range.
    Config,
}

impl ParseError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl(_) | Self::InvalidScheme(_) | Self::InvalidUtf8(_) => {
                ErrorKind::UriSyntax
            }
            Self::InvalidField { .. } => ErrorKind::FieldParse,
            Self::InvalidSecret { .. } | Self::MissingSecret => ErrorKind::SecretDecode,
            Self::UnsupportedDigits(_) | Self::ZeroPeriod => ErrorKind::Config,
        }
    }
}

/// Raw query parameters that are of interest. Only the first occurrence of each is kept.
#[derive(Debug, Default)]
struct Params {
    secret: Option<String>,
    issuer: Option<String>,
    algorithm: Option<String>,
    digits: Option<String>,
    counter: Option<String>,
    period: Option<String>,
}

impl Params {
    fn from_url(url: &Url) -> Self {
        let mut params = Self::default();

        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "secret" => &mut params.secret,
                "issuer" => &mut params.issuer,
                "algorithm" => &mut params.algorithm,
                "digits" => &mut params.digits,
                "counter" => &mut params.counter,
                "period" => &mut params.period,
                _ => continue,
            };

            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        params
    }
}

#[derive(Clone, Copy, Debug)]
enum OtpType {
    Hotp,
    Totp,
}

impl OtpType {
    /// Anything except `hotp` falls back to time based OTPs, including a missing host.
    fn from_host(host: Option<&str>) -> Self {
        match host {
            Some(host) if host.eq_ignore_ascii_case("hotp") => Self::Hotp,
            _ => Self::Totp,
        }
    }
}

/// Parse an optional numeric parameter, treating empty values like absent ones.
fn number<T>(field: &'static str, value: Option<&str>) -> Result<Option<T>, ParseError>
where
    T: FromStr<Err = ParseIntError>,
{
    match value {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|source| ParseError::InvalidField {
                field,
                value: value.to_owned(),
                source,
            }),
    }
}

/// The path exactly as written in the URI.
///
/// [`Url`] resolves `.` and `..` segments (even percent-encoded ones), which would alter labels
/// like `a/../b`. Only call this on input that [`Url::parse`] already accepted.
fn raw_path(value: &str) -> &str {
    let rest = value.trim().split_once(':').map_or("", |(_, rest)| rest);
    let rest = rest.split(['?', '#']).next().unwrap_or_default();

    match rest.strip_prefix("//") {
        Some(authority) => authority.find('/').map_or("", |i| &authority[i..]),
        None => rest,
    }
}

pub fn parse(value: &str) -> Result<Account, ParseError> {
    let url = Url::parse(value)?;

    if url.scheme() != "otpauth" {
        return Err(ParseError::InvalidScheme(url.scheme().to_owned()));
    }

    let otp_type = OtpType::from_host(url.host_str());

    let path = raw_path(value);
    let label = path.strip_prefix('/').unwrap_or(path);
    let label = percent_encoding::percent_decode_str(label).decode_utf8()?;

    let params = Params::from_url(&url);

    let digits = match number::<u64>("digits", params.digits.as_deref())? {
        Some(digits) => u8::try_from(digits)
            .ok()
            .filter(|d| (1..=MAX_DIGITS).contains(d))
            .ok_or(ParseError::UnsupportedDigits(digits))?,
        None => DEFAULT_DIGITS,
    };
    let counter = number::<u64>("counter", params.counter.as_deref())?.unwrap_or_default();
    let period = number::<u64>("period", params.period.as_deref())?.unwrap_or(DEFAULT_PERIOD);

    let otp = match otp_type {
        OtpType::Hotp => Otp::Hotp { counter },
        OtpType::Totp if period == 0 => return Err(ParseError::ZeroPeriod),
        OtpType::Totp => Otp::Totp { period },
    };

    let secret = params.secret.ok_or(ParseError::MissingSecret)?;
    let secret = Key::from_base32(&secret)
        .map_err(|source| ParseError::InvalidSecret { secret, source })?;

    if secret.is_empty() {
        warn!(label = %label, "account has an empty secret");
    }

    let algorithm = params.algorithm.as_deref().and_then(Algorithm::from_name);

    trace!(label = %label, otp = otp.name(), "parsed account");

    Ok(Account {
        label: label.into_owned(),
        secret,
        digits,
        otp,
        algorithm,
        issuer: params.issuer.unwrap_or_default(),
    })
}

impl Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut query = form_urlencoded::Serializer::new(String::new());

        query.append_pair("secret", &self.secret.to_base32());
        if !self.issuer.is_empty() {
            query.append_pair("issuer", &self.issuer);
        }
        if let Some(algorithm) = self.algorithm {
            query.append_pair("algorithm", algorithm.name());
        }
        if self.digits > 0 {
            query.append_pair("digits", &self.digits.to_string());
        }
        match self.otp {
            Otp::Hotp { counter } => {
                query.append_pair("counter", &counter.to_string());
            }
            Otp::Totp { period } if period > 0 => {
                query.append_pair("period", &period.to_string());
            }
            Otp::Totp { .. } => {}
        }

        write!(
            f,
            "otpauth://{}/{}?{}",
            self.otp.name(),
            percent_encoding::utf8_percent_encode(&self.label, LABEL),
            query.finish()
        )
    }
}
