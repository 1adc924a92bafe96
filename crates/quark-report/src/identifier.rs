//! Validated six-digit A-share security codes

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::ReportError;

/// Exchange a security is listed on, derived from its code prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Market {
    Shanghai,
    Shenzhen,
    Beijing,
}

impl Market {
    /// Market id used as the prefix of East Money `secid` keys
    pub const fn provider_id(self) -> u8 {
        match self {
            Self::Shanghai => 1,
            Self::Shenzhen | Self::Beijing => 0,
        }
    }

    /// Exchange suffix used in data-center `SECUCODE` filters
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Shanghai => "SH",
            Self::Shenzhen => "SZ",
            Self::Beijing => "BJ",
        }
    }
}

/// A validated six-digit security code
///
/// Surrounding whitespace is trimmed during parsing; the stored form is always
/// exactly six ASCII digits. Serializes as a plain string and re-validates on
/// deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Number of digits in a code
    pub const LEN: usize = 6;

    /// Parse and normalize a raw code
    pub fn parse(input: &str) -> Result<Self, ReportError> {
        let code = input.trim();

        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ReportError::invalid_identifier(
                input,
                "code must contain only ASCII digits",
            ));
        }

        if code.len() != Self::LEN {
            return Err(ReportError::invalid_identifier(
                input,
                format!("expected {} digits, got {}", Self::LEN, code.len()),
            ));
        }

        Ok(Self(code.to_string()))
    }

    /// Canonical string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Listing market inferred from the leading digits
    ///
    /// `920` is the Beijing exchange's current range; other `9` codes are
    /// Shanghai B shares.
    pub fn market(&self) -> Market {
        match self.0.as_bytes() {
            [b'9', b'2', b'0', ..] | [b'4' | b'8', ..] => Market::Beijing,
            [b'6' | b'9', ..] => Market::Shanghai,
            _ => Market::Shenzhen,
        }
    }

    /// East Money quote key, e.g. `1.600519`
    pub fn secid(&self) -> String {
        format!("{}.{}", self.market().provider_id(), self.0)
    }

    /// Data-center security key, e.g. `600519.SH`
    pub fn secucode(&self) -> String {
        format!("{}.{}", self.0, self.market().suffix())
    }
}

impl FromStr for Identifier {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = ReportError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_code() {
        let id = Identifier::parse("600519").unwrap();
        assert_eq!(id.as_str(), "600519");
        assert_eq!(id.to_string(), "600519");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let id = Identifier::parse("  000001\n").unwrap();
        assert_eq!(id.as_str(), "000001");
    }

    #[test]
    fn test_rejects_malformed_codes() {
        for input in ["ABC123", "12345", "1234567", "", "60051a", "６００５１９"] {
            let err = Identifier::parse(input).unwrap_err();
            assert!(
                matches!(err, ReportError::InvalidIdentifier { .. }),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_market_mapping() {
        let cases = [
            ("600519", Market::Shanghai, "1.600519", "600519.SH"),
            ("688981", Market::Shanghai, "1.688981", "688981.SH"),
            ("000001", Market::Shenzhen, "0.000001", "000001.SZ"),
            ("300750", Market::Shenzhen, "0.300750", "300750.SZ"),
            ("830799", Market::Beijing, "0.830799", "830799.BJ"),
            ("430047", Market::Beijing, "0.430047", "430047.BJ"),
            ("920019", Market::Beijing, "0.920019", "920019.BJ"),
            ("900901", Market::Shanghai, "1.900901", "900901.SH"),
        ];

        for (code, market, secid, secucode) in cases {
            let id = Identifier::parse(code).unwrap();
            assert_eq!(id.market(), market, "{code}");
            assert_eq!(id.secid(), secid);
            assert_eq!(id.secucode(), secucode);
        }
    }

    #[test]
    fn test_serde_revalidates() {
        let id: Identifier = serde_json::from_str("\"601318\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"601318\"");

        let bad = serde_json::from_str::<Identifier>("\"60131\"");
        assert!(bad.is_err());
    }
}
