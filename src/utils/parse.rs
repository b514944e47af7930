use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    pub fn new(reason: String) -> Self {
        ParseError { reason }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParseError: {}", self.reason)
    }
}

impl Error for ParseError {}

/// Convert an ASN string to a u32
/// E.g. "65000.100" -> 4259840100
pub fn asn_from_dotted(value: &str) -> Result<u32, ParseError> {
    let (high, low) = match value.split_once('.') {
        Some((high, low)) => (Some(high), low),
        None => (None, value),
    };
    let parse = |chunk: &str| {
        chunk
            .parse::<u32>()
            .map_err(|err| ParseError::new(format!("{} '{}'", err, value)))
    };
    let low = parse(low)?;
    match high {
        None => Ok(low),
        Some(high) => {
            let high = parse(high)?;
            if high > u32::from(u16::MAX) || low > u32::from(u16::MAX) {
                return Err(ParseError::new(format!("Unsupported ASN '{}'", value)));
            }
            Ok((high << 16) + low)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asn_from_dotted() {
        assert_eq!(asn_from_dotted("100"), Ok(100));
        assert_eq!(asn_from_dotted("4259840100"), Ok(4259840100));
        assert_eq!(asn_from_dotted("65000.100"), Ok(4259840100));
        assert!(asn_from_dotted("65536.1").is_err());
        assert!(asn_from_dotted("1.2.3").is_err());
        assert!(asn_from_dotted("").is_err());
        assert!(asn_from_dotted("as100").is_err());
    }
}
