use std::num::ParseIntError;
use std::str::FromStr;

use thiserror::Error;

/// A host port or closed range of host ports, both endpoints inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PortRange {
    #[display("{_0}")]
    Single(u16),

    #[display("{lo}-{hi}")]
    Range { lo: u16, hi: u16 },
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        match self {
            Self::Single(x) => *x == port,
            Self::Range { lo, hi } => (*lo..=*hi).contains(&port),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParsePortRangeError {
    #[error("invalid port: {0}")]
    InvalidPort(ParseIntError),

    #[error("range start {0} is greater than range end {1}")]
    StartAfterEnd(u16, u16),
}

impl FromStr for PortRange {
    type Err = ParsePortRangeError;

    // Syntax: <port> | <port>-<port>
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ParsePortRangeError::*;

        match s.split_once('-') {
            None => {
                let port = s.parse().map_err(InvalidPort)?;

                Ok(Self::Single(port))
            }

            Some((lo, hi)) => {
                let lo: u16 = lo.parse().map_err(InvalidPort)?;
                let hi: u16 = hi.parse().map_err(InvalidPort)?;

                if lo > hi {
                    Err(StartAfterEnd(lo, hi))
                } else if lo == hi {
                    Ok(Self::Single(lo))
                } else {
                    Ok(Self::Range { lo, hi })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_ports_and_ranges() {
        assert_eq!("10250".parse(), Ok(PortRange::Single(10250)));
        assert_eq!("0-1024".parse(), Ok(PortRange::Range { lo: 0, hi: 1024 }));
        assert_eq!("80-80".parse(), Ok(PortRange::Single(80)));
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!("".parse::<PortRange>().is_err());
        assert!("abc".parse::<PortRange>().is_err());
        assert!("80-".parse::<PortRange>().is_err());
        assert!("-80".parse::<PortRange>().is_err());
        assert!("1024-80".parse::<PortRange>().is_err());
        assert!("70000".parse::<PortRange>().is_err());
    }

    #[test]
    fn contains_is_inclusive() {
        let range: PortRange = "100-200".parse().unwrap();

        assert!(range.contains(100));
        assert!(range.contains(150));
        assert!(range.contains(200));
        assert!(!range.contains(99));
        assert!(!range.contains(201));

        let single: PortRange = "10250".parse().unwrap();

        assert!(single.contains(10250));
        assert!(!single.contains(10251));
    }

    #[test]
    fn renders_like_the_input() {
        assert_eq!("10250".parse::<PortRange>().unwrap().to_string(), "10250");
        assert_eq!(
            "0-1024".parse::<PortRange>().unwrap().to_string(),
            "0-1024"
        );
    }
}
