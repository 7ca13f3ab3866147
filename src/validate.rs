//! Validation of the volume letters and thresholds handed to a check
//!
//! Everything here is pure: nothing touches the filesystem, so every input
//! error is caught before a single volume is queried.

use std::fmt;
use std::result::Result as StdResult;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref VOLUME_ID: Regex = Regex::new(r"^[A-Z]$").unwrap();
}

/// Errors from user-supplied input
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum InputError {
    /// No volumes were requested at all
    NoVolumes,
    /// Something that is not a single upper case letter
    MalformedIdentifier(String),
    /// A threshold that is not a positive whole number in range
    MalformedThreshold { raw: String, mode: ThresholdMode },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter) -> StdResult<(), fmt::Error> {
        match self {
            InputError::NoVolumes => write!(
                f,
                "No disks to check. You must input at least one disk letter (for example C)"
            ),
            InputError::MalformedIdentifier(raw) => write!(
                f,
                "Invalid \"--disks\" input {:?}. You must input only upper case letters \
                 of disks (for example C D E)",
                raw
            ),
            InputError::MalformedThreshold {
                raw,
                mode: ThresholdMode::Absolute,
            } => write!(
                f,
                "Invalid \"--min-free-space\" input {:?}. You must input only a number \
                 that represents space in GB (for example, for 10 GB input 10)",
                raw
            ),
            InputError::MalformedThreshold {
                raw,
                mode: ThresholdMode::Percent,
            } => write!(
                f,
                "Invalid \"--min-free-space-percent\" input {:?}. You must input only a \
                 whole number of percent between 1 and 99 (for example, for 15% input 15)",
                raw
            ),
        }
    }
}

impl std::error::Error for InputError {}

/// A mounted volume, named by its drive letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(char);

impl VolumeId {
    pub fn letter(self) -> char {
        self.0
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for VolumeId {
    type Err = InputError;

    /// Case sensitive: only `A` through `Z` are volumes
    fn from_str(s: &str) -> StdResult<VolumeId, InputError> {
        match s.chars().next() {
            Some(letter) if is_volume_identifier(s) => Ok(VolumeId(letter)),
            _ => Err(InputError::MalformedIdentifier(s.to_owned())),
        }
    }
}

/// What a threshold number means
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    /// Gigabytes of free space
    Absolute,
    /// Percent of the volume's capacity that must be free
    Percent,
}

impl ThresholdMode {
    /// The unit that values in this mode are displayed with
    pub fn unit(self) -> &'static str {
        match self {
            ThresholdMode::Absolute => " GB",
            ThresholdMode::Percent => "%",
        }
    }
}

/// A validated minimum-free-space requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    value: u64,
    mode: ThresholdMode,
}

impl Threshold {
    /// Parse a raw threshold
    ///
    /// Only plain ASCII digits are accepted, so signs, decimal points and
    /// whitespace are all rejected. Zero is never a valid minimum, and
    /// percentages must stay below 100.
    pub fn parse(raw: &str, mode: ThresholdMode) -> StdResult<Threshold, InputError> {
        let malformed = || InputError::MalformedThreshold {
            raw: raw.to_owned(),
            mode,
        };
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let value: u64 = raw.parse().map_err(|_| malformed())?;
        let in_range = match mode {
            ThresholdMode::Absolute => value > 0,
            ThresholdMode::Percent => value > 0 && value < 100,
        };
        if in_range {
            Ok(Threshold { value, mode })
        } else {
            Err(malformed())
        }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn mode(&self) -> ThresholdMode {
        self.mode
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.value, self.mode.unit())
    }
}

/// Is `s` exactly one upper case ASCII letter
pub fn is_volume_identifier(s: &str) -> bool {
    VOLUME_ID.is_match(s)
}

/// True if every identifier is a single upper case letter
///
/// Stops at the first invalid identifier.
pub fn validate_volume_identifiers<S: AsRef<str>>(identifiers: &[S]) -> bool {
    identifiers
        .iter()
        .all(|id| is_volume_identifier(id.as_ref()))
}

/// True if `raw` is a positive whole number that fits `mode`
pub fn validate_threshold(raw: &str, mode: ThresholdMode) -> bool {
    Threshold::parse(raw, mode).is_ok()
}

/// Convert raw identifiers into `VolumeId`s, failing on the first bad one
///
/// Order and duplicates are preserved: volumes are checked in the order the
/// user gave them.
pub fn parse_volume_identifiers<S: AsRef<str>>(
    identifiers: &[S],
) -> StdResult<Vec<VolumeId>, InputError> {
    if identifiers.is_empty() {
        return Err(InputError::NoVolumes);
    }
    identifiers
        .iter()
        .map(|id| id.as_ref().parse())
        .collect()
}
