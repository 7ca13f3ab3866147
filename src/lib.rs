//! Volume Check Plugins: strongly typed free-space checks
//!
//! The library backs the `check-free-space` binary, which verifies that a set
//! of volumes (named by single drive letters, `C`, `D`, ...) keep a minimum
//! amount of free space, either as an absolute number of gigabytes or as a
//! percentage of the volume's capacity.
//!
//! The pipeline is deliberately linear:
//!
//! * [`validate`] rejects malformed volume letters and thresholds
//! * [`volumes`] confirms each volume is mounted and reads its capacity
//! * [`check`] compares free space against the threshold under a [`Policy`]
//! * [`report`] announces failures to the console, a last-error slot, or a
//!   chat webhook
//!
//! Platform specifics live behind the [`volumes::VolumeSource`] and
//! [`volumes::VolumeResolver`] traits, so the checking logic can be driven
//! by fake volumes in tests.
//!
//! [`Policy`]: check::Policy

use std::fmt;
use std::process;
use std::str::FromStr;

pub mod check;
pub mod config;
pub mod logging;
pub mod report;
pub mod units;
pub mod validate;
pub mod volumes;

/// All possible outcomes of a free-space check
///
/// Ordered so that the worst status wins when combined with `max`.
#[must_use]
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum Status {
    Ok,
    Failed,
}

impl Status {
    /// Exit with a return code that indicates the state of the system
    pub fn exit(self) -> ! {
        process::exit(self.code())
    }

    /// The process exit code for this status
    pub fn code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Failed => 1,
        }
    }

    pub fn str_values() -> [&'static str; 2] {
        ["ok", "failed"]
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match *self {
            Status::Ok => "OKAY",
            Status::Failed => "FAILED",
        };
        write!(f, "{}", msg)
    }
}

impl FromStr for Status {
    type Err = String;

    /// Primarily useful to construct from argparse
    fn from_str(s: &str) -> Result<Status, String> {
        match s {
            "ok" => Ok(Status::Ok),
            "failed" => Ok(Status::Failed),
            _ => Err(format!(
                "Unexpected status: {} (expected one of {:?})",
                s,
                Status::str_values()
            )),
        }
    }
}
