//! Compare free space on each volume against a minimum
//!
//! A check runs in two phases. `prepare` validates everything the user gave
//! us, that every volume is mounted, and (for absolute thresholds) that every
//! volume could actually hold the requested free space. Nothing is compared
//! until all of that has passed. `compare` then walks the volumes in order
//! under a [`Policy`].

use std::cmp::max;
use std::fmt;
use std::io;
use std::result::Result as StdResult;
use std::str::FromStr;

use derive_more::From;
use serde::Deserialize;
use tracing::{debug, info, info_span, warn};

use crate::report::Reporter;
use crate::validate::{parse_volume_identifiers, InputError, Threshold, ThresholdMode, VolumeId};
use crate::volumes::{
    check_threshold_within_capacity, query_volume_usage, volume_exists, VolumeResolver,
    VolumeSource, VolumeUsage,
};
use crate::Status;

/// Everything that can stop a check before it compares free space
#[derive(Debug, From)]
pub enum CheckError {
    /// Bad volume letters or threshold
    Input(InputError),
    /// A well formed letter that is not mounted
    #[from(ignore)]
    NonexistentVolume(VolumeId),
    /// The volume could never have that much free space
    #[from(ignore)]
    ThresholdExceedsCapacity {
        volume: VolumeId,
        threshold: Threshold,
        total_gb: f64,
    },
    /// The OS would not tell us about a volume
    #[from(ignore)]
    VolumeQuery { volume: VolumeId, error: io::Error },
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter) -> StdResult<(), fmt::Error> {
        match self {
            CheckError::Input(e) => write!(f, "{}", e),
            CheckError::NonexistentVolume(volume) => write!(f, "Disk {} does not exist.", volume),
            CheckError::ThresholdExceedsCapacity {
                volume,
                threshold,
                total_gb,
            } => write!(
                f,
                "Wanted minimum free space is {}, but disk {} has only {} GB of total space.",
                threshold, volume, total_gb
            ),
            CheckError::VolumeQuery { volume, error } => {
                write!(f, "Unable to read free space of disk {}: {}", volume, error)
            }
        }
    }
}

impl std::error::Error for CheckError {}

pub type Result<T> = StdResult<T, CheckError>;

/// What to do after the first volume falls short
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Policy {
    /// Stop checking, the run has already failed
    FailFast,
    /// Keep going so every short volume gets reported
    AggregateAll,
}

impl Policy {
    /// Absolute checks stop at the first failure, percentage checks report all
    pub fn default_for(mode: ThresholdMode) -> Policy {
        match mode {
            ThresholdMode::Absolute => Policy::FailFast,
            ThresholdMode::Percent => Policy::AggregateAll,
        }
    }

    pub fn str_values() -> [&'static str; 2] {
        ["fail-fast", "aggregate-all"]
    }
}

impl FromStr for Policy {
    type Err = String;

    fn from_str(s: &str) -> StdResult<Policy, String> {
        match s {
            "fail-fast" => Ok(Policy::FailFast),
            "aggregate-all" => Ok(Policy::AggregateAll),
            _ => Err(format!(
                "Unexpected policy: {} (expected one of {:?})",
                s,
                Policy::str_values()
            )),
        }
    }
}

/// The raw inputs of one check, exactly as the user typed them
#[derive(Debug, Clone, PartialEq)]
pub struct CheckRequest {
    pub volumes: Vec<String>,
    pub threshold: String,
    pub mode: ThresholdMode,
    pub policy: Policy,
}

/// How one volume fared
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub volume: VolumeId,
    pub usage: VolumeUsage,
    pub passed: bool,
    pub message: String,
}

/// How the whole run fared
#[derive(Debug)]
pub struct CheckOutcome {
    pub status: Status,
    /// One entry per volume that was compared, in input order
    pub results: Vec<CheckResult>,
    /// Set when the run stopped before or during comparison
    pub error: Option<CheckError>,
    /// The most recent message that was announced, for orchestrators
    pub last_error: Option<String>,
}

impl CheckOutcome {
    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|result| !result.passed)
    }
}

/// Compare one volume's usage against the threshold
pub fn evaluate(volume: VolumeId, usage: VolumeUsage, threshold: Threshold) -> CheckResult {
    let minimum = threshold.value() as f64;
    let (passed, message) = match threshold.mode() {
        ThresholdMode::Absolute => {
            let free = usage.free_gb();
            if free < minimum {
                (
                    false,
                    format!(
                        "Not enough free space on disk {}: {} GB, minimum required: {} GB",
                        volume,
                        free,
                        threshold.value()
                    ),
                )
            } else {
                (
                    true,
                    format!(
                        "Disk {} has {} GB free (minimum {} GB)",
                        volume,
                        free,
                        threshold.value()
                    ),
                )
            }
        }
        ThresholdMode::Percent => {
            let percent = usage.percent_free();
            if percent < minimum {
                (
                    false,
                    format!(
                        "Not enough free space on disk {}: {:.2}% free ({:.2} GB of {:.2} GB), \
                         minimum required: {}%",
                        volume,
                        percent,
                        usage.free_gb(),
                        usage.total_gb(),
                        threshold.value()
                    ),
                )
            } else {
                (
                    true,
                    format!(
                        "Disk {} has {:.2}% free (minimum {}%)",
                        volume,
                        percent,
                        threshold.value()
                    ),
                )
            }
        }
    };
    CheckResult {
        volume,
        usage,
        passed,
        message,
    }
}

/// Runs checks against a set of volumes, announcing failures to a reporter
pub struct Checker<'a> {
    source: &'a dyn VolumeSource,
    resolver: &'a dyn VolumeResolver,
    reporter: &'a mut dyn Reporter,
    last_error: Option<String>,
}

impl<'a> Checker<'a> {
    pub fn new(
        source: &'a dyn VolumeSource,
        resolver: &'a dyn VolumeResolver,
        reporter: &'a mut dyn Reporter,
    ) -> Checker<'a> {
        Checker {
            source,
            resolver,
            reporter,
            last_error: None,
        }
    }

    /// Validate, then compare every requested volume
    pub fn run(self, request: &CheckRequest) -> CheckOutcome {
        let span = info_span!("check", mode = ?request.mode, policy = ?request.policy);
        let _enter = span.enter();

        match self.prepare(request) {
            Ok((volumes, threshold)) => self.compare(&volumes, threshold, request.policy),
            Err(e) => self.abort(Vec::new(), e),
        }
    }

    /// Everything that must hold before any comparison happens
    fn prepare(&self, request: &CheckRequest) -> Result<(Vec<VolumeId>, Threshold)> {
        let volumes = parse_volume_identifiers(&request.volumes)?;
        let threshold = Threshold::parse(&request.threshold, request.mode)?;

        for &volume in &volumes {
            let exists = volume_exists(self.source, self.resolver, volume)
                .map_err(|error| CheckError::VolumeQuery { volume, error })?;
            if !exists {
                return Err(CheckError::NonexistentVolume(volume));
            }
        }

        if threshold.mode() == ThresholdMode::Absolute {
            for &volume in &volumes {
                let query_err = |error: io::Error| CheckError::VolumeQuery { volume, error };
                let fits = check_threshold_within_capacity(
                    self.source,
                    self.resolver,
                    volume,
                    threshold.value(),
                )
                .map_err(query_err)?;
                if !fits {
                    let usage = query_volume_usage(self.source, self.resolver, volume)
                        .map_err(query_err)?;
                    return Err(CheckError::ThresholdExceedsCapacity {
                        volume,
                        threshold,
                        total_gb: usage.total_gb(),
                    });
                }
            }
        }
        debug!(volumes = volumes.len(), %threshold, "input validated");
        Ok((volumes, threshold))
    }

    fn compare(mut self, volumes: &[VolumeId], threshold: Threshold, policy: Policy) -> CheckOutcome {
        let mut status = Status::Ok;
        let mut results = Vec::with_capacity(volumes.len());
        for &volume in volumes {
            let usage = match query_volume_usage(self.source, self.resolver, volume) {
                Ok(usage) => usage,
                Err(error) => return self.abort(results, CheckError::VolumeQuery { volume, error }),
            };
            let result = evaluate(volume, usage, threshold);
            debug!(%volume, passed = result.passed, "{}", result.message);
            if !result.passed {
                status = max(status, Status::Failed);
                self.announce(&result.message);
            }
            let passed = result.passed;
            results.push(result);
            if !passed && policy == Policy::FailFast {
                info!(%volume, "stopping at first failing volume");
                break;
            }
        }
        CheckOutcome {
            status,
            results,
            error: None,
            last_error: self.last_error,
        }
    }

    fn abort(mut self, results: Vec<CheckResult>, error: CheckError) -> CheckOutcome {
        self.announce(&error.to_string());
        CheckOutcome {
            status: Status::Failed,
            results,
            error: Some(error),
            last_error: self.last_error,
        }
    }

    fn announce(&mut self, message: &str) {
        if let Err(e) = self.reporter.report(message) {
            warn!(sink = self.reporter.name(), error = %e, "unable to deliver report");
        }
        self.last_error = Some(message.to_owned());
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::report::test::{Broken, Recorder};
    use crate::report::Reporters;
    use crate::units::BYTES_PER_GB;
    use crate::volumes::test::FakeVolumes;
    use crate::volumes::DriveLetters;

    fn request(volumes: &[&str], threshold: &str, mode: ThresholdMode) -> CheckRequest {
        CheckRequest {
            volumes: volumes.iter().map(|v| v.to_string()).collect(),
            threshold: threshold.to_owned(),
            mode,
            policy: Policy::default_for(mode),
        }
    }

    fn run(volumes: &FakeVolumes, request: &CheckRequest) -> (CheckOutcome, Vec<String>) {
        let mut recorder = Recorder::default();
        let outcome = Checker::new(volumes, &DriveLetters, &mut recorder).run(request);
        (outcome, recorder.messages())
    }

    #[test]
    fn plenty_of_space_passes_quietly() {
        let volumes = FakeVolumes::new().with_gb('C', 500, 250);
        let (outcome, messages) = run(&volumes, &request(&["C"], "100", ThresholdMode::Absolute));
        assert_eq!(outcome.status, Status::Ok);
        assert!(messages.is_empty());
        assert!(outcome.last_error.is_none());
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.results[0].passed);
    }

    #[test]
    fn short_volume_fails_with_a_useful_message() {
        let volumes = FakeVolumes::new().with_gb('C', 500, 50);
        let (outcome, messages) = run(&volumes, &request(&["C"], "100", ThresholdMode::Absolute));
        assert_eq!(outcome.status, Status::Failed);
        assert_eq!(
            messages,
            vec!["Not enough free space on disk C: 50 GB, minimum required: 100 GB".to_owned()]
        );
        assert_eq!(outcome.last_error.as_deref(), Some(messages[0].as_str()));
    }

    #[test]
    fn percentage_checks_every_volume() {
        let volumes = FakeVolumes::new()
            .with_gb('C', 100, 10)
            .with_gb('D', 100, 50);
        let (outcome, messages) = run(&volumes, &request(&["C", "D"], "20", ThresholdMode::Percent));
        assert_eq!(outcome.status, Status::Failed);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("disk C"));
        assert!(messages[0].contains("10.00% free"));
        assert!(messages[0].contains("minimum required: 20%"));
        let failed: Vec<char> = outcome.failures().map(|r| r.volume.letter()).collect();
        assert_eq!(failed, vec!['C']);
    }

    #[test]
    fn bad_identifier_aborts_before_any_query() {
        let volumes = FakeVolumes::new().with_gb('C', 500, 250);
        let (outcome, messages) = run(&volumes, &request(&["1"], "100", ThresholdMode::Absolute));
        assert_eq!(outcome.status, Status::Failed);
        assert_eq!(volumes.usage_queries.get(), 0);
        assert_eq!(volumes.enumerations.get(), 0);
        match outcome.error {
            Some(CheckError::Input(InputError::MalformedIdentifier(ref raw))) => assert_eq!(raw, "1"),
            ref other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("--disks"));
    }

    #[test]
    fn bad_threshold_aborts_before_any_query() {
        let volumes = FakeVolumes::new().with_gb('C', 500, 250);
        for bad in &["0", "-100", "ten", ""] {
            let (outcome, _) = run(&volumes, &request(&["C"], bad, ThresholdMode::Absolute));
            assert_eq!(outcome.status, Status::Failed);
            match outcome.error {
                Some(CheckError::Input(InputError::MalformedThreshold { .. })) => {}
                ref other => panic!("unexpected error for {:?}: {:?}", bad, other),
            }
        }
        let (outcome, _) = run(&volumes, &request(&["C"], "100", ThresholdMode::Percent));
        assert_eq!(outcome.status, Status::Failed);
        assert_eq!(volumes.usage_queries.get(), 0);
    }

    #[test]
    fn unmounted_volume_is_reported() {
        let volumes = FakeVolumes::new().with_gb('C', 500, 250);
        let (outcome, messages) = run(&volumes, &request(&["C", "E"], "100", ThresholdMode::Absolute));
        assert_eq!(outcome.status, Status::Failed);
        assert_eq!(messages, vec!["Disk E does not exist.".to_owned()]);
        assert!(outcome.results.is_empty());
        assert_eq!(volumes.usage_queries.get(), 0);
    }

    #[test]
    fn threshold_beyond_capacity_is_rejected() {
        let volumes = FakeVolumes::new()
            .with_gb('C', 500, 450)
            .with_gb('D', 100, 90);
        let (outcome, messages) = run(&volumes, &request(&["C", "D"], "100", ThresholdMode::Absolute));
        assert_eq!(outcome.status, Status::Failed);
        assert!(outcome.results.is_empty());
        assert_eq!(
            messages,
            vec![
                "Wanted minimum free space is 100 GB, but disk D has only 100 GB of total space."
                    .to_owned()
            ]
        );
    }

    #[test]
    fn capacity_bound_does_not_apply_to_percentages() {
        let volumes = FakeVolumes::new().with_gb('C', 10, 9);
        let (outcome, _) = run(&volumes, &request(&["C"], "50", ThresholdMode::Percent));
        assert_eq!(outcome.status, Status::Ok);
    }

    #[test]
    fn fail_fast_stops_at_first_short_volume() {
        let volumes = FakeVolumes::new()
            .with_gb('C', 500, 10)
            .with_gb('D', 500, 20);
        let (outcome, messages) = run(&volumes, &request(&["C", "D"], "100", ThresholdMode::Absolute));
        assert_eq!(outcome.status, Status::Failed);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("disk C"));
    }

    #[test]
    fn policies_can_be_swapped() {
        let volumes = FakeVolumes::new()
            .with_gb('C', 500, 10)
            .with_gb('D', 500, 20);
        let mut absolute = request(&["C", "D"], "100", ThresholdMode::Absolute);
        absolute.policy = Policy::AggregateAll;
        let (outcome, messages) = run(&volumes, &absolute);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(messages.len(), 2);
        assert_eq!(outcome.last_error.as_deref(), Some(messages[1].as_str()));

        let volumes = FakeVolumes::new()
            .with_gb('C', 100, 10)
            .with_gb('D', 100, 5);
        let mut percent = request(&["C", "D"], "20", ThresholdMode::Percent);
        percent.policy = Policy::FailFast;
        let (outcome, messages) = run(&volumes, &percent);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn broken_notifications_do_not_change_the_outcome() {
        let volumes = FakeVolumes::new().with_gb('C', 500, 50);
        let recorder = Recorder::default();
        let mut reporters = Reporters::new().with(Broken).with(recorder.clone());
        let outcome = Checker::new(&volumes, &DriveLetters, &mut reporters)
            .run(&request(&["C"], "100", ThresholdMode::Absolute));
        assert_eq!(outcome.status, Status::Failed);
        assert_eq!(recorder.messages().len(), 1);

        let volumes = FakeVolumes::new().with_gb('C', 500, 250);
        let mut broken = Broken;
        let outcome = Checker::new(&volumes, &DriveLetters, &mut broken)
            .run(&request(&["C"], "100", ThresholdMode::Absolute));
        assert_eq!(outcome.status, Status::Ok);
    }

    #[test]
    fn evaluate_uses_strict_comparison() {
        let id: VolumeId = "C".parse().unwrap();
        let usage = VolumeUsage {
            total_bytes: 500 * BYTES_PER_GB,
            free_bytes: 100 * BYTES_PER_GB,
        };
        let gb = Threshold::parse("100", ThresholdMode::Absolute).unwrap();
        assert!(evaluate(id, usage, gb).passed);
        let pct = Threshold::parse("20", ThresholdMode::Percent).unwrap();
        assert!(evaluate(id, usage, pct).passed);
        let pct = Threshold::parse("21", ThresholdMode::Percent).unwrap();
        assert!(!evaluate(id, usage, pct).passed);
    }

    #[test]
    fn empty_volume_fails_percentage_check() {
        let id: VolumeId = "C".parse().unwrap();
        let usage = VolumeUsage {
            total_bytes: 0,
            free_bytes: 0,
        };
        let pct = Threshold::parse("1", ThresholdMode::Percent).unwrap();
        assert!(!evaluate(id, usage, pct).passed);
    }

    #[test]
    fn policy_from_str() {
        assert_eq!("fail-fast".parse::<Policy>(), Ok(Policy::FailFast));
        assert_eq!("aggregate-all".parse::<Policy>(), Ok(Policy::AggregateAll));
        assert!("sometimes".parse::<Policy>().is_err());
    }
}
