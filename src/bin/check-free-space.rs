//! Check free space on volumes named by drive letter

use std::path::PathBuf;

use structopt::clap::AppSettings;
use structopt::StructOpt;
use tracing::warn;

use volume_check_plugins::check::{CheckOutcome, CheckRequest, Checker, Policy};
use volume_check_plugins::config::{FileConfig, Overrides, Settings, VolumeRoot};
use volume_check_plugins::report::{Console, LastErrorFile, Reporters, SlackNotifier};
use volume_check_plugins::units::bytes_to_human_size;
use volume_check_plugins::validate::ThresholdMode;
use volume_check_plugins::volumes::{SystemVolumes, VolumeResolver};
use volume_check_plugins::{logging, Status};

/// Check that volumes keep a minimum amount of free space.
///
/// Volumes are named by drive letter. On hosts without drive letters, map
/// letters to mount points with --volume-root or a config file.
#[derive(StructOpt, Debug)]
#[structopt(
    name = "check-free-space (part of volume-check-plugins)",
    setting = AppSettings::ColoredHelp,
    after_help = "Examples:

    Fail if C or D has less than 10 GB free, stopping at the first one:

        check-free-space --disks C D --min-free-space 10

    Report every volume with less than 15% free:

        check-free-space --disks C D E --min-free-space-percent 15

    Check the root filesystem of a Linux host as volume C, and tell Slack:

        check-free-space --disks C --volume-root C=/ --min-free-space 5 \\
            --slack-webhook-url https://hooks.slack.com/services/... --slack-channel '#ops'

Exit status is 0 when every volume has enough free space and 1 otherwise."
)]
struct Args {
    #[structopt(
        long = "disks",
        name = "LETTER",
        required = true,
        help = "Upper case letters of the volumes to check, e.g. C D E"
    )]
    disks: Vec<String>,
    #[structopt(
        long = "min-free-space",
        name = "GB",
        allow_hyphen_values = true,
        required_unless = "PERCENT",
        conflicts_with = "PERCENT",
        help = "Minimum free space in GB, a whole number above zero"
    )]
    min_free_space: Option<String>,
    #[structopt(
        long = "min-free-space-percent",
        name = "PERCENT",
        allow_hyphen_values = true,
        help = "Minimum free space as a percent of each volume, between 1 and 99"
    )]
    min_free_space_percent: Option<String>,
    #[structopt(
        long = "policy",
        possible_values = &["fail-fast", "aggregate-all"],
        help = "Stop at the first short volume or report them all. \
                Default: fail-fast for GB, aggregate-all for percent"
    )]
    policy: Option<Policy>,

    #[structopt(
        long = "config",
        parse(from_os_str),
        help = "TOML file with volume roots, policy and notification settings"
    )]
    config: Option<PathBuf>,
    #[structopt(
        long = "volume-root",
        name = "LETTER=PATH",
        number_of_values = 1,
        help = "Where a volume letter is mounted, e.g. C=/ (may be repeated)"
    )]
    volume_roots: Vec<VolumeRoot>,
    #[structopt(
        long = "last-error-file",
        parse(from_os_str),
        help = "Write the last failure message here, for whatever runs this check"
    )]
    last_error_file: Option<PathBuf>,
    #[structopt(
        long = "slack-webhook-url",
        env = "CHECK_FREE_SPACE_SLACK_WEBHOOK",
        hide_env_values = true,
        help = "Post failures to this Slack-compatible incoming webhook"
    )]
    slack_webhook_url: Option<String>,
    #[structopt(
        long = "slack-channel",
        env = "CHECK_FREE_SPACE_SLACK_CHANNEL",
        help = "Channel to post failures to, if the webhook allows overriding it"
    )]
    slack_channel: Option<String>,
    #[structopt(
        long = "notify-timeout",
        name = "SECONDS",
        help = "Give up on the webhook after this many seconds [default: 10]"
    )]
    notify_timeout: Option<u64>,

    #[structopt(long = "info", help = "Print size and free space of every checked volume")]
    info: bool,
    #[structopt(
        short = "v",
        long = "verbose",
        parse(from_occurrences),
        help = "Log more to stderr, may be repeated"
    )]
    verbose: u8,
}

impl Args {
    /// The threshold and how to interpret it
    ///
    /// Argument parsing guarantees exactly one of the two flags is present.
    fn threshold(&self) -> Option<(ThresholdMode, String)> {
        match (&self.min_free_space, &self.min_free_space_percent) {
            (Some(gb), None) => Some((ThresholdMode::Absolute, gb.clone())),
            (None, Some(percent)) => Some((ThresholdMode::Percent, percent.clone())),
            _ => None,
        }
    }

    fn overrides(&self) -> Overrides {
        Overrides {
            volume_roots: self.volume_roots.clone(),
            policy: self.policy,
            last_error_file: self.last_error_file.clone(),
            slack_webhook_url: self.slack_webhook_url.clone(),
            slack_channel: self.slack_channel.clone(),
            notify_timeout_secs: self.notify_timeout,
        }
    }
}

fn load_settings(args: &Args) -> Result<Settings, String> {
    let file = match args.config {
        Some(ref path) => Some(FileConfig::load(path).map_err(|e| e.to_string())?),
        None => None,
    };
    Settings::resolve(file, args.overrides()).map_err(|e| e.to_string())
}

fn build_reporters(settings: &Settings) -> Reporters {
    let mut reporters = Reporters::new().with(Console);
    if let Some(ref path) = settings.last_error_file {
        reporters.push(Box::new(LastErrorFile::new(path.clone())));
    }
    if let Some(ref slack) = settings.slack {
        match SlackNotifier::new(
            slack.webhook_url.clone(),
            slack.channel.clone(),
            slack.timeout(),
        ) {
            Ok(notifier) => reporters.push(Box::new(notifier)),
            Err(e) => warn!(error = %e, "slack notifications disabled"),
        }
    }
    reporters
}

fn print_info(outcome: &CheckOutcome, resolver: &dyn VolumeResolver) {
    println!(
        "{:<6} {:>8} {:>8} {:>6} {:<6} {:<20}",
        "Volume", "Size", "Free", "Free%", "Status", "Mounted on"
    );
    for result in &outcome.results {
        println!(
            "{:<6} {:>8} {:>8} {:>5.1}% {:<6} {:<20}",
            result.volume,
            bytes_to_human_size(result.usage.total_bytes),
            bytes_to_human_size(result.usage.free_bytes),
            result.usage.percent_free(),
            if result.passed { "ok" } else { "short" },
            resolver.root_path(result.volume).display()
        );
    }
}

fn main() {
    let args = Args::from_args();
    logging::init(args.verbose);

    let (mode, threshold) = match args.threshold() {
        Some(threshold) => threshold,
        None => {
            println!(
                "{}: exactly one of --min-free-space or --min-free-space-percent is required",
                Status::Failed
            );
            Status::Failed.exit();
        }
    };
    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            println!("{}: {}", Status::Failed, e);
            Status::Failed.exit();
        }
    };

    let request = CheckRequest {
        volumes: args.disks.clone(),
        threshold,
        mode,
        policy: settings.policy.unwrap_or_else(|| Policy::default_for(mode)),
    };
    let mut reporters = build_reporters(&settings);
    let outcome = Checker::new(&SystemVolumes, &settings.mount_map, &mut reporters).run(&request);

    if outcome.status == Status::Ok {
        println!(
            "{}: {} volumes checked, all have at least {}{} free",
            Status::Ok,
            outcome.results.len(),
            request.threshold,
            request.mode.unit()
        );
    }
    if args.info {
        print_info(&outcome, &settings.mount_map);
    }
    outcome.status.exit();
}
