//! Announce check failures
//!
//! A check only knows that it can `report` a message. Where the message goes
//! is decided by whoever builds the [`Reporters`] fan-out: standard output,
//! a file that an orchestrator reads after we exit, or a chat webhook.
//!
//! Reporting is best effort. A sink that fails is logged and skipped, it
//! never changes the outcome of a check.

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::result::Result as StdResult;
use std::time::Duration;

use derive_more::From;
use reqwest::blocking::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::Status;

/// Errors delivering a report
#[derive(Debug, From)]
pub enum ReportError {
    /// Could not reach the remote end, or it timed out
    Http(reqwest::Error),
    /// Could not write a local sink
    Io(io::Error),
    /// The remote end answered, but not with a success
    #[from(ignore)]
    Rejected(String),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> StdResult<(), fmt::Error> {
        match self {
            ReportError::Http(e) => write!(f, "notification request failed: {}", e),
            ReportError::Io(e) => write!(f, "unable to write report: {}", e),
            ReportError::Rejected(msg) => write!(f, "notification rejected: {}", msg),
        }
    }
}

impl std::error::Error for ReportError {}

pub type Result<T> = StdResult<T, ReportError>;

/// Something that can take a human readable failure message
pub trait Reporter {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn report(&mut self, message: &str) -> Result<()>;
}

/// Print to standard output, where check runners collect plugin output
#[derive(Debug, Default, Clone, Copy)]
pub struct Console;

impl Reporter for Console {
    fn name(&self) -> &'static str {
        "console"
    }

    fn report(&mut self, message: &str) -> Result<()> {
        println!("{}: {}", Status::Failed, message);
        Ok(())
    }
}

/// Keep the most recent failure message in a file
///
/// Each report overwrites the file, so after the process exits it holds the
/// last failure that was announced.
#[derive(Debug, Clone)]
pub struct LastErrorFile {
    path: PathBuf,
}

impl LastErrorFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> LastErrorFile {
        LastErrorFile { path: path.into() }
    }
}

impl Reporter for LastErrorFile {
    fn name(&self) -> &'static str {
        "last-error-file"
    }

    fn report(&mut self, message: &str) -> Result<()> {
        fs::write(&self.path, message)?;
        Ok(())
    }
}

/// The body of a Slack-compatible incoming webhook call
#[derive(Debug, Serialize, PartialEq)]
struct SlackMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
    text: String,
}

/// Post failures to a chat channel through an incoming webhook
pub struct SlackNotifier {
    client: Client,
    webhook_url: String,
    channel: Option<String>,
    host: Option<String>,
}

impl SlackNotifier {
    /// Build a notifier whose requests give up after `timeout`
    pub fn new(
        webhook_url: String,
        channel: Option<String>,
        timeout: Duration,
    ) -> Result<SlackNotifier> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(SlackNotifier {
            client,
            webhook_url,
            channel,
            host: sysinfo::System::host_name(),
        })
    }

    fn message<'a>(&'a self, text: &str) -> SlackMessage<'a> {
        let text = match self.host {
            Some(ref host) => format!("[{}] {}", host, text),
            None => text.to_owned(),
        };
        SlackMessage {
            channel: self.channel.as_deref(),
            text,
        }
    }
}

impl Reporter for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn report(&mut self, message: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&self.message(message))
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ReportError::Rejected(format!(
                "webhook returned {}: {}",
                status, body
            )));
        }
        debug!(channel = ?self.channel, "sent slack notification");
        Ok(())
    }
}

/// Send every report to all configured sinks
#[derive(Default)]
pub struct Reporters {
    sinks: Vec<Box<dyn Reporter>>,
}

impl Reporters {
    pub fn new() -> Reporters {
        Reporters::default()
    }

    pub fn with<R: Reporter + 'static>(mut self, sink: R) -> Reporters {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn Reporter>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Reporter for Reporters {
    fn name(&self) -> &'static str {
        "all"
    }

    /// Never fails: a broken sink is logged and the rest still get the message
    fn report(&mut self, message: &str) -> Result<()> {
        for sink in &mut self.sinks {
            if let Err(e) = sink.report(message) {
                warn!(sink = sink.name(), error = %e, "unable to deliver report");
            }
        }
        Ok(())
    }
}
