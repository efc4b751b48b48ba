//! Resilient execution of flaky external probes.
//!
//! Each attempt's payload is checked for acceptance (non-empty and free of
//! tool-reported error markers). Rejected attempts are retried after
//! `min(cap, base * 2^(attempt-1)) + uniform_jitter`. When every attempt is
//! rejected the last payload is still returned, flagged as failed.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::client::ProbeClient;
use super::types::{CommandSpec, ProbeResult, RetryPolicy};

/// Blocks the caller between attempts (and between runs in loop mode).
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

impl<T: Sleeper + ?Sized> Sleeper for &mut T {
    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Sleeper backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Why an attempt was not accepted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// Nothing but whitespace came back
    #[error("empty payload")]
    Empty,
    /// The payload carried a tool-reported error marker
    #[error("error marker {0:?}")]
    ErrorMarker(String),
    /// The command could not be started
    #[error("invocation failed: {0}")]
    Invoke(String),
}

/// Check a payload against the acceptance rule.
pub fn assess_payload(payload: &[u8], error_markers: &[String]) -> Result<(), RejectReason> {
    let text = String::from_utf8_lossy(payload);
    if text.trim().is_empty() {
        return Err(RejectReason::Empty);
    }
    match error_markers.iter().find(|m| text.contains(m.as_str())) {
        Some(marker) => Err(RejectReason::ErrorMarker(marker.clone())),
        None => Ok(()),
    }
}

/// Runs commands through a [`ProbeClient`] under a [`RetryPolicy`].
pub struct ProbeExecutor<C, S = ThreadSleeper, R = StdRng> {
    client: C,
    sleeper: S,
    rng: R,
    policy: RetryPolicy,
}

impl<C: ProbeClient> ProbeExecutor<C, ThreadSleeper, StdRng> {
    pub fn new(client: C, policy: RetryPolicy) -> Self {
        Self::with_parts(client, ThreadSleeper, StdRng::from_entropy(), policy)
    }
}

impl<C, S, R> ProbeExecutor<C, S, R>
where
    C: ProbeClient,
    S: Sleeper,
    R: Rng,
{
    pub fn with_parts(client: C, sleeper: S, rng: R, policy: RetryPolicy) -> Self {
        Self {
            client,
            sleeper,
            rng,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn sleeper_mut(&mut self) -> &mut S {
        &mut self.sleeper
    }

    /// Full delay after a rejected attempt, jitter included.
    pub fn retry_delay(&mut self, attempt: u32) -> Duration {
        let base = self.policy.backoff(attempt);
        let max_jitter = self.policy.max_jitter.as_secs_f64();
        if max_jitter <= 0.0 {
            return base;
        }
        base + Duration::from_secs_f64(self.rng.gen_range(0.0..max_jitter))
    }

    /// Run `spec` without persisting an artifact.
    pub fn execute(&mut self, spec: &CommandSpec) -> ProbeResult {
        self.run(spec, None)
    }

    /// Run `spec`, writing each attempt to a temp file next to `artifact`
    /// and promoting the accepted (or last) one to `artifact`.
    pub fn execute_to(&mut self, spec: &CommandSpec, artifact: &Path) -> ProbeResult {
        self.run(spec, Some(artifact))
    }

    fn run(&mut self, spec: &CommandSpec, artifact: Option<&Path>) -> ProbeResult {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut temps: Vec<PathBuf> = Vec::new();

        let mut attempt = 0;
        let (payload, exit_status, failed) = loop {
            attempt += 1;

            let (payload, exit_status, verdict) = match self.client.invoke(spec) {
                Ok(output) => {
                    let payload = if spec.capture_stderr && !output.stderr.is_empty() {
                        let mut merged = output.stderr.clone();
                        merged.extend_from_slice(&output.stdout);
                        merged
                    } else {
                        output.stdout
                    };
                    let verdict = assess_payload(&payload, &spec.error_markers);
                    (payload, output.status, verdict)
                }
                Err(e) => (Vec::new(), None, Err(RejectReason::Invoke(e.to_string()))),
            };

            if let Some(path) = artifact {
                let temp = temp_path(path, attempt);
                match fs::write(&temp, &payload) {
                    Ok(()) => temps.push(temp),
                    Err(e) => log::warn!("Failed to write {}: {}", temp.display(), e),
                }
            }

            match verdict {
                Ok(()) => {
                    log::debug!("{} accepted on attempt {}", spec.kind, attempt);
                    break (payload, exit_status, false);
                }
                Err(reason) if attempt < max_attempts => {
                    let delay = self.retry_delay(attempt);
                    log::warn!(
                        "{} attempt {}/{} rejected ({}), retrying in {:.2}s",
                        spec.kind,
                        attempt,
                        max_attempts,
                        reason,
                        delay.as_secs_f64()
                    );
                    self.sleeper.sleep(delay);
                }
                Err(reason) => {
                    log::warn!(
                        "{} failed after {} attempts ({}); keeping last payload",
                        spec.kind,
                        attempt,
                        reason
                    );
                    break (payload, exit_status, true);
                }
            }
        };

        let artifact = artifact.and_then(|path| promote(path, attempt, &temps));

        ProbeResult {
            kind: spec.kind,
            command: spec.identity(),
            exit_status,
            payload,
            attempts: attempt,
            elapsed: started.elapsed(),
            failed,
            artifact,
        }
    }
}

fn temp_path(artifact: &Path, attempt: u32) -> PathBuf {
    let mut name = artifact
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".attempt{}.tmp", attempt));
    artifact.with_file_name(name)
}

/// Rename the final attempt's temp file into place and drop the rest.
fn promote(artifact: &Path, final_attempt: u32, temps: &[PathBuf]) -> Option<PathBuf> {
    let final_temp = temp_path(artifact, final_attempt);
    let mut promoted = None;

    for temp in temps {
        if *temp == final_temp {
            match fs::rename(temp, artifact) {
                Ok(()) => promoted = Some(artifact.to_path_buf()),
                Err(e) => log::warn!("Failed to promote {}: {}", temp.display(), e),
            }
        } else if let Err(e) = fs::remove_file(temp) {
            log::debug!("Could not remove {}: {}", temp.display(), e);
        }
    }

    promoted
}
