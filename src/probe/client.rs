//! Probe client seam.
//!
//! The executor never spawns processes itself; it hands a [`CommandSpec`]
//! to a [`ProbeClient`]. Production code uses [`CommandProbeClient`], tests
//! plug in scripted clients.

use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::types::{CommandSpec, ProbeOutput};

/// Poll interval while waiting on a child with a deadline
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs one external measurement command.
pub trait ProbeClient {
    fn invoke(&mut self, spec: &CommandSpec) -> io::Result<ProbeOutput>;
}

impl<T: ProbeClient + ?Sized> ProbeClient for &mut T {
    fn invoke(&mut self, spec: &CommandSpec) -> io::Result<ProbeOutput> {
        (**self).invoke(spec)
    }
}

/// Client backed by `std::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct CommandProbeClient {
    /// Kill the process when it runs longer than this
    pub timeout: Option<Duration>,
}

impl CommandProbeClient {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ProbeClient for CommandProbeClient {
    fn invoke(&mut self, spec: &CommandSpec) -> io::Result<ProbeOutput> {
        log::debug!("Invoking {}", spec.identity());

        let Some(timeout) = self.timeout else {
            let output = Command::new(&spec.program).args(&spec.args).output()?;
            return Ok(ProbeOutput {
                status: output.status.code(),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        };

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain pipes on helper threads so a chatty child cannot block on a full pipe.
        let stdout_reader = child.stdout.take().map(|mut out| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = out.read_to_end(&mut buf);
                buf
            })
        });
        let stderr_reader = child.stderr.take().map(|mut err| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = err.read_to_end(&mut buf);
                buf
            })
        });

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status.code(),
                None if Instant::now() >= deadline => {
                    log::warn!("{} exceeded {:?}, killing", spec.identity(), timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    break None;
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        };

        let stdout = stdout_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        let stderr = stderr_reader
            .and_then(|h| h.join().ok())
            .unwrap_or_default();

        Ok(ProbeOutput { status, stdout, stderr })
    }
}
