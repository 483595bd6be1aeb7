// SPDX-License-Identifier: GPL-3.0-or-later

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long output is still collected once the child is gone. Processes the
/// child left behind may hold the pipes open.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum Completion {
    Exited { status: ExitStatus, stdout: String, stderr: String },
    TimedOut { stdout: String, stderr: String },
}

/// A child process that is killed and reaped whenever the handle goes away,
/// whichever way that happens. On unix the child leads its own process group
/// and the whole group is killed, so whatever it started goes too.
pub struct ScopedChild {
    child: Option<Child>,
    group: Option<u32>,
    stdout: Option<Receiver<Vec<u8>>>,
    stderr: Option<Receiver<Vec<u8>>>,
}

// The pipes are drained on their own threads so the child never blocks on a
// full pipe while we poll it. Chunks are sent as they arrive, the channel
// closes at end of file.
fn drain(mut pipe: impl Read + Send + 'static) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

/// Output received until the pipe closed or `deadline` passed. The flag is
/// false when the deadline cut it short.
fn collect(rx: Option<Receiver<Vec<u8>>>, deadline: Instant) -> (String, bool) {
    let rx = match rx {
        Some(rx) => rx,
        None => return (String::new(), true),
    };

    let mut buf = Vec::new();
    let complete = loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(chunk) => buf.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Disconnected) => break true,
            Err(RecvTimeoutError::Timeout) => break false,
        }
    };

    (String::from_utf8_lossy(&buf).into_owned(), complete)
}

#[cfg(unix)]
fn kill_group(group: u32) {
    // Negative pid addresses the process group
    let status = Command::new("kill")
        .args(["-KILL", "--", &format!("-{}", group)])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = status {
        trace!("kill group={}: {}", group, e);
    }
}

#[cfg(not(unix))]
fn kill_group(_group: u32) {}

impl ScopedChild {
    pub fn spawn(mut cmd: Command) -> io::Result<Self> {
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let group = Some(child.id()).filter(|_| cfg!(unix));
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        Ok(Self { child: Some(child), group, stdout, stderr })
    }

    /// Waits for the child to exit. Past `timeout` it is killed. Either way
    /// the call returns within `timeout` plus a short grace for the output.
    pub fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Completion> {
        let start = Instant::now();

        let status = loop {
            let child = match self.child.as_mut() {
                Some(c) => c,
                None => return Err(io::Error::new(io::ErrorKind::Other, "process already reaped")),
            };

            if let Some(status) = child.try_wait()? {
                break Some(status);
            }

            if start.elapsed() >= timeout {
                self.terminate();
                break None;
            }

            thread::sleep(POLL_INTERVAL);
        };

        self.child = None;
        let deadline = Instant::now() + DRAIN_GRACE;
        let (stdout, out_done) = collect(self.stdout.take(), deadline);
        let (stderr, err_done) = collect(self.stderr.take(), deadline);

        // Something the child started still holds a pipe
        if let Some(group) = self.group.take() {
            if !(out_done && err_done) {
                debug!("Killing processes left behind by group {}", group);
                kill_group(group);
            }
        }

        Ok(match status {
            Some(status) => Completion::Exited { status, stdout, stderr },
            None => Completion::TimedOut { stdout, stderr },
        })
    }

    fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Some(group) = self.group {
                kill_group(group);
            }
            if let Err(e) = child.kill() {
                trace!("kill pid={}: {}", child.id(), e);
            }
            let _ = child.wait();
        }
    }
}

impl Drop for ScopedChild {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ScopedChild {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        ScopedChild::spawn(cmd).unwrap()
    }

    #[test]
    fn captures_output_and_status() {
        let mut child = sh("echo out; echo err >&2; exit 3");
        match child.wait_timeout(Duration::from_secs(10)).unwrap() {
            Completion::Exited { status, stdout, stderr } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stdout.trim(), "out");
                assert_eq!(stderr.trim(), "err");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn kills_on_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let mut child = ScopedChild::spawn(cmd).unwrap();
        let start = Instant::now();
        let completion = child.wait_timeout(Duration::from_millis(100)).unwrap();
        assert!(matches!(completion, Completion::TimedOut { .. }));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn grandchild_holding_pipes_does_not_block_timeout() {
        // sh forks sleep instead of replacing itself with it
        let mut child = sh("sleep 30; true");
        let start = Instant::now();
        let completion = child.wait_timeout(Duration::from_millis(200)).unwrap();
        assert!(matches!(completion, Completion::TimedOut { .. }));
        assert!(start.elapsed() < Duration::from_secs(3), "took {:?}", start.elapsed());
    }

    #[test]
    fn background_process_does_not_block_exit() {
        let mut child = sh("sleep 30 & echo done");
        let start = Instant::now();
        match child.wait_timeout(Duration::from_secs(10)).unwrap() {
            Completion::Exited { status, stdout, .. } => {
                assert!(status.success());
                assert_eq!(stdout.trim(), "done");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(5), "took {:?}", start.elapsed());
    }
}
