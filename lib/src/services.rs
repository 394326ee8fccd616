use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::{Error, Result, ServiceRecord};

/// Leading token of the column header row printed by `systemctl list-units`.
pub const HEADER_TOKEN: &str = "UNIT";

/// Directory the derived [`ServiceRecord::path`] points into.
pub const SERVICE_DIR: &str = "/etc/systemd/system";

const LIST_ARGS: [&str; 3] = ["list-units", "--type=service", "--state=active"];

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Something that can enumerate the active services on the host.
pub trait ServiceLister: Send + Sync {
    fn list(&self, filter: &str) -> Result<Vec<ServiceRecord>>;
}

/// Lists services by running `systemctl list-units`.
#[derive(Debug, Clone)]
pub struct Systemctl {
    program: String,
    timeout: Option<Duration>,
}

impl Systemctl {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Kills the listing command if it has not exited after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn spawn_error(&self, source: std::io::Error) -> Error {
        Error::Spawn {
            program: self.program.clone(),
            source,
        }
    }

    /// Runs the listing command and returns its combined stdout and stderr.
    fn run(&self) -> Result<String> {
        tracing::debug!(program = %self.program, args = ?LIST_ARGS, "running service listing");
        let mut child = Command::new(&self.program)
            .args(LIST_ARGS)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| self.spawn_error(source))?;

        // Drained on their own threads so a chatty child never blocks on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child)?;
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(Error::Status {
                program: self.program.clone(),
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        let mut combined = String::from_utf8_lossy(&stdout).into_owned();
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&String::from_utf8_lossy(&stderr));
        }
        Ok(combined)
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let Some(timeout) = self.timeout else {
            return child.wait().map_err(|source| self.spawn_error(source));
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(|source| self.spawn_error(source))? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        tracing::warn!(program = %self.program, ?timeout, pid = child.id(), "killing hung service listing");
        if let Err(e) = child.kill() {
            tracing::warn!(error = %e, "failed to kill service listing");
        }
        // Reap it so no zombie is left behind.
        let _ = child.wait();
        Err(Error::Timeout {
            program: self.program.clone(),
            timeout,
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

impl ServiceLister for Systemctl {
    fn list(&self, filter: &str) -> Result<Vec<ServiceRecord>> {
        let output = self.run()?;
        let services = parse_list_units(&output, filter);
        tracing::debug!(count = services.len(), filter, "parsed active services");
        Ok(services)
    }
}

/// Parses `systemctl list-units` output.
///
/// The header row and lines with fewer than three columns are skipped. When
/// `filter` is non-empty only services whose name contains it are kept.
pub fn parse_list_units(output: &str, filter: &str) -> Vec<ServiceRecord> {
    output
        .lines()
        .filter(|line| !line.starts_with(HEADER_TOKEN))
        .filter_map(parse_line)
        .filter(|service| filter.is_empty() || service.name.contains(filter))
        .collect()
}

fn parse_line(line: &str) -> Option<ServiceRecord> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }
    let field = |i: usize| fields.get(i).map(|s| s.to_string()).unwrap_or_default();
    let name = fields[0].to_string();
    Some(ServiceRecord {
        path: service_path(&name),
        unit: field(1),
        active_state: field(2),
        sub_state: field(3),
        load_state: field(4),
        name,
    })
}

pub fn service_path(name: &str) -> String {
    format!("{SERVICE_DIR}/{name}.service")
}
