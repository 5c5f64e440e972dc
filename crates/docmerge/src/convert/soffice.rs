//! LibreOffice headless conversion.
//!
//! Each session owns a private user profile so concurrent or crashed
//! instances never share state, and every conversion runs under a watchdog
//! that kills the converter's whole process group once the timeout passes.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crossbeam_channel::{after, select, tick};
use tracing::{debug, warn};

use super::{Availability, ConversionSession, DocumentConverter};
use crate::config::WordConfig;
use crate::error::ConvertError;
use crate::tempdirs::ScratchDir;

const PROGRAM_NAMES: &[&str] = &["soffice", "libreoffice"];
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct SofficeConverter {
    program: Option<PathBuf>,
}

impl SofficeConverter {
    /// Uses `program` when given, otherwise searches `PATH`.
    pub fn new(program: Option<PathBuf>) -> Self {
        Self { program }
    }

    pub fn from_config(config: &WordConfig) -> Self {
        Self::new(config.converter_program.clone())
    }

    pub fn resolve_program(&self) -> Option<PathBuf> {
        match &self.program {
            Some(program) => program.is_file().then(|| program.clone()),
            None => find_on_path(PROGRAM_NAMES),
        }
    }
}

impl DocumentConverter for SofficeConverter {
    fn availability(&self) -> Availability {
        match (self.resolve_program(), &self.program) {
            (Some(program), _) => {
                Availability::available(format!("LibreOffice found at {}", program.display()))
            }
            (None, Some(configured)) => Availability::unavailable(format!(
                "Configured converter '{}' does not exist",
                configured.display()
            )),
            (None, None) => Availability::unavailable(
                "LibreOffice (soffice) was not found on PATH; set word.converter_program",
            ),
        }
    }

    fn open_session(
        &self,
        timeout: Duration,
    ) -> Result<Box<dyn ConversionSession + '_>, ConvertError> {
        let program = self.resolve_program().ok_or_else(|| ConvertError::Unavailable {
            reason: self.availability().reason,
        })?;
        let profile = ScratchDir::new("docmerge_soffice_profile_")
            .map_err(|e| ConvertError::Failed(e.to_string()))?;
        debug!(program = %program.display(), "Opened conversion session");

        Ok(Box::new(SofficeSession {
            program,
            profile,
            timeout,
        }))
    }
}

struct SofficeSession {
    program: PathBuf,
    profile: ScratchDir,
    timeout: Duration,
}

impl SofficeSession {
    fn profile_url(&self) -> String {
        let path = self.profile.path().to_string_lossy().replace('\\', "/");
        if path.starts_with('/') {
            format!("file://{}", path)
        } else {
            format!("file:///{}", path)
        }
    }
}

impl ConversionSession for SofficeSession {
    fn convert(&mut self, source: &Path, out_dir: &Path) -> Result<PathBuf, ConvertError> {
        let mut command = Command::new(&self.program);
        command
            .arg(format!("-env:UserInstallation={}", self.profile_url()))
            .args(["--headless", "--norestore", "--convert-to", "pdf", "--outdir"])
            .arg(out_dir)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // soffice forks soffice.bin; a fresh group lets the watchdog reach both.
            command.process_group(0);
        }
        let mut child = command.spawn().map_err(|e| ConvertError::Spawn {
            program: self.program.clone(),
            source: e,
        })?;

        let ticker = tick(POLL_INTERVAL);
        let deadline = after(self.timeout);
        let status = loop {
            select! {
                recv(ticker) -> _ => {}
                recv(deadline) -> _ => {
                    kill_process_group(&mut child);
                    let _ = child.wait();
                    return Err(ConvertError::Timeout {
                        seconds: self.timeout.as_secs(),
                    });
                }
            }
            if let Some(status) = child
                .try_wait()
                .map_err(|e| ConvertError::Failed(e.to_string()))?
            {
                break status;
            }
        };

        if !status.success() {
            return Err(ConvertError::Failed(format!("Converter exited with {}", status)));
        }

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let output = out_dir.join(format!("{}.pdf", stem));
        match std::fs::metadata(&output) {
            Ok(meta) if meta.len() > 0 => Ok(output),
            _ => Err(ConvertError::Failed(
                "Converter finished without producing a PDF".to_string(),
            )),
        }
    }
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;
    if unsafe { libc::kill(-pgid, libc::SIGKILL) } != 0 {
        warn!(
            error = %std::io::Error::last_os_error(),
            "Failed to kill converter process group"
        );
        if let Err(e) = child.kill() {
            warn!(error = %e, "Failed to kill timed-out converter");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(error = %e, "Failed to kill timed-out converter");
    }
}

fn find_on_path(names: &[&str]) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        names.iter().find_map(|name| {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
            let exe = dir.join(format!("{}.exe", name));
            exe.is_file().then_some(exe)
        })
    })
}
