use std::process::{Child, Command, Stdio};
use std::time::Duration;

use colored::Colorize;

use crate::error::Result;

/// Browser executable expected on PATH. The original workflow assumes it
/// already has the streaming site's login stored.
const BROWSER_EXECUTABLE: &str = "firefox";

/// How long a terminated viewer gets to exit before its process group is
/// killed outright.
#[cfg(unix)]
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle of the external process that displays the stream. The watch
/// loop owns the viewer exclusively; nothing else may signal it. Both
/// operations are idempotent: launching while running and terminating with
/// nothing running are no-ops.
pub trait Viewer {
    fn launch(&mut self, url: &str) -> Result<()>;
    fn terminate(&mut self) -> Result<()>;
    fn is_running(&self) -> bool;
}

pub struct BrowserViewer {
    executable: String,
    child: Option<Child>,
}

impl BrowserViewer {
    pub fn new() -> Self {
        Self {
            executable: BROWSER_EXECUTABLE.to_string(),
            child: None,
        }
    }
}

impl Default for BrowserViewer {
    fn default() -> Self {
        Self::new()
    }
}

impl Viewer for BrowserViewer {
    fn launch(&mut self, url: &str) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }

        let mut command = Command::new(&self.executable);
        command.arg(url).stdout(Stdio::null()).stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Give the browser its own process group so the whole tree can
            // be signalled at once.
            command.process_group(0);
        }

        let child = command.spawn()?;
        println!(
            "{} {} (pid {})",
            "I launched the viewer:".green(),
            self.executable.white(),
            child.id()
        );
        self.child = Some(child);
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        // The browser may have been closed by hand already.
        if child.try_wait()?.is_some() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            signal_group(&child, libc::SIGTERM)?;
            let deadline = std::time::Instant::now() + TERMINATE_GRACE;
            while std::time::Instant::now() < deadline {
                if child.try_wait()?.is_some() {
                    return Ok(());
                }
                std::thread::sleep(Duration::from_millis(250));
            }
            println!(
                "{}",
                "The viewer ignored SIGTERM, killing its process group".yellow()
            );
            signal_group(&child, libc::SIGKILL)?;
        }
        #[cfg(not(unix))]
        child.kill()?;

        child.wait()?;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.child.is_some()
    }
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: libc::c_int) -> Result<()> {
    let rc = unsafe { libc::killpg(child.id() as libc::pid_t, signal) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminate_with_no_child_is_a_no_op() {
        let mut viewer = BrowserViewer::new();
        assert!(!viewer.is_running());
        viewer.terminate().unwrap();
        assert!(!viewer.is_running());
    }
}
