//! Process group termination
//!
//! Children are spawned as leaders of their own process group, so one
//! signal reaches everything they forked that did not leave the group.
//!
//! The group ID is the leader's PID. Once the leader is reaped that PID can
//! be handed to an unrelated process, so the group must be signalled while
//! the leader is still running or an unreaped zombie.

#[cfg(target_os = "linux")]
use std::io;

use tracing::{debug, warn};

/// Kills a child's process group on request or when dropped
///
/// The group is signalled at most once; later calls are no-ops so a
/// recycled group ID is never targeted.
#[derive(Debug)]
pub(crate) struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    /// Track the group led by the child with the given PID
    pub(crate) fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    /// Send SIGKILL to every process in the group
    #[cfg(unix)]
    pub(crate) fn kill(&mut self) {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Some(pgid) = self.pgid.take() else {
            return;
        };
        let Ok(raw) = i32::try_from(pgid) else {
            return;
        };

        match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => debug!(pgid, "killed process group"),
            // Every member already exited
            Err(Errno::ESRCH) => {}
            Err(e) => warn!(pgid, error = %e, "failed to kill process group"),
        }
    }

    #[cfg(not(unix))]
    pub(crate) fn kill(&mut self) {
        self.pgid = None;
    }

    /// Wait for the group leader to exit without reaping it
    ///
    /// The leader stays a zombie, so its PID and the group ID remain reserved
    /// until the caller reaps it after [`kill`](Self::kill).
    #[cfg(target_os = "linux")]
    pub(crate) async fn wait_exited(&self) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::wait::{Id, WaitPidFlag, waitid};
        use nix::unistd::Pid;

        let Some(raw) = self.pgid.and_then(|pgid| i32::try_from(pgid).ok()) else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no process group"));
        };

        tokio::task::spawn_blocking(move || {
            loop {
                match waitid(
                    Id::Pid(Pid::from_raw(raw)),
                    WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT,
                ) {
                    Ok(_) => return Ok(()),
                    Err(Errno::EINTR) => continue,
                    Err(e) => return Err(io::Error::from(e)),
                }
            }
        })
        .await
        .map_err(io::Error::other)?
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}
