/// Process-group termination and host shutdown signals
///
/// Every child phase runs as the leader of its own process group, so the
/// tree it forks can be signalled with one `killpg`. Descendants that left
/// the group are reached through a [`ProcessTree`]. The leader is observed
/// with `WNOWAIT` and only reaped after the last signal went out, which keeps
/// its pid and group id from being recycled in between.
use crate::kernel::process_tree::ProcessTree;
use nix::errno::Errno;
use nix::sys::signal::{self, killpg, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitid, Id, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::os::raw::c_int;
use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::{Duration, Instant};

const REAP_POLL: Duration = Duration::from_millis(5);

/// What happened while asking a phase to stop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KillReport {
    pub term_sent: bool,
    /// Descendants outside the group that received SIGTERM
    pub descendants_signalled: usize,
    /// Group leader exited before the grace period ran out
    pub exited_during_grace: bool,
    pub waited: Duration,
    pub notes: Vec<String>,
}

/// What the final sweep of a phase had to kill
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Some group member was still alive
    pub group_killed: bool,
    /// Tracked descendants outside the group that were killed
    pub descendants_killed: usize,
}

/// True once the leader has exited. The leader is left unreaped.
pub fn leader_exited(child: &Child) -> nix::Result<bool> {
    let pid = Pid::from_raw(child.id() as i32);
    let flags = WaitPidFlag::WEXITED | WaitPidFlag::WNOHANG | WaitPidFlag::WNOWAIT;
    match waitid(Id::Pid(pid), flags) {
        Ok(WaitStatus::StillAlive) | Err(Errno::EINTR) => Ok(false),
        Ok(_) => Ok(true),
        Err(e) => Err(e),
    }
}

/// SIGTERM the group and every tracked descendant, then give the leader
/// `grace` to exit. Nothing is killed or reaped here; [`kill_and_reap`]
/// always follows.
pub fn terminate_process_group(
    child: &Child,
    tree: &mut ProcessTree,
    grace: Duration,
) -> KillReport {
    let mut report = KillReport::default();
    let start = Instant::now();
    let pgid = Pid::from_raw(child.id() as i32);

    tree.scan();
    match killpg(pgid, Signal::SIGTERM) {
        Ok(()) => report.term_sent = true,
        Err(Errno::ESRCH) => report.notes.push("group already gone at SIGTERM".to_string()),
        Err(e) => report.notes.push(format!("group SIGTERM failed: {e}")),
    }
    report.descendants_signalled = tree.signal_descendants(Signal::SIGTERM);

    let deadline = start + grace;
    while Instant::now() < deadline {
        match leader_exited(child) {
            Ok(true) => {
                report.exited_during_grace = true;
                break;
            }
            Ok(false) => std::thread::sleep(REAP_POLL),
            Err(e) => {
                report.notes.push(format!("waitid during grace failed: {e}"));
                break;
            }
        }
    }

    report.waited = start.elapsed();
    report
}

/// SIGKILL the group and every tracked descendant, then reap the leader.
///
/// Runs after every phase, however it ended. The leader must not have been
/// reaped yet: until `wait` below, its zombie holds the group id.
pub fn kill_and_reap(
    child: &mut Child,
    tree: &mut ProcessTree,
) -> (SweepReport, Option<ExitStatus>) {
    let mut report = SweepReport::default();
    let pgid = Pid::from_raw(child.id() as i32);

    tree.scan();
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) => report.group_killed = true,
        Err(Errno::ESRCH) => {}
        Err(e) => log::warn!("Failed to kill process group {}: {}", pgid, e),
    }
    report.descendants_killed = tree.kill_descendants();

    if !leader_exited(child).unwrap_or(false) {
        // The leader may have moved to another group.
        if let Err(e) = child.kill() {
            log::debug!("Leader {} kill: {}", pgid, e);
        }
    }

    let status = match child.wait() {
        Ok(status) => Some(status),
        Err(e) => {
            log::warn!("Failed to reap phase leader {}: {}", pgid, e);
            None
        }
    };

    if report.group_killed || report.descendants_killed > 0 {
        log::debug!(
            "Swept group {} (descendants killed: {})",
            pgid,
            report.descendants_killed
        );
    }
    (report, status)
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);
static SIGNAL_RECEIVED: AtomicI32 = AtomicI32::new(0);

/// SIGINT/SIGTERM latch for the CLI
pub struct ShutdownSignal;

impl ShutdownSignal {
    /// Install handlers. Call before spawning worker threads.
    pub fn install() -> Result<Self, String> {
        let action = SigAction::new(
            SigHandler::Handler(Self::handle),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );

        // SAFETY: the handler only touches atomics, which is async-signal-safe.
        unsafe {
            signal::sigaction(Signal::SIGINT, &action)
                .map_err(|e| format!("Failed to install SIGINT handler: {}", e))?;
            signal::sigaction(Signal::SIGTERM, &action)
                .map_err(|e| format!("Failed to install SIGTERM handler: {}", e))?;
        }

        log::debug!("Signal handlers installed (SIGINT, SIGTERM)");
        Ok(Self)
    }

    extern "C" fn handle(signal: c_int) {
        SIGNAL_RECEIVED.store(signal, Ordering::SeqCst);
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
    }

    pub fn requested(&self) -> bool {
        SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
    }

    /// Signal number received, 0 if none
    pub fn signal(&self) -> i32 {
        SIGNAL_RECEIVED.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::os::unix::process::{CommandExt, ExitStatusExt};
    use std::process::{Command, Stdio};

    fn is_alive(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    fn wait_dead(pid: u32) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while is_alive(pid) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        !is_alive(pid)
    }

    fn spawn_group(script: &str) -> Child {
        Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdout(Stdio::piped())
            .process_group(0)
            .spawn()
            .unwrap()
    }

    fn first_line(child: &mut Child) -> u32 {
        let mut line = String::new();
        BufReader::new(child.stdout.take().unwrap())
            .read_line(&mut line)
            .unwrap();
        line.trim().parse().unwrap()
    }

    #[test]
    fn cooperative_group_exits_during_grace() {
        let mut child = spawn_group("exec sleep 30");
        let mut tree = ProcessTree::new(child.id());
        let report = terminate_process_group(&child, &mut tree, Duration::from_secs(2));

        assert!(report.term_sent);
        assert!(report.exited_during_grace);
        let (_, status) = kill_and_reap(&mut child, &mut tree);
        assert_eq!(status.unwrap().signal(), Some(Signal::SIGTERM as i32));
    }

    #[test]
    fn stubborn_group_is_killed_with_descendants() {
        let mut child = spawn_group("trap '' TERM; sleep 30 & echo $!; wait; while :; do :; done");
        let grandchild = first_line(&mut child);
        assert!(is_alive(grandchild));

        let mut tree = ProcessTree::new(child.id());
        let report = terminate_process_group(&child, &mut tree, Duration::from_millis(100));
        assert!(report.term_sent);

        let (sweep, status) = kill_and_reap(&mut child, &mut tree);
        assert!(sweep.group_killed);
        assert!(status.is_some());
        assert!(wait_dead(grandchild));
    }

    #[test]
    fn exited_leader_stays_unreaped_until_the_sweep() {
        let mut child = spawn_group("sleep 30 & echo $!");
        let orphan = first_line(&mut child);
        let mut tree = ProcessTree::new(child.id());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !leader_exited(&child).unwrap() {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(5));
        }
        // Zombie still present: the group id cannot be handed out again.
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", child.id())).unwrap();
        assert!(stat.rsplit_once(')').unwrap().1.trim_start().starts_with('Z'));
        assert!(is_alive(orphan));

        let (sweep, status) = kill_and_reap(&mut child, &mut tree);
        assert!(sweep.group_killed);
        assert_eq!(status.unwrap().code(), Some(0));
        assert!(wait_dead(orphan));
    }

    #[test]
    fn sweep_reaches_descendants_outside_the_group() {
        if crate::utils::toolchain::find_executable("setsid").is_none() {
            return;
        }
        let mut child = spawn_group("setsid sleep 30 & echo $!; while :; do :; done");
        let escapee = first_line(&mut child);
        let mut tree = ProcessTree::new(child.id());
        tree.scan();

        let report = terminate_process_group(&child, &mut tree, Duration::from_millis(50));
        assert!(report.descendants_signalled >= 1);
        kill_and_reap(&mut child, &mut tree);
        assert!(wait_dead(escapee));
    }
}
