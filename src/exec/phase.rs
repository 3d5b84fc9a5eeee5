/// One child process phase: spawn, feed, watch, terminate, collect
///
/// The child becomes the leader of a fresh process group. Its descendants are
/// tracked while it runs. On timeout or cancellation the group and tracked
/// descendants are signalled; after any exit they are swept with SIGKILL so
/// no descendant outlives the phase.
use crate::config::types::Phase;
use crate::exec::feeder::InputFeed;
use crate::judge::profile::PreparedCommand;
use crate::kernel::process_tree::ProcessTree;
use crate::kernel::signal::{kill_and_reap, leader_exited, terminate_process_group};
use crate::observability::audit::events;
use crate::utils::output::{CapturedStream, ChunkSink, OutputLimits, Stream, StreamCollector};
use crate::utils::toolchain::find_executable_in;
use crossbeam_channel::bounded;
use std::ffi::OsStr;
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WAIT_POLL: Duration = Duration::from_millis(10);
/// Descendant scans happen every few polls
const SCAN_EVERY: u32 = 2;

/// Shared flag that asks a running execution to stop
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Settings common to every phase of one execution
#[derive(Debug, Clone)]
pub struct PhaseSettings {
    /// Complete child environment before per-language additions
    pub env: Vec<(String, String)>,
    pub limits: OutputLimits,
    pub kill_grace: Duration,
    pub drain: Duration,
}

pub struct PhaseSpec<'a> {
    pub execution_id: &'a str,
    pub phase: Phase,
    pub command: &'a PreparedCommand,
    pub workdir: &'a Path,
    pub timeout: Duration,
    pub settings: &'a PhaseSettings,
    pub cancel: &'a CancelToken,
    /// Live output consumer, interactive runs only
    pub sink: Option<ChunkSink>,
}

/// How a phase ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseStatus {
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
    TimedOut {
        limit: Duration,
    },
    Cancelled,
    ToolMissing {
        tool: String,
    },
    SpawnFailed {
        message: String,
    },
}

impl PhaseStatus {
    pub fn from_exit(status: ExitStatus) -> Self {
        PhaseStatus::Exited {
            code: status.code(),
            signal: status.signal(),
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, PhaseStatus::Exited { code: Some(0), .. })
    }

    pub fn label(&self) -> String {
        match self {
            PhaseStatus::Exited { code: Some(code), .. } => format!("exited {code}"),
            PhaseStatus::Exited { signal: Some(sig), .. } => format!("killed by signal {sig}"),
            PhaseStatus::Exited { .. } => "exited".to_string(),
            PhaseStatus::TimedOut { limit } => format!("timed out after {limit:?}"),
            PhaseStatus::Cancelled => "cancelled".to_string(),
            PhaseStatus::ToolMissing { tool } => format!("toolchain missing: {tool}"),
            PhaseStatus::SpawnFailed { message } => format!("spawn failed: {message}"),
        }
    }
}

/// Raw result of one phase, before classification
#[derive(Debug, Clone)]
pub struct PhaseReport {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub stdout: CapturedStream,
    pub stderr: CapturedStream,
    pub elapsed: Duration,
}

impl PhaseReport {
    fn without_process(phase: Phase, status: PhaseStatus) -> Self {
        Self {
            phase,
            status,
            stdout: CapturedStream::default(),
            stderr: CapturedStream::default(),
            elapsed: Duration::ZERO,
        }
    }
}

/// Run one phase to completion. Never fails: every fault becomes a status.
pub fn run_phase(spec: PhaseSpec<'_>, feed: InputFeed) -> PhaseReport {
    let command = spec.command;
    if spec.cancel.is_cancelled() {
        return PhaseReport::without_process(spec.phase, PhaseStatus::Cancelled);
    }

    let search_path = spec
        .settings
        .env
        .iter()
        .find(|(key, _)| key == "PATH")
        .map(|(_, value)| OsStr::new(value.as_str()));

    if command.toolchain && find_executable_in(&command.program, search_path).is_none() {
        log::info!("{} phase: `{}` not found on PATH", spec.phase, command.program);
        return PhaseReport::without_process(
            spec.phase,
            PhaseStatus::ToolMissing {
                tool: command.program.clone(),
            },
        );
    }

    log::debug!("{} phase: spawning {}", spec.phase, command.display());
    let started = Instant::now();

    let child = match Command::new(&command.program)
        .args(&command.args)
        .current_dir(spec.workdir)
        .env_clear()
        .envs(spec.settings.env.iter().map(|(k, v)| (k, v)))
        .envs(command.env.iter().map(|(k, v)| (k, v)))
        .stdin(feed.stdio())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound && command.toolchain => {
            return PhaseReport::without_process(
                spec.phase,
                PhaseStatus::ToolMissing {
                    tool: command.program.clone(),
                },
            );
        }
        Err(e) => {
            return PhaseReport::without_process(
                spec.phase,
                PhaseStatus::SpawnFailed {
                    message: format!("failed to start `{}`: {}", command.program, e),
                },
            );
        }
    };

    supervise(child, &spec, feed, started)
}

/// Everything after a successful spawn: readers, feeder, watch, sweep.
fn supervise(
    mut child: Child,
    spec: &PhaseSpec<'_>,
    feed: InputFeed,
    started: Instant,
) -> PhaseReport {
    let mut tree = ProcessTree::new(child.id());

    let collectors = match start_collectors(&mut child, spec) {
        Ok(collectors) => collectors,
        Err(e) => {
            kill_and_reap(&mut child, &mut tree);
            return PhaseReport::without_process(
                spec.phase,
                PhaseStatus::SpawnFailed {
                    message: format!("failed to start output readers: {e}"),
                },
            );
        }
    };

    // Dropping the sender tells the feeder the phase is over.
    let (phase_over, phase_done) = bounded::<()>(0);
    let stopped = match feed.start(child.stdin.take(), phase_done) {
        Ok(()) => watch(&child, &mut tree, spec, started),
        Err(e) => {
            log::warn!("{} phase: stdin feeder did not start: {}", spec.phase, e);
            Some(PhaseStatus::SpawnFailed {
                message: format!("failed to deliver stdin: {e}"),
            })
        }
    };

    let (sweep, exit) = kill_and_reap(&mut child, &mut tree);
    drop(phase_over);
    if sweep.descendants_killed > 0 {
        log::info!(
            "{} phase: killed {} descendants outside the process group",
            spec.phase,
            sweep.descendants_killed
        );
    }

    let status = match (stopped, exit) {
        (Some(status), _) => status,
        (None, Some(exit)) => PhaseStatus::from_exit(exit),
        (None, None) => PhaseStatus::SpawnFailed {
            message: "exit status unavailable".to_string(),
        },
    };

    let drain_deadline = Instant::now() + spec.settings.drain;
    let (stdout, stderr) = collectors;
    let report = PhaseReport {
        phase: spec.phase,
        stdout: stdout.finish(drain_deadline),
        stderr: stderr.finish(drain_deadline),
        status,
        elapsed: started.elapsed(),
    };
    log::debug!(
        "{} phase finished: {} in {:?}",
        report.phase,
        report.status.label(),
        report.elapsed
    );
    events::phase_finished(
        spec.execution_id,
        report.phase,
        &report.status.label(),
        report.elapsed,
    );
    report
}

fn start_collectors(
    child: &mut Child,
    spec: &PhaseSpec<'_>,
) -> io::Result<(StreamCollector, StreamCollector)> {
    let missing = || io::Error::new(io::ErrorKind::Other, "child pipe missing");
    let stdout = child.stdout.take().ok_or_else(missing)?;
    let stderr = child.stderr.take().ok_or_else(missing)?;
    let limits = &spec.settings.limits;

    let stdout = StreamCollector::spawn(
        stdout,
        Stream::Stdout,
        limits.limit_for(Stream::Stdout),
        spec.sink.clone(),
    )?;
    let stderr = StreamCollector::spawn(
        stderr,
        Stream::Stderr,
        limits.limit_for(Stream::Stderr),
        spec.sink.clone(),
    )?;
    Ok((stdout, stderr))
}

/// Poll until the leader exits (`None`) or the phase has to be stopped
/// (`Some(status)`). The leader is never reaped here.
fn watch(
    child: &Child,
    tree: &mut ProcessTree,
    spec: &PhaseSpec<'_>,
    started: Instant,
) -> Option<PhaseStatus> {
    let mut polls: u32 = 0;
    loop {
        match leader_exited(child) {
            Ok(true) => return None,
            Ok(false) => {}
            Err(e) => {
                return Some(PhaseStatus::SpawnFailed {
                    message: format!("wait failed: {e}"),
                });
            }
        }

        if polls % SCAN_EVERY == 0 {
            tree.scan();
        }
        polls = polls.wrapping_add(1);

        let stop = if spec.cancel.is_cancelled() {
            Some(PhaseStatus::Cancelled)
        } else if started.elapsed() >= spec.timeout {
            Some(PhaseStatus::TimedOut {
                limit: spec.timeout,
            })
        } else {
            None
        };

        if let Some(status) = stop {
            let report = terminate_process_group(child, tree, spec.settings.kill_grace);
            log::warn!(
                "{} phase {}: termination requested (term_sent={}, descendants={}, waited={:?})",
                spec.phase,
                status.label(),
                report.term_sent,
                report.descendants_signalled,
                report.waited
            );
            for note in &report.notes {
                log::debug!("kill note: {}", note);
            }
            events::forced_kill(spec.execution_id, spec.phase, &status.label());
            return Some(status);
        }

        std::thread::sleep(WAIT_POLL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PhaseSettings {
        PhaseSettings {
            env: vec![(
                "PATH".to_string(),
                std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string()),
            )],
            limits: OutputLimits::default(),
            kill_grace: Duration::from_millis(100),
            drain: Duration::from_secs(1),
        }
    }

    fn sh(script: &str) -> PreparedCommand {
        PreparedCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: vec![("GREETING".to_string(), "hi".to_string())],
            toolchain: true,
        }
    }

    fn run(command: &PreparedCommand, timeout: Duration, feed: InputFeed) -> PhaseReport {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings();
        let cancel = CancelToken::new();
        run_phase(
            PhaseSpec {
                execution_id: "test",
                phase: Phase::Run,
                command,
                workdir: dir.path(),
                timeout,
                settings: &settings,
                cancel: &cancel,
                sink: None,
            },
            feed,
        )
    }

    #[test]
    fn captures_both_streams_and_exit_code() {
        let report = run(
            &sh("echo out; echo err >&2; exit 4"),
            Duration::from_secs(5),
            InputFeed::Closed,
        );
        assert_eq!(
            report.status,
            PhaseStatus::Exited {
                code: Some(4),
                signal: None
            }
        );
        assert_eq!(report.stdout.text(), "out\n");
        assert_eq!(report.stderr.text(), "err\n");
    }

    #[test]
    fn environment_is_cleared_then_composed() {
        std::env::set_var("CODERUN_PHASE_LEAK", "1");
        let report = run(
            &sh("echo \"${CODERUN_PHASE_LEAK:-unset} $GREETING\""),
            Duration::from_secs(5),
            InputFeed::Closed,
        );
        assert_eq!(report.stdout.text(), "unset hi\n");
    }

    #[test]
    fn batch_stdin_reaches_program() {
        let report = run(
            &sh("read a; read b; echo \"$b $a\""),
            Duration::from_secs(5),
            InputFeed::Batch(b"x\ny\n".to_vec()),
        );
        assert_eq!(report.stdout.text(), "y x\n");
    }

    #[test]
    fn timeout_terminates_the_group() {
        let started = Instant::now();
        let report = run(&sh("sleep 30 & wait"), Duration::from_millis(300), InputFeed::Closed);
        assert_eq!(
            report.status,
            PhaseStatus::TimedOut {
                limit: Duration::from_millis(300)
            }
        );
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn missing_toolchain_is_reported_before_spawn() {
        let mut command = sh("true");
        command.program = "coderun-definitely-missing".to_string();
        let report = run(&command, Duration::from_secs(1), InputFeed::Closed);
        assert_eq!(
            report.status,
            PhaseStatus::ToolMissing {
                tool: "coderun-definitely-missing".to_string()
            }
        );
    }

    #[test]
    fn missing_artifact_is_a_spawn_failure() {
        let command = PreparedCommand {
            program: "/nonexistent/coderun/main".to_string(),
            args: vec![],
            env: vec![],
            toolchain: false,
        };
        let report = run(&command, Duration::from_secs(1), InputFeed::Closed);
        assert!(matches!(report.status, PhaseStatus::SpawnFailed { .. }));
    }

    #[test]
    fn cancellation_stops_the_phase() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings();
        let cancel = CancelToken::new();
        let command = sh("sleep 30");

        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });

        let report = run_phase(
            PhaseSpec {
                execution_id: "test",
                phase: Phase::Run,
                command: &command,
                workdir: dir.path(),
                timeout: Duration::from_secs(30),
                settings: &settings,
                cancel: &cancel,
                sink: None,
            },
            InputFeed::Closed,
        );
        canceller.join().unwrap();
        assert_eq!(report.status, PhaseStatus::Cancelled);
    }

    /// Pids whose command line is exactly `argv`
    fn processes_running(argv: &[&str]) -> Vec<u32> {
        let wanted = argv.join("\0") + "\0";
        std::fs::read_dir("/proc")
            .unwrap()
            .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse::<u32>().ok())
            .filter(|pid| {
                std::fs::read(format!("/proc/{pid}/cmdline"))
                    .map(|cmdline| cmdline == wanted.as_bytes())
                    .unwrap_or(false)
            })
            .filter(|pid| {
                std::fs::read_to_string(format!("/proc/{pid}/stat"))
                    .map(|stat| !stat.rsplit_once(')').unwrap().1.trim_start().starts_with('Z'))
                    .unwrap_or(false)
            })
            .collect()
    }

    fn gone_soon(argv: &[&str]) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !processes_running(argv).is_empty() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        true
    }

    #[test]
    fn timeout_reaches_processes_that_left_the_group() {
        if crate::utils::toolchain::find_executable("setsid").is_none() {
            return;
        }
        let started = Instant::now();
        let report = run(
            &sh("setsid sleep 876543 &\nwhile :; do :; done"),
            Duration::from_millis(500),
            InputFeed::Closed,
        );
        assert!(matches!(report.status, PhaseStatus::TimedOut { .. }));
        // grace 100 ms, one drain second shared by both streams at most
        assert!(started.elapsed() < Duration::from_millis(1800));
        assert!(gone_soon(&["sleep", "876543"]));
    }

    #[test]
    fn clean_exit_still_sweeps_escaped_descendants() {
        if crate::utils::toolchain::find_executable("setsid").is_none() {
            return;
        }
        let report = run(
            &sh("setsid sleep 876544 & sleep 0.3; echo done"),
            Duration::from_secs(5),
            InputFeed::Closed,
        );
        assert!(report.status.succeeded());
        assert_eq!(report.stdout.text(), "done\n");
        assert!(gone_soon(&["sleep", "876544"]));
    }

    #[test]
    fn undeliverable_stdin_fails_the_phase() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings();
        let cancel = CancelToken::new();
        let command = sh("read x; echo \"got $x\"");

        let mut child = Command::new("sh")
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .unwrap();
        let pid = child.id();
        drop(child.stdin.take());

        let spec = PhaseSpec {
            execution_id: "test",
            phase: Phase::Run,
            command: &command,
            workdir: dir.path(),
            timeout: Duration::from_secs(5),
            settings: &settings,
            cancel: &cancel,
            sink: None,
        };
        let report = supervise(child, &spec, InputFeed::Batch(b"5\n".to_vec()), Instant::now());
        match report.status {
            PhaseStatus::SpawnFailed { message } => assert!(message.contains("stdin")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());
    }
}
