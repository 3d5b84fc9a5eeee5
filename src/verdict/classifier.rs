/// Outcome classification over phase reports
///
/// Only one phase can fail: the run phase starts only after a successful
/// compile. Within a phase the status decides the kind, with precedence
/// toolchain missing > timeout > cancelled > internal > non-zero exit.
use crate::config::types::{ExecutionOutcome, OutcomeKind, Phase};
use crate::exec::phase::{PhaseReport, PhaseStatus};
use std::time::Duration;

/// Pure mapping from phase reports to an outcome
pub struct VerdictClassifier;

impl VerdictClassifier {
    /// Classify the phases that ran. `compile` is `None` for interpreted
    /// languages; `run` is `None` when compilation did not succeed.
    pub fn classify(
        compile: Option<&PhaseReport>,
        run: Option<&PhaseReport>,
        missing_hint: &str,
    ) -> OutcomeKind {
        if let Some(compile) = compile {
            if let Some(kind) = Self::interrupted(compile, missing_hint) {
                return kind;
            }
            if !compile.status.succeeded() {
                return OutcomeKind::CompileError {
                    message: Self::compiler_diagnostics(compile),
                };
            }
        }

        let Some(run) = run else {
            return OutcomeKind::InternalError {
                message: "run phase did not execute".to_string(),
            };
        };

        if let Some(kind) = Self::interrupted(run, missing_hint) {
            return kind;
        }

        match run.status {
            PhaseStatus::Exited { code: Some(0), .. } => OutcomeKind::Success,
            PhaseStatus::Exited { code, signal } => OutcomeKind::RuntimeError {
                stderr: run.stderr.text(),
                exit_code: code,
                signal,
            },
            // interrupted() handled every other status
            _ => OutcomeKind::InternalError {
                message: format!("unclassified run status: {}", run.status.label()),
            },
        }
    }

    /// Build the full outcome, consuming the reports
    pub fn outcome(
        mut compile: Option<PhaseReport>,
        mut run: Option<PhaseReport>,
        missing_hint: &str,
        duration: Duration,
    ) -> ExecutionOutcome {
        let kind = Self::classify(compile.as_ref(), run.as_ref(), missing_hint);

        // Bytes move through unchanged; decoding is left to the caller.
        let (stdout, stdout_truncated) = match run.as_mut() {
            Some(run) => (std::mem::take(&mut run.stdout.data), run.stdout.truncated),
            None => (Vec::new(), false),
        };
        let (stderr, stderr_truncated) = match run.as_mut().or(compile.as_mut()) {
            Some(report) => (std::mem::take(&mut report.stderr.data), report.stderr.truncated),
            None => (Vec::new(), false),
        };

        ExecutionOutcome {
            stdout,
            stderr,
            kind,
            stdout_truncated,
            stderr_truncated,
            duration,
        }
    }

    /// Statuses that end a phase without a normal exit
    fn interrupted(report: &PhaseReport, missing_hint: &str) -> Option<OutcomeKind> {
        match &report.status {
            PhaseStatus::ToolMissing { tool } => Some(OutcomeKind::ToolchainMissing {
                tool: tool.clone(),
                hint: missing_hint.to_string(),
            }),
            PhaseStatus::TimedOut { limit } => Some(OutcomeKind::Timeout {
                phase: report.phase,
                limit_ms: limit.as_millis() as u64,
            }),
            PhaseStatus::Cancelled => Some(OutcomeKind::Cancelled {
                phase: report.phase,
            }),
            PhaseStatus::SpawnFailed { message } => Some(OutcomeKind::InternalError {
                message: format!("{} phase: {}", report.phase, message),
            }),
            PhaseStatus::Exited { .. } => None,
        }
    }

    /// Compiler output verbatim. Some compilers (tsc) report on stdout.
    fn compiler_diagnostics(report: &PhaseReport) -> String {
        if !report.stderr.is_empty() {
            return report.stderr.text();
        }
        if !report.stdout.is_empty() {
            return report.stdout.text();
        }
        match report.status {
            PhaseStatus::Exited {
                code: Some(code), ..
            } => format!("compiler exited with status {code}"),
            PhaseStatus::Exited {
                signal: Some(signal),
                ..
            } => format!("compiler killed by signal {signal}"),
            _ => format!("{} failed", Phase::Compile),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::output::CapturedStream;

    fn report(phase: Phase, status: PhaseStatus, stdout: &str, stderr: &str) -> PhaseReport {
        PhaseReport {
            phase,
            status,
            stdout: CapturedStream {
                data: stdout.as_bytes().to_vec(),
                truncated: false,
            },
            stderr: CapturedStream {
                data: stderr.as_bytes().to_vec(),
                truncated: false,
            },
            elapsed: Duration::from_millis(5),
        }
    }

    fn exited(code: i32) -> PhaseStatus {
        PhaseStatus::Exited {
            code: Some(code),
            signal: None,
        }
    }

    #[test]
    fn clean_run_is_success() {
        let run = report(Phase::Run, exited(0), "hi\n", "warn\n");
        let outcome = VerdictClassifier::outcome(None, Some(run), "", Duration::ZERO);
        assert_eq!(outcome.kind, OutcomeKind::Success);
        assert_eq!(outcome.stdout_text(), "hi\n");
        assert_eq!(outcome.stderr_text(), "warn\n");
    }

    #[test]
    fn compile_failure_keeps_diagnostics_and_empty_stdout() {
        let compile = report(Phase::Compile, exited(1), "", "main.c:1: error: expected ';'\n");
        let outcome = VerdictClassifier::outcome(Some(compile), None, "", Duration::ZERO);
        assert_eq!(
            outcome.kind,
            OutcomeKind::CompileError {
                message: "main.c:1: error: expected ';'\n".to_string()
            }
        );
        assert_eq!(outcome.stdout_text(), "");
        assert_eq!(outcome.stderr_text(), "main.c:1: error: expected ';'\n");
    }

    #[test]
    fn compile_diagnostics_fall_back_to_stdout() {
        let compile = report(Phase::Compile, exited(2), "main.ts(1,1): error TS1005\n", "");
        let kind = VerdictClassifier::classify(Some(&compile), None, "");
        assert_eq!(
            kind,
            OutcomeKind::CompileError {
                message: "main.ts(1,1): error TS1005\n".to_string()
            }
        );
    }

    #[test]
    fn non_zero_run_is_runtime_error_with_partial_stdout() {
        let compile = report(Phase::Compile, exited(0), "", "");
        let run = report(Phase::Run, exited(3), "partial\n", "boom\n");
        let outcome = VerdictClassifier::outcome(Some(compile), Some(run), "", Duration::ZERO);
        assert_eq!(
            outcome.kind,
            OutcomeKind::RuntimeError {
                stderr: "boom\n".to_string(),
                exit_code: Some(3),
                signal: None
            }
        );
        assert_eq!(outcome.stdout_text(), "partial\n");
    }

    #[test]
    fn signal_death_is_runtime_error() {
        let run = report(
            Phase::Run,
            PhaseStatus::Exited {
                code: None,
                signal: Some(11),
            },
            "",
            "",
        );
        match VerdictClassifier::classify(None, Some(&run), "") {
            OutcomeKind::RuntimeError { signal, exit_code, .. } => {
                assert_eq!(signal, Some(11));
                assert_eq!(exit_code, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn compile_timeout_is_not_a_runtime_error() {
        let compile = report(
            Phase::Compile,
            PhaseStatus::TimedOut {
                limit: Duration::from_secs(30),
            },
            "",
            "",
        );
        assert_eq!(
            VerdictClassifier::classify(Some(&compile), None, ""),
            OutcomeKind::Timeout {
                phase: Phase::Compile,
                limit_ms: 30_000
            }
        );
    }

    #[test]
    fn missing_toolchain_names_tool_and_hint() {
        let compile = report(
            Phase::Compile,
            PhaseStatus::ToolMissing {
                tool: "javac".to_string(),
            },
            "",
            "",
        );
        assert_eq!(
            VerdictClassifier::classify(Some(&compile), None, "Install a JDK."),
            OutcomeKind::ToolchainMissing {
                tool: "javac".to_string(),
                hint: "Install a JDK.".to_string()
            }
        );
    }

    #[test]
    fn run_timeout_and_cancel_carry_phase() {
        let timed_out = report(
            Phase::Run,
            PhaseStatus::TimedOut {
                limit: Duration::from_secs(2),
            },
            "tick\n",
            "",
        );
        let outcome = VerdictClassifier::outcome(None, Some(timed_out), "", Duration::ZERO);
        assert_eq!(
            outcome.kind,
            OutcomeKind::Timeout {
                phase: Phase::Run,
                limit_ms: 2_000
            }
        );
        assert_eq!(outcome.stdout_text(), "tick\n");

        let cancelled = report(Phase::Run, PhaseStatus::Cancelled, "", "");
        assert_eq!(
            VerdictClassifier::classify(None, Some(&cancelled), ""),
            OutcomeKind::Cancelled { phase: Phase::Run }
        );
    }

    #[test]
    fn spawn_failure_is_internal() {
        let run = report(
            Phase::Run,
            PhaseStatus::SpawnFailed {
                message: "permission denied".to_string(),
            },
            "",
            "",
        );
        assert!(matches!(
            VerdictClassifier::classify(None, Some(&run), ""),
            OutcomeKind::InternalError { .. }
        ));
    }

    #[test]
    fn output_bytes_are_not_reencoded() {
        let mut run = report(Phase::Run, exited(0), "", "");
        run.stdout.data = vec![0xff, 0xfe, b'o', b'k'];
        run.stderr.data = vec![0xc3];
        let outcome = VerdictClassifier::outcome(None, Some(run), "", Duration::ZERO);
        assert_eq!(outcome.stdout, vec![0xff, 0xfe, b'o', b'k']);
        assert_eq!(outcome.stderr, vec![0xc3]);
        assert_eq!(outcome.stdout_text(), "\u{fffd}\u{fffd}ok");
    }

    #[test]
    fn truncation_flags_follow_the_streams() {
        let mut run = report(Phase::Run, exited(0), "x", "y");
        run.stdout.truncated = true;
        let outcome = VerdictClassifier::outcome(None, Some(run), "", Duration::ZERO);
        assert!(outcome.stdout_truncated);
        assert!(!outcome.stderr_truncated);
    }
}
