/// Execution engine: resolve, materialize, compile, run, classify, release
use crate::config::loader::EngineConfig;
use crate::config::types::{CoderunError, ExecutionOutcome, Phase, Result};
use crate::exec::feeder::InputFeed;
use crate::exec::phase::{run_phase, CancelToken, PhaseSettings, PhaseSpec};
use crate::exec::session::{InteractiveSession, SessionEvent};
use crate::judge::profile::LanguageProfile;
use crate::judge::registry::LanguageRegistry;
use crate::observability::audit::events;
use crate::safety::permits::ExecutionPermits;
use crate::safety::workspace::WorkspaceManager;
use crate::utils::output::{ChunkSink, OutputChunk};
use crate::verdict::VerdictClassifier;
use crossbeam_channel::unbounded;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// One submission: source, language and optional stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub language: String,
    pub code: String,
    /// Batch input. For interactive sessions these lines are queued before
    /// any caller input.
    pub stdin: Option<String>,
    pub run_timeout: Option<Duration>,
    pub compile_timeout: Option<Duration>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            stdin: None,
            run_timeout: None,
            compile_timeout: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn with_compile_timeout(mut self, timeout: Duration) -> Self {
        self.compile_timeout = Some(timeout);
        self
    }
}

/// Thread-safe handle to the engine; clones share limits and workspaces
#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    registry: LanguageRegistry,
    workspaces: WorkspaceManager,
    permits: ExecutionPermits,
    /// Host variables passed through to every child, captured at startup
    host_env: Vec<(String, String)>,
}

/// Everything one execution needs after admission
struct ExecutionPlan {
    id: String,
    profile: LanguageProfile,
    code: String,
    compile_timeout: Duration,
    run_timeout: Duration,
}

impl ExecutionEngine {
    /// Engine with the built-in languages and configured overrides
    pub fn new(config: EngineConfig) -> Result<Self> {
        let registry = LanguageRegistry::builtin().with_overrides(&config)?;
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: EngineConfig, registry: LanguageRegistry) -> Result<Self> {
        config.validate()?;
        let workspaces = WorkspaceManager::new(config.workspace_root.clone())?;

        match workspaces.sweep_stale(config.stale_workspace_age()) {
            Ok(0) => {}
            Ok(n) => log::info!(
                "Removed {} stale workspaces from {}",
                n,
                workspaces.root().display()
            ),
            Err(e) => log::warn!("Stale workspace sweep failed: {}", e),
        }

        let host_env = config
            .preserve_env
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (key.clone(), value)))
            .collect();

        let permits = ExecutionPermits::new(config.max_concurrent_executions);
        log::debug!(
            "Engine ready: {} languages, {} execution slots, workspaces under {}",
            registry.languages().len(),
            permits.capacity(),
            workspaces.root().display()
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                registry,
                workspaces,
                permits,
                host_env,
            }),
        })
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Run a program to completion with the whole stdin supplied up front
    pub fn run_batch(&self, language: &str, code: &str, stdin: &str) -> Result<ExecutionOutcome> {
        self.execute(ExecutionRequest::new(language, code).with_stdin(stdin))
    }

    /// Batch execution. Only rejected requests return `Err`; every other
    /// result, failures included, is an outcome.
    pub fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome> {
        let timeout = request.run_timeout;
        let plan = self.inner.admit(&request, |profile| timeout.unwrap_or(profile.run_timeout))?;
        let _permit = self.inner.permits.acquire()?;

        events::execution_start(&plan.id, plan.profile.name, &plan.code, false);
        let feed = InputFeed::Batch(request.stdin.unwrap_or_default().into_bytes());
        Ok(self.inner.run(&plan, feed, None, &CancelToken::new()))
    }

    /// Start a program whose stdin is supplied line by line while it runs
    pub fn start_interactive(&self, language: &str, code: &str) -> Result<InteractiveSession> {
        self.start_session(ExecutionRequest::new(language, code))
    }

    pub fn start_session(&self, request: ExecutionRequest) -> Result<InteractiveSession> {
        let default_timeout = self.inner.config.interactive_run_timeout();
        let timeout = request.run_timeout;
        let plan = self
            .inner
            .admit(&request, |_| timeout.unwrap_or(default_timeout))?;
        let permit = self.inner.permits.acquire()?;

        let (input_tx, input_rx) = unbounded::<String>();
        if let Some(stdin) = &request.stdin {
            for line in stdin.lines() {
                // Receiver is alive in this scope.
                let _ = input_tx.send(line.to_string());
            }
        }

        let (events_tx, events_rx) = unbounded::<SessionEvent>();
        let sink: ChunkSink = {
            let events_tx = events_tx.clone();
            Arc::new(move |chunk: OutputChunk| events_tx.send(SessionEvent::Output(chunk)).is_ok())
        };

        let cancel = CancelToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let id = plan.id.clone();
        let language = plan.profile.name;

        events::execution_start(&plan.id, language, &plan.code, true);
        let worker = {
            let inner = Arc::clone(&self.inner);
            let cancel = cancel.clone();
            let finished = Arc::clone(&finished);
            thread::Builder::new()
                .name(format!("coderun-session-{}", &id[..8.min(id.len())]))
                .spawn(move || {
                    let _permit = permit;
                    let outcome =
                        inner.run(&plan, InputFeed::Interactive(input_rx), Some(sink), &cancel);
                    finished.store(true, Ordering::SeqCst);
                    let _ = events_tx.send(SessionEvent::Finished(outcome.clone()));
                    outcome
                })
                .map_err(|e| CoderunError::Process(format!("failed to start session worker: {e}")))?
        };

        Ok(InteractiveSession::new(
            id, language, input_tx, events_rx, cancel, finished, worker,
        ))
    }
}

impl EngineInner {
    /// Resolve the language and check limits. Nothing touches the filesystem
    /// until this succeeds.
    fn admit(
        &self,
        request: &ExecutionRequest,
        run_timeout: impl FnOnce(&LanguageProfile) -> Duration,
    ) -> Result<ExecutionPlan> {
        let profile = self.registry.resolve(&request.language)?;

        let size = request.code.len();
        if size > self.config.max_source_bytes {
            return Err(CoderunError::SourceTooLarge {
                size,
                limit: self.config.max_source_bytes,
            });
        }

        Ok(ExecutionPlan {
            id: Uuid::new_v4().to_string(),
            compile_timeout: request.compile_timeout.unwrap_or(profile.compile_timeout),
            run_timeout: run_timeout(profile),
            profile: profile.clone(),
            code: request.code.clone(),
        })
    }

    fn child_env(&self, workdir: &Path) -> Vec<(String, String)> {
        let dir = workdir.to_string_lossy().into_owned();
        let mut env: Vec<(String, String)> = self
            .host_env
            .iter()
            .filter(|(key, _)| key != "HOME" && key != "TMPDIR")
            .cloned()
            .collect();
        env.push(("HOME".to_string(), dir.clone()));
        env.push(("TMPDIR".to_string(), dir));
        env
    }

    /// Workspace lifecycle around the phases. Always returns an outcome and
    /// always releases the workspace.
    fn run(
        &self,
        plan: &ExecutionPlan,
        feed: InputFeed,
        sink: Option<ChunkSink>,
        cancel: &CancelToken,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let profile = &plan.profile;
        log::info!("Execution {} started ({})", plan.id, profile.name);

        let mut workspace = match self.workspaces.acquire() {
            Ok(workspace) => workspace,
            Err(e) => return self.finish(plan, ExecutionOutcome::internal(e.to_string()), started),
        };

        log::debug!("Execution {} uses workspace {}", plan.id, workspace.id());
        let filename = profile.source_filename(&plan.code);
        if let Err(e) = workspace.materialize(&filename, plan.code.as_bytes()) {
            let outcome = ExecutionOutcome::internal(e.to_string());
            if let Err(release) = workspace.release() {
                log::warn!("Execution {}: {}", plan.id, release);
                events::cleanup_failure(&plan.id, &release.to_string());
            }
            return self.finish(plan, outcome, started);
        }

        let settings = PhaseSettings {
            env: self.child_env(workspace.dir()),
            limits: self.config.output.clone(),
            kill_grace: self.config.kill_grace(),
            drain: self.config.output_drain(),
        };

        let compile = profile.compile_command(&workspace).map(|command| {
            run_phase(
                PhaseSpec {
                    execution_id: &plan.id,
                    phase: Phase::Compile,
                    command: &command,
                    workdir: workspace.dir(),
                    timeout: plan.compile_timeout,
                    settings: &settings,
                    cancel,
                    sink: None,
                },
                InputFeed::Closed,
            )
        });

        let run = match &compile {
            Some(report) if !report.status.succeeded() => None,
            _ => {
                let command = profile.run_command(&workspace);
                Some(run_phase(
                    PhaseSpec {
                        execution_id: &plan.id,
                        phase: Phase::Run,
                        command: &command,
                        workdir: workspace.dir(),
                        timeout: plan.run_timeout,
                        settings: &settings,
                        cancel,
                        sink,
                    },
                    feed,
                ))
            }
        };

        let outcome =
            VerdictClassifier::outcome(compile, run, profile.missing_hint, started.elapsed());

        // Cleanup failure is logged, the classification stands.
        if let Err(e) = workspace.release() {
            log::warn!("Execution {}: {}", plan.id, e);
            events::cleanup_failure(&plan.id, &e.to_string());
        }

        self.finish(plan, outcome, started)
    }

    fn finish(
        &self,
        plan: &ExecutionPlan,
        mut outcome: ExecutionOutcome,
        started: Instant,
    ) -> ExecutionOutcome {
        if outcome.duration.is_zero() {
            outcome.duration = started.elapsed();
        }
        log::info!(
            "Execution {} finished: {} in {:?}",
            plan.id,
            outcome.kind.label(),
            outcome.duration
        );
        events::execution_end(&plan.id, plan.profile.name, outcome.kind.label(), outcome.duration);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::OutcomeKind;
    use crate::judge::profile::{CommandTemplate, SourceNaming};

    fn shell_profile() -> LanguageProfile {
        LanguageProfile {
            name: "shell",
            display_name: "POSIX shell",
            aliases: &["sh"],
            source: SourceNaming::Fixed("main.sh"),
            compile: None,
            run: CommandTemplate::new("sh", &["{source}"]),
            compile_timeout: Duration::from_secs(5),
            run_timeout: Duration::from_secs(5),
            environment: &[],
            missing_hint: "Install a POSIX shell.",
        }
    }

    fn engine(root: &Path) -> ExecutionEngine {
        let config = EngineConfig {
            workspace_root: root.to_path_buf(),
            ..EngineConfig::default()
        };
        let registry = LanguageRegistry::from_profiles(vec![shell_profile()]).unwrap();
        ExecutionEngine::with_registry(config, registry).unwrap()
    }

    #[test]
    fn children_see_workspace_as_home() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(root.path());
        let outcome = engine
            .run_batch("sh", "test \"$HOME\" -ef . && test \"$TMPDIR\" -ef . && echo ok", "")
            .unwrap();
        assert_eq!(outcome.kind, OutcomeKind::Success);
        assert_eq!(outcome.stdout_text(), "ok\n");
    }

    #[test]
    fn request_timeout_overrides_profile() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(root.path());
        let request = ExecutionRequest::new("shell", "sleep 5")
            .with_run_timeout(Duration::from_millis(200));
        let outcome = engine.execute(request).unwrap();
        assert_eq!(
            outcome.kind,
            OutcomeKind::Timeout {
                phase: Phase::Run,
                limit_ms: 200
            }
        );
    }

    #[test]
    fn rejected_requests_never_create_workspaces() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(root.path());
        assert!(matches!(
            engine.run_batch("fortran", "x", ""),
            Err(CoderunError::UnsupportedLanguage(_))
        ));
        let huge = "#".repeat(engine.config().max_source_bytes + 1);
        assert!(matches!(
            engine.run_batch("shell", &huge, ""),
            Err(CoderunError::SourceTooLarge { .. })
        ));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn sources_are_written_byte_for_byte() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(root.path());
        let code = "# héllo ☃\r\nwc -c < main.sh\n";
        let outcome = engine.run_batch("shell", code, "").unwrap();
        assert_eq!(outcome.stdout_text().trim(), code.len().to_string());
    }
}
