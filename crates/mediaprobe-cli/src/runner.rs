//! Command execution against a simulated target

use crate::commands::{EngineArgs, ListArgs, RunArgs, StateArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, ProgressReporter};
use mediaprobe::format::{format_metadata, format_playback_state, format_queue_size};
use mediaprobe::{
    build_tests, Outcome, ProbeConfig, ProbeError, SessionHandle, SessionManager, SimulatedEndpoint,
    StaticDisplayText, SuiteReport, TargetProfile, TestCoordinator, TestId, TestOutcome,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Executes CLI commands
#[derive(Debug)]
pub struct ProbeRunner {
    config: CliConfig,
}

impl ProbeRunner {
    /// Create a runner
    #[must_use]
    pub const fn new(config: CliConfig) -> Self {
        Self { config }
    }

    fn reporter(&self) -> ProgressReporter {
        ProgressReporter::new(
            self.config.color.should_color(),
            self.config.verbosity.is_quiet(),
        )
    }

    /// Print the catalog for a target
    pub fn list(&self, args: &ListArgs) -> CliResult<()> {
        let profile = TargetProfile::from_file(&args.profile)?;
        let engine = engine_config(&args.engine)?;
        let tests = build_tests(&profile.target, &StaticDisplayText);

        if OutputFormat::from(args.format) == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&tests)?);
            return Ok(());
        }

        let reporter = self.reporter();
        reporter.header(&format!("Tests for {}", profile.target.package));
        for test in &tests {
            let mut line = format!("{:>3}  {:<9} {}", test.id, test.tier.name(), test.name);
            if test.accepts_query {
                line.push_str("  [query]");
            }
            if test.check_platform(engine.platform_level).is_err() {
                line.push_str("  [unsupported]");
            }
            reporter.plain(&line);
            if self.config.verbosity.is_verbose() {
                reporter.plain(&format!("       {}", test.description));
            }
        }
        Ok(())
    }

    /// Run one test or the whole catalog
    pub async fn run(&self, args: &RunArgs) -> CliResult<()> {
        let profile = TargetProfile::from_file(&args.profile)?;
        let engine = engine_config(&args.engine)?;
        let (manager, session) = connect(profile).await?;
        let coordinator = TestCoordinator::for_session(session, &StaticDisplayText, engine);

        let mut reporter = self.reporter();
        let text = OutputFormat::from(args.format) == OutputFormat::Text;
        if text {
            reporter.start_progress(&format!("Testing {}", manager.target().package));
        }

        let report = match args.test {
            Some(id) => run_single(&coordinator, id, args.query.clone().unwrap_or_default()).await?,
            None => {
                let queries: HashMap<TestId, String> = args.query_for.iter().cloned().collect();
                coordinator
                    .run_all(|test| queries.get(&test.id).cloned().unwrap_or_default())
                    .await
            }
        };
        reporter.finish();
        manager.disconnect();

        if text {
            reporter.header(&format!("Results for {}", report.package));
            for outcome in &report.outcomes {
                reporter.outcome(outcome);
                if args.show_log && matches!(outcome.outcome, Outcome::Verdict { .. }) {
                    reporter.run_log(&coordinator.log_entries(outcome.id)?);
                }
            }
            reporter.summary(&report);
        } else {
            println!("{}", report.to_json()?);
        }

        if report.all_passed() {
            Ok(())
        } else {
            Err(CliError::TestsFailed {
                failed: report.failures().len(),
                total: report.total(),
            })
        }
    }

    /// Print the session state a target reports on connect
    pub async fn state(&self, args: &StateArgs) -> CliResult<()> {
        let profile = TargetProfile::from_file(&args.profile)?;
        let (manager, session) = connect(profile).await?;
        let reporter = self.reporter();

        reporter.header(&format!("Session of {}", manager.target().package));
        reporter.plain(&format!(
            "Playback: {}",
            format_playback_state(session.playback_state()?.as_ref())
        ));
        reporter.plain(&format_metadata(session.metadata()?.as_ref()));
        reporter.plain(&format_queue_size(&session.queue()?));
        if let Some(title) = session.queue_title()? {
            reporter.plain(&format!("Queue title: {title}"));
        }
        reporter.plain(&format!(
            "Repeat: {}, shuffle: {}",
            session.repeat_mode()?.name(),
            session.shuffle_mode()?.name()
        ));

        manager.disconnect();
        Ok(())
    }
}

/// Engine settings from an optional file, then flag overrides
fn engine_config(args: &EngineArgs) -> CliResult<ProbeConfig> {
    let mut config = match &args.config {
        Some(path) => load_engine_file(path)?,
        None => ProbeConfig::default(),
    };
    if let Some(ms) = args.timeout {
        config = config.with_timeout_ms(ms);
    }
    if let Some(level) = args.platform_level {
        config = config.with_platform_level(level);
    }
    config
        .validate()
        .map_err(|err| CliError::invalid_argument(err.to_string()))?;
    Ok(config)
}

fn load_engine_file(path: &Path) -> CliResult<ProbeConfig> {
    ProbeConfig::from_file(path)
        .map_err(|err| CliError::config(format!("{}: {err}", path.display())))
}

async fn connect(profile: TargetProfile) -> CliResult<(SessionManager, SessionHandle)> {
    let target = profile.target.clone();
    tracing::debug!(package = %target.package, "loaded target profile");
    let manager = SessionManager::new(target, Arc::new(SimulatedEndpoint::new(profile)));
    let session = manager.connect().await?;
    Ok((manager, session))
}

async fn run_single(
    coordinator: &Arc<TestCoordinator>,
    id: TestId,
    query: String,
) -> CliResult<SuiteReport> {
    let definition = coordinator
        .test_list()
        .into_iter()
        .find(|t| t.id == id)
        .ok_or(ProbeError::UnknownTest { test_id: id })?;

    let started = Instant::now();
    let outcome = match coordinator.run_test(id, query) {
        Ok(ticket) => Outcome::Verdict {
            result: ticket.finish().await,
        },
        Err(ProbeError::UnsupportedPlatform { required, .. }) => Outcome::Unsupported { required },
        Err(err) => return Err(err.into()),
    };

    let mut report = SuiteReport::new(coordinator.session().target().package.clone());
    report.push(TestOutcome {
        id,
        name: definition.name,
        tier: definition.tier,
        outcome,
        duration: started.elapsed(),
    });
    report.duration = started.elapsed();
    Ok(report)
}
