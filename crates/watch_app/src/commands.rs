use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use tokio_util::sync::CancellationToken;
use watch_core::SnapshotSummary;
use watch_engine::{
    BulletDrafter, Collaborators, FetchSettings, FileSnapshotStore, LogNotifier, Notifier,
    Orchestrator, ReqwestFetcher, SnapshotStore, WatchConfig, WebhookNotifier,
};
use watch_logging::{watch_info, watch_warn};

use crate::report::{RunReport, TargetState};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Override the configured state directory.
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
    /// Treat every fetched page as changed and diff it against nothing.
    #[arg(long)]
    pub force_change: bool,
    /// Only run these target ids (repeatable).
    #[arg(long = "only", value_name = "ID")]
    pub only: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Override the configured state directory.
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
    /// Only show these target ids (repeatable).
    #[arg(long = "only", value_name = "ID")]
    pub only: Vec<String>,
    /// Include the stored normalized text.
    #[arg(long)]
    pub text: bool,
}

fn open_store(config: &WatchConfig, state_dir: Option<PathBuf>) -> Result<FileSnapshotStore> {
    let dir = state_dir.unwrap_or_else(|| config.state_dir.clone());
    FileSnapshotStore::open(&dir, config.history_limit)
        .with_context(|| format!("opening state directory {}", dir.display()))
}

fn build_notifier(config: &WatchConfig) -> Result<Arc<dyn Notifier>> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(
            WebhookNotifier::new(url.clone(), config.timeouts().notify)
                .context("building webhook client")?,
        )),
        None => {
            watch_warn!("no webhook configured; notifications go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Validate the configuration and report what would run.
pub fn check(config_path: &Path) -> Result<()> {
    let config = WatchConfig::load(config_path)?;
    config.cycle_settings(false)?;
    println!(
        "{}: {} target(s), {} worker(s), state in {}",
        config_path.display(),
        config.targets.len(),
        config.workers,
        config.state_dir.display()
    );
    Ok(())
}

/// One batch over the selected targets.
pub async fn run(config_path: &Path, args: RunArgs, cancel: CancellationToken) -> Result<RunReport> {
    let config = WatchConfig::load(config_path)?;
    let targets = config.selected_targets(&args.only)?;
    let settings = Arc::new(config.cycle_settings(args.force_change)?);
    let store: Arc<dyn SnapshotStore> = Arc::new(open_store(&config, args.state_dir)?);

    let fetch_settings = FetchSettings {
        request_timeout: config.timeouts().fetch,
        respect_robots: config.respect_robots,
        ..FetchSettings::default()
    };
    let fetcher = ReqwestFetcher::new(fetch_settings).context("building http client")?;

    let collaborators = Collaborators {
        fetcher: Arc::new(fetcher),
        drafter: Arc::new(BulletDrafter::default()),
        notifier: build_notifier(&config)?,
        store,
    };
    let orchestrator = Orchestrator::new(collaborators, settings, config.orchestrator_options());

    if args.force_change {
        watch_info!("force-change enabled: every target will be reported as changed");
    }
    let started_at = Utc::now();
    let outcomes = orchestrator.run_batch(&targets, &cancel).await;
    Ok(RunReport::new(started_at, Utc::now(), outcomes))
}

/// Stored snapshot state for the selected targets.
pub fn show(config_path: &Path, args: ShowArgs) -> Result<Vec<TargetState>> {
    let config = WatchConfig::load(config_path)?;
    let targets = config.selected_targets(&args.only)?;
    let store = open_store(&config, args.state_dir)?;

    targets
        .into_iter()
        .map(|target| -> Result<TargetState> {
            let current = store.get_current(&target.id)?;
            Ok(TargetState {
                history: store.history(&target.id)?,
                current: current.as_ref().map(SnapshotSummary::from),
                text: current
                    .filter(|_| args.text)
                    .map(|snapshot| snapshot.normalized_text),
                target_id: target.id,
                locator: target.locator,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use watch_core::{ChangeKind, CycleStatus, ErrorKind};
    use watch_engine::ConfigurationError;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_config(dir: &Path, base_url: &str) -> PathBuf {
        let config = format!(
            r#"(
    targets: [
        (id: "pricing", locator: "{base_url}/pricing", extraction: Some("main")),
        (id: "gone", locator: "{base_url}/gone"),
    ],
    workers: 2,
    fetch_retries: 0,
    state_dir: "{state}",
)"#,
            state = dir.join("state").display()
        );
        let path = dir.join("page-watch.ron");
        std::fs::write(&path, config).unwrap();
        path
    }

    fn run_args() -> RunArgs {
        RunArgs {
            state_dir: None,
            force_change: false,
            only: Vec::new(),
        }
    }

    async fn serve(server: &MockServer, body: &str) {
        server.reset().await;
        Mock::given(method("GET"))
            .and(path("/pricing"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                format!("<html><nav>Home</nav><main>{body}</main></html>"),
                "text/html",
            ))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn run_then_rerun_reports_change_then_no_change() {
        let temp = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let config = write_config(temp.path(), &server.uri());

        serve(&server, "<p>Plan: $10/mo</p>").await;
        let first = run(&config, run_args(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(first.outcomes[0].status, CycleStatus::Changed);
        assert_eq!(first.outcomes[0].segments[0].kind, ChangeKind::Added);
        assert_eq!(first.outcomes[1].error_kind(), Some(ErrorKind::Fetch));
        assert_eq!(first.summary.changed, 1);
        assert_eq!(first.summary.errors, 1);

        let second = run(&config, run_args(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(second.outcomes[0].status, CycleStatus::NoChange);
        assert_eq!(second.outcomes[0].snapshot_version, Some(1));

        serve(&server, "<p>Plan: $12/mo</p>").await;
        let third = run(&config, run_args(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(third.outcomes[0].status, CycleStatus::Changed);
        assert_eq!(third.outcomes[0].snapshot_version, Some(2));

        let states = show(
            &config,
            ShowArgs {
                state_dir: None,
                only: vec!["pricing".to_string()],
                text: true,
            },
        )
        .unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].current.as_ref().map(|c| c.version), Some(2));
        assert_eq!(states[0].text.as_deref(), Some("Plan: $12/mo"));
        assert_eq!(states[0].history.len(), 1);
    }

    #[tokio::test]
    async fn force_change_reports_an_unchanged_page() {
        let temp = TempDir::new().unwrap();
        let server = MockServer::start().await;
        let config = write_config(temp.path(), &server.uri());
        serve(&server, "<p>Stable</p>").await;

        let only = || vec!["pricing".to_string()];
        run(&config, RunArgs { only: only(), ..run_args() }, CancellationToken::new())
            .await
            .unwrap();
        let forced = run(
            &config,
            RunArgs {
                only: only(),
                force_change: true,
                ..run_args()
            },
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(forced.outcomes.len(), 1);
        assert_eq!(forced.outcomes[0].status, CycleStatus::Changed);
        assert_eq!(forced.outcomes[0].snapshot_version, Some(2));
    }

    #[tokio::test]
    async fn unknown_target_is_a_configuration_error() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "https://example.test");

        let err = run(
            &config,
            RunArgs {
                only: vec!["missing".to_string()],
                ..run_args()
            },
            CancellationToken::new(),
        )
        .await
        .err()
        .unwrap();

        assert!(matches!(
            err.downcast_ref::<ConfigurationError>(),
            Some(ConfigurationError::UnknownTarget(_))
        ));
    }

    #[test]
    fn check_accepts_a_valid_file_and_rejects_a_broken_one() {
        let temp = TempDir::new().unwrap();
        let config = write_config(temp.path(), "https://example.test");
        check(&config).unwrap();

        let broken = temp.path().join("broken.ron");
        std::fs::write(&broken, "(targets: [], workers: 0)").unwrap();
        let err = check(&broken).unwrap_err();
        assert!(err.downcast_ref::<ConfigurationError>().is_some());
    }
}
