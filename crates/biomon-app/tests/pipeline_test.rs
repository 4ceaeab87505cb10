//! End-to-end pipeline tests: in-memory database -> stream sources ->
//! collectors -> signal store -> dashboard views.

use biomon_app::{AppConfig, AppError, Application, OperatingMode};
use biomon_core::{Channel, EcgSample, EmgSample, HeartRateSample};
use biomon_dashboard::{DashboardError, DashboardState, DisplayRange, PulseCue, ViewStatus};
use biomon_feed::{spawn_collectors, CollectorOutcome, Collectors, SignalStore};
use biomon_source::{MemoryDatabase, RemoteError, SourceError, SourcePhase, SourceSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const ECG: &str = "ecg/latest";
const EMG: &str = "emg/latest";
const HR: &str = "heartrate/latest";

struct Pipeline {
    db: Arc<MemoryDatabase>,
    sources: SourceSet,
    store: Arc<SignalStore>,
    shutdown: CancellationToken,
    collectors: Collectors,
}

async fn start() -> Pipeline {
    let db = Arc::new(MemoryDatabase::new());
    let sources = SourceSet::new(db.clone());
    let store = Arc::new(SignalStore::new());
    let shutdown = CancellationToken::new();
    let collectors = spawn_collectors(&sources, store.clone(), shutdown.clone());

    wait_until(|| [ECG, EMG, HR].iter().all(|p| db.listener_count(p) == 1)).await;

    Pipeline {
        db,
        sources,
        store,
        shutdown,
        collectors,
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_valid_samples_reach_store() {
    let p = start().await;

    p.db.set_string(ECG, r#"{"data":[512,530,498],"timestamp":1700000000000}"#);
    p.db.set_string(HR, r#"{"value":72,"timestamp":1700000000500}"#);

    wait_until(|| p.store.ecg().timestamp != 0 && p.store.heart_rate().value != 0).await;

    assert_eq!(
        p.store.ecg(),
        EcgSample::new(vec![512, 530, 498], 1_700_000_000_000)
    );
    assert_eq!(
        p.store.heart_rate(),
        HeartRateSample::new(72, 1_700_000_000_500)
    );
    // untouched channel stays empty
    assert_eq!(p.store.emg(), EmgSample::default());

    let cue = PulseCue::from_bpm(p.store.heart_rate().value).unwrap();
    assert_eq!(cue.on_duration(), Duration::from_millis(100));
    assert_eq!(cue.off_duration(), Duration::from_millis(733));
}

#[tokio::test]
async fn test_malformed_payload_keeps_subscription() {
    let p = start().await;

    p.db.set_string(EMG, "not json");
    p.db.set_string(EMG, r#"{"data":[1,2],"timestamp":5}"#);

    wait_until(|| p.store.emg().timestamp == 5).await;

    let stats = p.sources.emg.stats();
    assert_eq!(stats.decode_failures, 1);
    assert_eq!(stats.decoded, 1);
    assert_eq!(p.sources.emg.phase(), SourcePhase::Receiving);
    assert_eq!(p.db.subscribe_calls(), 3);
}

#[tokio::test]
async fn test_empty_payload_is_ignored() {
    let p = start().await;

    p.db.set_string(ECG, r#"{"data":[9],"timestamp":1}"#);
    wait_until(|| p.store.ecg().timestamp == 1).await;

    let empty_before = p.sources.ecg.stats().empty_payloads;
    p.db.remove(ECG);
    wait_until(|| p.sources.ecg.stats().empty_payloads == empty_before + 1).await;

    sleep(Duration::from_millis(20)).await;
    assert_eq!(p.store.ecg(), EcgSample::new(vec![9], 1));
}

#[tokio::test]
async fn test_remote_cancel_ends_one_collector() {
    let p = start().await;

    p.db.cancel_path(HR, RemoteError::Cancelled("Permission denied".into()));
    wait_until(|| p.sources.heart_rate.phase() == SourcePhase::Unsubscribed).await;
    assert_eq!(p.db.listener_count(HR), 0);

    // the other channels keep streaming
    p.db.set_string(ECG, r#"{"data":[3],"timestamp":3}"#);
    wait_until(|| p.store.ecg().timestamp == 3).await;

    p.shutdown.cancel();
    let outcomes = p.collectors.join().await.unwrap();

    for (channel, outcome) in outcomes {
        match channel {
            Channel::HeartRate => assert_eq!(
                outcome,
                CollectorOutcome::Terminated(SourceError::Remote {
                    channel: Channel::HeartRate,
                    error: RemoteError::Cancelled("Permission denied".into()),
                })
            ),
            _ => assert_eq!(outcome, CollectorOutcome::Shutdown),
        }
    }

    // one teardown per listener
    assert_eq!(p.db.unsubscribe_calls(), 3);
    assert_eq!(p.sources.heart_rate.stats().remote_errors, 1);
}

#[tokio::test]
async fn test_restart_attaches_fresh_listeners() {
    let p = start().await;
    p.shutdown.cancel();
    p.collectors.join().await.unwrap();

    assert_eq!(p.db.subscribe_calls(), 3);
    assert_eq!(p.db.unsubscribe_calls(), 3);
    for path in [ECG, EMG, HR] {
        assert_eq!(p.db.listener_count(path), 0);
    }

    let shutdown = CancellationToken::new();
    let collectors = spawn_collectors(&p.sources, p.store.clone(), shutdown.clone());
    wait_until(|| [ECG, EMG, HR].iter().all(|path| p.db.listener_count(path) == 1)).await;
    assert_eq!(p.db.subscribe_calls(), 6);

    p.db.set_string(HR, r#"{"value":64,"timestamp":9}"#);
    wait_until(|| p.store.heart_rate().value == 64).await;

    shutdown.cancel();
    collectors.join().await.unwrap();
    assert_eq!(p.db.unsubscribe_calls(), 6);
}

#[tokio::test]
async fn test_dashboard_snapshot_reflects_pipeline() {
    let p = start().await;
    let (_beat_tx, beat_rx) = watch::channel(false);
    let state = DashboardState::new(
        p.store.clone(),
        p.sources.statuses(),
        DisplayRange::default(),
        beat_rx,
    );

    let waiting = state.collect_snapshot();
    assert_eq!(waiting.ecg.status, ViewStatus::Waiting);
    assert_eq!(waiting.heart_rate.pulse, None);

    p.db.set_string(ECG, r#"{"data":[0,50,100],"timestamp":10}"#);
    p.db.set_string(HR, r#"{"value":60,"timestamp":11}"#);
    wait_until(|| p.store.ecg().timestamp == 10 && p.store.heart_rate().value == 60).await;

    let snapshot = state.collect_snapshot();
    assert_eq!(snapshot.ecg.status, ViewStatus::Live);
    assert_eq!(snapshot.ecg.readings, 3);
    let ys: Vec<f64> = snapshot.ecg.points.iter().map(|pt| pt.y).collect();
    assert_eq!(ys, vec![0.0, 0.5, 1.0]);
    assert_eq!(snapshot.emg.status, ViewStatus::Waiting);

    assert_eq!(snapshot.heart_rate.bpm, 60);
    assert_eq!(snapshot.heart_rate.pulse.map(|c| c.off_ms), Some(900));

    assert_eq!(snapshot.sources.len(), 3);
    let hr_source = &snapshot.sources[2];
    assert_eq!(hr_source.channel, Channel::HeartRate);
    assert_eq!(hr_source.consumers, 1);
    assert_eq!(hr_source.stats.decoded, 1);
}

fn simulated_config() -> AppConfig {
    let mut config = AppConfig {
        mode: OperatingMode::Simulated,
        ..Default::default()
    };
    config.dashboard.enabled = false;
    config.simulator.waveform_interval_ms = 10;
    config.simulator.heart_rate_interval_ms = 10;
    config.simulator.seed = Some(1);
    config
}

#[tokio::test]
async fn test_application_runs_simulated_until_shutdown() {
    let app = Application::new(simulated_config()).unwrap();
    let shutdown = app.shutdown_token();
    let handle = tokio::spawn(app.run());

    sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("application did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_dashboard_bind_failure_fails_run() {
    let occupied = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let mut config = simulated_config();
    config.dashboard.enabled = true;
    config.dashboard.port = port;

    let app = Application::new(config).unwrap();
    let result = timeout(Duration::from_secs(5), app.run())
        .await
        .expect("application did not stop after dashboard failure");

    assert!(matches!(
        result,
        Err(AppError::Dashboard(DashboardError::Bind { .. }))
    ));
    drop(occupied);
}

#[test]
fn test_application_rejects_invalid_config() {
    let live_without_url = AppConfig::default();
    assert!(matches!(
        Application::new(live_without_url),
        Err(AppError::Config(_))
    ));
}
