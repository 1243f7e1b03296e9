//! End-to-end runs over a real socket against the fake instrument
//!
//! These use wall-clock time with short intervals.

mod support;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dischsrv::core::session::{PersistenceSink, SessionMode, CONNECTION_LOST_COMMENT};
use dischsrv::core::transport::{ConnectionState, TcpTransport};
use dischsrv::runtime::reconnect::ReconnectPolicy;
use dischsrv::{ControllerState, DischargeController, DischargeService, MemoryStore, OperatorCommand};
use support::{cc_profile, FakeInstrument, RecordingReports, IDN};

const TICK: Duration = Duration::from_millis(50);

struct Rig {
    controller: DischargeController,
    store: Arc<MemoryStore>,
    reports: Arc<RecordingReports>,
}

fn rig(instrument: &FakeInstrument) -> Rig {
    let mut settings = support::settings(&instrument.host(), instrument.port());
    settings.reconnect = ReconnectPolicy {
        enabled: true,
        interval: Duration::from_millis(100),
    };
    let store = Arc::new(MemoryStore::new());
    let reports = Arc::new(RecordingReports::default());
    let controller = DischargeController::new(
        settings,
        Box::new(TcpTransport::default()),
        store.clone(),
        reports.clone(),
    );
    Rig {
        controller,
        store,
        reports,
    }
}

#[tokio::test]
async fn test_profile_runs_over_tcp() {
    let instrument = FakeInstrument::start(400.0, 0.5).await;
    let mut rig = rig(&instrument);

    rig.controller.connect().await.unwrap();
    assert_eq!(rig.controller.last_idn(), Some(IDN));
    let id = rig
        .controller
        .start_discharge(&cc_profile(399.0), "AB123", SessionMode::Real, "")
        .await
        .unwrap();

    let mut service = DischargeService::new(rig.controller, TICK);
    let (_tx, rx) = mpsc::channel(4);
    tokio::time::timeout(Duration::from_secs(5), service.run(rx, CancellationToken::new()))
        .await
        .expect("run did not finish")
        .unwrap();

    let controller = service.controller();
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_eq!(controller.current_step(), Some(1));
    // 400.0, 399.5, 399.0
    assert_eq!(controller.samples().len(), 3);

    // Let the instrument drain the final command
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!instrument.enabled());

    let received = instrument.received();
    assert_eq!(received[0], "*IDN?");
    assert_eq!(received[1..4], ["INPut:STATe 1", "INPut:FUNCtion CC", "STATic:CC:HIGH:LEVel 10"]);
    assert_eq!(received.last().map(String::as_str), Some("INPut:STATe 0"));

    let (samples, summary) = rig.store.get_session_data(id).await.unwrap();
    assert_eq!(samples.len(), 3);
    assert!(summary.total_energy_kwh > 0.0);
    assert_eq!(rig.reports.count(), 1);
}

#[tokio::test]
async fn test_poll_status_over_tcp() {
    let instrument = FakeInstrument::start(400.0, 0.0).await;
    let mut rig = rig(&instrument);
    rig.controller.connect().await.unwrap();

    let status = rig.controller.poll_status().await.unwrap();
    assert!(!status.enabled);
    assert_eq!(status.function, "CC");

    let results = rig.controller.verify_instrument().await.unwrap();
    let queries: Vec<&str> = results.iter().map(|(q, _)| q.as_str()).collect();
    assert_eq!(
        queries,
        ["*IDN?", "MEASure:VOLTage?", "MEASure:CURRent?", "MEASure:POWer?", "INPut:STATe?"]
    );
    assert_eq!(results[1].1, "400.00V");

    rig.controller.disconnect().await;
    assert_eq!(rig.controller.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_peer_hangup_reconnects_and_resumes() {
    let instrument = FakeInstrument::start(400.0, 0.1).await;
    let mut rig = rig(&instrument);
    rig.controller.connect().await.unwrap();
    let first = rig
        .controller
        .start_discharge(&cc_profile(399.0), "AB123", SessionMode::Real, "")
        .await
        .unwrap();
    instrument.close_after_reads(2);

    let mut service = DischargeService::new(rig.controller, TICK);
    let (tx, rx) = mpsc::channel(4);
    let run = tokio::spawn(async move {
        let result = service.run(rx, CancellationToken::new()).await;
        result.map(|()| service)
    });

    // Wait for the reconnect to land, then confirm the resume
    tokio::time::timeout(Duration::from_secs(5), async {
        while instrument.connections() < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("no reconnect");
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(OperatorCommand::ConfirmResume).await.unwrap();

    let service = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run did not finish")
        .unwrap()
        .unwrap();

    let (lost_samples, lost) = rig.store.get_session_data(first).await.unwrap();
    assert_eq!(lost_samples.len(), 2);
    assert_eq!(lost.comment, CONNECTION_LOST_COMMENT);

    let controller = service.controller();
    assert_eq!(controller.session_id(), Some(first + 1));
    assert_eq!(controller.state(), ControllerState::Idle);
    assert_eq!(rig.store.session_count(), 2);
    assert_eq!(rig.reports.count(), 1);
}
