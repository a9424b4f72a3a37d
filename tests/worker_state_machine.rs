//! End-to-end measurement worker tests against the scripted mock instrument.

use std::sync::Arc;

use rust_vna::config::SweepConfig;
use rust_vna::driver::default_registry;
use rust_vna::error::VnaError;
use rust_vna::measurement::SParam;
use rust_vna::transport::{MockConnector, MockFailure, MockTransport};
use rust_vna::worker::{MeasurementPhase, MeasurementWorker, WorkerEvent};

fn test_config() -> SweepConfig {
    SweepConfig {
        host: "192.168.1.50".into(),
        start_freq_hz: 10e6,
        stop_freq_hz: 1500e6,
        sweep_points: 201,
        averaging_count: 4,
        sparams: vec![SParam::S11, SParam::S21],
        set_freq_range: true,
        enable_averaging: true,
        set_averaging_count: true,
        ..SweepConfig::default()
    }
}

fn worker_with(transport: MockTransport) -> MeasurementWorker {
    MeasurementWorker::new(
        Arc::new(default_registry().clone()),
        Arc::new(MockConnector::new(transport)),
    )
}

/// Drain events until a terminal one arrives, collecting phase transitions.
async fn run_to_completion(
    handle: &mut rust_vna::worker::MeasurementHandle,
) -> (Vec<MeasurementPhase>, WorkerEvent) {
    let mut phases = Vec::new();
    loop {
        match handle.recv().await {
            Some(WorkerEvent::Phase { phase, .. }) => phases.push(phase),
            Some(WorkerEvent::Progress { .. }) | Some(WorkerEvent::Wire { .. }) => {}
            Some(terminal) => return (phases, terminal),
            None => panic!("worker stopped without a terminal event"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn successful_run_visits_every_phase_once_in_order() {
    let worker = worker_with(MockTransport::e5071b());
    let mut handle = worker.start_measurement(test_config()).unwrap();

    let (phases, terminal) = run_to_completion(&mut handle).await;
    let result = match terminal {
        WorkerEvent::Completed(result) => result,
        other => panic!("expected completion, got {other:?}"),
    };

    assert_eq!(
        phases,
        vec![
            MeasurementPhase::Connecting,
            MeasurementPhase::Detecting,
            MeasurementPhase::Configuring,
            MeasurementPhase::Sweeping,
            MeasurementPhase::Reading,
            MeasurementPhase::Complete,
        ]
    );

    assert_eq!(result.points(), 201);
    assert_eq!(result.idn, "AGILENT,E5071B,MY12345,A.09.25");
    assert_eq!(
        result.traces.keys().copied().collect::<Vec<_>>(),
        vec![SParam::S11, SParam::S21]
    );
    for trace in result.traces.values() {
        assert_eq!(trace.magnitude_db.len(), 201);
        assert_eq!(trace.phase_deg.len(), 201);
    }
    assert!(result
        .frequencies_hz
        .windows(2)
        .all(|pair| pair[0] < pair[1]));
}

#[tokio::test(start_paused = true)]
async fn wire_traffic_is_observable_through_events() {
    let worker = worker_with(MockTransport::e5071b());
    let mut handle = worker.start_measurement(test_config()).unwrap();

    let mut saw_idn = false;
    loop {
        match handle.recv().await {
            Some(WorkerEvent::Wire { text, .. }) => {
                if text == "*IDN?" {
                    saw_idn = true;
                }
            }
            Some(WorkerEvent::Completed(_)) => break,
            Some(WorkerEvent::Failed(err)) => panic!("measurement failed: {err}"),
            Some(_) => {}
            None => panic!("worker stopped early"),
        }
    }
    assert!(saw_idn);
}

#[tokio::test(start_paused = true)]
async fn second_request_while_active_fails_fast_with_busy() {
    let worker = worker_with(MockTransport::e5071b());
    let _handle = worker.start_measurement(test_config()).unwrap();

    assert!(worker.is_busy());
    match worker.start_measurement(test_config()) {
        Err(VnaError::Busy) => {}
        other => panic!("expected Busy, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn worker_frees_the_slot_after_completion() {
    let worker = worker_with(MockTransport::e5071b());
    let mut handle = worker.start_measurement(test_config()).unwrap();

    let (_, terminal) = run_to_completion(&mut handle).await;
    assert!(matches!(terminal, WorkerEvent::Completed(_)));
    handle.join().await;

    assert!(!worker.is_busy());
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_sweep_yields_cancelled_not_complete() {
    // A sweep that never finishes; only cancellation can end it early.
    let transport = MockTransport::e5071b().with_busy_polls(u32::MAX);
    let worker = worker_with(transport);
    let mut handle = worker.start_measurement(test_config()).unwrap();

    let mut cancelled = false;
    loop {
        match handle.recv().await {
            Some(WorkerEvent::Phase { phase, .. }) => {
                if phase == MeasurementPhase::Sweeping {
                    handle.cancel();
                }
                assert_ne!(phase, MeasurementPhase::Complete);
            }
            Some(WorkerEvent::Cancelled) => {
                cancelled = true;
                break;
            }
            Some(WorkerEvent::Completed(_)) => panic!("completed despite cancellation"),
            Some(WorkerEvent::Failed(err)) => panic!("failed instead of cancelling: {err}"),
            Some(_) => {}
            None => break,
        }
    }
    assert!(cancelled);
}

#[tokio::test(start_paused = true)]
async fn hung_sweep_fails_with_timeout_after_the_poll_budget() {
    let transport = MockTransport::e5071b().with_busy_polls(u32::MAX);
    let worker = worker_with(transport);
    let mut handle = worker.start_measurement(test_config()).unwrap();

    let (_, terminal) = run_to_completion(&mut handle).await;
    match terminal {
        WorkerEvent::Failed(VnaError::Timeout(_)) => {}
        other => panic!("expected a timeout failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unknown_instrument_fails_with_unsupported() {
    let transport = MockTransport::new("ROHDE&SCHWARZ,ZVB8,100042,1.90");
    let worker = worker_with(transport);
    let mut handle = worker.start_measurement(test_config()).unwrap();

    let (phases, terminal) = run_to_completion(&mut handle).await;
    assert_eq!(
        phases,
        vec![MeasurementPhase::Connecting, MeasurementPhase::Detecting]
    );
    match terminal {
        WorkerEvent::Failed(VnaError::UnsupportedInstrument(idn)) => {
            assert!(idn.contains("ZVB8"));
        }
        other => panic!("expected UnsupportedInstrument, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unreachable_host_fails_with_connection_error() {
    let worker = MeasurementWorker::new(
        Arc::new(default_registry().clone()),
        Arc::new(MockConnector::refusing()),
    );
    let mut handle = worker.start_measurement(test_config()).unwrap();

    let (_, terminal) = run_to_completion(&mut handle).await;
    assert!(matches!(
        terminal,
        WorkerEvent::Failed(VnaError::Connection(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn partial_read_failure_reports_one_failure_and_no_result() {
    // S11 reads fine; the second data read drops the connection.
    let transport =
        MockTransport::e5071b().fail_on_nth("CALC1:DATA:SDAT?", 2, MockFailure::ConnectionReset);
    let worker = worker_with(transport);
    let mut handle = worker.start_measurement(test_config()).unwrap();

    let (_, terminal) = run_to_completion(&mut handle).await;
    match terminal {
        WorkerEvent::Failed(VnaError::Connection(message)) => {
            assert!(message.contains("S21"), "message was: {message}");
        }
        other => panic!("expected a connection failure, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_points_are_rejected_before_any_connection() {
    let transport = MockTransport::e5071b();
    let log = transport.command_log();
    let worker = worker_with(transport);

    let config = SweepConfig {
        sweep_points: 5000,
        ..test_config()
    };
    match worker.start_measurement(config) {
        Err(VnaError::Config(_)) => {}
        other => panic!("expected Config error, got {other:?}"),
    }

    assert!(log.lock().unwrap().is_empty());
    assert!(!worker.is_busy());
}

#[tokio::test(start_paused = true)]
async fn read_settings_round_trips_through_detection() {
    let worker = worker_with(MockTransport::e5071b());
    let settings = worker.read_settings(&test_config()).await.unwrap();

    assert_eq!(settings.sweep_points, Some(601));
    assert_eq!(settings.start_freq_hz, Some(1e6));
    assert_eq!(settings.averaging_enabled, Some(false));
    assert!(!worker.is_busy());
}

#[tokio::test(start_paused = true)]
async fn read_settings_rejects_unknown_instruments() {
    let worker = worker_with(MockTransport::new("ACME,WIDGET,1,1.0"));
    let err = worker.read_settings(&test_config()).await.unwrap_err();
    assert!(matches!(err, VnaError::UnsupportedInstrument(_)));
}
