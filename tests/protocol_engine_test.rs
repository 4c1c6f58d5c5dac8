// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the async protocol engine
//!
//! The station side of the link is an in-memory duplex stream. Tokio time is
//! paused, so retry timeouts elapse instantly whenever every task is idle.

use approx::assert_relative_eq;
use std::time::Duration;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use rust_ema::device::Station;
use rust_ema::protocol::commands::{self, AuxRelayMode, Setting};
use rust_ema::protocol::status::magnitude;
use rust_ema::protocol::{
    AuxRelaySettings, EmaProtocol, EngineSettings, ProtocolEngine, ProtocolError, Value,
};

const STATUS: &str =
    "(CEP 0000 0153 10132 10150 0012 00345 0456 41234 +185 0562 +034 0123 0098 371a0123)";

fn start() -> (EmaProtocol, DuplexStream, JoinHandle<Result<(), ProtocolError>>) {
    let (host, station) = duplex(4096);
    let (reader, writer) = tokio::io::split(host);
    let (ema, task) = ProtocolEngine::spawn(reader, writer, EngineSettings::default());
    (ema, station, task)
}

async fn expect_line(station: &mut DuplexStream, line: &str) {
    let mut buf = vec![0u8; line.len()];
    station.read_exact(&mut buf).await.unwrap();
    assert_eq!(String::from_utf8_lossy(&buf), line);
}

/// Nothing is written by the host for a while
async fn expect_silence(station: &mut DuplexStream) {
    let mut buf = [0u8; 64];
    let read = time::timeout(Duration::from_millis(100), station.read(&mut buf)).await;
    assert!(read.is_err(), "unexpected transmission");
}

#[tokio::test(start_paused = true)]
async fn test_set_aux_relay_timer_on() {
    let (ema, mut station, _task) = start();
    let reply = ema
        .enqueue(commands::set_aux_relay_mode(AuxRelayMode::TimerOn).unwrap(), None)
        .unwrap();

    expect_line(&mut station, "(S009)").await;
    station.write_all(b"(S009)\r\n").await.unwrap();
    station
        .write_all(b"(12:34:56 20/06/2016 Timer ON)\r\n")
        .await
        .unwrap();

    assert_eq!(reply.await.unwrap().unwrap(), Value::Text("Timer/On".into()));
}

#[tokio::test(start_paused = true)]
async fn test_aux_relay_settings_use_one_exchange() {
    let (ema, mut station, _task) = start();
    let device = Station::new(ema);
    let pending = tokio::spawn(async move { device.aux_relay_settings().await });

    expect_line(&mut station, "(s)").await;
    station
        .write_all(b"(S005)(Son0930)(Sof2300)")
        .await
        .unwrap();

    assert_eq!(
        pending.await.unwrap().unwrap(),
        Value::AuxRelay(AuxRelaySettings {
            mode: "Open".into(),
            switch_on: chrono::NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            switch_off: chrono::NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
        })
    );
    expect_silence(&mut station).await;
}

#[tokio::test(start_paused = true)]
async fn test_station_rejects_out_of_range_setting() {
    let (ema, mut station, _task) = start();
    let device = Station::new(ema);

    let error = device
        .setting(Setting::RainThreshold)
        .set(-5.0)
        .await
        .unwrap_err();
    assert!(matches!(*error, ProtocolError::Range { .. }));
    expect_silence(&mut station).await;
}

#[tokio::test(start_paused = true)]
async fn test_get_photometer_threshold() {
    let (ema, mut station, _task) = start();
    let reply = ema
        .enqueue(commands::get(Setting::PhotometerThreshold).unwrap(), None)
        .unwrap();

    expect_line(&mut station, "(i)").await;
    station.write_all(b"(I105)(I+00)(I00100)").await.unwrap();

    let value = reply.await.unwrap().unwrap();
    assert_relative_eq!(value.as_f64().unwrap(), 10.5);
}

#[tokio::test(start_paused = true)]
async fn test_single_command_in_flight() {
    let (ema, mut station, _task) = start();
    let first = ema
        .enqueue(commands::get(Setting::AnemometerThreshold).unwrap(), None)
        .unwrap();
    let second = ema
        .enqueue(commands::get(Setting::RainThreshold).unwrap(), None)
        .unwrap();

    expect_line(&mut station, "(w)").await;
    expect_silence(&mut station).await;

    station.write_all(b"(W020)").await.unwrap();
    assert_eq!(first.await.unwrap().unwrap(), Value::Number(20.0));

    expect_line(&mut station, "(l)").await;
    station.write_all(b"(L035)").await.unwrap();
    assert_eq!(second.await.unwrap().unwrap(), Value::Number(35.0));
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_advances_queue() {
    let (ema, mut station, _task) = start();
    let started = Instant::now();
    let failing = ema
        .enqueue(commands::get(Setting::CloudGain).unwrap(), Some(2))
        .unwrap();
    let next = ema.enqueue(commands::ping().unwrap(), None).unwrap();

    // Initial transmission plus two retries, 2 s then 4 s apart
    for _ in 0..3 {
        expect_line(&mut station, "(r)").await;
    }
    match failing.await.unwrap() {
        Err(ProtocolError::Timeout { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert!(started.elapsed() >= Duration::from_secs(14));

    expect_line(&mut station, "( )").await;
    station.write_all(b"( )").await.unwrap();
    assert_eq!(next.await.unwrap().unwrap(), Value::Ack);
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume() {
    let (ema, mut station, _task) = start();
    ema.pause().unwrap();
    let first = ema
        .enqueue(commands::get(Setting::AnemometerThreshold).unwrap(), None)
        .unwrap();
    let _second = ema
        .enqueue(commands::get(Setting::RainThreshold).unwrap(), None)
        .unwrap();
    expect_silence(&mut station).await;

    ema.resume().unwrap();
    expect_line(&mut station, "(w)").await;
    expect_silence(&mut station).await;

    station.write_all(b"(W010)").await.unwrap();
    assert_eq!(first.await.unwrap().unwrap(), Value::Number(10.0));
    expect_line(&mut station, "(l)").await;
}

#[tokio::test(start_paused = true)]
async fn test_status_callbacks() {
    let (ema, mut station, _task) = start();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let first = tx.clone();
    let id = ema
        .add_status_callback(move |event| {
            let _ = first.send(("first", event.clone()));
        })
        .unwrap();
    ema.add_status_callback(move |event| {
        let _ = tx.send(("second", event.clone()));
    })
    .unwrap();

    let before = chrono::Utc::now();
    station.write_all(STATUS.as_bytes()).await.unwrap();

    let (name, event) = rx.recv().await.unwrap();
    assert_eq!(name, "first");
    assert_eq!(event.page, 123);
    assert_eq!(event.record.roof_relay, 'C');
    assert_relative_eq!(event.record.voltage, 8.0);
    assert_relative_eq!(event.record.photometer_frequency, 12340.0);
    assert!(event.timestamp >= before + chrono::Duration::milliseconds(500));
    assert_eq!(rx.recv().await.unwrap().0, "second");

    ema.remove_status_callback(id).unwrap();
    station.write_all(STATUS.as_bytes()).await.unwrap();
    assert_eq!(rx.recv().await.unwrap().0, "second");
}

#[tokio::test(start_paused = true)]
async fn test_photometer_reading_holds_traffic() {
    let (ema, mut station, _task) = start();
    let (tx, mut rx) = mpsc::unbounded_channel();
    ema.add_photometer_callback(move |event| {
        let _ = tx.send(event.clone());
    })
    .unwrap();

    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    ema.add_status_callback(move |event| {
        let _ = status_tx.send(event.page);
    })
    .unwrap();

    station.write_all(b"(mv:begin)").await.unwrap();
    // Status traffic is still processed while paused
    station.write_all(STATUS.as_bytes()).await.unwrap();
    assert_eq!(status_rx.recv().await, Some(123));

    let reply = ema
        .enqueue(commands::get(Setting::AnemometerThreshold).unwrap(), None)
        .unwrap();
    expect_silence(&mut station).await;

    station.write_all(b"(mv:31234)").await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_relative_eq!(event.frequency, 1234.0);
    assert_relative_eq!(event.magnitude, magnitude(1234.0));

    expect_line(&mut station, "(w)").await;
    station.write_all(b"(W020)").await.unwrap();
    assert_eq!(reply.await.unwrap().unwrap(), Value::Number(20.0));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_frames_are_dropped() {
    let (ema, mut station, _task) = start();
    let reply = ema
        .enqueue(commands::get(Setting::AnemometerThreshold).unwrap(), None)
        .unwrap();
    expect_line(&mut station, "(w)").await;
    station
        .write_all(b"(T+215-034)(??garbage)(12:00:00 20/06/2016 Datalogger ok)(W020)")
        .await
        .unwrap();
    assert_eq!(reply.await.unwrap().unwrap(), Value::Number(20.0));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_fails_pending_commands() {
    let (ema, mut station, task) = start();
    let reply = ema.enqueue(commands::ping().unwrap(), None).unwrap();
    expect_line(&mut station, "( )").await;

    ema.shutdown();
    assert!(matches!(
        reply.await.unwrap(),
        Err(ProtocolError::Disconnected)
    ));
    assert!(task.await.unwrap().is_ok());
    assert!(matches!(
        ema.execute(commands::ping().unwrap()).await,
        Err(ProtocolError::Disconnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_station_hangup_stops_engine() {
    let (ema, station, task) = start();
    drop(station);
    assert!(task.await.unwrap().is_ok());
    assert!(!ema.is_running());
    assert!(matches!(
        ema.execute_with_retries(commands::ping().unwrap(), 0).await,
        Err(ProtocolError::Disconnected)
    ));
}
