// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Command line client for EMA weather stations
use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, NaiveTime};
use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpStream;

use rust_ema::config::{output_config_schema, Config};
use rust_ema::device::{DumpFilter, Station};
use rust_ema::protocol::bulk::DumpKind;
use rust_ema::protocol::command::DATETIME_FORMAT;
use rust_ema::protocol::commands::{AuxRelayMode, RoofRelayMode, Setting};
use rust_ema::protocol::{ProtocolEngine, Value};

/// Talk to an EMA weather station through its serial-to-TCP bridge
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML), created with defaults if missing
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Bridge address, overrides the configuration
    #[arg(short, long)]
    address: Option<String>,

    /// Bridge port, overrides the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    show_config_schema: bool,

    #[command(subcommand)]
    command: Option<Action>,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Log status and photometer broadcasts until interrupted (default)
    Monitor {
        /// Watchdog keep-alive period in seconds, 0 disables it
        #[arg(long, default_value_t = 60)]
        ping: u64,
    },
    /// Read a numeric setting, e.g. photometer-threshold
    Get { setting: Setting },
    /// Write a numeric setting in physical units
    Set {
        setting: Setting,
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },
    /// Command the roof relay: Closed, Auto or Open
    Roof { mode: RoofRelayMode },
    /// Read the aux relay mode and switch times, or set the mode
    Aux { mode: Option<AuxRelayMode> },
    /// Set the aux relay switch times (HH:MM)
    AuxTimes {
        #[arg(long, value_parser = parse_hour_minute)]
        on: Option<NaiveTime>,
        #[arg(long, value_parser = parse_hour_minute)]
        off: Option<NaiveTime>,
    },
    /// Read the station clock, or set it to the host local time
    Clock {
        #[arg(long)]
        sync: bool,
    },
    /// Download the onboard history as JSON
    Dump {
        #[arg(value_enum)]
        kind: DumpArg,
        /// Only entries newer than this "HH:MM:SS DD/MM/YYYY" timestamp
        #[arg(long)]
        since: Option<String>,
        /// Extra history kept before --since, in percent of the record period
        #[arg(long, default_value_t = 0)]
        overlap: u32,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DumpArg {
    MinMax,
    Averages,
}

impl From<DumpArg> for DumpKind {
    fn from(arg: DumpArg) -> Self {
        match arg {
            DumpArg::MinMax => DumpKind::DailyMinMax,
            DumpArg::Averages => DumpKind::FiveMinuteAverages,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.show_config_schema {
        return output_config_schema();
    }

    let mut config = Config::from_file(&args.config)?;
    config.apply_args(args.address.clone(), args.port, args.verbose);

    env_logger::init_from_env(
        env_logger::Env::default()
            .filter_or(env_logger::DEFAULT_FILTER_ENV, &config.logging.level),
    );

    let endpoint = config.connection.endpoint();
    info!("Connecting to station bridge at {}", endpoint);
    let stream = TcpStream::connect(&endpoint)
        .await
        .with_context(|| format!("Failed to connect to {}", endpoint))?;
    let (reader, writer) = stream.into_split();
    let (protocol, engine) =
        ProtocolEngine::spawn(reader, writer, config.protocol.engine_settings());
    let station = Station::new(protocol.clone());

    let outcome = run(&station, args.command.unwrap_or(Action::Monitor { ping: 60 })).await;

    protocol.shutdown();
    match engine.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Protocol engine stopped with an error: {}", e),
        Err(e) => error!("Protocol engine task panicked: {}", e),
    }
    outcome
}

async fn run(station: &Station, action: Action) -> Result<()> {
    match action {
        Action::Monitor { ping } => monitor(station, ping).await,
        Action::Get { setting } => {
            let value = station.setting(setting).get().await?;
            print_json(&value)
        }
        Action::Set { setting, value } => {
            let stored = station.setting(setting).set(value).await?;
            print_json(&stored)
        }
        Action::Roof { mode } => print_json(&station.set_roof_relay_mode(mode).await?),
        Action::Aux { mode: Some(mode) } => print_json(&station.aux_relay_mode().set(mode).await?),
        Action::Aux { mode: None } => print_json(&station.aux_relay_settings().await?),
        Action::AuxTimes { on, off } => {
            if let Some(on) = on {
                print_json(&station.aux_switch_on_time().set(on).await?)?;
            }
            if let Some(off) = off {
                print_json(&station.aux_switch_off_time().set(off).await?)?;
            }
            Ok(())
        }
        Action::Clock { sync: true } => {
            let now = Local::now().naive_local();
            print_json(&station.clock().set(now).await?)
        }
        Action::Clock { sync: false } => print_json(&station.clock().get().await?),
        Action::Dump {
            kind,
            since,
            overlap,
        } => {
            let last_seen = since
                .map(|s| NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT))
                .transpose()
                .context("--since expects \"HH:MM:SS DD/MM/YYYY\"")?;
            let kind = DumpKind::from(kind);
            let filter = DumpFilter::for_kind(kind, overlap);
            let dump = match kind {
                DumpKind::DailyMinMax => station.daily_min_max().await?,
                DumpKind::FiveMinuteAverages => station.five_minute_averages().await?,
            };
            match dump {
                Value::MinMax(entries) => print_json(&filter.filter(&entries, last_seen)),
                Value::Averages(entries) => print_json(&filter.filter(&entries, last_seen)),
                other => print_json(&other),
            }
        }
    }
}

/// Log broadcasts and keep the station watchdog fed until Ctrl-C
async fn monitor(station: &Station, ping: u64) -> Result<()> {
    let protocol = station.protocol();
    protocol.add_status_callback(|event| {
        info!(
            "Status page {} at {}: roof {}, aux {}, {:.1} °C, {:.1} %RH, {:.1} hPa",
            event.page,
            event.timestamp,
            event.record.roof_relay_name(),
            event.record.aux_relay_name(),
            event.record.temperature,
            event.record.humidity,
            event.record.cal_pressure
        )
    })?;
    protocol.add_photometer_callback(|event| {
        info!(
            "Photometer {:.3} Hz, {:.2} mag/arcsec²",
            event.frequency, event.magnitude
        )
    })?;

    let mut keepalive = tokio::time::interval(Duration::from_secs(ping.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, disconnecting");
                return Ok(());
            }
            _ = keepalive.tick(), if ping > 0 => {
                if let Err(e) = station.ping().await {
                    warn!("Watchdog keep-alive failed: {}", e);
                }
            }
        }
        if !protocol.is_running() {
            anyhow::bail!("Connection to the station was lost");
        }
    }
}

fn parse_hour_minute(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(s, "%H:%M")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
