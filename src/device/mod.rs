// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-ema project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Station facade
//!
//! [`Station`] groups the parameters of one EMA station behind a single
//! engine handle. Parameters live as long as the station so concurrent
//! callers of the same parameter share their exchanges.

pub mod dump_filter;
pub mod parameter;

pub use dump_filter::{DumpFilter, Timestamped};
pub use parameter::{Parameter, ParameterState, SharedResult};

use chrono::{NaiveDateTime, NaiveTime};
use std::collections::HashMap;

use crate::protocol::commands::{self, AnemometerModel, AuxRelayMode, RoofRelayMode, Setting};
use crate::protocol::{EmaProtocol, ProtocolError, Value};

pub struct Station {
    protocol: EmaProtocol,
    settings: HashMap<Setting, Parameter<f64>>,
    aux_relay_mode: Parameter<AuxRelayMode>,
    aux_switch_on: Parameter<NaiveTime>,
    aux_switch_off: Parameter<NaiveTime>,
    anemometer_model: Parameter<AnemometerModel>,
    clock: Parameter<NaiveDateTime>,
}

impl Station {
    pub fn new(protocol: EmaProtocol) -> Self {
        let settings = Setting::ALL
            .into_iter()
            .map(|setting| {
                let parameter = Parameter::new(
                    setting.name(),
                    protocol.clone(),
                    move || commands::get(setting),
                    move |value| commands::set(setting, value),
                );
                (setting, parameter)
            })
            .collect();

        Self {
            settings,
            aux_relay_mode: Parameter::new(
                "aux relay mode",
                protocol.clone(),
                commands::get_aux_relay_mode,
                commands::set_aux_relay_mode,
            ),
            aux_switch_on: Parameter::new(
                "aux relay switch-on time",
                protocol.clone(),
                commands::get_aux_switch_on_time,
                commands::set_aux_switch_on_time,
            ),
            aux_switch_off: Parameter::new(
                "aux relay switch-off time",
                protocol.clone(),
                commands::get_aux_switch_off_time,
                commands::set_aux_switch_off_time,
            ),
            anemometer_model: Parameter::new(
                "anemometer model",
                protocol.clone(),
                commands::get_anemometer_model,
                commands::set_anemometer_model,
            ),
            clock: Parameter::new(
                "real time clock",
                protocol.clone(),
                commands::get_rtc,
                commands::set_rtc,
            ),
            protocol,
        }
    }

    pub fn protocol(&self) -> &EmaProtocol {
        &self.protocol
    }

    /// Numeric setting accessor
    pub fn setting(&self, setting: Setting) -> &Parameter<f64> {
        // Populated from Setting::ALL
        &self.settings[&setting]
    }

    pub fn aux_relay_mode(&self) -> &Parameter<AuxRelayMode> {
        &self.aux_relay_mode
    }

    pub fn aux_switch_on_time(&self) -> &Parameter<NaiveTime> {
        &self.aux_switch_on
    }

    pub fn aux_switch_off_time(&self) -> &Parameter<NaiveTime> {
        &self.aux_switch_off
    }

    pub fn anemometer_model(&self) -> &Parameter<AnemometerModel> {
        &self.anemometer_model
    }

    pub fn clock(&self) -> &Parameter<NaiveDateTime> {
        &self.clock
    }

    /// Aux relay mode and both switch times from a single `(s)` exchange
    pub async fn aux_relay_settings(&self) -> Result<Value, ProtocolError> {
        self.protocol.execute(commands::get_aux_relay()?).await
    }

    /// The roof relay cannot be read back, only commanded
    pub async fn set_roof_relay_mode(&self, mode: RoofRelayMode) -> Result<Value, ProtocolError> {
        self.protocol
            .execute(commands::set_roof_relay_mode(mode)?)
            .await
    }

    /// Watchdog keep-alive
    pub async fn ping(&self) -> Result<(), ProtocolError> {
        self.protocol.execute(commands::ping()?).await.map(|_| ())
    }

    pub async fn daily_min_max(&self) -> Result<Value, ProtocolError> {
        self.protocol.execute(commands::daily_min_max_dump()?).await
    }

    pub async fn five_minute_averages(&self) -> Result<Value, ProtocolError> {
        self.protocol
            .execute(commands::five_minute_averages_dump()?)
            .await
    }
}
