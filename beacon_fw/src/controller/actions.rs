// src/controller/actions.rs
use cinet_protocol::OperatingMode;
use tracing::{info, warn};

use super::{Controller, Restart, State, WAKE_COMMAND};
use crate::commands::ControlAction;
use crate::config::RfMode;

impl Controller {
    /// Apply one remote action. Settings changes are persisted immediately;
    /// failures to do so are logged and otherwise ignored.
    pub fn apply(&mut self, action: ControlAction) {
        info!(?action, state = ?self.state, "control action");
        match action {
            ControlAction::SetMode { mode } => {
                self.settings.mode = mode;
                self.wake_trigger = WAKE_COMMAND;
                let next = match mode {
                    OperatingMode::Standby | OperatingMode::ForeverStandby => State::Standby,
                    OperatingMode::Hibernate => State::Hibernate,
                    OperatingMode::Active | OperatingMode::Continuous | OperatingMode::Logging => {
                        State::AcquireFix
                    }
                };
                self.enter(next);
                self.persist();
            }
            ControlAction::ResetToDefaults => {
                // back to normal reporting; key and tuning stay as configured
                self.settings.mode = OperatingMode::Active;
                self.settings.rf_mode = RfMode::Auto;
                self.degraded_since = None;
                self.retry_count = 0;
                self.enter(State::AcquireFix);
                self.persist();
            }
            ControlAction::SetRf { rf } => {
                self.settings.rf_mode = rf;
                if rf != RfMode::Off {
                    self.degraded_since = None;
                }
                self.persist();
            }
            ControlAction::RequestStatus => {
                self.pending.status = true;
                self.wake_trigger = WAKE_COMMAND;
                if matches!(self.state, State::Standby | State::Hibernate | State::Sleep) {
                    self.enter(State::AcquireFix);
                }
            }
            ControlAction::RequestLocate => {
                self.pending.locate = true;
                self.wake_trigger = WAKE_COMMAND;
                self.enter(State::AcquireFix);
            }
            ControlAction::RequestLogUpload => self.pending.log_upload = true,
            ControlAction::RequestReboot => self.restart = Some(Restart::Reboot),
            ControlAction::SetOutput { on } => {
                if let Some(io) = self.dev.io.as_mut() {
                    io.set_output(on);
                }
                self.settings.output_default_state = on;
                self.persist();
            }
            ControlAction::SetTamperAlerts { on } => {
                self.settings.tamper_alerts = on;
                self.persist();
            }
            ControlAction::SetReportingRate { rate, seconds } => {
                let stored = self.settings.set_rate(rate, seconds);
                if stored != seconds {
                    warn!(?rate, requested = seconds, stored, "reporting rate clamped");
                }
                self.persist();
            }
            ControlAction::EraseLog => {
                if let Some(store) = self.dev.log_store.as_mut() {
                    match store.erase() {
                        Ok(()) => info!("log erased"),
                        Err(e) => warn!(%e, "log erase failed"),
                    }
                }
            }
        }
    }
}
