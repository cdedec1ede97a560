// src/controller/alerts.rs
//! Edge detection for the alert bits raised from polled state.

use cinet_protocol::{AlertMask, PositionFix};

use crate::config::Settings;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in metres.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dp = (lat2 - lat1).to_radians();
    let dl = (lon2 - lon1).to_radians();
    let a = (dp / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

pub struct AlertInputs<'a> {
    pub battery_pct: u8,
    pub external_power: bool,
    pub fix: &'a PositionFix,
    pub tamper: bool,
    pub input_changes: usize,
}

/// Remembers the previous level of each polled condition. The first
/// observation of a level never raises an edge.
#[derive(Debug, Default, Clone)]
pub struct AlertMonitor {
    low_battery: bool,
    external_power: Option<bool>,
    inside_fence: Option<bool>,
}

impl AlertMonitor {
    pub fn inside_geofence(&self) -> Option<bool> {
        self.inside_fence
    }

    pub fn evaluate(&mut self, inputs: &AlertInputs<'_>, settings: &Settings) -> AlertMask {
        let mut raised = AlertMask::empty();

        let low = inputs.battery_pct <= settings.low_battery_threshold;
        if low && !self.low_battery && settings.alert_low_battery {
            raised |= AlertMask::LOW_BATTERY;
        }
        self.low_battery = low;

        if let Some(prev) = self.external_power.replace(inputs.external_power) {
            if settings.alert_external_power {
                match (prev, inputs.external_power) {
                    (true, false) => raised |= AlertMask::POWER_LOST,
                    (false, true) => raised |= AlertMask::POWER_RESTORED,
                    _ => {}
                }
            }
        }

        if inputs.input_changes > 0 && settings.alert_input_change {
            raised |= AlertMask::INPUT_CHANGE;
        }
        if inputs.tamper && settings.tamper_alerts {
            raised |= AlertMask::TAMPER;
        }

        if settings.geofence_enabled && inputs.fix.valid {
            let d = haversine_m(
                inputs.fix.latitude,
                inputs.fix.longitude,
                settings.geofence_lat,
                settings.geofence_lon,
            );
            let inside = d <= settings.geofence_radius_m;
            match self.inside_fence.replace(inside) {
                Some(false) if inside => raised |= AlertMask::GEOFENCE_ENTER,
                Some(true) if !inside => raised |= AlertMask::GEOFENCE_EXIT,
                _ => {}
            }
        }

        raised
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(lat: f64, lon: f64) -> PositionFix {
        PositionFix { latitude: lat, longitude: lon, valid: true, ..PositionFix::default() }
    }

    fn inputs(fix: &PositionFix) -> AlertInputs<'_> {
        AlertInputs { battery_pct: 80, external_power: true, fix, tamper: false, input_changes: 0 }
    }

    #[test]
    fn haversine_known_distance() {
        // one degree of latitude
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 10.0);
        assert_eq!(haversine_m(53.8, -1.6, 53.8, -1.6), 0.0);
    }

    #[test]
    fn low_battery_raises_on_falling_edge_only() {
        let s = Settings::default();
        let fix = PositionFix::default();
        let mut m = AlertMonitor::default();
        let mut i = inputs(&fix);

        assert_eq!(m.evaluate(&i, &s), AlertMask::empty());
        i.battery_pct = 19;
        assert_eq!(m.evaluate(&i, &s), AlertMask::LOW_BATTERY);
        assert_eq!(m.evaluate(&i, &s), AlertMask::empty());
        i.battery_pct = 50;
        m.evaluate(&i, &s);
        i.battery_pct = 20;
        assert_eq!(m.evaluate(&i, &s), AlertMask::LOW_BATTERY);
    }

    #[test]
    fn external_power_edges() {
        let s = Settings::default();
        let fix = PositionFix::default();
        let mut m = AlertMonitor::default();
        let mut i = inputs(&fix);

        assert_eq!(m.evaluate(&i, &s), AlertMask::empty());
        i.external_power = false;
        assert_eq!(m.evaluate(&i, &s), AlertMask::POWER_LOST);
        i.external_power = true;
        assert_eq!(m.evaluate(&i, &s), AlertMask::POWER_RESTORED);
    }

    #[test]
    fn disabled_alerts_stay_quiet() {
        let s = Settings {
            tamper_alerts: false,
            alert_input_change: false,
            ..Settings::default()
        };
        let fix = PositionFix::default();
        let mut m = AlertMonitor::default();
        let mut i = inputs(&fix);
        i.tamper = true;
        i.input_changes = 3;
        assert_eq!(m.evaluate(&i, &s), AlertMask::empty());

        let s = Settings::default();
        assert_eq!(m.evaluate(&i, &s), AlertMask::TAMPER | AlertMask::INPUT_CHANGE);
    }

    #[test]
    fn geofence_enter_and_exit() {
        let s = Settings {
            geofence_enabled: true,
            geofence_lat: 53.8272,
            geofence_lon: -1.6647,
            geofence_radius_m: 500.0,
            ..Settings::default()
        };
        let mut m = AlertMonitor::default();

        let far = at(53.9, -1.6647);
        assert_eq!(m.evaluate(&inputs(&far), &s), AlertMask::empty());
        assert_eq!(m.inside_geofence(), Some(false));

        let near = at(53.8280, -1.6650);
        assert_eq!(m.evaluate(&inputs(&near), &s), AlertMask::GEOFENCE_ENTER);
        assert_eq!(m.evaluate(&inputs(&near), &s), AlertMask::empty());
        assert_eq!(m.evaluate(&inputs(&far), &s), AlertMask::GEOFENCE_EXIT);

        // invalid fixes do not move the fence state
        let lost = PositionFix::default();
        assert_eq!(m.evaluate(&inputs(&lost), &s), AlertMask::empty());
        assert_eq!(m.inside_geofence(), Some(false));
    }
}
