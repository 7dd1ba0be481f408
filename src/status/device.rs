use serde::{Deserialize, Serialize};

use crate::status::{signal_map, Signal, StatusError};
use crate::tedapi::{Din, Gateway, Query, Transport};

/// Most MPPT slots a single device reports.
pub const MAX_MPPT: usize = 6;

/// Status of one battery device, plus its inverter when it has one.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct DeviceStatus {
    /// Wh
    pub battery_energy: i64,
    /// Wh
    pub battery_full_energy: i64,
    pub power_battery: f64,
    pub power_solar: f64,
    pub freq: f64,
    pub voltage: f64,
    pub mppt: Vec<MpptStatus>,
}

#[derive(Serialize, Debug, Copy, Clone, Default, PartialEq)]
pub struct MpptStatus {
    pub current: f64,
    pub voltage: f64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct ComponentsResponse {
    components: Components,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Components {
    bms: Vec<Component>,
    pch: Vec<Component>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Component {
    signals: Vec<Signal>,
}

impl DeviceStatus {
    pub fn from_payload(payload: &[u8]) -> Result<DeviceStatus, StatusError> {
        let rsp: ComponentsResponse = serde_json::from_slice(payload)?;
        let components = rsp.components;

        let bms = components.bms.first().ok_or(StatusError::MissingBms)?;
        let bms = signal_map(&bms.signals);
        let (energy, full) = match (
            bms.get("BMS_nominalEnergyRemaining"),
            bms.get("BMS_nominalFullPackEnergy"),
        ) {
            (Some(e), Some(f)) => (*e, *f),
            _ => return Err(StatusError::MissingEnergy),
        };

        // reported in kWh
        let mut status = DeviceStatus {
            battery_energy: (energy * 1000.0) as i64,
            battery_full_energy: (full * 1000.0) as i64,
            ..Default::default()
        };

        match components.pch.as_slice() {
            [] => {}
            [pch] => {
                let pch = signal_map(&pch.signals);
                let get = |name: &str| pch.get(name).copied();

                status.power_solar = get("PCH_SlowPvPowerSum").unwrap_or(0.0);
                status.power_battery = get("PCH_BatteryPower").unwrap_or(0.0);
                status.freq = get("PCH_AcFrequency").unwrap_or(0.0);
                status.voltage = get("PCH_AcVoltageAB").unwrap_or(0.0);

                // Sold as three MPPTs in some markets but reported as pairs
                // doing half duty, so scan every lettered slot.
                for slot in ('A'..='Z').take(MAX_MPPT) {
                    let current = get(&format!("PCH_PvCurrent{}", slot));
                    let voltage = get(&format!("PCH_PvVoltage{}", slot));
                    if current.is_none() && voltage.is_none() {
                        break;
                    }
                    status.mppt.push(MpptStatus {
                        current: current.unwrap_or(0.0),
                        voltage: voltage.unwrap_or(0.0),
                    });
                }
            }
            many => return Err(StatusError::MultiplePch(many.len())),
        }

        Ok(status)
    }

    /// Percent charge, 0 when the pack size is unknown.
    pub fn charge_percent(&self) -> f64 {
        if self.battery_full_energy <= 0 {
            return 0.0;
        }
        self.battery_energy as f64 / self.battery_full_energy as f64 * 100.0
    }
}

/// Runs the components query against one device and decodes it.
pub async fn fetch<T: Transport>(
    gw: &Gateway<T>,
    query: &Query,
    din: &Din,
) -> Result<DeviceStatus, StatusError> {
    let payload = gw.query_device(query, din.clone()).await?;
    DeviceStatus::from_payload(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(pch: &str) -> String {
        format!(
            r#"{{"components": {{
                "bms": [{{"activeAlerts": [], "signals": [
                    {{"name": "BMS_nominalEnergyRemaining", "value": 6.25}},
                    {{"name": "BMS_nominalFullPackEnergy", "value": 13.5}},
                    {{"name": "BMS_isCharging", "value": null}}
                ]}}],
                "pch": {}
            }}}}"#,
            pch
        )
    }

    #[test]
    fn battery_only() {
        let s = DeviceStatus::from_payload(components("[]").as_bytes()).unwrap();
        assert_eq!(s.battery_energy, 6250);
        assert_eq!(s.battery_full_energy, 13500);
        assert!(s.mppt.is_empty());
        assert_eq!(s.power_solar, 0.0);
        assert!((s.charge_percent() - 46.296).abs() < 0.001);
        assert_eq!(DeviceStatus::default().charge_percent(), 0.0);
    }

    #[test]
    fn mppt_scan_stops_at_first_gap() {
        let pch = r#"[{"signals": [
            {"name": "PCH_SlowPvPowerSum", "value": 3120.0},
            {"name": "PCH_BatteryPower", "value": -1500.0},
            {"name": "PCH_AcFrequency", "value": 50.0},
            {"name": "PCH_AcVoltageAB", "value": 240.1},
            {"name": "PCH_PvCurrentA", "value": 4.0},
            {"name": "PCH_PvVoltageA", "value": 390.0},
            {"name": "PCH_PvCurrentB", "value": 0.0},
            {"name": "PCH_PvVoltageB", "value": 12.5},
            {"name": "PCH_PvVoltageC", "value": 3.0},
            {"name": "PCH_PvCurrentE", "value": 9.0},
            {"name": "PCH_PvVoltageE", "value": 400.0}
        ]}]"#;
        let s = DeviceStatus::from_payload(components(pch).as_bytes()).unwrap();
        assert_eq!(s.power_solar, 3120.0);
        assert_eq!(s.power_battery, -1500.0);
        assert_eq!(s.voltage, 240.1);
        assert_eq!(
            s.mppt,
            vec![
                MpptStatus { current: 4.0, voltage: 390.0 },
                MpptStatus { current: 0.0, voltage: 12.5 },
                MpptStatus { current: 0.0, voltage: 3.0 },
            ]
        );
    }

    #[test]
    fn no_bms() {
        let err = DeviceStatus::from_payload(br#"{"components":{"bms":[]}}"#).unwrap_err();
        assert!(matches!(err, StatusError::MissingBms));
    }

    #[test]
    fn no_energy_signals() {
        let err = DeviceStatus::from_payload(
            br#"{"components":{"bms":[{"signals":[{"name":"BMS_nominalFullPackEnergy","value":13.5}]}]}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, StatusError::MissingEnergy));
    }

    #[test]
    fn multiple_pch() {
        let err = DeviceStatus::from_payload(components(r#"[{"signals":[]},{"signals":[]}]"#).as_bytes())
            .unwrap_err();
        assert!(matches!(err, StatusError::MultiplePch(2)));
    }
}
