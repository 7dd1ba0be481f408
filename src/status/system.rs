use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::status::StatusError;
use crate::tedapi::{Din, Gateway, Query, Transport};

/// Aggregate status reported by the leader.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SystemStatus {
    pub leader: Din,
    pub shutdown: bool,
    pub island: bool,
    /// Wh
    pub battery_energy: i64,
    /// Wh
    pub battery_full_energy: i64,
    pub power_battery: f64,
    pub power_site: f64,
    pub power_load: f64,
    pub power_solar: f64,
    pub power_solar_rgm: f64,
    pub power_generator: f64,
    pub power_conductor: f64,
    pub battery_blocks: Vec<Din>,
    pub phase: [Phase; 3],
}

#[derive(Serialize, Debug, Copy, Clone, Default, PartialEq)]
pub struct Phase {
    pub freq_load: f64,
    pub freq_main: f64,
    pub voltage_load: f64,
    pub voltage_main: f64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct StatusResponse {
    control: Control,
    es_can: EsCan,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Control {
    battery_blocks: Vec<BatteryBlock>,
    islanding: Islanding,
    meter_aggregates: Vec<MeterAggregate>,
    site_shutdown: SiteShutdown,
    system_status: EnergyStatus,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct BatteryBlock {
    din: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Islanding {
    contactor_closed: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct MeterAggregate {
    location: String,
    real_power_w: f64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SiteShutdown {
    #[serde(rename = "isShutDown")]
    is_shutdown: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct EnergyStatus {
    // usually whole numbers, occasionally with float noise
    nominal_energy_remaining_wh: f64,
    nominal_full_pack_energy_wh: f64,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct EsCan {
    bus: Bus,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Bus {
    #[serde(rename = "ISLANDER")]
    islander: Islander,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Islander {
    #[serde(rename = "ISLAND_AcMeasurements")]
    ac_measurements: HashMap<String, serde_json::Value>,
}

impl SystemStatus {
    pub fn from_payload(leader: Din, payload: &[u8]) -> Result<SystemStatus, StatusError> {
        let rsp: StatusResponse = serde_json::from_slice(payload)?;
        let control = &rsp.control;

        let power_for = |location: &str| {
            control
                .meter_aggregates
                .iter()
                .find(|m| m.location == location)
                .map(|m| m.real_power_w)
                .unwrap_or(0.0)
        };

        let ac = &rsp.es_can.bus.islander.ac_measurements;
        let float_for = |name: String| ac.get(&name).and_then(|v| v.as_f64()).unwrap_or(0.0);

        let mut phase = [Phase::default(); 3];
        for (i, p) in phase.iter_mut().enumerate() {
            let n = i + 1;
            *p = Phase {
                freq_load: float_for(format!("ISLAND_FreqL{}_Load", n)),
                freq_main: float_for(format!("ISLAND_FreqL{}_Main", n)),
                voltage_load: float_for(format!("ISLAND_VL{}N_Load", n)),
                voltage_main: float_for(format!("ISLAND_VL{}N_Main", n)),
            };
        }

        Ok(SystemStatus {
            leader,
            shutdown: control.site_shutdown.is_shutdown,
            island: !control.islanding.contactor_closed,
            battery_energy: control.system_status.nominal_energy_remaining_wh as i64,
            battery_full_energy: control.system_status.nominal_full_pack_energy_wh as i64,
            power_battery: power_for("BATTERY"),
            power_site: power_for("SITE"),
            power_load: power_for("LOAD"),
            power_solar: power_for("SOLAR"),
            power_solar_rgm: power_for("SOLAR_RGM"),
            power_generator: power_for("GENERATOR"),
            power_conductor: power_for("CONDUCTOR"),
            battery_blocks: control
                .battery_blocks
                .iter()
                .map(|b| Din::new(b.din.clone()))
                .collect(),
            phase,
        })
    }

    /// Percent charge, 0 when the pack size is unknown.
    pub fn charge_percent(&self) -> f64 {
        if self.battery_full_energy <= 0 {
            return 0.0;
        }
        self.battery_energy as f64 / self.battery_full_energy as f64 * 100.0
    }
}

/// Runs the leader status query and decodes it.
pub async fn fetch<T: Transport>(gw: &Gateway<T>, query: &Query) -> Result<SystemStatus, StatusError> {
    let payload = gw.query(query).await?;
    let leader = gw.leader_din().await?;
    SystemStatus::from_payload(leader, &payload)
}
