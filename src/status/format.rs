use std::fmt::{Display, Formatter};

use chrono::Duration;

use crate::status::device::MpptStatus;

pub fn format_power_table(watts: f64) -> String {
    if watts.abs() <= 10.0 {
        return "     - kW".to_owned();
    }
    format!("{:6.2} kW", watts / 1000.0)
}

impl MpptStatus {
    pub fn power(&self) -> f64 {
        self.current * self.voltage
    }

    pub fn format_power(&self) -> String {
        let w = self.power();
        if w < 1.0 {
            return "-".to_owned();
        }
        format!("{:.0}w", w)
    }
}

/// Where the battery is heading at the current rate.
#[derive(Debug, Clone, PartialEq)]
pub enum BatteryOutlook {
    Idle,
    /// Negative battery power means charging.
    Charging(Duration),
    Discharging(Duration),
}

impl BatteryOutlook {
    /// `energy`/`full` in Wh; rates at or below `min_watts` count as idle.
    pub fn from_status(power_battery: f64, energy: i64, full: i64, min_watts: f64) -> Self {
        if power_battery.abs() <= min_watts {
            return BatteryOutlook::Idle;
        }
        if power_battery < 0.0 {
            let missing = (full - energy).max(0) as f64;
            BatteryOutlook::Charging(hours(missing / -power_battery))
        } else {
            BatteryOutlook::Discharging(hours(energy.max(0) as f64 / power_battery))
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            BatteryOutlook::Idle => "",
            BatteryOutlook::Charging(_) => " (charging)",
            BatteryOutlook::Discharging(_) => " (discharging)",
        }
    }
}

fn hours(h: f64) -> Duration {
    Duration::seconds((h * 3600.0).round() as i64)
}

fn fmt_duration(d: &Duration) -> String {
    let secs = d.num_seconds();
    format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

impl Display for BatteryOutlook {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BatteryOutlook::Idle => write!(f, "effectively idle"),
            BatteryOutlook::Charging(d) => write!(f, "{} until full", fmt_duration(d)),
            BatteryOutlook::Discharging(d) => write!(f, "{} until empty", fmt_duration(d)),
        }
    }
}
