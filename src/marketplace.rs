//! Marketplace definitions and the peak-window classifier.
//!
//! Peak windows are expressed in each marketplace operator's local business
//! timezone as a fixed UTC offset. DST is deliberately ignored: windows are
//! coarse trading-hour bands used for reporting only, never for scheduling.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// A country-specific Amazon storefront.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Marketplace {
    Us,
    Ca,
    Mx,
    Uk,
    De,
    Fr,
    It,
    Es,
    Jp,
    Au,
}

impl Marketplace {
    pub const ALL: [Marketplace; 10] = [
        Marketplace::Us,
        Marketplace::Ca,
        Marketplace::Mx,
        Marketplace::Uk,
        Marketplace::De,
        Marketplace::Fr,
        Marketplace::It,
        Marketplace::Es,
        Marketplace::Jp,
        Marketplace::Au,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Marketplace::Us => "US",
            Marketplace::Ca => "CA",
            Marketplace::Mx => "MX",
            Marketplace::Uk => "UK",
            Marketplace::De => "DE",
            Marketplace::Fr => "FR",
            Marketplace::It => "IT",
            Marketplace::Es => "ES",
            Marketplace::Jp => "JP",
            Marketplace::Au => "AU",
        }
    }

    /// Fixed reference offset (whole hours east of UTC) of the marketplace
    /// operator's business timezone. All peak-hour arithmetic happens against
    /// this single clock.
    pub fn utc_offset_hours(&self) -> i32 {
        match self {
            Marketplace::Us => -8, // Pacific
            Marketplace::Ca => -5,
            Marketplace::Mx => -6,
            Marketplace::Uk => 0,
            Marketplace::De | Marketplace::Fr | Marketplace::It | Marketplace::Es => 1,
            Marketplace::Jp => 9,
            Marketplace::Au => 10,
        }
    }

    fn fixed_offset(&self) -> FixedOffset {
        // Offsets are constant and within +/-12h, so this cannot fail.
        FixedOffset::east_opt(self.utc_offset_hours() * 3600).unwrap()
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Marketplace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "US" => Ok(Marketplace::Us),
            "CA" => Ok(Marketplace::Ca),
            "MX" => Ok(Marketplace::Mx),
            "UK" | "GB" => Ok(Marketplace::Uk),
            "DE" => Ok(Marketplace::De),
            "FR" => Ok(Marketplace::Fr),
            "IT" => Ok(Marketplace::It),
            "ES" => Ok(Marketplace::Es),
            "JP" => Ok(Marketplace::Jp),
            "AU" => Ok(Marketplace::Au),
            other => Err(format!("unknown marketplace: {other}")),
        }
    }
}

/// An `[start, end)` window of marketplace-local hours, `0 <= start < end <= 24`.
pub type PeakWindow = (u8, u8);

/// Hour tally over a time range, used by the dashboard's reporting widgets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRangeStats {
    pub peak_hours: u64,
    pub off_peak_hours: u64,
    pub total_hours: u64,
}

#[derive(Deserialize)]
struct PeakScheduleFile {
    #[serde(default)]
    windows: HashMap<String, Vec<PeakWindow>>,
}

/// Per-marketplace peak trading windows.
///
/// Marketplaces without an entry are treated as entirely off-peak.
#[derive(Clone, Debug)]
pub struct PeakSchedule {
    windows: HashMap<Marketplace, Vec<PeakWindow>>,
}

impl Default for PeakSchedule {
    fn default() -> Self {
        let mut windows = HashMap::new();
        windows.insert(Marketplace::Us, vec![(9, 12), (18, 23)]);
        windows.insert(Marketplace::Ca, vec![(9, 12), (18, 23)]);
        windows.insert(Marketplace::Uk, vec![(8, 11), (19, 22)]);
        windows.insert(Marketplace::De, vec![(8, 11), (19, 22)]);
        windows.insert(Marketplace::Jp, vec![(11, 14), (20, 23)]);
        // MX, FR, IT, ES, AU have no defined peak schedule yet.
        Self { windows }
    }
}

impl PeakSchedule {
    /// Parses an operator-provided TOML override, e.g.
    ///
    /// ```toml
    /// [windows]
    /// US = [[9, 12], [18, 23]]
    /// JP = [[20, 23]]
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self, String> {
        let file: PeakScheduleFile =
            toml::from_str(raw).map_err(|e| format!("invalid peak schedule file: {e}"))?;
        let mut windows = HashMap::new();
        for (code, mut wins) in file.windows {
            let marketplace = Marketplace::from_str(&code)?;
            for &(start, end) in &wins {
                if start >= end || end > 24 {
                    return Err(format!(
                        "invalid peak window [{start}, {end}) for {marketplace}"
                    ));
                }
            }
            wins.sort_unstable();
            windows.insert(marketplace, wins);
        }
        Ok(Self { windows })
    }

    /// Ordered peak windows for a marketplace; empty when none are defined.
    pub fn peak_windows(&self, marketplace: Marketplace) -> &[PeakWindow] {
        self.windows
            .get(&marketplace)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether `ts` falls inside a peak window of `marketplace`.
    pub fn is_peak_hour(&self, ts: DateTime<Utc>, marketplace: Marketplace) -> bool {
        let local_hour = ts.with_timezone(&marketplace.fixed_offset()).hour() as u8;
        self.peak_windows(marketplace)
            .iter()
            .any(|&(start, end)| local_hour >= start && local_hour < end)
    }

    pub fn is_off_peak_hour(&self, ts: DateTime<Utc>, marketplace: Marketplace) -> bool {
        !self.is_peak_hour(ts, marketplace)
    }

    /// Walks `[start, end]` hour by hour (inclusive boundaries) and tallies
    /// peak membership. Returns zeroed stats when `end < start`.
    pub fn time_range_stats(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        marketplace: Marketplace,
    ) -> TimeRangeStats {
        if end < start {
            return TimeRangeStats {
                peak_hours: 0,
                off_peak_hours: 0,
                total_hours: 0,
            };
        }
        let mut cursor = start;
        let mut peak = 0u64;
        let mut total = 0u64;
        while cursor <= end {
            total += 1;
            if self.is_peak_hour(cursor, marketplace) {
                peak += 1;
            }
            cursor += chrono::Duration::hours(1);
        }
        TimeRangeStats {
            peak_hours: peak,
            off_peak_hours: total - peak,
            total_hours: total,
        }
    }
}
