/// Garage Tycoon economy state definitions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ActionError;

/// Highest garage tier. Level 20 is terminal.
pub const MAX_LEVEL: u8 = 20;

/// Balance required to reach each garage level (index 0 = level 1).
pub const LEVEL_THRESHOLDS: [f64; MAX_LEVEL as usize] = [
    0.0,
    5_000.0,
    50_000.0,
    250_000.0,
    1_000_000.0,
    2_500_000.0,
    5_000_000.0,
    10_000_000.0,
    25_000_000.0,
    50_000_000.0,
    100_000_000.0,
    200_000_000.0,
    400_000_000.0,
    750_000_000.0,
    1_500_000_000.0,
    3_000_000_000.0,
    6_000_000_000.0,
    12_000_000_000.0,
    25_000_000_000.0,
    50_000_000_000.0,
];

/// Milestone tiers that must be bought before the garage can grow past them.
pub const MILESTONES: [u8; 4] = [5, 10, 15, 20];

/// Click value per click-power level. Levels above 50 extrapolate geometrically.
pub const CLICK_VALUES: [u64; 51] = [
    1, 2, 3, 4, 5, 7, 9, 12, 15, 20, //
    25, 32, 40, 50, 65, 80, 100, 125, 160, 200, //
    250, 320, 400, 500, 650, 800, 1_000, 1_250, 1_600, 2_000, //
    2_500, 3_200, 4_000, 5_000, 6_500, 8_000, 10_000, 12_500, 16_000, 20_000, //
    25_000, 32_000, 40_000, 50_000, 65_000, 80_000, 100_000, 125_000, 160_000, 200_000, //
    250_000,
];

/// Each work-speed level adds this much to the passive income multiplier.
pub const WORK_SPEED_BONUS_PER_LEVEL: f64 = 0.10;

/// Balance needed to reach `level`. Levels outside 1..=20 have no threshold.
pub fn level_threshold(level: u8) -> Option<f64> {
    if level == 0 || level > MAX_LEVEL {
        return None;
    }
    Some(LEVEL_THRESHOLDS[(level - 1) as usize])
}

pub fn is_milestone(level: u8) -> bool {
    MILESTONES.contains(&level)
}

/// Purchase price of a milestone tier.
pub fn milestone_cost(level: u8) -> Option<u64> {
    match level {
        5 => Some(500_000),
        10 => Some(25_000_000),
        15 => Some(750_000_000),
        20 => Some(25_000_000_000),
        _ => None,
    }
}

/// Kinds of workers that produce passive income.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerType {
    Apprentice,
    Mechanic,
    Master,
    Brigadier,
    Director,
}

impl WorkerType {
    /// All worker types in display order.
    pub fn all() -> &'static [WorkerType] {
        &[
            WorkerType::Apprentice,
            WorkerType::Mechanic,
            WorkerType::Master,
            WorkerType::Brigadier,
            WorkerType::Director,
        ]
    }

    /// Wire id used in the save document and in string intents.
    pub fn id(&self) -> &'static str {
        match self {
            WorkerType::Apprentice => "apprentice",
            WorkerType::Mechanic => "mechanic",
            WorkerType::Master => "master",
            WorkerType::Brigadier => "brigadier",
            WorkerType::Director => "director",
        }
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            WorkerType::Apprentice => "見習い",
            WorkerType::Mechanic => "整備士",
            WorkerType::Master => "親方",
            WorkerType::Brigadier => "班長",
            WorkerType::Director => "工場長",
        }
    }

    /// Cost of the first unit.
    pub fn base_cost(&self) -> u64 {
        match self {
            WorkerType::Apprentice => 500,
            WorkerType::Mechanic => 5_000,
            WorkerType::Master => 50_000,
            WorkerType::Brigadier => 500_000,
            WorkerType::Director => 5_000_000,
        }
    }

    pub fn cost_growth(&self) -> f64 {
        1.15
    }

    /// Income per second per unit, before the work-speed multiplier.
    pub fn income_rate(&self) -> f64 {
        match self {
            WorkerType::Apprentice => 5.0,
            WorkerType::Mechanic => 40.0,
            WorkerType::Master => 300.0,
            WorkerType::Brigadier => 2_000.0,
            WorkerType::Director => 15_000.0,
        }
    }

    /// Maximum number of units that can be hired.
    pub fn cap(&self) -> u32 {
        match self {
            WorkerType::Apprentice => 25,
            WorkerType::Mechanic => 20,
            WorkerType::Master => 15,
            WorkerType::Brigadier => 10,
            WorkerType::Director => 5,
        }
    }

    /// Milestone that must be purchased before hiring. `None` = always available.
    pub fn required_milestone(&self) -> Option<u8> {
        match self {
            WorkerType::Apprentice => None,
            WorkerType::Mechanic => Some(5),
            WorkerType::Master => Some(10),
            WorkerType::Brigadier => Some(15),
            WorkerType::Director => Some(20),
        }
    }

    /// Key to hire (1-5 mapped to worker index).
    pub fn key(&self) -> char {
        match self {
            WorkerType::Apprentice => '1',
            WorkerType::Mechanic => '2',
            WorkerType::Master => '3',
            WorkerType::Brigadier => '4',
            WorkerType::Director => '5',
        }
    }

    pub fn index(&self) -> usize {
        match self {
            WorkerType::Apprentice => 0,
            WorkerType::Mechanic => 1,
            WorkerType::Master => 2,
            WorkerType::Brigadier => 3,
            WorkerType::Director => 4,
        }
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for WorkerType {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkerType::all()
            .iter()
            .find(|w| w.id() == s)
            .copied()
            .ok_or_else(|| ActionError::UnknownWorker(s.to_string()))
    }
}

/// Purchasable upgrades.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpgradeKind {
    ClickPower,
    WorkSpeed,
}

impl UpgradeKind {
    pub fn all() -> &'static [UpgradeKind] {
        &[UpgradeKind::ClickPower, UpgradeKind::WorkSpeed]
    }

    pub fn id(&self) -> &'static str {
        match self {
            UpgradeKind::ClickPower => "clickPower",
            UpgradeKind::WorkSpeed => "workSpeed",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UpgradeKind::ClickPower => "工具強化",
            UpgradeKind::WorkSpeed => "作業効率",
        }
    }

    pub fn base_cost(&self) -> u64 {
        match self {
            UpgradeKind::ClickPower => 50,
            UpgradeKind::WorkSpeed => 250_000,
        }
    }

    pub fn cost_growth(&self) -> f64 {
        match self {
            UpgradeKind::ClickPower => 1.5,
            UpgradeKind::WorkSpeed => 2.0,
        }
    }

    pub fn required_milestone(&self) -> Option<u8> {
        match self {
            UpgradeKind::ClickPower => None,
            UpgradeKind::WorkSpeed => Some(5),
        }
    }
}

impl FromStr for UpgradeKind {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UpgradeKind::all()
            .iter()
            .find(|u| u.id() == s)
            .copied()
            .ok_or_else(|| ActionError::UnknownUpgrade(s.to_string()))
    }
}

/// Level and next-purchase cost of one upgrade track.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpgradeLevel {
    pub level: u32,
    pub cost: u64,
}

impl UpgradeLevel {
    pub fn new(kind: UpgradeKind) -> Self {
        Self {
            level: 0,
            cost: kind.base_cost(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upgrades {
    pub click_power: UpgradeLevel,
    pub work_speed: UpgradeLevel,
}

impl Upgrades {
    pub fn get(&self, kind: UpgradeKind) -> &UpgradeLevel {
        match kind {
            UpgradeKind::ClickPower => &self.click_power,
            UpgradeKind::WorkSpeed => &self.work_speed,
        }
    }

    pub fn get_mut(&mut self, kind: UpgradeKind) -> &mut UpgradeLevel {
        match kind {
            UpgradeKind::ClickPower => &mut self.click_power,
            UpgradeKind::WorkSpeed => &mut self.work_speed,
        }
    }
}

impl Default for Upgrades {
    fn default() -> Self {
        Self {
            click_power: UpgradeLevel::new(UpgradeKind::ClickPower),
            work_speed: UpgradeLevel::new(UpgradeKind::WorkSpeed),
        }
    }
}

/// Hired units of one worker type and the price of the next one.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerHolding {
    pub count: u32,
    pub cost: u64,
}

impl WorkerHolding {
    pub fn new(kind: WorkerType) -> Self {
        Self {
            count: 0,
            cost: kind.base_cost(),
        }
    }
}

/// Income credited on load for the time the player was away.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OfflineReport {
    pub earnings: f64,
    pub seconds_away: f64,
}

/// Full state of a Garage Tycoon game.
#[derive(Clone, Debug)]
pub struct EconomyState {
    /// Spendable currency.
    pub balance: f64,
    /// Premium currency. Persisted, not yet earned or spent anywhere.
    pub nuts: u64,
    /// Currency per non-critical click.
    pub click_value: u64,
    pub total_clicks: u64,
    /// Currency earned all-time (clicks, passive and offline).
    pub total_earned: f64,
    pub session_count: u32,
    pub last_session_date: Option<String>,
    /// Visual/economic tier, 1..=20.
    pub garage_level: u8,
    pub milestones_purchased: BTreeSet<u8>,
    pub upgrades: Upgrades,
    pub workers: BTreeMap<WorkerType, WorkerHolding>,
    /// Cached derived value, see `logic::passive_income`.
    pub passive_income_per_second: f64,
    /// Milestone currently offered to the player.
    pub pending_milestone: Option<u8>,
    /// Offers the player closed; cleared by the next milestone purchase.
    pub dismissed_milestones: BTreeSet<u8>,
    /// Set once on load, cleared when the presentation consumes it.
    pub offline_report: Option<OfflineReport>,
}

impl EconomyState {
    pub fn new() -> Self {
        let workers = WorkerType::all()
            .iter()
            .map(|&w| (w, WorkerHolding::new(w)))
            .collect();

        Self {
            balance: 0.0,
            nuts: 0,
            click_value: CLICK_VALUES[0],
            total_clicks: 0,
            total_earned: 0.0,
            session_count: 0,
            last_session_date: None,
            garage_level: 1,
            milestones_purchased: BTreeSet::new(),
            upgrades: Upgrades::default(),
            workers,
            passive_income_per_second: 0.0,
            pending_milestone: None,
            dismissed_milestones: BTreeSet::new(),
            offline_report: None,
        }
    }

    pub fn worker(&self, kind: WorkerType) -> WorkerHolding {
        self.workers
            .get(&kind)
            .copied()
            .unwrap_or_else(|| WorkerHolding::new(kind))
    }

    pub fn has_milestone(&self, level: u8) -> bool {
        self.milestones_purchased.contains(&level)
    }

    /// Whether a gate (`None` = ungated) is satisfied.
    pub fn gate_open(&self, gate: Option<u8>) -> bool {
        gate.map_or(true, |m| self.has_milestone(m))
    }
}

impl Default for EconomyState {
    fn default() -> Self {
        Self::new()
    }
}
