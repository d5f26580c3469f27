//! Garage Tycoon economy rules as pure functions.

use std::collections::{BTreeMap, BTreeSet};

use super::state::{
    is_milestone, level_threshold, WorkerHolding, WorkerType, CLICK_VALUES, MAX_LEVEL,
    MILESTONES, WORK_SPEED_BONUS_PER_LEVEL,
};

/// Price after `purchases` buys: `floor(base × growth^purchases)`.
pub fn scaled_cost(base: u64, growth: f64, purchases: u32) -> u64 {
    let exp = purchases.min(i32::MAX as u32) as i32;
    // `as` saturates, so absurd levels pin to u64::MAX instead of wrapping.
    (base as f64 * growth.powi(exp)).floor() as u64
}

/// Currency per click at a given click-power level.
pub fn click_value_for_level(level: u32) -> u64 {
    let last = CLICK_VALUES.len() - 1;
    let idx = level as usize;
    if idx <= last {
        return CLICK_VALUES[idx];
    }
    let top = CLICK_VALUES[last] as f64;
    let ratio = top / CLICK_VALUES[last - 1] as f64;
    let steps = (idx - last).min(i32::MAX as usize) as i32;
    (top * ratio.powi(steps)).floor() as u64
}

/// Passive income multiplier from work-speed levels.
pub fn work_speed_multiplier(work_speed_level: u32) -> f64 {
    1.0 + WORK_SPEED_BONUS_PER_LEVEL * work_speed_level as f64
}

/// Income per second of the whole worker set.
pub fn passive_income(
    workers: &BTreeMap<WorkerType, WorkerHolding>,
    work_speed_level: u32,
) -> f64 {
    let base: f64 = workers
        .iter()
        .map(|(kind, holding)| holding.count as f64 * kind.income_rate())
        .sum();
    base * work_speed_multiplier(work_speed_level)
}

/// Garage level reached from `current_level` with `balance`.
///
/// Walks upward one level at a time while the balance clears the next threshold,
/// and halts right before any milestone level that has not been purchased.
/// Never returns less than `current_level` (clamped to 1..=20).
pub fn check_auto_level(balance: f64, current_level: u8, milestones: &BTreeSet<u8>) -> u8 {
    let mut level = current_level.clamp(1, MAX_LEVEL);
    while level < MAX_LEVEL {
        let next = level + 1;
        if is_milestone(next) && !milestones.contains(&next) {
            break;
        }
        match level_threshold(next) {
            Some(threshold) if balance >= threshold => level = next,
            _ => break,
        }
    }
    level
}

/// First unpurchased milestone whose threshold the balance has reached.
///
/// A dismissed offer suppresses the offer entirely (later tiers are not offered
/// in its place) until the dismissal set is cleared.
pub fn pending_milestone(
    balance: f64,
    purchased: &BTreeSet<u8>,
    dismissed: &BTreeSet<u8>,
) -> Option<u8> {
    let candidate = MILESTONES.iter().copied().find(|&m| {
        !purchased.contains(&m) && level_threshold(m).is_some_and(|t| balance >= t)
    })?;
    if dismissed.contains(&candidate) {
        None
    } else {
        Some(candidate)
    }
}

/// Balance needed for the next garage level, `None` at level 20.
pub fn next_level_threshold(level: u8) -> Option<f64> {
    if level >= MAX_LEVEL {
        return None;
    }
    level_threshold(level + 1)
}

/// Fraction of the way from the current level's threshold to the next, in [0, 1].
pub fn level_progress(balance: f64, level: u8) -> f64 {
    let (Some(floor), Some(ceil)) = (level_threshold(level), next_level_threshold(level)) else {
        return 1.0;
    };
    let span = ceil - floor;
    if span <= 0.0 {
        return 1.0;
    }
    ((balance - floor) / span).clamp(0.0, 1.0)
}

/// Seconds until the next unit of `kind` pays back its price.
pub fn payback_seconds(kind: WorkerType, cost: u64, work_speed_level: u32) -> Option<f64> {
    let rate = kind.income_rate() * work_speed_multiplier(work_speed_level);
    if rate > 0.0 {
        Some(cost as f64 / rate)
    } else {
        None
    }
}

/// Round to two decimal places.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Format a currency amount with comma separators; millions and up use M/B/T.
pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return "∞".to_string();
    }
    if n < 0.0 {
        return format!("-{}", format_number(-n));
    }
    const SUFFIXES: [(f64, &str); 3] = [(1e12, "T"), (1e9, "B"), (1e6, "M")];
    for (scale, suffix) in SUFFIXES {
        if n >= scale {
            return format!("{:.2}{}", n / scale, suffix);
        }
    }

    let rounded = (n * 10.0).round() / 10.0;
    let int_part = rounded.floor() as u64;
    let tenths = ((rounded - int_part as f64) * 10.0).round() as u8;

    let s = int_part.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    let result: String = result.chars().rev().collect();

    if tenths > 0 {
        format!("{}.{}", result, tenths)
    } else {
        result
    }
}

/// Human-readable duration for the offline report, e.g. `2時間5分`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{}時間{}分", hours, minutes)
    } else if minutes > 0 {
        format!("{}分{}秒", minutes, secs)
    } else {
        format!("{}秒", secs)
    }
}
