//! Semantic action IDs for Garage Tycoon click targets.
//!
//! Registered during render and dispatched via `InputEvent::Click`.

// ── Core actions ────────────────────────────────────────────────
pub const CLICK_GARAGE: u16 = 0;
pub const CLOSE_OFFLINE_REPORT: u16 = 1;

// ── Tab navigation ──────────────────────────────────────────────
pub const TAB_SHOP: u16 = 10;
pub const TAB_STATS: u16 = 11;

// ── Upgrades ────────────────────────────────────────────────────
pub const BUY_CLICK_POWER: u16 = 20;
pub const BUY_WORK_SPEED: u16 = 21;

// ── Worker hire (base + worker index 0..4) ──────────────────────
pub const HIRE_WORKER_BASE: u16 = 100;

// ── Milestone offer ─────────────────────────────────────────────
pub const BUY_MILESTONE: u16 = 200;
pub const DISMISS_MILESTONE: u16 = 201;

// ── Housekeeping ────────────────────────────────────────────────
pub const FORCE_SAVE: u16 = 300;
pub const RESET_GAME: u16 = 301;
