//! Garage Tycoon セーブ/ロード機能。
//!
//! ## バージョニング方針
//!
//! - `SAVE_VERSION`: 現在のセーブ形式バージョン。フィールド追加時にインクリメントする。
//! - `MIN_COMPATIBLE_VERSION`: 互換性を維持できる最小バージョン。
//!   新フィールドの追加のみの場合はこの値を変えない（旧データを維持できる）。
//!   既存フィールドの意味変更や削除など破壊的変更を行った場合のみインクリメントする。
//!
//! 旧バージョンのセーブデータは、`MIN_COMPATIBLE_VERSION` 以上であれば
//! 不足フィールドをデフォルトのドキュメントからディープマージで補完して読み込む。
//!
//! ## v3 変更点
//! - `foreman` を `brigadier` に改名（ロード時に人数を引き継ぐ）
//! - `playerData.money` を `playerData.balance` に改名
//! - `playerData.totalEarned` を `stats.totalEarned` に移動

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::error::PersistError;
use super::logic::{click_value_for_level, passive_income, round_cents, scaled_cost};
use super::state::{
    is_milestone, EconomyState, UpgradeKind, Upgrades, WorkerHolding, WorkerType, MAX_LEVEL,
};

/// セーブデータのフォーマットバージョン。
pub const SAVE_VERSION: u32 = 3;

/// 互換性を維持できる最小バージョン。
pub const MIN_COMPATIBLE_VERSION: u32 = 1;

/// これより短い不在ではオフライン収入を付与しない（リロード連打対策）。
pub const MIN_OFFLINE_SECONDS: f64 = 60.0;

// ── Storage seam ───────────────────────────────────────────────

/// Key-value blob storage. `localStorage` in the browser, an in-memory map elsewhere.
pub trait SaveStore {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn write(&self, key: &str, value: &str) -> Result<(), PersistError>;
    fn remove(&self, key: &str) -> Result<(), PersistError>;
}

/// localStorage にアクセスする。WASM 環境でのみ動作。
#[cfg(target_arch = "wasm32")]
pub struct LocalStore;

#[cfg(target_arch = "wasm32")]
impl LocalStore {
    fn storage() -> Result<web_sys::Storage, PersistError> {
        web_sys::window()
            .and_then(|w| w.local_storage().ok().flatten())
            .ok_or(PersistError::StorageUnavailable)
    }
}

#[cfg(target_arch = "wasm32")]
impl SaveStore for LocalStore {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        Self::storage()?
            .get_item(key)
            .map_err(|e| PersistError::Read(format!("{e:?}")))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistError> {
        Self::storage()?
            .set_item(key, value)
            .map_err(|e| PersistError::Write(format!("{e:?}")))
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        Self::storage()?
            .remove_item(key)
            .map_err(|e| PersistError::Write(format!("{e:?}")))
    }
}

/// In-memory store. Clones share the same slots, so a test can reopen "the same"
/// storage from a second engine.
#[derive(Clone, Default)]
pub struct MemoryStore {
    slots: Rc<RefCell<HashMap<String, String>>>,
    fail_reads: Rc<Cell<bool>>,
    fail_writes: Rc<Cell<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a full quota: every write fails until switched back.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    /// Simulate a blocked storage (privacy mode, security error): reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.slots.borrow().get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.slots.borrow_mut().insert(key.to_string(), value.to_string());
    }
}

impl SaveStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        if self.fail_reads.get() {
            return Err(PersistError::Read("access denied".into()));
        }
        Ok(self.get(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), PersistError> {
        if self.fail_writes.get() {
            return Err(PersistError::Write("quota exceeded".into()));
        }
        self.insert(key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), PersistError> {
        self.slots.borrow_mut().remove(key);
        Ok(())
    }
}

// ── Document ───────────────────────────────────────────────────

/// 永続化されるドキュメント。オフライン収入の表示状態などの一時的な値は含まない。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveDocument {
    pub version: u32,
    /// 保存時刻 (ms epoch)。0 は「記録なし」。
    pub timestamp: i64,
    pub player_data: PlayerData,
    pub upgrades: Upgrades,
    pub workers: BTreeMap<WorkerType, WorkerHolding>,
    pub stats: Stats,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    pub balance: f64,
    pub nuts: u64,
    pub total_clicks: u64,
    pub garage_level: u8,
    pub milestones_purchased: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_earned: f64,
    pub session_count: u32,
    pub last_session_date: Option<String>,
}

impl Default for SaveDocument {
    fn default() -> Self {
        extract_save(&EconomyState::new(), 0)
    }
}

fn default_value() -> Result<Value, PersistError> {
    Ok(serde_json::to_value(SaveDocument::default())?)
}

/// EconomyState からセーブ用データを抽出する。
pub fn extract_save(state: &EconomyState, timestamp: i64) -> SaveDocument {
    SaveDocument {
        version: SAVE_VERSION,
        timestamp,
        player_data: PlayerData {
            balance: state.balance,
            nuts: state.nuts,
            total_clicks: state.total_clicks,
            garage_level: state.garage_level,
            milestones_purchased: state.milestones_purchased.iter().copied().collect(),
        },
        upgrades: state.upgrades,
        workers: state.workers.clone(),
        stats: Stats {
            total_earned: state.total_earned,
            session_count: state.session_count,
            last_session_date: state.last_session_date.clone(),
        },
    }
}

/// セーブデータを EconomyState に復元する。
///
/// 値は信用せず正規化する: 残高は有限かつ非負、人数は上限まで、未知のマイルストーンは
/// 捨て、コストはレベル/人数から再計算する。ガレージレベルは呼び出し側で再評価すること。
pub fn apply_save(state: &mut EconomyState, doc: &SaveDocument) {
    let pd = &doc.player_data;
    state.balance = finite_non_negative(pd.balance);
    state.nuts = pd.nuts;
    state.total_clicks = pd.total_clicks;
    state.garage_level = pd.garage_level.clamp(1, MAX_LEVEL);
    state.milestones_purchased = pd
        .milestones_purchased
        .iter()
        .copied()
        .filter(|&m| is_milestone(m))
        .collect();

    for &kind in UpgradeKind::all() {
        let level = doc.upgrades.get(kind).level;
        let slot = state.upgrades.get_mut(kind);
        slot.level = level;
        slot.cost = scaled_cost(kind.base_cost(), kind.cost_growth(), level);
    }
    state.click_value = click_value_for_level(state.upgrades.click_power.level);

    for &kind in WorkerType::all() {
        let count = doc
            .workers
            .get(&kind)
            .map_or(0, |h| h.count)
            .min(kind.cap());
        state.workers.insert(
            kind,
            WorkerHolding {
                count,
                cost: scaled_cost(kind.base_cost(), kind.cost_growth(), count),
            },
        );
    }
    state.passive_income_per_second =
        passive_income(&state.workers, state.upgrades.work_speed.level);

    state.total_earned = finite_non_negative(doc.stats.total_earned);
    state.session_count = doc.stats.session_count;
    state.last_session_date = doc.stats.last_session_date.clone();
}

fn finite_non_negative(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

// ── JSON plumbing ──────────────────────────────────────────────

/// `patch` を `base` に再帰的にマージする。オブジェクトはキー単位でマージ、
/// 配列とスカラーは置き換え。
pub fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, patch) => *slot = patch,
    }
}

/// 旧フィールド名を現行の名前へ移す。黙って捨てずに必ず引き継ぐ。
fn migrate_legacy(value: &mut Value) {
    let Some(root) = value.as_object_mut() else {
        return;
    };

    let mut legacy_total_earned = None;
    if let Some(Value::Object(player)) = root.get_mut("playerData") {
        if let Some(money) = player.remove("money") {
            player.entry("balance").or_insert(money);
        }
        legacy_total_earned = player.remove("totalEarned");
    }
    if let Some(total) = legacy_total_earned {
        let stats = root
            .entry("stats")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(stats) = stats.as_object_mut() {
            stats.entry("totalEarned").or_insert(total);
        }
    }

    if let Some(Value::Object(workers)) = root.get_mut("workers") {
        if let Some(foreman) = workers.remove("foreman") {
            let legacy = foreman.get("count").and_then(Value::as_u64).unwrap_or(0);
            let entry = workers
                .entry("brigadier")
                .or_insert_with(|| json!({ "count": 0 }));
            if let Some(obj) = entry.as_object_mut() {
                let current = obj.get("count").and_then(Value::as_u64).unwrap_or(0);
                obj.insert("count".into(), current.saturating_add(legacy).into());
            }
            log::info!("セーブデータ移行: foreman({legacy}人) → brigadier");
        }
        workers.retain(|key, _| {
            let known = key.parse::<WorkerType>().is_ok();
            if !known {
                log::warn!("セーブデータ内の未知の従業員タイプを無視: {key}");
            }
            known
        });
    }
}

/// 数値フィールドを型の範囲に収める。範囲外の値一つでセーブ全体を捨てないため、
/// 型付きデシリアライズの前に行う。
fn clamp_ranges(value: &mut Value) {
    let Some(root) = value.as_object_mut() else {
        return;
    };

    if let Some(Value::Object(player)) = root.get_mut("playerData") {
        if let Some(level) = player.get_mut("garageLevel") {
            clamp_integer(level, 1, MAX_LEVEL as u64);
        }
        if let Some(Value::Array(milestones)) = player.get_mut("milestonesPurchased") {
            milestones.retain(|m| {
                m.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .is_some_and(is_milestone)
            });
        }
        for key in ["nuts", "totalClicks"] {
            if let Some(v) = player.get_mut(key) {
                clamp_integer(v, 0, u64::MAX);
            }
        }
    }

    if let Some(Value::Object(upgrades)) = root.get_mut("upgrades") {
        for track in upgrades.values_mut() {
            if let Some(level) = track.get_mut("level") {
                clamp_integer(level, 0, u32::MAX as u64);
            }
            // コストはロード時に再計算されるので、読めない値は捨ててデフォルトに任せる。
            if let Value::Object(obj) = track {
                if obj.get("cost").is_some_and(|c| c.as_u64().is_none()) {
                    obj.remove("cost");
                }
            }
        }
    }

    if let Some(Value::Object(workers)) = root.get_mut("workers") {
        for (key, holding) in workers.iter_mut() {
            let cap = key.parse::<WorkerType>().map_or(0, |k| k.cap() as u64);
            if let Some(count) = holding.get_mut("count") {
                clamp_integer(count, 0, cap);
            }
            if let Value::Object(obj) = holding {
                if obj.get("cost").is_some_and(|c| c.as_u64().is_none()) {
                    obj.remove("cost");
                }
            }
        }
    }

    if let Some(Value::Object(stats)) = root.get_mut("stats") {
        if let Some(count) = stats.get_mut("sessionCount") {
            clamp_integer(count, 0, u32::MAX as u64);
        }
    }
}

/// Numbers become integers in `[min, max]`. Non-numbers are left for validation to reject.
fn clamp_integer(value: &mut Value, min: u64, max: u64) {
    let clamped = if let Some(n) = value.as_u64() {
        n.clamp(min, max)
    } else if let Some(f) = value.as_f64() {
        if f.is_finite() {
            f.floor().clamp(min as f64, max as f64) as u64
        } else {
            min
        }
    } else {
        return;
    };
    *value = clamped.into();
}

/// 必須フィールドの存在と型だけを確認する浅い検証。
fn validate_shallow(value: &Value) -> Result<(), PersistError> {
    let root = value
        .as_object()
        .ok_or_else(|| invalid("root is not an object"))?;
    let player = root
        .get("playerData")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid("playerData missing"))?;
    if !player.get("balance").is_some_and(Value::is_number) {
        return Err(invalid("playerData.balance must be a number"));
    }
    expect(
        player.get("milestonesPurchased"),
        Value::is_array,
        "playerData.milestonesPurchased",
    )?;
    for key in ["upgrades", "workers", "stats"] {
        expect(root.get(key), Value::is_object, key)?;
    }
    expect(root.get("timestamp"), Value::is_number, "timestamp")?;
    expect(root.get("version"), Value::is_number, "version")?;
    Ok(())
}

fn expect(
    value: Option<&Value>,
    check: fn(&Value) -> bool,
    field: &str,
) -> Result<(), PersistError> {
    match value {
        None => Ok(()),
        Some(v) if check(v) => Ok(()),
        Some(_) => Err(invalid(&format!("{field} has the wrong type"))),
    }
}

fn invalid(reason: &str) -> PersistError {
    PersistError::Invalid(reason.to_string())
}

// ── Slot ───────────────────────────────────────────────────────

/// The single persisted blob: one store, one key.
pub struct SaveSlot {
    store: Box<dyn SaveStore>,
    key: String,
    /// The last load could not read storage. Writing now could replace a save we never saw.
    read_failed: Cell<bool>,
}

impl SaveSlot {
    pub fn new(store: Box<dyn SaveStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            read_failed: Cell::new(false),
        }
    }

    /// 保存済みドキュメント（無ければデフォルト）に `patch` をマージして書き込む。
    /// 失敗時は false を返す（ログに警告を出す）。
    pub fn save(&self, patch: Value, now_ms: i64) -> bool {
        match self.try_save(patch, now_ms) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Garage Tycoon: セーブに失敗: {e}");
                false
            }
        }
    }

    fn try_save(&self, patch: Value, now_ms: i64) -> Result<(), PersistError> {
        if self.read_failed.get() {
            return Err(PersistError::Read(
                "stored save was unreadable at load; not overwriting it".into(),
            ));
        }
        let mut doc = match self.stored_value()? {
            Some(v) => v,
            None => default_value()?,
        };
        deep_merge(&mut doc, patch);
        if let Value::Object(root) = &mut doc {
            root.insert("version".into(), SAVE_VERSION.into());
            root.insert("timestamp".into(), now_ms.into());
        }
        let json = serde_json::to_string(&doc)?;
        self.store.write(&self.key, &json)
    }

    /// Current blob as migrated JSON, if it parses to an object.
    /// A read error is returned, never mistaken for an empty slot.
    fn stored_value(&self) -> Result<Option<Value>, PersistError> {
        let Some(json) = self.store.read(&self.key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(&json) {
            Ok(mut value) if value.is_object() => {
                migrate_legacy(&mut value);
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    }

    /// ストレージからドキュメントを復元する。
    /// 存在しない場合は None。壊れたデータや互換性のないバージョンは削除して None を返す。
    pub fn load(&self) -> Option<SaveDocument> {
        let json = match self.store.read(&self.key) {
            Ok(Some(j)) => j,
            Ok(None) => {
                self.read_failed.set(false);
                return None;
            }
            Err(e) => {
                log::warn!("Garage Tycoon: ストレージの読み込みに失敗 (このセッションは保存しない): {e}");
                self.read_failed.set(true);
                return None;
            }
        };
        self.read_failed.set(false);

        match parse_document(&json) {
            Ok(doc) => Some(doc),
            Err(e) => {
                log::warn!("Garage Tycoon: セーブデータを破棄します: {e}");
                self.clear();
                None
            }
        }
    }

    /// セーブデータを削除する。
    ///
    /// 削除に成功すれば、ロード失敗による書き込み停止も解除する。
    pub fn clear(&self) {
        match self.store.remove(&self.key) {
            Ok(()) => self.read_failed.set(false),
            Err(e) => log::warn!("Garage Tycoon: セーブデータの削除に失敗: {e}"),
        }
    }
}

fn parse_document(json: &str) -> Result<SaveDocument, PersistError> {
    let mut value: Value = serde_json::from_str(json)?;
    migrate_legacy(&mut value);
    validate_shallow(&value)?;
    clamp_ranges(&mut value);

    let saved = value
        .get("version")
        .and_then(Value::as_u64)
        .unwrap_or(1)
        .min(u32::MAX as u64) as u32;
    if saved < MIN_COMPATIBLE_VERSION {
        return Err(PersistError::TooOld {
            saved,
            min: MIN_COMPATIBLE_VERSION,
        });
    }
    if saved < SAVE_VERSION {
        log::info!(
            "Garage Tycoon: 旧バージョンのセーブデータをマイグレーション (saved={saved}, current={SAVE_VERSION})。"
        );
    }

    let mut merged = default_value()?;
    deep_merge(&mut merged, value);
    Ok(serde_json::from_value(merged)?)
}

// ── Offline income ─────────────────────────────────────────────

/// Seconds between `last_timestamp_ms` and `now_ms`, clamped to `[0, max_hours]`.
/// `None` when there is no prior timestamp.
pub fn offline_seconds(
    last_timestamp_ms: Option<i64>,
    now_ms: i64,
    max_hours: f64,
) -> Option<f64> {
    let last = last_timestamp_ms.filter(|&t| t > 0)?;
    let elapsed = (now_ms - last) as f64 / 1_000.0;
    Some(elapsed.clamp(0.0, max_hours.max(0.0) * 3_600.0))
}

/// 不在中の収入。`rate × clamp(経過秒, 0, max_hours×3600)` を小数第2位に丸める。
/// レートが 0 以下、タイムスタンプ無し、または経過が 60 秒未満なら 0。
pub fn offline_earnings(
    rate_per_second: f64,
    last_timestamp_ms: Option<i64>,
    now_ms: i64,
    max_hours: f64,
) -> f64 {
    if rate_per_second <= 0.0 {
        return 0.0;
    }
    let Some(last) = last_timestamp_ms.filter(|&t| t > 0) else {
        return 0.0;
    };
    if ((now_ms - last) as f64 / 1_000.0) < MIN_OFFLINE_SECONDS {
        return 0.0;
    }
    match offline_seconds(Some(last), now_ms, max_hours) {
        Some(secs) => round_cents(secs * rate_per_second),
        None => 0.0,
    }
}
