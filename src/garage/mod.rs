//! Garage Tycoon: click the garage, hire a crew, grow through 20 tiers.

pub mod actions;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod logic;
pub mod render;
pub mod rng;
pub mod save;
pub mod state;

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use ratzilla::ratatui::layout::Rect;
use ratzilla::ratatui::Frame;

use crate::input::{ClickState, InputEvent};

use actions::*;
use engine::{Engine, EngineEvent, Intent};
use error::ActionError;
use logic::format_number;
use state::{UpgradeKind, WorkerType};

/// Messages kept in the on-screen log.
const MAX_LOG: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tab {
    Shop,
    Stats,
}

/// Presentation adapter: turns keys and taps into engine intents and keeps
/// a short message log fed by engine events.
pub struct GarageGame {
    engine: Rc<RefCell<Engine>>,
    log: Rc<RefCell<Vec<String>>>,
    pub tab: Tab,
    /// `R` was pressed once; a second `R` resets.
    pub confirm_reset: bool,
}

impl GarageGame {
    pub fn new(engine: Rc<RefCell<Engine>>) -> Self {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        engine.borrow_mut().subscribe(move |event| {
            if let Some(message) = describe(event) {
                push_log(&sink, message);
            }
        });
        Self {
            engine,
            log,
            tab: Tab::Shop,
            confirm_reset: false,
        }
    }

    pub fn engine(&self) -> &Rc<RefCell<Engine>> {
        &self.engine
    }

    pub fn log(&self) -> Ref<'_, Vec<String>> {
        self.log.borrow()
    }

    /// Handle an input event. Returns true if the event was consumed.
    pub fn handle_input(&mut self, event: &InputEvent) -> bool {
        match event {
            InputEvent::Key(c) => self.handle_key(*c),
            InputEvent::Click(id) => self.handle_click(*id),
        }
    }

    /// Advance the engine's timers to the host time.
    pub fn pump(&mut self, now_ms: f64) {
        self.engine.borrow_mut().pump(now_ms);
    }

    pub fn render(&self, f: &mut Frame, area: Rect, click_state: &Rc<RefCell<ClickState>>) {
        let engine = self.engine.borrow();
        render::render(self, &engine, f, area, click_state);
    }

    fn handle_click(&mut self, action_id: u16) -> bool {
        match action_id {
            TAB_SHOP => {
                self.tab = Tab::Shop;
                true
            }
            TAB_STATS => {
                self.tab = Tab::Stats;
                true
            }
            id => match click_to_key(id) {
                Some(key) => self.handle_key(key),
                None => false,
            },
        }
    }

    fn handle_key(&mut self, key: char) -> bool {
        // The offline report is modal: any input closes it.
        let modal_open = self.engine.borrow().offline_report().is_some();
        if modal_open {
            self.engine.borrow_mut().take_offline_report();
            return true;
        }

        if key != 'R' {
            self.confirm_reset = false;
        }
        // Labels show `[U]`; Shift is optional except for reset.
        let key = if key == 'R' { key } else { key.to_ascii_lowercase() };

        let intent = match key {
            'c' => Intent::Click,
            'u' => Intent::PurchaseUpgrade(UpgradeKind::ClickPower),
            'w' => Intent::PurchaseUpgrade(UpgradeKind::WorkSpeed),
            '1'..='5' => Intent::HireWorker(WorkerType::all()[(key as u8 - b'1') as usize]),
            'm' => {
                let pending = self.engine.borrow().pending_milestone();
                match pending {
                    Some(level) => Intent::PurchaseMilestone(level),
                    None => return false,
                }
            }
            'x' => Intent::DismissMilestone,
            's' => {
                let ok = self.engine.borrow_mut().force_save();
                if ok {
                    push_log(&self.log, "セーブしました".to_string());
                }
                return true;
            }
            't' => {
                self.tab = match self.tab {
                    Tab::Shop => Tab::Stats,
                    Tab::Stats => Tab::Shop,
                };
                return true;
            }
            'R' if !self.confirm_reset => {
                self.confirm_reset = true;
                push_log(&self.log, "もう一度 R を押すとリセットします".to_string());
                return true;
            }
            'R' => {
                self.confirm_reset = false;
                Intent::Reset
            }
            _ => return false,
        };

        let result = self.engine.borrow_mut().dispatch(intent);
        if let Err(e) = result {
            push_log(&self.log, refusal_message(&e));
        }
        true
    }
}

fn click_to_key(action_id: u16) -> Option<char> {
    match action_id {
        CLICK_GARAGE => Some('c'),
        CLOSE_OFFLINE_REPORT => Some(' '),
        BUY_CLICK_POWER => Some('u'),
        BUY_WORK_SPEED => Some('w'),
        id if (HIRE_WORKER_BASE..HIRE_WORKER_BASE + 5).contains(&id) => {
            Some((b'1' + (id - HIRE_WORKER_BASE) as u8) as char)
        }
        BUY_MILESTONE => Some('m'),
        DISMISS_MILESTONE => Some('x'),
        FORCE_SAVE => Some('s'),
        RESET_GAME => Some('R'),
        _ => None,
    }
}

fn push_log(log: &Rc<RefCell<Vec<String>>>, message: String) {
    let mut log = log.borrow_mut();
    log.push(message);
    if log.len() > MAX_LOG {
        let excess = log.len() - MAX_LOG;
        log.drain(..excess);
    }
}

fn describe(event: &EngineEvent) -> Option<String> {
    let message = match event {
        EngineEvent::Clicked(outcome) if outcome.is_critical => {
            format!("クリティカル! +¥{}", format_number(outcome.income as f64))
        }
        EngineEvent::LevelUp { to, .. } => format!("ガレージが Lv.{} に成長した!", to),
        EngineEvent::MilestoneOffered(level) => format!(
            "マイルストーン Lv.{} を購入できます (¥{})",
            level,
            format_number(state::milestone_cost(*level).unwrap_or(0) as f64)
        ),
        EngineEvent::MilestonePurchased(level) => format!("マイルストーン Lv.{} 達成!", level),
        EngineEvent::UpgradePurchased { kind, level } => {
            format!("{} が Lv.{} になった", kind.name(), level)
        }
        EngineEvent::WorkerHired { kind, count } => {
            format!("{}を雇った ({}人目)", kind.name(), count)
        }
        EngineEvent::OfflineEarnings(report) => {
            format!("留守中に ¥{} 稼いだ", format_number(report.earnings))
        }
        EngineEvent::Saved { ok: false } => "セーブに失敗しました".to_string(),
        EngineEvent::Reset => "ゲームをリセットしました".to_string(),
        _ => return None,
    };
    Some(message)
}

fn refusal_message(err: &ActionError) -> String {
    match err {
        ActionError::InsufficientFunds { needed, available } => format!(
            "お金が足りない (あと ¥{})",
            format_number((*needed as f64 - available).max(0.0))
        ),
        ActionError::AtCapacity { cap, .. } => format!("これ以上雇えない (上限 {}人)", cap),
        ActionError::Locked { milestone } => {
            format!("マイルストーン Lv.{} で解放", milestone)
        }
        ActionError::AlreadyPurchased(level) => format!("Lv.{} は購入済み", level),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::garage::clock::ManualClock;
    use crate::garage::config::EngineConfig;
    use crate::garage::rng::FixedRoll;
    use crate::garage::save::MemoryStore;
    use crate::garage::state::OfflineReport;

    fn game() -> GarageGame {
        let engine = Engine::new(
            EngineConfig::default(),
            Box::new(MemoryStore::new()),
            Box::new(ManualClock::new(1_700_000_000_000)),
            Box::new(FixedRoll(false)),
        );
        GarageGame::new(Rc::new(RefCell::new(engine)))
    }

    fn set_balance(game: &GarageGame, balance: f64) {
        game.engine().borrow_mut().state_mut().balance = balance;
    }

    fn balance(game: &GarageGame) -> f64 {
        game.engine().borrow().balance()
    }

    #[test]
    fn key_c_clicks_garage() {
        let mut g = game();
        assert!(g.handle_input(&InputEvent::Key('c')));
        assert_eq!(balance(&g), 1.0);
    }

    #[test]
    fn uppercase_letters_match_their_labels() {
        let mut g = game();
        set_balance(&g, 50.0);
        assert!(g.handle_input(&InputEvent::Key('U')));
        assert_eq!(g.engine().borrow().state().upgrades.click_power.level, 1);
        assert!(g.handle_input(&InputEvent::Key('C')));
        assert_eq!(g.engine().borrow().state().total_clicks, 1);
    }

    #[test]
    fn lowercase_r_does_not_arm_reset() {
        let mut g = game();
        g.handle_input(&InputEvent::Key('r'));
        assert!(!g.confirm_reset);
    }

    #[test]
    fn tap_on_garage_clicks() {
        let mut g = game();
        assert!(g.handle_input(&InputEvent::Click(CLICK_GARAGE)));
        assert_eq!(g.engine().borrow().state().total_clicks, 1);
    }

    #[test]
    fn number_keys_hire_workers() {
        let mut g = game();
        set_balance(&g, 600.0);
        g.handle_input(&InputEvent::Key('1'));
        assert_eq!(g.engine().borrow().state().worker(WorkerType::Apprentice).count, 1);
        assert_eq!(balance(&g), 100.0);
    }

    #[test]
    fn hire_tap_maps_to_worker_index() {
        let mut g = game();
        set_balance(&g, 600.0);
        g.handle_input(&InputEvent::Click(HIRE_WORKER_BASE));
        assert_eq!(g.engine().borrow().state().worker(WorkerType::Apprentice).count, 1);
    }

    #[test]
    fn locked_worker_logs_reason() {
        let mut g = game();
        set_balance(&g, 1e9);
        g.handle_input(&InputEvent::Key('2'));
        assert_eq!(g.engine().borrow().state().worker(WorkerType::Mechanic).count, 0);
        assert_eq!(g.log().last().map(String::as_str), Some("マイルストーン Lv.5 で解放"));
    }

    #[test]
    fn insufficient_funds_logs_shortfall() {
        let mut g = game();
        set_balance(&g, 20.0);
        g.handle_input(&InputEvent::Key('u'));
        assert_eq!(g.log().last().map(String::as_str), Some("お金が足りない (あと ¥30)"));
    }

    #[test]
    fn milestone_key_buys_pending_offer() {
        let mut g = game();
        set_balance(&g, 999_999.0);
        g.handle_input(&InputEvent::Key('c'));
        assert_eq!(g.engine().borrow().pending_milestone(), Some(5));
        g.handle_input(&InputEvent::Key('m'));
        assert!(g.engine().borrow().state().has_milestone(5));
        assert_eq!(g.engine().borrow().garage_level(), 5);
    }

    #[test]
    fn milestone_key_without_offer_is_ignored() {
        let mut g = game();
        assert!(!g.handle_input(&InputEvent::Key('m')));
    }

    #[test]
    fn dismiss_key_hides_offer() {
        let mut g = game();
        set_balance(&g, 999_999.0);
        g.handle_input(&InputEvent::Key('c'));
        g.handle_input(&InputEvent::Click(DISMISS_MILESTONE));
        assert_eq!(g.engine().borrow().pending_milestone(), None);
    }

    #[test]
    fn reset_needs_two_presses() {
        let mut g = game();
        g.handle_input(&InputEvent::Key('c'));
        g.handle_input(&InputEvent::Key('R'));
        assert!(g.confirm_reset);
        assert_eq!(balance(&g), 1.0);
        g.handle_input(&InputEvent::Key('R'));
        assert!(!g.confirm_reset);
        assert_eq!(balance(&g), 0.0);
        assert_eq!(g.log().last().map(String::as_str), Some("ゲームをリセットしました"));
    }

    #[test]
    fn other_key_cancels_reset_confirmation() {
        let mut g = game();
        g.handle_input(&InputEvent::Key('R'));
        g.handle_input(&InputEvent::Key('c'));
        assert!(!g.confirm_reset);
        g.handle_input(&InputEvent::Key('R'));
        assert_eq!(balance(&g), 1.0);
    }

    #[test]
    fn offline_report_swallows_first_input() {
        let mut g = game();
        g.engine().borrow_mut().state_mut().offline_report = Some(OfflineReport {
            earnings: 900.0,
            seconds_away: 90.0,
        });
        assert!(g.handle_input(&InputEvent::Key('c')));
        assert_eq!(balance(&g), 0.0);
        assert_eq!(g.engine().borrow().offline_report(), None);
        g.handle_input(&InputEvent::Key('c'));
        assert_eq!(balance(&g), 1.0);
    }

    #[test]
    fn save_key_logs_success() {
        let mut g = game();
        g.handle_input(&InputEvent::Key('s'));
        assert_eq!(g.log().last().map(String::as_str), Some("セーブしました"));
    }

    #[test]
    fn tabs_switch_by_tap_and_key() {
        let mut g = game();
        g.handle_input(&InputEvent::Click(TAB_STATS));
        assert_eq!(g.tab, Tab::Stats);
        g.handle_input(&InputEvent::Key('t'));
        assert_eq!(g.tab, Tab::Shop);
    }

    #[test]
    fn unknown_input_not_consumed() {
        let mut g = game();
        assert!(!g.handle_input(&InputEvent::Key('z')));
        assert!(!g.handle_input(&InputEvent::Click(9_999)));
    }

    #[test]
    fn level_up_is_logged() {
        let mut g = game();
        set_balance(&g, 4_999.0);
        g.handle_input(&InputEvent::Key('c'));
        assert!(g.log().iter().any(|m| m == "ガレージが Lv.2 に成長した!"));
    }

    #[test]
    fn log_is_capped() {
        let g = game();
        for i in 0..(MAX_LOG + 10) {
            push_log(&g.log, format!("msg {}", i));
        }
        assert_eq!(g.log().len(), MAX_LOG);
        assert_eq!(g.log()[0], "msg 10");
    }
}
