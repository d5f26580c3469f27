//! Garage Tycoon rendering (read-only over the engine).

use std::cell::RefCell;
use std::rc::Rc;

use ratzilla::ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratzilla::ratatui::style::{Color, Modifier, Style};
use ratzilla::ratatui::text::{Line, Span};
use ratzilla::ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratzilla::ratatui::Frame;

use crate::input::{is_narrow_layout, ClickState};
use crate::widgets::{ClickableList, TabBar};

use super::actions::*;
use super::engine::Engine;
use super::logic::{format_duration, format_number, payback_seconds};
use super::state::{is_milestone, UpgradeKind, WorkerType, MAX_LEVEL, MILESTONES};
use super::{GarageGame, Tab};

/// Garage art per tier bracket (Lv.1-4, 5-9, 10-14, 15-19, 20).
static GARAGE_ART: [[&str; 3]; 5] = [
    ["   _____   ", "  /_____\\  ", "  |_[=]_|  "],
    ["  _______  ", " /_______\\ ", " |_[==]_#| "],
    [" _________ ", "/___===___\\", "|_[==][==]|"],
    ["___________", "|##=====##|", "|[==][==]=|"],
    ["_/\\_____/\\_", "|★ ===== ★|", "|[==]★[==]|"],
];

pub fn render(
    game: &GarageGame,
    engine: &Engine,
    f: &mut Frame,
    area: Rect,
    click_state: &Rc<RefCell<ClickState>>,
) {
    let (main_area, log_area) = if area.width >= 80 {
        let h_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(area);
        (h_chunks[0], Some(h_chunks[1]))
    } else {
        (area, None)
    };
    let is_narrow = is_narrow_layout(main_area.width);

    let content = match game.tab {
        Tab::Shop => shop_list(game, engine, is_narrow),
        Tab::Stats => stats_list(engine),
    };
    // Narrow screens size the content to fit and give the rest to the log.
    let content_constraint = if log_area.is_none() {
        Constraint::Length(content.visual_height(main_area.width.saturating_sub(2)) + 2)
    } else {
        Constraint::Min(6)
    };

    let mut constraints = vec![
        Constraint::Length(5),
        Constraint::Length(5),
        Constraint::Length(1),
        content_constraint,
    ];
    if log_area.is_none() {
        constraints.push(Constraint::Min(3));
    }
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(main_area);

    render_header(engine, f, chunks[0], is_narrow);
    render_garage(engine, f, chunks[1], click_state);
    render_tab_bar(game, f, chunks[2], click_state);
    render_content(content, game.tab, f, chunks[3], click_state);
    render_log(game, f, log_area.unwrap_or(chunks[chunks.len() - 1]));

    if let Some(report) = engine.offline_report() {
        render_offline_modal(report.earnings, report.seconds_away, f, area, click_state);
    }
}

fn render_header(engine: &Engine, f: &mut Frame, area: Rect, is_narrow: bool) {
    let level = engine.garage_level();
    let title = if is_narrow {
        " Garage Tycoon "
    } else {
        " Garage Tycoon - ガレージ経営 "
    };

    let mut lines = vec![
        Line::from(vec![
            Span::styled(" 所持金: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("¥{}", format_number(engine.balance().floor())),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  +¥{}/秒", format_number(engine.passive_income_per_second())),
                Style::default().fg(Color::Green),
            ),
        ]),
        Line::from(vec![
            Span::styled(" ガレージ: ", Style::default().fg(Color::Gray)),
            Span::styled(
                format!("Lv.{}", level),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  クリック ¥{}", format_number(engine.click_value() as f64)),
                Style::default().fg(Color::Gray),
            ),
        ]),
    ];

    let bar_width = if is_narrow { 10 } else { 20 };
    let progress = match engine.next_level_threshold() {
        None => Span::styled(" 最大レベル到達!", Style::default().fg(Color::Yellow)),
        Some(_) if is_milestone(level + 1) && !engine.state().has_milestone(level + 1) => {
            Span::styled(
                format!(" 次: マイルストーン Lv.{} が必要", level + 1),
                Style::default().fg(Color::Magenta),
            )
        }
        Some(threshold) => Span::styled(
            format!(
                " 次: {} ¥{}",
                progress_bar(engine.level_progress(), bar_width),
                format_number(threshold)
            ),
            Style::default().fg(Color::Blue),
        ),
    };
    lines.push(Line::from(progress));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Span::styled(
            title,
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    "█".repeat(filled) + &"░".repeat(empty)
}

fn garage_art(level: u8) -> &'static [&'static str; 3] {
    let idx = if level >= MAX_LEVEL {
        4
    } else {
        (level / 5).min(3) as usize
    };
    &GARAGE_ART[idx]
}

fn render_garage(
    engine: &Engine,
    f: &mut Frame,
    area: Rect,
    click_state: &Rc<RefCell<ClickState>>,
) {
    let art_style = Style::default().fg(Color::Yellow);
    let mut lines: Vec<Line> = garage_art(engine.garage_level())
        .iter()
        .map(|row| Line::from(Span::styled(*row, art_style)))
        .collect();
    lines.push(Line::from(Span::styled(
        format!("[C] 修理する +¥{}", format_number(engine.click_value() as f64)),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )));

    let block = Block::default()
        .borders(Borders::TOP | Borders::BOTTOM)
        .border_style(Style::default().fg(Color::DarkGray));
    let widget = Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Center);
    f.render_widget(widget, area);

    click_state.borrow_mut().add_click_target(area, CLICK_GARAGE);
}

fn render_tab_bar(
    game: &GarageGame,
    f: &mut Frame,
    area: Rect,
    click_state: &Rc<RefCell<ClickState>>,
) {
    let tab_style = |tab: Tab, color: Color| -> Style {
        if game.tab == tab {
            Style::default()
                .fg(Color::Black)
                .bg(color)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(color)
        }
    };

    let mut cs = click_state.borrow_mut();
    TabBar::new(" │ ")
        .tab("作業場", tab_style(Tab::Shop, Color::Green), TAB_SHOP)
        .tab("統計", tab_style(Tab::Stats, Color::Cyan), TAB_STATS)
        .render(f, area, &mut cs);
}

fn section(title: &str) -> Line<'static> {
    Line::from(Span::styled(
        format!("── {} ──", title),
        Style::default().fg(Color::DarkGray),
    ))
}

fn item_style(available: bool) -> Style {
    if available {
        Style::default().fg(Color::White)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

fn shop_list(game: &GarageGame, engine: &Engine, is_narrow: bool) -> ClickableList<'static> {
    let state = engine.state();
    let balance = engine.balance();
    let mut cl = ClickableList::new();

    if let Some(level) = engine.pending_milestone() {
        let cost = engine.milestone_cost(level).unwrap_or(0);
        let label = format!(
            " [M] マイルストーン Lv.{} を購入 ¥{}",
            level,
            format_number(cost as f64)
        );
        let style = item_style(balance >= cost as f64).add_modifier(Modifier::BOLD);
        let offer = Line::from(Span::styled(label, style.fg(Color::Magenta)));
        cl.push_clickable(offer, BUY_MILESTONE);
        cl.push_clickable(Line::from(" [X] あとで"), DISMISS_MILESTONE);
    }

    cl.push(section("強化"));
    for &kind in UpgradeKind::all() {
        let track = state.upgrades.get(kind);
        let (key, action) = match kind {
            UpgradeKind::ClickPower => ('U', BUY_CLICK_POWER),
            UpgradeKind::WorkSpeed => ('W', BUY_WORK_SPEED),
        };
        let unlocked = engine.is_upgrade_unlocked(kind);
        let label = match kind.required_milestone() {
            Some(m) if !unlocked => format!(" [{}] {} 🔒 マイルストーン Lv.{}", key, kind.name(), m),
            _ => format!(
                " [{}] {} Lv.{}  ¥{}",
                key,
                kind.name(),
                track.level,
                format_number(track.cost as f64)
            ),
        };
        let available = unlocked && balance >= track.cost as f64;
        cl.push_clickable(Line::from(Span::styled(label, item_style(available))), action);
    }

    cl.push(section("従業員"));
    let ws_level = state.upgrades.work_speed.level;
    for &kind in WorkerType::all() {
        let holding = state.worker(kind);
        let unlocked = engine.is_worker_unlocked(kind);
        let full = holding.count >= kind.cap();
        let head = format!(
            " [{}] {} {}/{}",
            kind.key(),
            kind.name(),
            holding.count,
            kind.cap()
        );
        let label = if !unlocked {
            let m = kind.required_milestone().unwrap_or(0);
            format!("{} 🔒 マイルストーン Lv.{}", head, m)
        } else if full {
            format!("{} 満員", head)
        } else if is_narrow {
            format!("{} ¥{}", head, format_number(holding.cost as f64))
        } else {
            let payback = payback_seconds(kind, holding.cost, ws_level)
                .map(format_duration)
                .unwrap_or_default();
            format!(
                "{} ¥{} (+{}/秒, 回収 {})",
                head,
                format_number(holding.cost as f64),
                format_number(kind.income_rate()),
                payback
            )
        };
        let available = unlocked && !full && balance >= holding.cost as f64;
        cl.push_clickable(
            Line::from(Span::styled(label, item_style(available))),
            HIRE_WORKER_BASE + kind.index() as u16,
        );
    }

    cl.push(Line::from(""));
    cl.push_clickable(Line::from(" [S] セーブ"), FORCE_SAVE);
    let reset_label = if game.confirm_reset {
        Line::from(Span::styled(
            " [R] もう一度押すとリセット",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ))
    } else {
        Line::from(Span::styled(" [R] リセット", Style::default().fg(Color::DarkGray)))
    };
    cl.push_clickable(reset_label, RESET_GAME);
    cl
}

fn stats_list(engine: &Engine) -> ClickableList<'static> {
    let state = engine.state();
    let mut cl = ClickableList::new();
    let row = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!(" {}: ", label), Style::default().fg(Color::Gray)),
            Span::styled(value, Style::default().fg(Color::White)),
        ])
    };

    cl.push(row("累計クリック", format_number(state.total_clicks as f64)));
    cl.push(row("累計収入", format!("¥{}", format_number(state.total_earned))));
    cl.push(row("作業効率", format!("×{:.2}", engine.work_speed_multiplier())));
    cl.push(row("セッション", state.session_count.to_string()));
    cl.push(row(
        "前回プレイ",
        state.last_session_date.clone().unwrap_or_else(|| "-".to_string()),
    ));

    let milestones: Vec<String> = MILESTONES
        .iter()
        .map(|&m| {
            let mark = if state.has_milestone(m) { "✓" } else { "·" };
            format!("Lv.{}{}", m, mark)
        })
        .collect();
    cl.push(row("マイルストーン", milestones.join(" ")));
    cl
}

fn render_content(
    content: ClickableList<'static>,
    tab: Tab,
    f: &mut Frame,
    area: Rect,
    click_state: &Rc<RefCell<ClickState>>,
) {
    let (title, color) = match tab {
        Tab::Shop => (" ショップ ", Color::Green),
        Tab::Stats => (" 統計 ", Color::Cyan),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(title);
    let inner_width = block.inner(area).width;

    content.register_targets(area, &mut click_state.borrow_mut(), 1, 1, 0, inner_width);
    let widget = Paragraph::new(content.into_lines())
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(widget, area);
}

fn render_log(game: &GarageGame, f: &mut Frame, area: Rect) {
    let log = game.log();
    let max_lines = area.height.saturating_sub(2) as usize;
    let start = log.len().saturating_sub(max_lines);
    let lines: Vec<Line> = log[start..]
        .iter()
        .map(|msg| {
            Line::from(Span::styled(
                format!(" > {}", msg),
                Style::default().fg(Color::DarkGray),
            ))
        })
        .collect();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" ログ ");
    let widget = Paragraph::new(lines).block(block).wrap(Wrap { trim: false });
    f.render_widget(widget, area);
}

fn render_offline_modal(
    earnings: f64,
    seconds_away: f64,
    f: &mut Frame,
    area: Rect,
    click_state: &Rc<RefCell<ClickState>>,
) {
    let width = area.width.min(40);
    let height = area.height.min(7);
    let modal = Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    );

    let lines = vec![
        Line::from(format!("留守にしていた時間: {}", format_duration(seconds_away))),
        Line::from(Span::styled(
            format!("従業員が ¥{} 稼いだ!", format_number(earnings)),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(Span::styled("タップで閉じる", Style::default().fg(Color::DarkGray))),
    ];
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" おかえりなさい ");
    f.render_widget(Clear, modal);
    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: false }),
        modal,
    );

    // Registered last so it wins over everything underneath.
    click_state
        .borrow_mut()
        .add_click_target(area, CLOSE_OFFLINE_REPORT);
}
