//! Clickable UI components for the garage screen.
//!
//! Each component renders its lines and registers the matching click
//! targets, so a row and its action can never drift apart.
//!
//! - [`TabBar`]: single-row tab navigation.
//! - [`ClickableList`]: vertical list with per-row actions, wrap-aware.

use ratzilla::ratatui::layout::Rect;
use ratzilla::ratatui::style::{Color, Style};
use ratzilla::ratatui::text::{Line, Span};
use ratzilla::ratatui::widgets::{Paragraph, Wrap};
use ratzilla::ratatui::Frame;

use crate::input::ClickState;

// ── TabBar ─────────────────────────────────────────────────────

/// Horizontal tab bar. Click targets follow the rendered label widths,
/// so full-width (CJK) labels land where they are drawn.
///
/// ```ignore
/// TabBar::new(" │ ")
///     .tab("作業場", style, TAB_SHOP)
///     .tab("統計", style, TAB_STATS)
///     .render(f, area, &mut cs);
/// ```
pub struct TabBar<'a> {
    tabs: Vec<(String, Style, u16)>,
    separator: &'a str,
}

impl<'a> TabBar<'a> {
    pub fn new(separator: &'a str) -> Self {
        Self {
            tabs: Vec::new(),
            separator,
        }
    }

    pub fn tab(mut self, label: impl Into<String>, style: Style, action_id: u16) -> Self {
        self.tabs.push((label.into(), style, action_id));
        self
    }

    pub fn render(self, f: &mut Frame, area: Rect, cs: &mut ClickState) {
        let sep_width = Line::from(self.separator).width() as u16;
        let mut spans: Vec<Span> = Vec::new();
        let mut tab_widths: Vec<(u16, u16)> = Vec::new();

        for (i, (label, style, action_id)) in self.tabs.into_iter().enumerate() {
            if i > 0 {
                spans.push(Span::styled(
                    self.separator,
                    Style::default().fg(Color::DarkGray),
                ));
            }
            let padded = format!(" {} ", label);
            tab_widths.push((Line::from(padded.as_str()).width() as u16, action_id));
            spans.push(Span::styled(padded, style));
        }

        f.render_widget(Paragraph::new(Line::from(spans)), area);
        cs.register_tab_targets(
            &tab_widths,
            sep_width,
            area.x,
            area.y,
            area.width,
            area.height.max(1),
        );
    }
}

// ── ClickableList ──────────────────────────────────────────────

/// Lines paired with the actions of the rows they land on.
///
/// ```ignore
/// let mut cl = ClickableList::new();
/// cl.push(Line::from("── 従業員 ──"));
/// cl.push_clickable(Line::from("見習いを雇う"), HIRE_WORKER_BASE);
/// cl.register_targets(area, &mut cs, 1, 1, 0, inner_width);
/// f.render_widget(Paragraph::new(cl.into_lines()).block(block), area);
/// ```
pub struct ClickableList<'a> {
    lines: Vec<Line<'a>>,
    /// `(line_index, action_id)`
    actions: Vec<(u16, u16)>,
}

impl<'a> ClickableList<'a> {
    pub fn new() -> Self {
        Self {
            lines: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, line: Line<'a>) {
        self.lines.push(line);
    }

    /// Add a line that triggers `action_id` on every row it wraps onto.
    pub fn push_clickable(&mut self, line: Line<'a>, action_id: u16) {
        let idx = self.lines.len() as u16;
        self.actions.push((idx, action_id));
        self.lines.push(line);
    }

    pub fn into_lines(self) -> Vec<Line<'a>> {
        self.lines
    }

    /// Rows the list occupies when rendered with `Wrap { trim: false }`
    /// at `width` columns.
    pub fn visual_height(&self, width: u16) -> u16 {
        if width == 0 {
            return self.lines.len() as u16;
        }
        Paragraph::new(self.lines.clone())
            .wrap(Wrap { trim: false })
            .line_count(width) as u16
    }

    /// Register targets for every clickable line.
    ///
    /// `top_offset`/`bottom_offset` are the rows taken by borders, `scroll`
    /// is in visual rows. With `inner_width == 0` each line is one row;
    /// otherwise rows are counted the way the wrapped paragraph lays them out.
    pub fn register_targets(
        &self,
        area: Rect,
        cs: &mut ClickState,
        top_offset: u16,
        bottom_offset: u16,
        scroll: u16,
        inner_width: u16,
    ) {
        let content_y = area.y + top_offset;
        let content_end = area.y + area.height.saturating_sub(bottom_offset);

        let mut starts: Vec<(u16, u16)> = Vec::with_capacity(self.lines.len());
        let mut cumulative: u16 = 0;
        for line in &self.lines {
            let rows = wrapped_rows(line, inner_width);
            starts.push((cumulative, rows));
            cumulative += rows;
        }

        for &(line_idx, action_id) in &self.actions {
            let Some(&(vstart, rows)) = starts.get(line_idx as usize) else {
                continue;
            };
            for vr in vstart..vstart + rows {
                if vr < scroll {
                    continue;
                }
                let screen_row = content_y + (vr - scroll);
                if screen_row >= content_end {
                    break;
                }
                cs.add_row_target(area, screen_row, action_id);
            }
        }
    }
}

fn wrapped_rows(line: &Line, width: u16) -> u16 {
    if width == 0 {
        return 1;
    }
    (Paragraph::new(line.clone())
        .wrap(Wrap { trim: false })
        .line_count(width) as u16)
        .max(1)
}
