//! Input plumbing for the web host: pixel to cell conversion, click targets,
//! and the normalized event the garage screen consumes.

use ratzilla::ratatui::layout::Rect;

/// Keyboard, mouse and touch input, normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key(char),
    /// A tap on a registered target (see `garage::actions`).
    Click(u16),
}

/// Tappable region in terminal cells.
#[derive(Debug, Clone)]
pub struct ClickTarget {
    pub rect: Rect,
    pub action_id: u16,
}

/// Targets registered by the last frame, plus the grid size the mouse
/// handler needs to map pixels back to cells.
pub struct ClickState {
    pub targets: Vec<ClickTarget>,
    pub terminal_cols: u16,
    pub terminal_rows: u16,
}

impl ClickState {
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            terminal_cols: 0,
            terminal_rows: 0,
        }
    }

    pub fn clear_targets(&mut self) {
        self.targets.clear();
    }

    pub fn add_click_target(&mut self, rect: Rect, action_id: u16) {
        self.targets.push(ClickTarget { rect, action_id });
    }

    /// Full-width row of `area`. Rows outside the area are ignored.
    pub fn add_row_target(&mut self, area: Rect, row: u16, action_id: u16) {
        if (area.y..area.y + area.height).contains(&row) {
            self.add_click_target(Rect::new(area.x, row, area.width, 1), action_id);
        }
    }

    /// Targets for a one-row tab bar.
    ///
    /// `tab_widths` holds `(display_width, action_id)` of each padded label
    /// (`" 統計 "` is 6 columns). Neighbouring tabs split the separator between
    /// them; the first tab reaches the left edge and the last one the right edge,
    /// so every column of the bar hits some tab.
    pub fn register_tab_targets(
        &mut self,
        tab_widths: &[(u16, u16)],
        separator_width: u16,
        x: u16,
        y: u16,
        total_width: u16,
        height: u16,
    ) {
        if tab_widths.is_empty() || total_width == 0 {
            return;
        }

        let half_sep = separator_width / 2;
        let last = tab_widths.len() - 1;
        let mut left = 0u16;
        let mut label_start = 0u16;
        for (i, &(width, action_id)) in tab_widths.iter().enumerate() {
            let label_end = label_start + width;
            let right = if i == last {
                total_width
            } else {
                (label_end + half_sep).min(total_width)
            };
            if right > left {
                self.add_click_target(Rect::new(x + left, y, right - left, height), action_id);
            }
            left = right;
            label_start = label_end + separator_width;
        }
    }

    /// Topmost target under the cell. Later registrations sit on top.
    pub fn hit_test(&self, col: u16, row: u16) -> Option<u16> {
        self.targets
            .iter()
            .rev()
            .find(|t| {
                let r = t.rect;
                (r.x..r.x + r.width).contains(&col) && (r.y..r.y + r.height).contains(&row)
            })
            .map(|t| t.action_id)
    }
}

pub fn is_narrow_layout(width: u16) -> bool {
    width < 60
}

/// Cell index for a pixel offset along one axis of the grid.
/// `None` outside the grid or when the grid has no size yet.
fn pixel_to_cell(offset: f64, extent: f64, cells: u16) -> Option<u16> {
    if extent <= 0.0 || cells == 0 || offset < 0.0 {
        return None;
    }
    let cell = (offset / (extent / cells as f64)) as u16;
    (cell < cells).then_some(cell)
}

/// Row under `click_y`, measured from the grid container's top edge.
pub fn pixel_y_to_row(click_y: f64, grid_height: f64, terminal_rows: u16) -> Option<u16> {
    pixel_to_cell(click_y, grid_height, terminal_rows)
}

/// Column under `click_x`, measured from the grid container's left edge.
pub fn pixel_x_to_col(click_x: f64, grid_width: f64, terminal_cols: u16) -> Option<u16> {
    pixel_to_cell(click_x, grid_width, terminal_cols)
}
