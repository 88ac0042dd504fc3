//! Plain-text tree output.

use std::fmt::Write;

use treetabs_engine::{CloseTarget, TabRow};

use crate::replay::WindowReport;

/// Renders one window as an indented outline.
///
/// ```text
/// window 1
/// - 1 [2]
///   - 2 [1]
///     * 3
/// + 4 [1] (closes tree)
///   . 5 (hidden)
/// ```
#[must_use]
pub fn window_text(report: &WindowReport) -> String {
    let mut out = format!("window {}\n", report.window);
    for row in &report.rows {
        out.push_str(&row_text(row));
        out.push('\n');
    }
    out
}

fn row_text(row: &TabRow) -> String {
    let mut line = "  ".repeat(row.display_level as usize);
    let marker = match (row.has_children, row.collapsed) {
        (true, true) => '+',
        (true, false) => '-',
        (false, _) if row.active => '*',
        (false, _) => '.',
    };
    let _ = write!(line, "{marker} {}", row.id);
    if row.has_children {
        let _ = write!(line, " [{}]", row.counter);
    }
    if row.close_target == CloseTarget::Tree {
        line.push_str(" (closes tree)");
    }
    if !row.visible {
        line.push_str(" (hidden)");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u32, level: u32) -> TabRow {
        TabRow {
            id,
            parent: None,
            level,
            display_level: level,
            indent_px: level * 12,
            visible: true,
            collapsed: false,
            has_children: false,
            counter: 1,
            close_target: CloseTarget::Tab,
            active: false,
        }
    }

    // ===== Render Tests =====

    #[test]
    fn test_window_text() {
        let mut parent = row(1, 0);
        parent.has_children = true;
        parent.counter = 2;
        let mut child = row(2, 1);
        child.active = true;

        let report = WindowReport {
            window: 4,
            rows: vec![parent, child],
        };
        assert_eq!(window_text(&report), "window 4\n- 1 [2]\n  * 2\n");
    }

    #[test]
    fn test_collapsed_and_hidden() {
        let mut parent = row(7, 0);
        parent.has_children = true;
        parent.collapsed = true;
        parent.counter = 2;
        parent.close_target = CloseTarget::Tree;
        let mut child = row(8, 1);
        child.visible = false;

        assert_eq!(row_text(&parent), "+ 7 [2] (closes tree)");
        assert_eq!(row_text(&child), "  . 8 (hidden)");
    }

    #[test]
    fn test_capped_display_level() {
        let mut deep = row(3, 5);
        deep.display_level = 2;
        assert_eq!(row_text(&deep), "    . 3");
    }
}
