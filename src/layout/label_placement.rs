//! Edge label handling: picking the path segment a label annotates during
//! layout, and finding a start column on the composited canvas that leaves
//! every protected glyph intact.

use std::collections::{BTreeMap, HashSet};

use crate::canvas::{junction_mask, Canvas, CONNECT_DOWN, CONNECT_LEFT, CONNECT_RIGHT, CONNECT_UP};
use crate::charset::is_arrowhead;
use crate::text_metrics::str_width;

use super::types::{DrawingCoord, GridCoord};

/// Grid-space footprint of an already chosen label, consulted so later
/// labels pick different segments instead of stacking.
#[derive(Debug, Clone, Copy)]
pub struct PlacedLabel {
    pub row: i32,
    pub x_range: (i32, i32),
}

/// Chooses the segment a label annotates: the first segment wide enough for
/// the label that collides with neither earlier labels nor node blocks,
/// falling back to the widest collision-free segment, then to the widest
/// overall. Returns the segment plus the label footprint to reserve.
pub fn determine_label_line(
    path: &[GridCoord],
    label_width: i32,
    column_width: &BTreeMap<i32, i32>,
    placed: &[PlacedLabel],
    node_blocks: &[GridCoord],
) -> Option<((GridCoord, GridCoord), PlacedLabel)> {
    if path.len() < 2 {
        return None;
    }

    let mut widest: Option<((GridCoord, GridCoord), PlacedLabel, i32)> = None;
    let mut widest_free: Option<((GridCoord, GridCoord), PlacedLabel, i32)> = None;

    for pair in path.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let width = spanned_width(a, b, column_width);
        let footprint = footprint_of(a, b);
        let free = !collides(&footprint, placed, node_blocks)
            && !is_border_column(mid_column(&footprint), node_blocks);

        if width >= label_width && free {
            return Some(((a, b), footprint));
        }
        if widest.as_ref().map_or(true, |(.., w)| width > *w) {
            widest = Some(((a, b), footprint, width));
        }
        if free && widest_free.as_ref().map_or(true, |(.., w)| width > *w) {
            widest_free = Some(((a, b), footprint, width));
        }
    }

    widest_free
        .or(widest)
        .map(|(line, footprint, _)| (line, footprint))
}

/// Sum of the column widths a segment spans; a vertical segment only offers
/// its own column.
fn spanned_width(a: GridCoord, b: GridCoord, column_width: &BTreeMap<i32, i32>) -> i32 {
    if a.y == b.y {
        let (lo, hi) = (a.x.min(b.x), a.x.max(b.x));
        (lo..=hi)
            .map(|x| column_width.get(&x).copied().unwrap_or(0))
            .sum()
    } else {
        column_width.get(&a.x).copied().unwrap_or(0)
    }
}

fn footprint_of(a: GridCoord, b: GridCoord) -> PlacedLabel {
    let row = if a.y == b.y {
        a.y
    } else {
        a.y.min(b.y) + (a.y - b.y).abs() / 2
    };
    PlacedLabel {
        row,
        x_range: (a.x.min(b.x), a.x.max(b.x)),
    }
}

fn mid_column(footprint: &PlacedLabel) -> i32 {
    footprint.x_range.0 + (footprint.x_range.1 - footprint.x_range.0) / 2
}

/// Node border columns keep width 1 so ports project exactly onto box
/// borders; widening one for a label would shear every box in that band.
pub fn is_border_column(x: i32, node_blocks: &[GridCoord]) -> bool {
    node_blocks
        .iter()
        .any(|block| x == block.x || x == block.x + 2)
}

fn collides(footprint: &PlacedLabel, placed: &[PlacedLabel], node_blocks: &[GridCoord]) -> bool {
    for other in placed {
        if other.row == footprint.row
            && footprint.x_range.0 <= other.x_range.1
            && other.x_range.0 <= footprint.x_range.1
        {
            return true;
        }
    }
    let mid_x = footprint.x_range.0 + (footprint.x_range.1 - footprint.x_range.0) / 2;
    for block in node_blocks {
        if (block.x..block.x + 3).contains(&mid_x)
            && (block.y..block.y + 3).contains(&footprint.row)
        {
            return true;
        }
    }
    false
}

/// Midpoint grid column of a chosen label line; layout widens this column to
/// make room for the label.
pub fn label_line_mid_column(line: (GridCoord, GridCoord)) -> i32 {
    let (lo, hi) = (line.0.x.min(line.1.x), line.0.x.max(line.1.x));
    lo + (hi - lo) / 2
}

/// Finds the start cell for a label on the composited canvas, searching
/// nearest-first around the centred position. A candidate is accepted only
/// if no covered cell is an arrowhead, a junction or corner, a bridge
/// crossing, or on the explicit avoid list; those glyphs carry routing
/// semantics the reverse parser depends on. Returns `None` when no clean
/// position exists; the label is then dropped rather than corrupting the
/// art.
pub fn place_label(
    base: &Canvas,
    label: &str,
    line: (DrawingCoord, DrawingCoord),
    avoid: &HashSet<(i32, i32)>,
) -> Option<DrawingCoord> {
    let width = str_width(label) as i32;
    if width == 0 {
        return None;
    }
    let (max_x, _) = base.size();
    let seg_lo = line.0.x.min(line.1.x);
    let seg_hi = line.0.x.max(line.1.x);
    let row = line.0.y.min(line.1.y) + (line.0.y - line.1.y).abs() / 2;
    let centred = seg_lo + (seg_hi - seg_lo) / 2 - width / 2;

    // Prefer staying inside the chosen segment when the label fits there.
    let (range_lo, range_hi) = if seg_hi - seg_lo + 1 >= width {
        (seg_lo, seg_hi - width + 1)
    } else {
        (0, max_x - width + 1)
    };
    if range_hi < range_lo {
        return None;
    }

    let fits = |start: i32| -> bool {
        (start..start + width).all(|x| !avoid.contains(&(x, row)) && !is_protected(base, x, row))
    };

    let centred = centred.clamp(range_lo, range_hi);
    for delta in 0..=(range_hi - range_lo) {
        for start in [centred - delta, centred + delta] {
            if (range_lo..=range_hi).contains(&start) && fits(start) {
                return Some(DrawingCoord::new(start, row));
            }
        }
    }
    None
}

/// Cells a label must never cover: arrowheads, junction and corner glyphs,
/// and bridge crossings (a cell flanked by strokes pointing at it on both
/// axes).
fn is_protected(base: &Canvas, x: i32, y: i32) -> bool {
    let Some(ch) = base.get(x, y) else {
        return false;
    };
    if is_arrowhead(ch) {
        return true;
    }
    if matches!(ch, '┌' | '┐' | '└' | '┘' | '├' | '┤' | '┬' | '┴' | '┼' | '+') {
        return true;
    }

    let arm = |cx: i32, cy: i32, bit: u8| -> bool {
        base.get(cx, cy)
            .and_then(junction_mask)
            .map_or(false, |mask| mask & bit != 0)
    };
    let horizontal = arm(x - 1, y, CONNECT_RIGHT) && arm(x + 1, y, CONNECT_LEFT);
    let vertical = arm(x, y - 1, CONNECT_DOWN) && arm(x, y + 1, CONNECT_UP);
    horizontal && vertical
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widths(entries: &[(i32, i32)]) -> BTreeMap<i32, i32> {
        entries.iter().copied().collect()
    }

    #[test]
    fn picks_first_segment_wide_enough() {
        let path = [
            GridCoord::new(2, 1),
            GridCoord::new(4, 1),
            GridCoord::new(4, 5),
        ];
        let columns = widths(&[(2, 1), (3, 12), (4, 1)]);
        let (line, _) = determine_label_line(&path, 8, &columns, &[], &[]).unwrap();
        assert_eq!(line, (GridCoord::new(2, 1), GridCoord::new(4, 1)));
    }

    #[test]
    fn skips_segments_already_carrying_a_label() {
        let path = [
            GridCoord::new(2, 1),
            GridCoord::new(6, 1),
            GridCoord::new(6, 5),
            GridCoord::new(10, 5),
        ];
        let columns = widths(&[(2, 1), (3, 12), (4, 1), (5, 5), (6, 1), (7, 12), (8, 1), (9, 5), (10, 1)]);
        let taken = PlacedLabel {
            row: 1,
            x_range: (2, 6),
        };
        let (line, _) = determine_label_line(&path, 8, &columns, &[taken], &[]).unwrap();
        assert_ne!(line.0.y, 1);
    }

    #[test]
    fn falls_back_to_widest_segment() {
        let path = [
            GridCoord::new(2, 1),
            GridCoord::new(4, 1),
            GridCoord::new(4, 3),
        ];
        let columns = widths(&[(2, 1), (3, 4), (4, 1)]);
        // Label wider than anything available still gets the widest line.
        let (line, _) = determine_label_line(&path, 40, &columns, &[], &[]).unwrap();
        assert_eq!(line, (GridCoord::new(2, 1), GridCoord::new(4, 1)));
    }

    #[test]
    fn place_label_centres_on_the_segment() {
        let mut base = Canvas::new(20, 4);
        for x in 3..=17 {
            base.set(x, 2, '─');
        }
        let start = place_label(
            &base,
            "go",
            (DrawingCoord::new(3, 2), DrawingCoord::new(17, 2)),
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(start, DrawingCoord::new(9, 2));
    }

    #[test]
    fn place_label_slides_off_protected_cells() {
        let mut base = Canvas::new(20, 4);
        for x in 3..=17 {
            base.set(x, 2, '─');
        }
        base.set(9, 2, '┬');
        let start = place_label(
            &base,
            "go",
            (DrawingCoord::new(3, 2), DrawingCoord::new(17, 2)),
            &HashSet::new(),
        )
        .unwrap();
        // Both covered cells are plain stroke cells.
        assert!(start.x + 1 < 9 || start.x > 9);
    }

    #[test]
    fn bridge_crossings_are_protected() {
        let mut base = Canvas::new(4, 4);
        base.set(1, 2, '─');
        base.set(3, 2, '─');
        base.set(2, 1, '│');
        base.set(2, 3, '│');
        base.set(2, 2, '─');
        assert!(is_protected(&base, 2, 2));
        assert!(!is_protected(&base, 1, 2));
    }
}
