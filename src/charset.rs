//! Glyph tables for the two output alphabets.
//!
//! Unicode output composes box-drawing characters under the junction algebra
//! in `canvas.rs`; ASCII output is the lossy fallback where the overlay
//! always wins and every junction collapses to `+`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charset {
    pub horizontal: char,
    pub vertical: char,
    pub corner_tl: char,
    pub corner_tr: char,
    pub corner_bl: char,
    pub corner_br: char,
    pub arrow_up: char,
    pub arrow_down: char,
    pub arrow_left: char,
    pub arrow_right: char,
    pub arrow_fallback: char,
    pub ascii: bool,
}

impl Charset {
    pub fn unicode() -> Self {
        Self {
            horizontal: '─',
            vertical: '│',
            corner_tl: '┌',
            corner_tr: '┐',
            corner_bl: '└',
            corner_br: '┘',
            arrow_up: '▲',
            arrow_down: '▼',
            arrow_left: '◄',
            arrow_right: '►',
            arrow_fallback: '●',
            ascii: false,
        }
    }

    pub fn ascii() -> Self {
        Self {
            horizontal: '-',
            vertical: '|',
            corner_tl: '+',
            corner_tr: '+',
            corner_bl: '+',
            corner_br: '+',
            arrow_up: '^',
            arrow_down: 'v',
            arrow_left: '<',
            arrow_right: '>',
            arrow_fallback: '*',
            ascii: true,
        }
    }

    pub fn for_mode(use_ascii: bool) -> Self {
        if use_ascii {
            Self::ascii()
        } else {
            Self::unicode()
        }
    }
}

/// Arrowhead glyphs in either alphabet, plus the diagonal variants only the
/// Unicode set carries.
pub fn is_arrowhead(ch: char) -> bool {
    matches!(
        ch,
        '▲' | '▼' | '◄' | '►' | '◥' | '◤' | '◢' | '◣' | '●' | '^' | 'v' | '<' | '>' | '*'
    )
}

/// Source-port markers written onto a node border for an outgoing edge.
/// Unicode only; the reverse parser treats these as the authoritative signal
/// that a border cell is a source.
pub fn is_source_marker(ch: char) -> bool {
    matches!(ch, '├' | '┤' | '┬' | '┴' | '┼')
}
