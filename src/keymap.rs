//! Symbolic keymap: one optional symbol per matrix cell.
//!
//! Edited live by the control channel and reverted to [`Keymap::default`]
//! on every boot.

use heapless::String;

use crate::config::{MATRIX_COLS, MATRIX_ROWS};

/// Longest symbol a cell can hold, in bytes.
pub const SYMBOL_CAPACITY: usize = 16;

pub type Symbol = String<SYMBOL_CAPACITY>;

/// Built-in layout, a calculator-style number pad.
const DEFAULT_LAYOUT: [[Option<&str>; MATRIX_COLS]; MATRIX_ROWS] = [
    [Some("PROFILE"), Some("/"), Some("*"), Some("-")],
    [Some("7"), Some("8"), Some("9"), Some("+")],
    [Some("4"), Some("5"), Some("6"), None],
    [Some("1"), Some("2"), Some("3"), Some("=")],
    [Some("0"), Some("."), None, None],
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keymap {
    cells: [[Option<Symbol>; MATRIX_COLS]; MATRIX_ROWS],
}

impl Default for Keymap {
    fn default() -> Self {
        let mut keymap = Self::empty();
        for (r, row) in DEFAULT_LAYOUT.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                keymap.set(r, c, *cell);
            }
        }
        keymap
    }
}

impl Keymap {
    pub fn empty() -> Self {
        Self {
            cells: Default::default(),
        }
    }

    /// Symbol bound at (row, col). Out-of-range cells are unbound.
    pub fn get(&self, row: usize, col: usize) -> Option<&str> {
        self.cells
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|cell| cell.as_deref())
    }

    /// Bind or clear a cell. Returns `false` when the cell is out of range
    /// or the symbol is too long to store.
    pub fn set(&mut self, row: usize, col: usize, symbol: Option<&str>) -> bool {
        let Some(cell) = self.cells.get_mut(row).and_then(|r| r.get_mut(col)) else {
            return false;
        };
        match symbol.filter(|s| !s.is_empty()) {
            None => {
                *cell = None;
                true
            }
            Some(s) => match Symbol::try_from(s) {
                Ok(sym) => {
                    *cell = Some(sym);
                    true
                }
                Err(_) => false,
            },
        }
    }

    /// Number of bound cells.
    pub fn bound_count(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }

    /// Bound cells in row-major order.
    pub fn bindings(&self) -> impl Iterator<Item = (usize, usize, &str)> + '_ {
        self.cells.iter().enumerate().flat_map(|(r, row)| {
            row.iter()
                .enumerate()
                .filter_map(move |(c, cell)| cell.as_deref().map(|s| (r, c, s)))
        })
    }
}

/// Parse a `"row-col"` cell id. Range is checked by [`Keymap::set`].
pub fn parse_cell_id(id: &str) -> Option<(usize, usize)> {
    let (row, col) = id.split_once('-')?;
    Some((row.trim().parse().ok()?, col.trim().parse().ok()?))
}
