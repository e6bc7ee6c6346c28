//! Key matrix scanning with per-cell debounce.
//!
//! Columns are driven active-low one at a time; rows are inputs with
//! pull-ups, so a pressed key reads low on its row while its column is
//! selected. All columns idle high between scans.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use heapless::Vec;

use crate::clock::{elapsed_ms, Millis};
use crate::config::{COLUMN_SETTLE_US, MATRIX_COLS, MATRIX_DEBOUNCE_MS, MATRIX_ROWS};

/// Every cell can change at most once per scan.
pub const MAX_EVENTS_PER_SCAN: usize = MATRIX_ROWS * MATRIX_COLS;

/// A committed key transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyEvent {
    pub row: usize,
    pub col: usize,
    pub pressed: bool,
}

#[derive(Clone, Copy, Debug, Default)]
struct CellState {
    /// Committed level.
    pressed: bool,
    /// When the committed level last changed.
    last_change: Millis,
    /// When the raw level started disagreeing with `pressed`.
    pending_since: Option<Millis>,
}

/// Stability debouncer: a raw level that disagrees with the committed one
/// must hold for the whole interval before it commits. A bounce back
/// resets the window.
pub struct Debouncer {
    cells: [[CellState; MATRIX_COLS]; MATRIX_ROWS],
    interval_ms: u32,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(MATRIX_DEBOUNCE_MS)
    }
}

impl Debouncer {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            cells: [[CellState::default(); MATRIX_COLS]; MATRIX_ROWS],
            interval_ms,
        }
    }

    /// Feed one raw sample. Returns the new level when a transition commits.
    pub fn update(&mut self, row: usize, col: usize, raw_pressed: bool, now: Millis) -> Option<bool> {
        let cell = &mut self.cells[row][col];

        if raw_pressed == cell.pressed {
            cell.pending_since = None;
            return None;
        }

        match cell.pending_since {
            None => {
                cell.pending_since = Some(now);
                None
            }
            Some(since) if elapsed_ms(now, since) >= self.interval_ms => {
                cell.pressed = raw_pressed;
                cell.last_change = now;
                cell.pending_since = None;
                Some(raw_pressed)
            }
            Some(_) => None,
        }
    }

    pub fn is_pressed(&self, row: usize, col: usize) -> bool {
        self.cells[row][col].pressed
    }

    pub fn last_change(&self, row: usize, col: usize) -> Millis {
        self.cells[row][col].last_change
    }
}

/// Matrix scanner over `embedded-hal` pins.
pub struct Matrix<C: OutputPin, R: InputPin, D: DelayNs> {
    cols: [C; MATRIX_COLS],
    rows: [R; MATRIX_ROWS],
    delay: D,
    debouncer: Debouncer,
}

impl<C: OutputPin, R: InputPin, D: DelayNs> Matrix<C, R, D> {
    pub fn new(cols: [C; MATRIX_COLS], rows: [R; MATRIX_ROWS], delay: D) -> Self {
        let mut matrix = Self {
            cols,
            rows,
            delay,
            debouncer: Debouncer::default(),
        };
        matrix.release_columns();
        matrix
    }

    /// One full pass over the matrix; committed transitions are appended to `events`.
    pub fn scan(&mut self, now: Millis, events: &mut Vec<KeyEvent, MAX_EVENTS_PER_SCAN>) {
        for col in 0..MATRIX_COLS {
            for (i, pin) in self.cols.iter_mut().enumerate() {
                let _ = if i == col { pin.set_low() } else { pin.set_high() };
            }
            self.delay.delay_us(COLUMN_SETTLE_US);

            for row in 0..MATRIX_ROWS {
                let raw_pressed = self.rows[row].is_low().unwrap_or(false);
                if let Some(pressed) = self.debouncer.update(row, col, raw_pressed, now) {
                    trace!("matrix: ({}, {}) pressed={}", row, col, pressed);
                    let _ = events.push(KeyEvent { row, col, pressed });
                }
            }
        }
        self.release_columns();
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }

    fn release_columns(&mut self) {
        for pin in self.cols.iter_mut() {
            let _ = pin.set_high();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use core::convert::Infallible;
    use std::rc::Rc;

    #[test]
    fn short_glitch_is_ignored() {
        let mut d = Debouncer::new(30);
        assert_eq!(d.update(0, 0, true, 100), None);
        assert_eq!(d.update(0, 0, true, 120), None);
        // Bounced back before the interval elapsed.
        assert_eq!(d.update(0, 0, false, 125), None);
        assert_eq!(d.update(0, 0, false, 200), None);
        assert!(!d.is_pressed(0, 0));
    }

    #[test]
    fn stable_change_commits_once() {
        let mut d = Debouncer::new(30);
        assert_eq!(d.update(1, 2, true, 0), None);
        assert_eq!(d.update(1, 2, true, 29), None);
        assert_eq!(d.update(1, 2, true, 30), Some(true));
        assert_eq!(d.update(1, 2, true, 60), None);
        assert!(d.is_pressed(1, 2));
        assert_eq!(d.last_change(1, 2), 30);
    }

    #[test]
    fn bounce_restarts_window() {
        let mut d = Debouncer::new(30);
        d.update(0, 0, true, 0);
        d.update(0, 0, false, 20);
        d.update(0, 0, true, 25);
        assert_eq!(d.update(0, 0, true, 50), None);
        assert_eq!(d.update(0, 0, true, 55), Some(true));
    }

    #[test]
    fn survives_clock_wraparound() {
        let mut d = Debouncer::new(30);
        d.update(0, 0, true, u32::MAX - 10);
        assert_eq!(d.update(0, 0, true, 25), Some(true));
    }

    // Simulated wiring: the pressed set is shared between column and row pins.

    #[derive(Default)]
    struct Wiring {
        selected: Option<usize>,
        pressed: [[bool; MATRIX_COLS]; MATRIX_ROWS],
    }

    struct ColPin {
        index: usize,
        wiring: Rc<RefCell<Wiring>>,
    }

    impl embedded_hal::digital::ErrorType for ColPin {
        type Error = Infallible;
    }

    impl OutputPin for ColPin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.wiring.borrow_mut().selected = Some(self.index);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            let mut w = self.wiring.borrow_mut();
            if w.selected == Some(self.index) {
                w.selected = None;
            }
            Ok(())
        }
    }

    struct RowPin {
        index: usize,
        wiring: Rc<RefCell<Wiring>>,
    }

    impl embedded_hal::digital::ErrorType for RowPin {
        type Error = Infallible;
    }

    impl InputPin for RowPin {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(!self.is_low()?)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            let w = self.wiring.borrow();
            Ok(w.selected.is_some_and(|c| w.pressed[self.index][c]))
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    fn matrix(wiring: &Rc<RefCell<Wiring>>) -> Matrix<ColPin, RowPin, NoDelay> {
        let cols = core::array::from_fn(|index| ColPin {
            index,
            wiring: wiring.clone(),
        });
        let rows = core::array::from_fn(|index| RowPin {
            index,
            wiring: wiring.clone(),
        });
        Matrix::new(cols, rows, NoDelay)
    }

    #[test]
    fn scan_reports_press_and_release() {
        let wiring = Rc::new(RefCell::new(Wiring::default()));
        let mut m = matrix(&wiring);
        let mut events = Vec::new();

        wiring.borrow_mut().pressed[3][1] = true;
        m.scan(0, &mut events);
        assert!(events.is_empty());
        m.scan(30, &mut events);
        assert_eq!(
            events.as_slice(),
            &[KeyEvent {
                row: 3,
                col: 1,
                pressed: true
            }]
        );

        events.clear();
        wiring.borrow_mut().pressed[3][1] = false;
        m.scan(40, &mut events);
        m.scan(70, &mut events);
        assert_eq!(events.len(), 1);
        assert!(!events[0].pressed);
        assert_eq!(wiring.borrow().selected, None);
    }

    #[test]
    fn columns_are_isolated() {
        let wiring = Rc::new(RefCell::new(Wiring::default()));
        let mut m = matrix(&wiring);
        let mut events = Vec::new();

        wiring.borrow_mut().pressed[0][3] = true;
        m.scan(0, &mut events);
        m.scan(50, &mut events);
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].row, events[0].col), (0, 3));
        assert!(!m.debouncer().is_pressed(0, 2));
    }
}
