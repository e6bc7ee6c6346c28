//! Rotary encoder with push button: volume up/down on rotation, mute on press.
//!
//! Only clock-line edges are decoded. On each edge the data line is
//! compared with the new clock level; a mechanical detent produces
//! several edges, which are coalesced by an accumulator.

use embedded_hal::digital::InputPin;
use heapless::Vec;

use crate::clock::{elapsed_ms, Millis};
use crate::config::{ENCODER_BUTTON_COOLDOWN_MS, ENCODER_DETENT_THRESHOLD, ENCODER_REARM_MS};

/// What the encoder asks the HID gateway to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncoderIntent {
    VolumeUp,
    VolumeDown,
    Mute,
}

/// Pin-independent decoder state.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderState {
    last_clock_level: bool,
    last_edge: Millis,
    position: i8,
    button_pressed: bool,
    last_button: Option<Millis>,
}

impl EncoderState {
    pub fn new(clock_level: bool) -> Self {
        Self {
            last_clock_level: clock_level,
            last_edge: 0,
            position: 0,
            button_pressed: false,
            last_button: None,
        }
    }

    pub fn position(&self) -> i8 {
        self.position
    }

    /// Feed one sample of the phase lines.
    pub fn update_rotation(&mut self, clock: bool, data: bool, now: Millis) -> Option<EncoderIntent> {
        if elapsed_ms(now, self.last_edge) > ENCODER_REARM_MS {
            if clock != self.last_clock_level {
                if data != clock {
                    self.position = self.position.saturating_add(1);
                } else {
                    self.position = self.position.saturating_sub(1);
                }
                self.last_edge = now;
            }
            self.last_clock_level = clock;
        }

        if self.position >= ENCODER_DETENT_THRESHOLD {
            self.position = 0;
            Some(EncoderIntent::VolumeUp)
        } else if self.position <= -ENCODER_DETENT_THRESHOLD {
            self.position = 0;
            Some(EncoderIntent::VolumeDown)
        } else {
            None
        }
    }

    /// Feed one sample of the (active-low) button line.
    pub fn update_button(&mut self, pressed: bool, now: Millis) -> Option<EncoderIntent> {
        if !pressed {
            self.button_pressed = false;
            return None;
        }
        if self.button_pressed {
            return None;
        }
        let cooled_down = self
            .last_button
            .map_or(true, |t| elapsed_ms(now, t) > ENCODER_BUTTON_COOLDOWN_MS);
        if !cooled_down {
            return None;
        }
        self.button_pressed = true;
        self.last_button = Some(now);
        Some(EncoderIntent::Mute)
    }
}

/// Encoder bound to its three input lines.
pub struct Encoder<A: InputPin, B: InputPin, S: InputPin> {
    clock: A,
    data: B,
    button: S,
    state: EncoderState,
}

impl<A: InputPin, B: InputPin, S: InputPin> Encoder<A, B, S> {
    pub fn new(mut clock: A, data: B, button: S) -> Self {
        let level = clock.is_high().unwrap_or(false);
        Self {
            clock,
            data,
            button,
            state: EncoderState::new(level),
        }
    }

    /// Sample all lines once and return the intents produced this tick.
    pub fn poll(&mut self, now: Millis) -> Vec<EncoderIntent, 2> {
        let mut intents = Vec::new();

        let clock = self.clock.is_high().unwrap_or(self.state.last_clock_level);
        let data = self.data.is_high().unwrap_or(false);
        if let Some(intent) = self.state.update_rotation(clock, data, now) {
            debug!("encoder: {:?}", intent);
            let _ = intents.push(intent);
        }

        let pressed = self.button.is_low().unwrap_or(false);
        if let Some(intent) = self.state.update_button(pressed, now) {
            debug!("encoder: button");
            let _ = intents.push(intent);
        }

        intents
    }
}
