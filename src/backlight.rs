//! Key backlight level.

use crate::config::{BACKLIGHT_DEFAULT_BRIGHTNESS, BACKLIGHT_PWM_TOP};

/// A PWM channel driving the backlight LEDs.
pub trait Dimmer {
    /// Set the duty cycle in `0..=BACKLIGHT_PWM_TOP`.
    fn set_duty(&mut self, duty: u16);
}

pub struct Backlight<D: Dimmer> {
    dimmer: D,
    enabled: bool,
    brightness: u8,
}

impl<D: Dimmer> Backlight<D> {
    /// Power-on state: enabled at the default brightness.
    pub fn new(dimmer: D) -> Self {
        let mut backlight = Self {
            dimmer,
            enabled: true,
            brightness: BACKLIGHT_DEFAULT_BRIGHTNESS,
        };
        backlight.apply();
        backlight
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn dimmer(&self) -> &D {
        &self.dimmer
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.apply();
    }

    /// Out-of-range values are clamped to 0-255.
    pub fn set_brightness(&mut self, brightness: i64) {
        self.brightness = brightness.clamp(0, u8::MAX as i64) as u8;
        self.apply();
    }

    /// Duty for the current state; 0 while disabled.
    pub fn duty(&self) -> u16 {
        if !self.enabled {
            return 0;
        }
        (u32::from(self.brightness) * u32::from(BACKLIGHT_PWM_TOP) / 255) as u16
    }

    fn apply(&mut self) {
        let duty = self.duty();
        self.dimmer.set_duty(duty);
        debug!("backlight: enabled={} brightness={} duty={}", self.enabled, self.brightness, duty);
    }
}

/// Backlight LEDs on one channel of an nRF PWM instance.
#[cfg(feature = "embedded")]
pub struct PwmDimmer<T: embassy_nrf::pwm::Instance> {
    pwm: embassy_nrf::pwm::SimplePwm<'static, T>,
}

#[cfg(feature = "embedded")]
impl<T: embassy_nrf::pwm::Instance> PwmDimmer<T> {
    pub fn new(mut pwm: embassy_nrf::pwm::SimplePwm<'static, T>) -> Self {
        pwm.set_max_duty(BACKLIGHT_PWM_TOP);
        Self { pwm }
    }
}

#[cfg(feature = "embedded")]
impl<T: embassy_nrf::pwm::Instance> Dimmer for PwmDimmer<T> {
    fn set_duty(&mut self, duty: u16) {
        self.pwm.set_duty(0, duty);
    }
}
