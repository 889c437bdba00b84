//! Normalized readings from the handheld controller and edge detection for its buttons.

pub mod nunchuk;

/// One sample of every channel the controller exposes.
///
/// Joystick axes are normalized to `[-1.0, 1.0]`; acceleration axes are expressed relative to one g, so a controller
/// lying flat reads roughly `1.0` on Z.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorReading {
    /// Joystick, left to right.
    pub joy_x: f32,
    /// Joystick, down to up.
    pub joy_y: f32,
    /// Acceleration along the X axis.
    pub accel_x: f32,
    /// Acceleration along the Y axis.
    pub accel_y: f32,
    /// Acceleration along the Z axis.
    pub accel_z: f32,
    /// Whether the small, round C button is held.
    pub button_c: bool,
    /// Whether the large, trigger-like Z button is held.
    pub button_z: bool,
}

impl SensorReading {
    fn button(&self, button: Button) -> bool {
        match button {
            Button::C => self.button_c,
            Button::Z => self.button_z,
        }
    }
}

/// The controller's buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Button {
    /// The C button.
    C,
    /// The Z button.
    Z,
}

/// Current and previous [`SensorReading`], from which button edges are derived.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SensorState {
    current: SensorReading,
    previous: SensorReading,
}

impl SensorState {
    /// Records a new sample; the sample it replaces becomes the basis for edge detection.
    pub fn update(&mut self, reading: SensorReading) {
        self.previous = self.current;
        self.current = reading;
    }

    /// The most recent sample.
    pub fn current(&self) -> &SensorReading {
        &self.current
    }

    /// Returns `true` if the button is held in the most recent sample.
    pub fn is_held(&self, button: Button) -> bool {
        self.current.button(button)
    }

    /// Returns `true` if the button went down between the previous and the most recent sample.
    pub fn was_pressed(&self, button: Button) -> bool {
        self.current.button(button) && !self.previous.button(button)
    }

    /// Returns `true` if the button came up between the previous and the most recent sample.
    pub fn was_released(&self, button: Button) -> bool {
        !self.current.button(button) && self.previous.button(button)
    }
}
