//! Driver for the Wii Nunchuk, generic over any [`embedded_hal`] I2C bus.
//!
//! The Nunchuk is initialized in its unencrypted mode. It then exposes a 6-byte report at register `0x00` and a
//! 16-byte factory calibration block at register `0x20`. See <https://www.xarg.org/2016/12/using-a-wii-nunchuk-with-arduino/>.

use super::SensorReading;
use embedded_hal::{delay::DelayNs, i2c::I2c};

/// The Nunchuk's fixed I2C address.
pub const ADDRESS: u8 = 0x52;

const REPORT_REGISTER: u8 = 0x00;
const CALIBRATION_REGISTER: u8 = 0x20;

/// Fraction of each joystick half-range treated as dead zone at the center (and as saturation at the edge).
const JOYSTICK_DEAD_ZONE: f32 = 0.1;

/// Calibration for one joystick axis: raw readings at both extremes and at rest.
#[derive(Clone, Copy, Debug, PartialEq)]
struct JoyAxis {
    min: u8,
    center: u8,
    max: u8,
}

impl JoyAxis {
    fn normalize(&self, raw: u8) -> f32 {
        let (distance, range, sign) = if raw < self.center {
            (self.center - raw, self.center.saturating_sub(self.min), -1.0)
        } else {
            (raw - self.center, self.max.saturating_sub(self.center), 1.0)
        };
        if range == 0 {
            return 0.0;
        }

        let full = f32::from(distance) / f32::from(range);
        let value = (full - JOYSTICK_DEAD_ZONE) / (1.0 - 2.0 * JOYSTICK_DEAD_ZONE);
        sign * value.clamp(0.0, 1.0)
    }
}

/// Calibration for one acceleration axis: 10-bit readings at zero and at one g.
#[derive(Clone, Copy, Debug, PartialEq)]
struct AccelAxis {
    zero_g: u16,
    one_g: u16,
}

impl AccelAxis {
    fn normalize(&self, raw: u16) -> f32 {
        let one_g = f32::from(self.one_g) - f32::from(self.zero_g);
        if one_g == 0.0 {
            return 0.0;
        }
        (f32::from(raw) - f32::from(self.zero_g)) / one_g
    }
}

/// Factory calibration data, as stored in the Nunchuk's calibration block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    accel: [AccelAxis; 3],
    joy: [JoyAxis; 2],
}

impl Calibration {
    /// Decodes the 16-byte calibration block. The last two bytes are a checksum and are ignored.
    pub fn from_bytes(bytes: &[u8; 16]) -> Self {
        // the two least significant bits of the 10-bit values are packed into bytes 3 and 7, Z first
        let ten_bit = |msb: u8, lsb_byte: u8, shift: u8| (u16::from(msb) << 2) | u16::from((lsb_byte >> shift) & 0b11);
        let accel = |axis: usize, shift: u8| AccelAxis {
            zero_g: ten_bit(bytes[axis], bytes[3], shift),
            one_g: ten_bit(bytes[4 + axis], bytes[7], shift),
        };

        Self {
            accel: [accel(0, 4), accel(1, 2), accel(2, 0)],
            joy: [
                JoyAxis {
                    max: bytes[8],
                    min: bytes[9],
                    center: bytes[10],
                },
                JoyAxis {
                    max: bytes[11],
                    min: bytes[12],
                    center: bytes[13],
                },
            ],
        }
    }

    /// Converts a raw [`Report`] into a normalized [`SensorReading`].
    pub fn reading(&self, report: &Report) -> SensorReading {
        SensorReading {
            joy_x: self.joy[0].normalize(report.joy[0]),
            joy_y: self.joy[1].normalize(report.joy[1]),
            accel_x: self.accel[0].normalize(report.accel[0]),
            accel_y: self.accel[1].normalize(report.accel[1]),
            accel_z: self.accel[2].normalize(report.accel[2]),
            button_c: report.button_c,
            button_z: report.button_z,
        }
    }
}

/// A raw, uncalibrated report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Report {
    joy: [u8; 2],
    accel: [u16; 3],
    button_c: bool,
    button_z: bool,
}

impl Report {
    /// Decodes the 6-byte report. Buttons are active low; the last byte also carries the low bits of each acceleration
    /// axis.
    pub fn from_bytes(bytes: &[u8; 6]) -> Self {
        let packed = bytes[5];
        let ten_bit = |msb: u8, shift: u8| (u16::from(msb) << 2) | u16::from((packed >> shift) & 0b11);

        Self {
            joy: [bytes[0], bytes[1]],
            accel: [
                ten_bit(bytes[2], 2),
                ten_bit(bytes[3], 4),
                ten_bit(bytes[4], 6),
            ],
            button_z: packed & 0b01 == 0,
            button_c: packed & 0b10 == 0,
        }
    }
}

/// A Nunchuk attached to an I2C bus.
pub struct Nunchuk<I2C, D> {
    i2c: I2C,
    delay: D,
    calibration: Calibration,
}

impl<I2C: I2c, D: DelayNs> Nunchuk<I2C, D> {
    /// Wakes the Nunchuk in unencrypted mode and reads its calibration block.
    pub fn new(i2c: I2C, delay: D) -> Result<Self, I2C::Error> {
        let mut nunchuk = Self {
            i2c,
            delay,
            calibration: Calibration::from_bytes(&[0; 16]),
        };

        // the first write wakes the device, the second turns off encryption of reports
        nunchuk.delay.delay_ms(100);
        nunchuk.i2c.write(ADDRESS, &[0xF0, 0x55])?;
        nunchuk.delay.delay_ms(100);
        nunchuk.i2c.write(ADDRESS, &[0xFB, 0x00])?;
        nunchuk.delay.delay_ms(100);

        let mut calibration = [0; 16];
        nunchuk.read_register(CALIBRATION_REGISTER, &mut calibration)?;
        nunchuk.calibration = Calibration::from_bytes(&calibration);
        trace!("Nunchuk calibration read");

        Ok(nunchuk)
    }

    /// Reads and normalizes the current state of the controller.
    pub fn read(&mut self) -> Result<SensorReading, I2C::Error> {
        let mut report = [0; 6];
        self.read_register(REPORT_REGISTER, &mut report)?;
        Ok(self.calibration.reading(&Report::from_bytes(&report)))
    }

    fn read_register(&mut self, register: u8, buf: &mut [u8]) -> Result<(), I2C::Error> {
        self.i2c.write(ADDRESS, &[register])?;
        // the Nunchuk needs a moment to latch the register before it can be read
        self.delay.delay_ms(3);
        self.i2c.read(ADDRESS, buf)
    }
}
