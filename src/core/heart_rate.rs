//! Heart Rate Measurement decoding
//! This module turns the raw value of the Heart Rate Measurement characteristic
//! (0x2A37) into a structured reading, and builds payloads back from readings.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FrameError;

/// Heart rate value is a little-endian u16 instead of a u8
pub const FLAG_HR_VALUE_16BIT: u8 = 1 << 0;
/// Skin contact is currently detected
pub const FLAG_SENSOR_CONTACT_DETECTED: u8 = 1 << 1;
/// Sensor is able to report skin contact at all
pub const FLAG_SENSOR_CONTACT_SUPPORTED: u8 = 1 << 2;
/// Energy Expended field is present
pub const FLAG_ENERGY_EXPENDED: u8 = 1 << 3;
/// One or more RR-Interval values follow
pub const FLAG_RR_INTERVALS: u8 = 1 << 4;

/// RR intervals are transmitted in units of 1/1024 second
pub const RR_INTERVAL_UNITS_PER_SECOND: u32 = 1024;

/// A single decoded heart rate measurement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartRateReading {
    pub beats_per_minute: u16,
    /// Cumulative energy expended in kilojoules, if the sensor reports it
    pub energy_expended_kj: Option<u16>,
    /// RR intervals in arrival order, converted to milliseconds
    pub rr_intervals_ms: Vec<u16>,
    /// `None` when the sensor does not support contact detection
    pub sensor_contact: Option<bool>,
}

impl fmt::Display for HeartRateReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bpm", self.beats_per_minute)?;
        if let Some(energy) = self.energy_expended_kj {
            write!(f, ", {} kJ", energy)?;
        }
        if !self.rr_intervals_ms.is_empty() {
            write!(f, ", RR {:?} ms", self.rr_intervals_ms)?;
        }
        match self.sensor_contact {
            Some(true) => write!(f, ", contact"),
            Some(false) => write!(f, ", no contact"),
            None => Ok(()),
        }
    }
}

/// Decodes a Heart Rate Measurement payload
pub fn decode(data: &[u8]) -> Result<HeartRateReading, FrameError> {
    let Some(&flags) = data.first() else {
        return Err(FrameError::Empty);
    };

    let hr_width = if flags & FLAG_HR_VALUE_16BIT != 0 { 2 } else { 1 };
    let energy_width = if flags & FLAG_ENERGY_EXPENDED != 0 { 2 } else { 0 };
    let required = 1 + hr_width + energy_width;
    if data.len() < required {
        return Err(FrameError::Truncated {
            flags,
            required,
            actual: data.len(),
        });
    }

    let beats_per_minute = if hr_width == 2 {
        u16::from_le_bytes([data[1], data[2]])
    } else {
        data[1] as u16
    };
    let mut offset = 1 + hr_width;

    let energy_expended_kj = if energy_width != 0 {
        let energy = u16::from_le_bytes([data[offset], data[offset + 1]]);
        offset += 2;
        Some(energy)
    } else {
        None
    };

    // whatever follows the declared fields must fill whole RR slots
    let rest = &data[offset..];
    if rest.len() % 2 != 0 {
        return Err(FrameError::UnalignedRrIntervals(rest.len()));
    }
    let rr_intervals_ms = if flags & FLAG_RR_INTERVALS != 0 {
        rest.chunks_exact(2)
            .map(|chunk| rr_to_millis(u16::from_le_bytes([chunk[0], chunk[1]])))
            .collect()
    } else {
        Vec::new()
    };

    let sensor_contact = if flags & FLAG_SENSOR_CONTACT_SUPPORTED != 0 {
        Some(flags & FLAG_SENSOR_CONTACT_DETECTED != 0)
    } else {
        None
    };

    Ok(HeartRateReading {
        beats_per_minute,
        energy_expended_kj,
        rr_intervals_ms,
        sensor_contact,
    })
}

/// Builds the payload a sensor would send for `reading`
pub fn encode(reading: &HeartRateReading) -> Vec<u8> {
    let mut flags = 0u8;
    let mut body = Vec::with_capacity(4 + reading.rr_intervals_ms.len() * 2);

    if reading.beats_per_minute > u8::MAX as u16 {
        flags |= FLAG_HR_VALUE_16BIT;
        body.extend_from_slice(&reading.beats_per_minute.to_le_bytes());
    } else {
        body.push(reading.beats_per_minute as u8);
    }

    match reading.sensor_contact {
        Some(true) => flags |= FLAG_SENSOR_CONTACT_SUPPORTED | FLAG_SENSOR_CONTACT_DETECTED,
        Some(false) => flags |= FLAG_SENSOR_CONTACT_SUPPORTED,
        None => {}
    }

    if let Some(energy) = reading.energy_expended_kj {
        flags |= FLAG_ENERGY_EXPENDED;
        body.extend_from_slice(&energy.to_le_bytes());
    }

    if !reading.rr_intervals_ms.is_empty() {
        flags |= FLAG_RR_INTERVALS;
        for &ms in &reading.rr_intervals_ms {
            body.extend_from_slice(&millis_to_rr(ms).to_le_bytes());
        }
    }

    let mut frame = Vec::with_capacity(body.len() + 1);
    frame.push(flags);
    frame.extend_from_slice(&body);
    frame
}

fn rr_to_millis(raw: u16) -> u16 {
    // rounds half up; u16::MAX maps to 63999 so this never overflows
    ((raw as u32 * 1000 + RR_INTERVAL_UNITS_PER_SECOND / 2) / RR_INTERVAL_UNITS_PER_SECOND) as u16
}

fn millis_to_rr(ms: u16) -> u16 {
    let raw = (ms as u32 * RR_INTERVAL_UNITS_PER_SECOND + 500) / 1000;
    raw.min(u16::MAX as u32) as u16
}
