//! Physical dimension and scale encoding for metric values
//!
//! A unit is a product of powers of three base dimensions (space, time,
//! count), each paired with a scale. The whole description packs into a
//! single `u32` stored in each metric descriptor so readers can decode it
//! without any external schema.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShmStatsError};

/// Space scale steps (powers of 1024 from bytes)
pub const SCALE_BYTE: u8 = 0;
pub const SCALE_KBYTE: u8 = 1;
pub const SCALE_MBYTE: u8 = 2;
pub const SCALE_GBYTE: u8 = 3;
pub const SCALE_TBYTE: u8 = 4;

/// Time scale steps
pub const SCALE_NSEC: u8 = 0;
pub const SCALE_USEC: u8 = 1;
pub const SCALE_MSEC: u8 = 2;
pub const SCALE_SEC: u8 = 3;
pub const SCALE_MIN: u8 = 4;
pub const SCALE_HOUR: u8 = 5;

const DIM_MIN: i8 = -8;
const DIM_MAX: i8 = 7;
const SPACE_SCALE_MAX: u8 = 8;
const TIME_SCALE_MAX: u8 = 6;

/// Dimension and scale of a metric value
///
/// Dimensions are small signed exponents; scales select the measurement
/// granularity per dimension. `count_scale` is a signed power of ten
/// applied to the count dimension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Units {
    pub space_dim: i8,
    pub time_dim: i8,
    pub count_dim: i8,
    pub space_scale: u8,
    pub time_scale: u8,
    pub count_scale: i8,
}

impl Units {
    /// Dimensionless unit (plain counts of one)
    pub const NONE: Units = Units {
        space_dim: 0,
        time_dim: 0,
        count_dim: 0,
        space_scale: 0,
        time_scale: 0,
        count_scale: 0,
    };

    /// A count of events (count dimension 1)
    pub fn count() -> Self {
        Units {
            count_dim: 1,
            ..Default::default()
        }
    }

    /// A space quantity at the given scale (e.g. `SCALE_KBYTE`)
    pub fn space(scale: u8) -> Self {
        Units {
            space_dim: 1,
            space_scale: scale,
            ..Default::default()
        }
    }

    /// A time quantity at the given scale (e.g. `SCALE_USEC`)
    pub fn time(scale: u8) -> Self {
        Units {
            time_dim: 1,
            time_scale: scale,
            ..Default::default()
        }
    }

    /// A rate: count per time unit at the given scale
    pub fn per_time(scale: u8) -> Self {
        Units {
            count_dim: 1,
            time_dim: -1,
            time_scale: scale,
            ..Default::default()
        }
    }

    /// Validate dimension and scale ranges
    pub fn validate(&self) -> Result<()> {
        for (label, dim) in [
            ("space", self.space_dim),
            ("time", self.time_dim),
            ("count", self.count_dim),
        ] {
            if !(DIM_MIN..=DIM_MAX).contains(&dim) {
                return Err(ShmStatsError::validation(format!(
                    "{} dimension {} out of range [{}, {}]",
                    label, dim, DIM_MIN, DIM_MAX
                )));
            }
        }
        if self.space_scale > SPACE_SCALE_MAX {
            return Err(ShmStatsError::validation(format!(
                "space scale {} exceeds {}",
                self.space_scale, SPACE_SCALE_MAX
            )));
        }
        if self.time_scale > TIME_SCALE_MAX {
            return Err(ShmStatsError::validation(format!(
                "time scale {} exceeds {}",
                self.time_scale, TIME_SCALE_MAX
            )));
        }
        if !(DIM_MIN..=DIM_MAX).contains(&self.count_scale) {
            return Err(ShmStatsError::validation(format!(
                "count scale {} out of range [{}, {}]",
                self.count_scale, DIM_MIN, DIM_MAX
            )));
        }
        Ok(())
    }

    /// Pack into the descriptor wire encoding
    ///
    /// Nibble layout, most significant first: space_dim, time_dim,
    /// count_dim, space_scale, time_scale, count_scale, then 8 zero bits.
    pub fn pack(&self) -> u32 {
        ((self.space_dim as u32 & 0xf) << 28)
            | ((self.time_dim as u32 & 0xf) << 24)
            | ((self.count_dim as u32 & 0xf) << 20)
            | ((self.space_scale as u32 & 0xf) << 16)
            | ((self.time_scale as u32 & 0xf) << 12)
            | ((self.count_scale as u32 & 0xf) << 8)
    }

    /// Decode the wire encoding produced by [`Units::pack`]
    pub fn unpack(bits: u32) -> Self {
        // Sign-extend the 4-bit dimension fields
        let nibble_i8 = |v: u32| -> i8 { ((((v & 0xf) as u8) << 4) as i8) >> 4 };
        Units {
            space_dim: nibble_i8(bits >> 28),
            time_dim: nibble_i8(bits >> 24),
            count_dim: nibble_i8(bits >> 20),
            space_scale: ((bits >> 16) & 0xf) as u8,
            time_scale: ((bits >> 12) & 0xf) as u8,
            count_scale: nibble_i8(bits >> 8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_roundtrip() {
        let cases = [
            Units::NONE,
            Units::count(),
            Units::space(SCALE_MBYTE),
            Units::time(SCALE_USEC),
            Units::per_time(SCALE_SEC),
            Units {
                space_dim: -2,
                time_dim: 3,
                count_dim: -1,
                space_scale: 4,
                time_scale: 5,
                count_scale: -3,
            },
        ];
        for units in cases {
            assert_eq!(Units::unpack(units.pack()), units);
        }
    }

    #[test]
    fn test_negative_dimensions_survive_packing() {
        let rate = Units::per_time(SCALE_SEC);
        let decoded = Units::unpack(rate.pack());
        assert_eq!(decoded.time_dim, -1);
        assert_eq!(decoded.count_dim, 1);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut units = Units::count();
        units.space_dim = 9;
        assert!(units.validate().is_err());

        let mut units = Units::time(SCALE_SEC);
        units.time_scale = 7;
        assert!(units.validate().is_err());

        assert!(Units::NONE.validate().is_ok());
        assert!(Units::per_time(SCALE_MSEC).validate().is_ok());
    }
}
