use crate::registers::Range;

/// One acquisition: signed 20-bit counts per axis, sign-extended to i32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl RawSample {
    /// Converts counts to g using the divisor of the given range.
    pub fn to_g(self, range: Range) -> [f32; 3] {
        let div = range.lsb_per_g();
        [
            self.x as f32 / div,
            self.y as f32 / div,
            self.z as f32 / div,
        ]
    }
}
