#![allow(unused_imports)]
use bitflags::bitflags;

macro_rules! registers {
    (
        $enum_name:ident, $slice_name:ident {
            $($name:ident = $val:expr),* $(,)?
        }
    ) => {
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, PartialEq, Eq)]
        pub enum $enum_name {
            $($name = $val),*
        }

        pub const $slice_name: &[$enum_name] = &[
            $($enum_name::$name),*
        ];

        impl $enum_name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($enum_name::$name => stringify!($name),)*
                }
            }
        }

        impl Register for $enum_name {
            fn addr(self) -> u8 {
                self as u8
            }
        }

        impl NamedRegister for $enum_name {
            fn name(&self) -> &'static str {
                self.name()
            }
        }

        impl From<$enum_name> for u8 {
            fn from(r: $enum_name) -> u8 {
                r as u8
            }
        }
    };
}

#[derive(Clone, Copy, Debug)]
pub enum RegOp {
    Read,
    Write,
}

pub trait NamedRegister: Register {
    fn name(&self) -> &'static str;
}

pub trait Register: Copy {
    fn addr(self) -> u8;
}

pub struct RegConfig<R: Register> {
    pub op: RegOp,
    pub reg: R,
    pub value: u8,
}

registers! {
    AccelReg, ACCEL_REGS {
        DevIdAd = 0x00,
        DevIdMst = 0x01,
        PartId = 0x02,
        RevId = 0x03,
        Status = 0x04,
        FifoEntries = 0x05,
        Temp2 = 0x06,
        Temp1 = 0x07,
        XData3 = 0x08,
        XData2 = 0x09,
        XData1 = 0x0A,
        YData3 = 0x0B,
        YData2 = 0x0C,
        YData1 = 0x0D,
        ZData3 = 0x0E,
        ZData2 = 0x0F,
        ZData1 = 0x10,
        FifoData = 0x11,
        OffsetXH = 0x1E,
        OffsetXL = 0x1F,
        OffsetYH = 0x20,
        OffsetYL = 0x21,
        OffsetZH = 0x22,
        OffsetZL = 0x23,
        ActEn = 0x24,
        ActThreshH = 0x25,
        ActThreshL = 0x26,
        ActCount = 0x27,
        Filter = 0x28,
        FifoSamples = 0x29,
        IntMap = 0x2A,
        Sync = 0x2B,
        Range = 0x2C,
        PowerCtl = 0x2D,
        SelfTest = 0x2E,
        Reset = 0x2F,
    }
}

/// Fixed identity register contents (datasheet table 17).
pub const DEVID_AD_VALUE: u8 = 0xAD;
pub const DEVID_MST_VALUE: u8 = 0x1D;
pub const PARTID_VALUE: u8 = 0xED;

/// Magic code that triggers a soft reset when written to RESET.
pub const RESET_CODE: u8 = 0x52;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const NVM_BUSY  = 1 << 4;
        const ACTIVITY  = 1 << 3;
        const FIFO_OVR  = 1 << 2;
        const FIFO_FULL = 1 << 1;
        const DATA_RDY  = 1 << 0;
    }
}

/* POWER_CTL
 * B7   B6   B5   B4   B3   B2        B1        B0
 * 0    0    0    0    0    DRDY_OFF  TEMP_OFF  STANDBY
*/
bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PowerCtlFlags: u8 {
        const DRDY_OFF = 1 << 2;
        const TEMP_OFF = 1 << 1;
        const STANDBY  = 1 << 0;
    }
}

/* RANGE
 * B7      B6       B5   B4   B3   B2   B1   B0
 * I2C_HS  INT_POL  0    0    0    0    FS1  FS0
*/
#[repr(u8)]
pub enum RangeRegBitflags {
    IntPol = 1 << 6,
    I2cHs = 1 << 7,
}

pub const RANGE_FS_LOC: u8 = 0;
pub const RANGE_FS_MASK: u8 = 0x03;

/// Full-scale range selector. The register bit pattern and the LSB-per-g
/// divisor live on the same value so they can never disagree.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Range {
    G2 = 0b01,
    G4 = 0b10,
    G8 = 0b11,
}

impl Range {
    pub fn bits(self) -> u8 {
        (self as u8) << RANGE_FS_LOC
    }

    /// Sensitivity divisor in LSB per g for this range.
    pub fn lsb_per_g(self) -> f32 {
        match self {
            Range::G2 => 256_000.0,
            Range::G4 => 128_000.0,
            Range::G8 => 64_000.0,
        }
    }

    /// Nominal full scale in g.
    pub fn full_scale_g(self) -> f32 {
        match self {
            Range::G2 => 2.048,
            Range::G4 => 4.096,
            Range::G8 => 8.192,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Range> {
        match (bits >> RANGE_FS_LOC) & RANGE_FS_MASK {
            0b01 => Some(Range::G2),
            0b10 => Some(Range::G4),
            0b11 => Some(Range::G8),
            _ => None,
        }
    }
}

/* FILTER
 * B7   B6   B5   B4   B3   B2   B1   B0
 * 0    HPF2 HPF1 HPF0 ODR3 ODR2 ODR1 ODR0
*/
pub const FILTER_ODR_LOC: u8 = 0;
pub const FILTER_ODR_MASK: u8 = 0x0F;

/// Output data rate / lowpass corner pairs (ODR and -3dB corner are
/// coupled on this part; the name carries the ODR in Hz).
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Odr {
    Hz4000 = 0b0000,
    Hz2000 = 0b0001,
    Hz1000 = 0b0010,
    Hz500 = 0b0011,
    Hz250 = 0b0100,
    Hz125 = 0b0101,
    Hz62_5 = 0b0110,
    Hz31_25 = 0b0111,
    Hz15_625 = 0b1000,
    Hz7_813 = 0b1001,
    Hz3_906 = 0b1010,
}

pub const HPF_CORNER_LOC: u8 = 4;
pub const HPF_CORNER_MASK: u8 = 0x70;

/// Number of bytes per axis sample and the assembled field width.
pub const AXIS_BYTES: usize = 3;
pub const AXIS_BITS: u32 = 20;
pub const AXIS_BLOCK_LEN: usize = 9;

pub const TEMP_BLOCK_LEN: usize = 2;

// Temperature transfer characteristic: -9.05 LSB/C slope around the
// 1852 LSB bias point.
pub const TEMP_BIAS: f32 = 1852.0;
pub const TEMP_SLOPE: f32 = 9.05;
pub const TEMP_OFFSET_C: f32 = 19.21;
