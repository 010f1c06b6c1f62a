use crate::registers::*;

// Range, filter and power mode are set through dedicated driver calls so
// the recorded divisor can never drift from the register contents; these
// tables only cover the static plumbing around them.

pub const CONFIG_RESET: &[RegConfig<AccelReg>] = &[
    RegConfig {
        op: RegOp::Write,
        reg: AccelReg::Reset,
        value: RESET_CODE,
    },
];

pub const CONFIG_WAKEUP_ADXL355: &[RegConfig<AccelReg>] = &[
    RegConfig {
        reg: AccelReg::IntMap,
        value: 0x00, // All interrupts disabled, polling only
        op: RegOp::Write,
    },
    RegConfig {
        reg: AccelReg::Sync,
        value: 0x00, // Internal sync, no external trigger
        op: RegOp::Write,
    },
    RegConfig {
        reg: AccelReg::FifoSamples,
        value: 0x00, // FIFO watermark unused, data registers are read directly
        op: RegOp::Write,
    },
];
