#![cfg_attr(not(test), no_std)]

//! Driver for the ADXL355 low-noise 3-axis accelerometer on I2C.
//!
//! The driver is generic over any bus implementing
//! `embedded_hal::i2c::I2c`, so the same code runs against a Linux
//! `/dev/i2c-*` device or an MCU HAL. Axis data is a 20-bit
//! two's-complement field per axis, left-justified in three bytes;
//! conversion to g divides by the LSB-per-g divisor of the configured
//! full-scale range. The divisor is recorded in the same operation that
//! writes the range register, after a read-back check, so decoded values
//! can never be scaled with a stale range.

pub mod configs;
pub mod registers;
pub mod types;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::debug;

use registers::*;
pub use configs::{CONFIG_RESET, CONFIG_WAKEUP_ADXL355};
pub use registers::{Odr, Range};
pub use types::RawSample;

/// Trait alias to support both I2c<SevenBitAddress> and I2c without address mode.
pub trait CompatibleI2c<E>: I2c<Error = E> {}
impl<T, E> CompatibleI2c<E> for T where T: I2c<Error = E> {}

/// Bus address with the ASEL pin tied low (the usual wiring).
pub const DEFAULT_ADDRESS: u8 = 0x1D;
/// Bus address with the ASEL pin tied high.
pub const ALT_ADDRESS: u8 = 0x53;

const RESET_POLL_ATTEMPTS: u32 = 50;
const RESET_POLL_INTERVAL_US: u32 = 2_000;

#[derive(Debug)]
pub enum Error<E> {
    I2c(E),
    /// Identity registers did not match the ADXL355 signature.
    InvalidDevice,
    /// STATUS.DATA_RDY was clear when a sample was requested.
    NotReady,
    /// Range register read-back disagrees with what was written.
    ConfigMismatch { wrote: u8, read: u8 },
    ResetTimeout,
}

impl<E> Error<E> {
    /// Transient errors are worth retrying on the next poll; everything
    /// else means the device state can no longer be trusted.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::I2c(_) | Error::NotReady)
    }
}

pub struct Adxl355<I2C, E> {
    i2c: I2C,
    address: u8,
    range: Range,
    _error: core::marker::PhantomData<E>,
}

impl<I2C, E> Adxl355<I2C, E> {
    pub fn i2c(&mut self) -> &mut I2C {
        &mut self.i2c
    }
}

impl<I2C, E> Adxl355<I2C, E>
where
    I2C: CompatibleI2c<E>,
    E: core::fmt::Debug,
{
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            range: Range::G4,
            _error: core::marker::PhantomData,
        }
    }

    pub fn default(i2c: I2C) -> Self {
        Self::new(i2c, DEFAULT_ADDRESS)
    }

    pub fn destroy(self) -> I2C {
        self.i2c
    }

    pub fn read_reg(&mut self, reg: u8) -> Result<u8, Error<E>> {
        let mut buf = [0u8];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(Error::I2c)?;
        Ok(buf[0])
    }

    pub fn write_reg(&mut self, reg: u8, val: u8) -> Result<(), Error<E>> {
        self.i2c
            .write(self.address, &[reg, val])
            .map_err(Error::I2c)?;
        Ok(())
    }

    pub fn read_bytes(&mut self, start_reg: u8, buffer: &mut [u8]) -> Result<(), Error<E>> {
        self.i2c
            .write_read(self.address, &[start_reg], buffer)
            .map_err(Error::I2c)
    }

    /// Checks the three fixed identity registers.
    pub fn verify_identity(&mut self) -> Result<(), Error<E>> {
        let ad = self.read_reg(AccelReg::DevIdAd as u8)?;
        let mst = self.read_reg(AccelReg::DevIdMst as u8)?;
        let part = self.read_reg(AccelReg::PartId as u8)?;
        if ad != DEVID_AD_VALUE || mst != DEVID_MST_VALUE || part != PARTID_VALUE {
            debug!(
                "identity mismatch: DEVID_AD={:#04x} DEVID_MST={:#04x} PARTID={:#04x}",
                ad, mst, part
            );
            return Err(Error::InvalidDevice);
        }
        Ok(())
    }

    /// Full bring-up: soft reset, identity check, static config, range,
    /// filter, then measurement mode. The part comes out of reset in
    /// standby, which is also where range and filter must be written.
    pub fn init<D: DelayNs>(
        &mut self,
        range: Range,
        odr: Odr,
        delay: &mut D,
    ) -> Result<(), Error<E>> {
        self.apply_config(CONFIG_RESET)?;
        self.wait_for_reset_complete(delay)?;
        self.verify_identity()?;
        self.apply_config(CONFIG_WAKEUP_ADXL355)?;
        self.set_lowpass(odr)?;
        self.set_range(range)?;
        self.start()?;
        self.dump_config(ACCEL_REGS)?;
        Ok(())
    }

    fn wait_for_reset_complete<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        for _ in 0..RESET_POLL_ATTEMPTS {
            delay.delay_us(RESET_POLL_INTERVAL_US);

            // The bus may NAK while the part reboots; keep polling.
            if let Ok(status) = self.read_reg(AccelReg::Status as u8) {
                if StatusFlags::from_bits_truncate(status).contains(StatusFlags::NVM_BUSY) {
                    continue;
                }
                if self.read_reg(AccelReg::DevIdAd as u8).ok() == Some(DEVID_AD_VALUE) {
                    return Ok(());
                }
            }
        }
        Err(Error::ResetTimeout)
    }

    /// Selects the full-scale range. Writes the register, reads it back,
    /// and only records the new divisor once the device has confirmed the
    /// setting, so register and divisor change together or not at all.
    pub fn set_range(&mut self, range: Range) -> Result<(), Error<E>> {
        let old = self.read_reg(AccelReg::Range as u8)?;
        let wrote = (old & !RANGE_FS_MASK) | range.bits();
        self.write_reg(AccelReg::Range as u8, wrote)?;

        let read = self.read_reg(AccelReg::Range as u8)?;
        if read & RANGE_FS_MASK != range.bits() {
            return Err(Error::ConfigMismatch { wrote, read });
        }
        self.range = range;
        debug!(
            "range set to {:?} ({} LSB/g)",
            range,
            range.lsb_per_g() as u32
        );
        Ok(())
    }

    /// The currently configured full-scale range.
    pub fn range(&self) -> Range {
        self.range
    }

    /// Divisor used by the decode path, in LSB per g.
    pub fn lsb_per_g(&self) -> f32 {
        self.range.lsb_per_g()
    }

    /// Selects the output-data-rate / lowpass-corner pair.
    pub fn set_lowpass(&mut self, odr: Odr) -> Result<(), Error<E>> {
        let old = self.read_reg(AccelReg::Filter as u8)?;
        let new = (old & !FILTER_ODR_MASK) | ((odr as u8) << FILTER_ODR_LOC);
        self.write_reg(AccelReg::Filter as u8, new)?;
        Ok(())
    }

    /// Leaves standby and starts measuring.
    pub fn start(&mut self) -> Result<(), Error<E>> {
        let power = self.read_reg(AccelReg::PowerCtl as u8)?;
        if power & PowerCtlFlags::STANDBY.bits() != 0 {
            self.write_reg(
                AccelReg::PowerCtl as u8,
                power & !PowerCtlFlags::STANDBY.bits(),
            )?;
        }
        Ok(())
    }

    /// Returns to standby. Safe to call on an already-stopped part.
    pub fn stop(&mut self) -> Result<(), Error<E>> {
        let power = self.read_reg(AccelReg::PowerCtl as u8)?;
        if power & PowerCtlFlags::STANDBY.bits() == 0 {
            self.write_reg(
                AccelReg::PowerCtl as u8,
                power | PowerCtlFlags::STANDBY.bits(),
            )?;
        }
        Ok(())
    }

    pub fn is_running(&mut self) -> Result<bool, Error<E>> {
        let power = self.read_reg(AccelReg::PowerCtl as u8)?;
        Ok(power & PowerCtlFlags::STANDBY.bits() == 0)
    }

    pub fn status(&mut self) -> Result<StatusFlags, Error<E>> {
        let status = self.read_reg(AccelReg::Status as u8)?;
        Ok(StatusFlags::from_bits_truncate(status))
    }

    pub fn data_ready(&mut self) -> Result<bool, Error<E>> {
        Ok(self.status()?.contains(StatusFlags::DATA_RDY))
    }

    /// Reads one raw sample. Fails with `NotReady` when the device has no
    /// fresh conversion; bus failures propagate untouched.
    pub fn read_raw(&mut self) -> Result<RawSample, Error<E>> {
        if !self.data_ready()? {
            return Err(Error::NotReady);
        }

        let mut buf = [0u8; AXIS_BLOCK_LEN];
        self.read_bytes(AccelReg::XData3 as u8, &mut buf)?;

        Ok(RawSample {
            x: decode_axis([buf[0], buf[1], buf[2]]),
            y: decode_axis([buf[3], buf[4], buf[5]]),
            z: decode_axis([buf[6], buf[7], buf[8]]),
        })
    }

    /// Reads one sample converted to g at the active range.
    pub fn read_accel(&mut self) -> Result<[f32; 3], Error<E>> {
        let raw = self.read_raw()?;
        Ok(raw.to_g(self.range))
    }

    /// Die temperature in degrees Celsius.
    pub fn read_temperature(&mut self) -> Result<f32, Error<E>> {
        let mut buf = [0u8; TEMP_BLOCK_LEN];
        self.read_bytes(AccelReg::Temp2 as u8, &mut buf)?;
        let raw = (((buf[0] & 0x0F) as u16) << 8 | buf[1] as u16) as f32;
        Ok((TEMP_BIAS - raw) / TEMP_SLOPE + TEMP_OFFSET_C)
    }

    /// Accepts any register type that implements the `Register` trait
    pub fn apply_config<R>(&mut self, config: &[RegConfig<R>]) -> Result<(), Error<E>>
    where
        R: Register + NamedRegister + Copy,
    {
        for entry in config {
            let addr = entry.reg.addr();
            match entry.op {
                RegOp::Write => {
                    debug!(
                        "write_reg {:<12}({:#04X}) = {:#04x}",
                        entry.reg.name(),
                        addr,
                        entry.value
                    );
                    self.write_reg(addr, entry.value)?
                }
                RegOp::Read => {
                    let data = self.read_reg(addr)?;
                    debug!(
                        "read_reg {:<12}({:#04X}) = {:#04x}",
                        entry.reg.name(),
                        addr,
                        data
                    );
                }
            }
        }
        Ok(())
    }

    pub fn dump_config<R>(&mut self, regs: &[R]) -> Result<(), Error<E>>
    where
        R: NamedRegister + Copy,
    {
        for reg in regs {
            match self.read_reg(reg.addr()) {
                Ok(v) => debug!(
                    "{:<12}({:#04x}): 0x{:02X} ({:>3}) 0b{:08b}",
                    reg.name(),
                    reg.addr(),
                    v,
                    v,
                    v
                ),
                Err(e) => debug!("{:<12}: Error: {:?}", reg.name(), e),
            }
        }
        Ok(())
    }
}

/// Assembles one axis field: three MSB-first bytes holding a 20-bit
/// two's-complement value left-justified, i.e. the low nibble of the last
/// byte is padding. Pure function of the bytes, no device state involved.
pub fn decode_axis(bytes: [u8; AXIS_BYTES]) -> i32 {
    let unsigned =
        ((bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32) >> 4;
    if unsigned & (1 << (AXIS_BITS - 1)) != 0 {
        (unsigned as i32) - (1 << AXIS_BITS)
    } else {
        unsigned as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation, SevenBitAddress};

    #[derive(Debug)]
    struct BusFault;

    impl embedded_hal::i2c::Error for BusFault {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Register-file fake for the driver's write / write_read traffic.
    struct FakeBus {
        regs: [u8; 0x30],
        fail_all: bool,
        // Simulates a range latch that never takes writes.
        stuck_range: bool,
    }

    impl FakeBus {
        fn new() -> Self {
            let mut regs = [0u8; 0x30];
            regs[AccelReg::DevIdAd as usize] = DEVID_AD_VALUE;
            regs[AccelReg::DevIdMst as usize] = DEVID_MST_VALUE;
            regs[AccelReg::PartId as usize] = PARTID_VALUE;
            regs[AccelReg::Status as usize] = StatusFlags::DATA_RDY.bits();
            regs[AccelReg::PowerCtl as usize] = PowerCtlFlags::STANDBY.bits();
            Self {
                regs,
                fail_all: false,
                stuck_range: false,
            }
        }

        fn load_axes(&mut self, x: i32, y: i32, z: i32) {
            let blocks = [
                (AccelReg::XData3 as usize, x),
                (AccelReg::YData3 as usize, y),
                (AccelReg::ZData3 as usize, z),
            ];
            for (base, raw) in blocks {
                let bytes = encode_axis(raw);
                self.regs[base..base + AXIS_BYTES].copy_from_slice(&bytes);
            }
        }
    }

    impl ErrorType for FakeBus {
        type Error = BusFault;
    }

    impl I2c for FakeBus {
        fn write(&mut self, _addr: SevenBitAddress, bytes: &[u8]) -> Result<(), BusFault> {
            if self.fail_all {
                return Err(BusFault);
            }
            let reg = bytes[0] as usize;
            for (i, val) in bytes[1..].iter().enumerate() {
                if self.stuck_range && reg + i == AccelReg::Range as usize {
                    continue;
                }
                self.regs[reg + i] = *val;
            }
            Ok(())
        }

        fn write_read(
            &mut self,
            _addr: SevenBitAddress,
            bytes: &[u8],
            buffer: &mut [u8],
        ) -> Result<(), BusFault> {
            if self.fail_all {
                return Err(BusFault);
            }
            let reg = bytes[0] as usize;
            buffer.copy_from_slice(&self.regs[reg..reg + buffer.len()]);
            Ok(())
        }

        fn transaction(
            &mut self,
            _addr: SevenBitAddress,
            _operations: &mut [Operation],
        ) -> Result<(), BusFault> {
            Err(BusFault)
        }
    }

    /// Inverse of `decode_axis` for building synthetic register contents.
    fn encode_axis(raw: i32) -> [u8; AXIS_BYTES] {
        let unsigned = (raw as u32) & ((1 << AXIS_BITS) - 1);
        [
            (unsigned >> 12) as u8,
            (unsigned >> 4) as u8,
            ((unsigned & 0x0F) << 4) as u8,
        ]
    }

    fn driver(bus: FakeBus) -> Adxl355<FakeBus, BusFault> {
        Adxl355::default(bus)
    }

    struct NoopDelay;

    impl embedded_hal::delay::DelayNs for NoopDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn init_brings_the_part_into_measurement_mode() {
        let mut dev = driver(FakeBus::new());
        dev.init(Range::G8, Odr::Hz125, &mut NoopDelay).unwrap();

        assert_eq!(dev.range(), Range::G8);
        let range_reg = dev.read_reg(AccelReg::Range as u8).unwrap();
        assert_eq!(range_reg & RANGE_FS_MASK, Range::G8.bits());
        let filter = dev.read_reg(AccelReg::Filter as u8).unwrap();
        assert_eq!(filter & FILTER_ODR_MASK, Odr::Hz125 as u8);
        assert!(dev.is_running().unwrap());
    }

    #[test]
    fn init_propagates_identity_failure() {
        let mut bus = FakeBus::new();
        bus.regs[AccelReg::DevIdMst as usize] = 0xFF;
        let mut dev = driver(bus);
        assert!(matches!(
            dev.init(Range::G4, Odr::Hz62_5, &mut NoopDelay).unwrap_err(),
            Error::InvalidDevice
        ));
    }

    #[test]
    fn divisor_table_matches_datasheet() {
        assert_eq!(Range::G2.lsb_per_g(), 256_000.0);
        assert_eq!(Range::G4.lsb_per_g(), 128_000.0);
        assert_eq!(Range::G8.lsb_per_g(), 64_000.0);
    }

    #[test]
    fn range_bits_round_trip() {
        for range in [Range::G2, Range::G4, Range::G8] {
            assert_eq!(Range::from_bits(range.bits()), Some(range));
        }
        assert_eq!(Range::from_bits(0b00), None);
    }

    #[test]
    fn decode_twos_complement() {
        assert_eq!(decode_axis([0x00, 0x00, 0x00]), 0);
        assert_eq!(decode_axis([0x00, 0x00, 0x10]), 1);
        // All twenty bits set is -1.
        assert_eq!(decode_axis([0xFF, 0xFF, 0xF0]), -1);
        assert_eq!(decode_axis([0x7F, 0xFF, 0xF0]), 524_287);
        assert_eq!(decode_axis([0x80, 0x00, 0x00]), -524_288);
        // Padding nibble must be ignored.
        assert_eq!(decode_axis([0x00, 0x00, 0x1F]), 1);
    }

    #[test]
    fn encode_decode_round_trip() {
        for raw in [0, 1, -1, 1000, -500, 128_000, 524_287, -524_288] {
            assert_eq!(decode_axis(encode_axis(raw)), raw);
        }
    }

    #[test]
    fn conversion_example_at_default_range() {
        let sample = RawSample {
            x: 1000,
            y: -500,
            z: 128_000,
        };
        let [x, y, z] = sample.to_g(Range::G4);
        assert!((x - 0.0078125).abs() < 1e-7);
        assert!((y - -0.0039063).abs() < 1e-7);
        assert!((z - 1.0).abs() < 1e-7);
    }

    #[test]
    fn physical_round_trip_within_one_lsb() {
        for range in [Range::G2, Range::G4, Range::G8] {
            let div = range.lsb_per_g();
            for g in [0.5f32, -1.25, 1.0, -0.0039063] {
                if g.abs() >= range.full_scale_g() {
                    continue;
                }
                let raw = (g * div) as i32;
                let back = decode_axis(encode_axis(raw)) as f32 / div;
                assert!((back - g).abs() <= 1.0 / div, "range {:?} value {}", range, g);
            }
        }
    }

    #[test]
    fn read_raw_and_accel() {
        let mut bus = FakeBus::new();
        bus.load_axes(1000, -500, 128_000);
        let mut dev = driver(bus);
        dev.set_range(Range::G4).unwrap();

        let raw = dev.read_raw().unwrap();
        assert_eq!(
            raw,
            RawSample {
                x: 1000,
                y: -500,
                z: 128_000
            }
        );

        let [x, _, z] = dev.read_accel().unwrap();
        assert!((x - 0.0078125).abs() < 1e-7);
        assert!((z - 1.0).abs() < 1e-7);
    }

    #[test]
    fn set_range_is_idempotent() {
        let mut bus = FakeBus::new();
        bus.load_axes(1000, -500, 128_000);
        let mut dev = driver(bus);

        dev.set_range(Range::G8).unwrap();
        let first = dev.read_accel().unwrap();
        let div = dev.lsb_per_g();

        dev.set_range(Range::G8).unwrap();
        assert_eq!(dev.lsb_per_g(), div);
        assert_eq!(dev.read_accel().unwrap(), first);
    }

    #[test]
    fn set_range_preserves_other_range_bits() {
        let mut bus = FakeBus::new();
        bus.regs[AccelReg::Range as usize] = RangeRegBitflags::IntPol as u8 | Range::G2.bits();
        let mut dev = driver(bus);

        dev.set_range(Range::G8).unwrap();
        let reg = dev.read_reg(AccelReg::Range as u8).unwrap();
        assert_eq!(reg & RANGE_FS_MASK, Range::G8.bits());
        assert_ne!(reg & RangeRegBitflags::IntPol as u8, 0);
    }

    #[test]
    fn set_range_readback_mismatch_is_fatal() {
        let mut bus = FakeBus::new();
        bus.stuck_range = true;
        bus.regs[AccelReg::Range as usize] = Range::G2.bits();
        let mut dev = driver(bus);

        let err = dev.set_range(Range::G8).unwrap_err();
        assert!(matches!(err, Error::ConfigMismatch { .. }));
        assert!(!err.is_transient());
        // Divisor must be left untouched on failure.
        assert_eq!(dev.range(), Range::G4);
    }

    #[test]
    fn read_raw_requires_data_ready() {
        let mut bus = FakeBus::new();
        bus.regs[AccelReg::Status as usize] = 0;
        let mut dev = driver(bus);

        let err = dev.read_raw().unwrap_err();
        assert!(matches!(err, Error::NotReady));
        assert!(err.is_transient());
    }

    #[test]
    fn bus_failure_propagates() {
        let mut bus = FakeBus::new();
        bus.fail_all = true;
        let mut dev = driver(bus);

        let err = dev.read_raw().unwrap_err();
        assert!(matches!(err, Error::I2c(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn start_and_stop_toggle_standby() {
        let mut dev = driver(FakeBus::new());
        assert!(!dev.is_running().unwrap());
        dev.start().unwrap();
        assert!(dev.is_running().unwrap());
        dev.stop().unwrap();
        assert!(!dev.is_running().unwrap());
    }

    #[test]
    fn identity_check_rejects_strangers() {
        let mut bus = FakeBus::new();
        bus.regs[AccelReg::PartId as usize] = 0x00;
        let mut dev = driver(bus);
        assert!(matches!(
            dev.verify_identity().unwrap_err(),
            Error::InvalidDevice
        ));
    }

    #[test]
    fn temperature_at_bias_point() {
        let mut bus = FakeBus::new();
        bus.regs[AccelReg::Temp2 as usize] = (1852u16 >> 8) as u8;
        bus.regs[AccelReg::Temp1 as usize] = (1852u16 & 0xFF) as u8;
        let mut dev = driver(bus);
        let temp = dev.read_temperature().unwrap();
        assert!((temp - 19.21).abs() < 1e-4);
    }
}
