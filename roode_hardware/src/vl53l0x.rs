//! VL53L0X driver over the Raspberry Pi I²C bus.
//!
//! Both sensors share one bus. The bus handle is single-owner (`Rc<RefCell<_>>`)
//! and every transaction re-targets the slave address first, so transactions
//! never interleave.
//!
//! Bring-up follows the vendor API's data-init, static-init and reference
//! calibration steps: 2V8 I/O, SPAD reference map, default tuning table,
//! interrupt routing, timing budget, then VHV and phase calibration.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use rppal::gpio::{Gpio, OutputPin};
use rppal::i2c::I2c;
use roode_traits::RangeFinder;
use tracing::{debug, trace};

use crate::error::{HwError, Result};
use crate::util::poll_until_ready;
use crate::vl53l0x_timing::{self as timing, SequenceSteps, StepTimeouts};

pub type SharedBus = Rc<RefCell<I2c>>;

/// Factory default address every VL53L0X answers on after reset.
pub const DEFAULT_ADDRESS: u8 = 0x29;

const SYSRANGE_START: u8 = 0x00;
const SYSTEM_SEQUENCE_CONFIG: u8 = 0x01;
const SYSTEM_INTERRUPT_CONFIG_GPIO: u8 = 0x0A;
const SYSTEM_INTERRUPT_CLEAR: u8 = 0x0B;
const RESULT_INTERRUPT_STATUS: u8 = 0x13;
const RESULT_RANGE_MM: u8 = 0x14 + 10;
const FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT: u8 = 0x44;
const MSRC_CONFIG_TIMEOUT_MACROP: u8 = 0x46;
const DYNAMIC_SPAD_NUM_REQUESTED_REF_SPAD: u8 = 0x4E;
const DYNAMIC_SPAD_REF_EN_START_OFFSET: u8 = 0x4F;
const PRE_RANGE_CONFIG_VCSEL_PERIOD: u8 = 0x50;
const PRE_RANGE_CONFIG_TIMEOUT_MACROP_HI: u8 = 0x51;
const MSRC_CONFIG_CONTROL: u8 = 0x60;
const FINAL_RANGE_CONFIG_VCSEL_PERIOD: u8 = 0x70;
const FINAL_RANGE_CONFIG_TIMEOUT_MACROP_HI: u8 = 0x71;
const GPIO_HV_MUX_ACTIVE_HIGH: u8 = 0x84;
const VHV_CONFIG_PAD_SCL_SDA_EXTSUP_HV: u8 = 0x89;
const I2C_SLAVE_DEVICE_ADDRESS: u8 = 0x8A;
const GLOBAL_CONFIG_SPAD_ENABLES_REF_0: u8 = 0xB0;
const GLOBAL_CONFIG_REF_EN_START_SELECT: u8 = 0xB6;
const IDENTIFICATION_MODEL_ID: u8 = 0xC0;
const MODEL_ID: u8 = 0xEE;

/// Return signal rate limit, 0.25 MCPS in 9.7 fixed point.
const SIGNAL_RATE_LIMIT: u16 = 32;
/// DSS, pre-range and final range; MSRC and TCC off.
const SEQUENCE_RANGING: u8 = 0xE8;

const BOOT_DELAY: Duration = Duration::from_millis(2);
const POLL_INTERVAL: Duration = Duration::from_micros(500);
/// Bound on the one-off waits during bring-up.
const INIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Default tuning settings from the vendor API, written once at bring-up.
#[rustfmt::skip]
const TUNING: &[(u8, u8)] = &[
    (0xFF, 0x01), (0x00, 0x00),
    (0xFF, 0x00), (0x09, 0x00), (0x10, 0x00), (0x11, 0x00),
    (0x24, 0x01), (0x25, 0xFF), (0x75, 0x00),
    (0xFF, 0x01), (0x4E, 0x2C), (0x48, 0x00), (0x30, 0x20),
    (0xFF, 0x00), (0x30, 0x09), (0x54, 0x00), (0x31, 0x04), (0x32, 0x03), (0x40, 0x83),
    (0x46, 0x25), (0x60, 0x00), (0x27, 0x00), (0x50, 0x06), (0x51, 0x00), (0x52, 0x96),
    (0x56, 0x08), (0x57, 0x30), (0x61, 0x00), (0x62, 0x00), (0x64, 0x00), (0x65, 0x00),
    (0x66, 0xA0),
    (0xFF, 0x01), (0x22, 0x32), (0x47, 0x14), (0x49, 0xFF), (0x4A, 0x00),
    (0xFF, 0x00), (0x7A, 0x0A), (0x7B, 0x00), (0x78, 0x21),
    (0xFF, 0x01), (0x23, 0x34), (0x42, 0x00), (0x44, 0xFF), (0x45, 0x26), (0x46, 0x05),
    (0x40, 0x40), (0x0E, 0x06), (0x20, 0x1A), (0x43, 0x40),
    (0xFF, 0x00), (0x34, 0x03), (0x35, 0x44),
    (0xFF, 0x01), (0x31, 0x04), (0x4B, 0x09), (0x4C, 0x05), (0x4D, 0x04),
    (0xFF, 0x00), (0x44, 0x00), (0x45, 0x20), (0x47, 0x08), (0x48, 0x28), (0x67, 0x00),
    (0x70, 0x04), (0x71, 0x01), (0x72, 0xFE), (0x76, 0x00), (0x77, 0x00),
    (0xFF, 0x01), (0x0D, 0x01),
    (0xFF, 0x00), (0x80, 0x01), (0x01, 0xF8),
    (0xFF, 0x01), (0x8E, 0x01), (0x00, 0x01), (0xFF, 0x00), (0x80, 0x00),
];

impl From<rppal::i2c::Error> for HwError {
    fn from(e: rppal::i2c::Error) -> Self {
        HwError::I2c(e.to_string())
    }
}

impl From<rppal::gpio::Error> for HwError {
    fn from(e: rppal::gpio::Error) -> Self {
        HwError::Gpio(e.to_string())
    }
}

pub fn open_bus(bus: u8) -> Result<SharedBus> {
    Ok(Rc::new(RefCell::new(I2c::with_bus(bus)?)))
}

pub struct Vl53l0x {
    bus: SharedBus,
    xshut: OutputPin,
    address: u8,
    target_address: u8,
    stop_variable: u8,
    timing_budget_us: u32,
    continuous: bool,
}

impl Vl53l0x {
    /// Claim the sensor's XSHUT line and hold the device in reset.
    ///
    /// Construct every sensor on the bus before initializing any of them so that
    /// only the one being initialized answers on the default address.
    pub fn new(bus: SharedBus, gpio: &Gpio, xshut_pin: u8, address: u8) -> Result<Self> {
        let mut xshut = gpio.get(xshut_pin)?.into_output();
        xshut.set_low();
        Ok(Self {
            bus,
            xshut,
            address: DEFAULT_ADDRESS,
            target_address: address,
            stop_variable: 0,
            timing_budget_us: 0,
            continuous: false,
        })
    }

    /// Measurement timing budget programmed at bring-up, in microseconds.
    pub fn timing_budget_us(&self) -> u32 {
        self.timing_budget_us
    }

    fn write_reg(&self, reg: u8, value: u8) -> Result<()> {
        self.write_bytes(reg, &[value])
    }

    fn write_reg16(&self, reg: u8, value: u16) -> Result<()> {
        self.write_bytes(reg, &value.to_be_bytes())
    }

    fn write_bytes(&self, reg: u8, data: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(reg);
        frame.extend_from_slice(data);
        let mut bus = self.bus.borrow_mut();
        bus.set_slave_address(u16::from(self.address))?;
        bus.write(&frame)?;
        Ok(())
    }

    fn read_bytes(&self, reg: u8, buf: &mut [u8]) -> Result<()> {
        let mut bus = self.bus.borrow_mut();
        bus.set_slave_address(u16::from(self.address))?;
        bus.write_read(&[reg], buf)?;
        Ok(())
    }

    fn read_reg(&self, reg: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(reg, &mut buf)?;
        Ok(buf[0])
    }

    fn read_reg16(&self, reg: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_bytes(reg, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn update_reg(&self, reg: u8, f: impl FnOnce(u8) -> u8) -> Result<()> {
        let value = self.read_reg(reg)?;
        self.write_reg(reg, f(value))
    }

    fn write_seq(&self, seq: &[(u8, u8)]) -> Result<()> {
        for &(reg, value) in seq {
            self.write_reg(reg, value)?;
        }
        Ok(())
    }

    fn arm(&self, mode: u8) -> Result<()> {
        self.write_seq(&[
            (0x80, 0x01),
            (0xFF, 0x01),
            (0x00, 0x00),
            (0x91, self.stop_variable),
            (0x00, 0x01),
            (0xFF, 0x00),
            (0x80, 0x00),
            (SYSRANGE_START, mode),
        ])
    }

    fn wait_result(&self, timeout: Duration) -> Result<u16> {
        poll_until_ready(
            || Ok(self.read_reg(RESULT_INTERRUPT_STATUS)? & 0x07 != 0),
            timeout,
            POLL_INTERVAL,
        )
        .map_err(|e| match e {
            HwError::DataReadyTimeout => HwError::Timeout,
            other => other,
        })?;
        let mm = self.read_reg16(RESULT_RANGE_MM)?;
        self.write_reg(SYSTEM_INTERRUPT_CLEAR, 0x01)?;
        trace!(address = self.address, mm, "vl53l0x range");
        Ok(mm)
    }

    /// Reference SPAD count and type from the sensor's NVM.
    fn spad_info(&self) -> Result<(u8, bool)> {
        self.write_seq(&[(0x80, 0x01), (0xFF, 0x01), (0x00, 0x00), (0xFF, 0x06)])?;
        self.update_reg(0x83, |v| v | 0x04)?;
        self.write_seq(&[(0xFF, 0x07), (0x81, 0x01), (0x80, 0x01), (0x94, 0x6B), (0x83, 0x00)])?;
        poll_until_ready(|| Ok(self.read_reg(0x83)? != 0x00), INIT_TIMEOUT, POLL_INTERVAL)?;
        self.write_reg(0x83, 0x01)?;
        let raw = self.read_reg(0x92)?;
        self.write_seq(&[(0x81, 0x00), (0xFF, 0x06)])?;
        self.update_reg(0x83, |v| v & !0x04)?;
        self.write_seq(&[(0xFF, 0x01), (0x00, 0x01), (0xFF, 0x00), (0x80, 0x00)])?;
        Ok((raw & 0x7F, raw & 0x80 != 0))
    }

    /// Keep only the first `count` good reference SPADs, skipping the
    /// non-aperture block when the part uses aperture SPADs.
    fn configure_ref_spads(&self, count: u8, aperture: bool) -> Result<()> {
        let mut map = [0u8; 6];
        self.read_bytes(GLOBAL_CONFIG_SPAD_ENABLES_REF_0, &mut map)?;
        self.write_seq(&[
            (0xFF, 0x01),
            (DYNAMIC_SPAD_REF_EN_START_OFFSET, 0x00),
            (DYNAMIC_SPAD_NUM_REQUESTED_REF_SPAD, 0x2C),
            (0xFF, 0x00),
            (GLOBAL_CONFIG_REF_EN_START_SELECT, 0xB4),
        ])?;
        let first = if aperture { 12 } else { 0 };
        let mut enabled = 0u8;
        for i in 0..48usize {
            let (byte, bit) = (i / 8, 1u8 << (i % 8));
            if i < first || enabled == count {
                map[byte] &= !bit;
            } else if map[byte] & bit != 0 {
                enabled += 1;
            }
        }
        self.write_bytes(GLOBAL_CONFIG_SPAD_ENABLES_REF_0, &map)
    }

    fn sequence_steps(&self) -> Result<SequenceSteps> {
        Ok(SequenceSteps::from_register(self.read_reg(SYSTEM_SEQUENCE_CONFIG)?))
    }

    fn step_timeouts(&self, steps: SequenceSteps) -> Result<StepTimeouts> {
        let pre_pclks = timing::decode_vcsel_period(self.read_reg(PRE_RANGE_CONFIG_VCSEL_PERIOD)?);
        let msrc_mclks = u32::from(self.read_reg(MSRC_CONFIG_TIMEOUT_MACROP)?) + 1;
        let pre_mclks = timing::decode_timeout(self.read_reg16(PRE_RANGE_CONFIG_TIMEOUT_MACROP_HI)?);
        let final_pclks =
            timing::decode_vcsel_period(self.read_reg(FINAL_RANGE_CONFIG_VCSEL_PERIOD)?);
        let mut final_mclks =
            timing::decode_timeout(self.read_reg16(FINAL_RANGE_CONFIG_TIMEOUT_MACROP_HI)?);
        if steps.pre_range {
            final_mclks = final_mclks.saturating_sub(pre_mclks);
        }
        Ok(StepTimeouts {
            pre_range_vcsel_pclks: pre_pclks,
            final_range_vcsel_pclks: final_pclks,
            msrc_dss_tcc_us: timing::mclks_to_us(msrc_mclks, pre_pclks),
            pre_range_mclks: pre_mclks,
            pre_range_us: timing::mclks_to_us(pre_mclks, pre_pclks),
            final_range_us: timing::mclks_to_us(final_mclks, final_pclks),
        })
    }

    fn set_timing_budget(&self, budget_us: u32) -> Result<()> {
        let steps = self.sequence_steps()?;
        let t = self.step_timeouts(steps)?;
        let mclks = timing::final_range_mclks(budget_us, steps, &t)
            .ok_or(HwError::TimingBudget(budget_us))?;
        self.write_reg16(FINAL_RANGE_CONFIG_TIMEOUT_MACROP_HI, timing::encode_timeout(mclks))
    }

    /// One VHV (`0x40`) or phase (`0x00`) reference calibration.
    fn single_ref_calibration(&self, vhv_init: u8) -> Result<()> {
        self.write_reg(SYSRANGE_START, 0x01 | vhv_init)?;
        poll_until_ready(
            || Ok(self.read_reg(RESULT_INTERRUPT_STATUS)? & 0x07 != 0),
            INIT_TIMEOUT,
            POLL_INTERVAL,
        )?;
        self.write_reg(SYSTEM_INTERRUPT_CLEAR, 0x01)?;
        self.write_reg(SYSRANGE_START, 0x00)
    }

    fn bring_up(&mut self) -> Result<()> {
        self.xshut.set_high();
        std::thread::sleep(BOOT_DELAY);
        self.address = DEFAULT_ADDRESS;

        let model_id = self.read_reg(IDENTIFICATION_MODEL_ID)?;
        if model_id != MODEL_ID {
            return Err(HwError::NotResponding {
                address: DEFAULT_ADDRESS,
                model_id,
            });
        }
        self.write_reg(I2C_SLAVE_DEVICE_ADDRESS, self.target_address & 0x7F)?;
        self.address = self.target_address;

        // Data init: 2V8 I/O levels, stop variable, signal-rate limits.
        self.update_reg(VHV_CONFIG_PAD_SCL_SDA_EXTSUP_HV, |v| v | 0x01)?;
        self.write_seq(&[(0x88, 0x00), (0x80, 0x01), (0xFF, 0x01), (0x00, 0x00)])?;
        self.stop_variable = self.read_reg(0x91)?;
        self.write_seq(&[(0x00, 0x01), (0xFF, 0x00), (0x80, 0x00)])?;
        // Disable the MSRC and pre-range signal-rate limit checks.
        self.update_reg(MSRC_CONFIG_CONTROL, |v| v | 0x12)?;
        self.write_reg16(FINAL_RANGE_CONFIG_MIN_COUNT_RATE_RTN_LIMIT, SIGNAL_RATE_LIMIT)?;
        self.write_reg(SYSTEM_SEQUENCE_CONFIG, 0xFF)?;

        // Static init.
        let (spad_count, aperture) = self.spad_info()?;
        self.configure_ref_spads(spad_count, aperture)?;
        self.write_seq(TUNING)?;

        // Interrupt on "new sample ready", active low.
        self.write_reg(SYSTEM_INTERRUPT_CONFIG_GPIO, 0x04)?;
        self.update_reg(GPIO_HV_MUX_ACTIVE_HIGH, |v| v & !0x10)?;
        self.write_reg(SYSTEM_INTERRUPT_CLEAR, 0x01)?;

        // Keep the current budget across the switch to the ranging sequence.
        let steps = self.sequence_steps()?;
        let budget = timing::budget_us(steps, &self.step_timeouts(steps)?);
        self.write_reg(SYSTEM_SEQUENCE_CONFIG, SEQUENCE_RANGING)?;
        self.set_timing_budget(budget)?;
        self.timing_budget_us = budget;

        // Reference calibration.
        self.write_reg(SYSTEM_SEQUENCE_CONFIG, 0x01)?;
        self.single_ref_calibration(0x40)?;
        self.write_reg(SYSTEM_SEQUENCE_CONFIG, 0x02)?;
        self.single_ref_calibration(0x00)?;
        self.write_reg(SYSTEM_SEQUENCE_CONFIG, SEQUENCE_RANGING)?;

        debug!(
            address = self.address,
            spad_count,
            aperture,
            budget_us = budget,
            "vl53l0x initialized"
        );
        Ok(())
    }
}

impl RangeFinder for Vl53l0x {
    fn initialize(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.bring_up()?)
    }

    /// Both waits of a single-shot acquisition share one `timeout`.
    fn read_range(
        &mut self,
        timeout: Duration,
    ) -> std::result::Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        let deadline = Instant::now() + timeout;
        if !self.continuous {
            self.arm(0x01)?;
            poll_until_ready(
                || Ok(self.read_reg(SYSRANGE_START)? & 0x01 == 0),
                timeout,
                POLL_INTERVAL,
            )
            .map_err(|e| match e {
                HwError::DataReadyTimeout => HwError::Timeout,
                other => other,
            })?;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        Ok(self.wait_result(remaining)?)
    }

    fn start_continuous(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.arm(0x02)?;
        self.continuous = true;
        Ok(())
    }

    fn stop_continuous(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.write_seq(&[
            (SYSRANGE_START, 0x01),
            (0xFF, 0x01),
            (0x00, 0x00),
            (0x91, 0x00),
            (0x00, 0x01),
            (0xFF, 0x00),
        ])?;
        self.continuous = false;
        Ok(())
    }
}
