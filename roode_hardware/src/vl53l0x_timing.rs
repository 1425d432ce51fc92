//! VL53L0X measurement-timing arithmetic.
//!
//! The sensor stores each ranging-sequence step timeout in macro periods
//! (MCLKs), whose length depends on the VCSEL pulse period of that step. The
//! measurement timing budget is the sum of the enabled steps plus fixed
//! overheads; the final-range timeout absorbs whatever is left.

/// Smallest budget the sensor accepts, in microseconds.
pub const MIN_TIMING_BUDGET_US: u32 = 20_000;

const START_OVERHEAD_US: u32 = 1910;
const END_OVERHEAD_US: u32 = 960;
const MSRC_OVERHEAD_US: u32 = 660;
const TCC_OVERHEAD_US: u32 = 590;
const DSS_OVERHEAD_US: u32 = 690;
const PRE_RANGE_OVERHEAD_US: u32 = 660;
const FINAL_RANGE_OVERHEAD_US: u32 = 550;

/// Enabled steps of the ranging sequence (`SYSTEM_SEQUENCE_CONFIG`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceSteps {
    pub tcc: bool,
    pub dss: bool,
    pub msrc: bool,
    pub pre_range: bool,
    pub final_range: bool,
}

impl SequenceSteps {
    pub fn from_register(seq: u8) -> Self {
        Self {
            tcc: seq & 0x10 != 0,
            dss: seq & 0x08 != 0,
            msrc: seq & 0x04 != 0,
            pre_range: seq & 0x40 != 0,
            final_range: seq & 0x80 != 0,
        }
    }
}

/// Step timeouts as read back from the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepTimeouts {
    pub pre_range_vcsel_pclks: u16,
    pub final_range_vcsel_pclks: u16,
    /// Shared by the MSRC, DSS and TCC steps.
    pub msrc_dss_tcc_us: u32,
    pub pre_range_mclks: u32,
    pub pre_range_us: u32,
    pub final_range_us: u32,
}

/// VCSEL period register value to PCLKs.
pub fn decode_vcsel_period(reg: u8) -> u16 {
    (u16::from(reg) + 1) << 1
}

/// Macro period in nanoseconds for a VCSEL period in PCLKs.
pub fn macro_period_ns(vcsel_pclks: u16) -> u32 {
    (2304 * u32::from(vcsel_pclks) * 1655 + 500) / 1000
}

/// Timeout register (`LSB * 2^MSB + 1`) to MCLKs.
pub fn decode_timeout(reg: u16) -> u32 {
    let lsb = u32::from(reg & 0x00FF);
    let msb = u32::from(reg >> 8);
    lsb.checked_shl(msb).unwrap_or(u32::MAX).saturating_add(1)
}

/// MCLKs to the `(MSB << 8) | LSB` timeout register format.
pub fn encode_timeout(mclks: u32) -> u16 {
    if mclks == 0 {
        return 0;
    }
    let mut lsb = mclks - 1;
    let mut msb: u16 = 0;
    while lsb & 0xFFFF_FF00 != 0 {
        lsb >>= 1;
        msb += 1;
    }
    (msb << 8) | (lsb & 0xFF) as u16
}

pub fn mclks_to_us(mclks: u32, vcsel_pclks: u16) -> u32 {
    let period = u64::from(macro_period_ns(vcsel_pclks));
    ((u64::from(mclks) * period + period / 2) / 1000) as u32
}

pub fn us_to_mclks(us: u32, vcsel_pclks: u16) -> u32 {
    let period = u64::from(macro_period_ns(vcsel_pclks)).max(1);
    ((u64::from(us) * 1000 + period / 2) / period) as u32
}

/// Everything but the final-range step.
fn fixed_cost_us(steps: SequenceSteps, t: &StepTimeouts) -> u32 {
    let mut used = START_OVERHEAD_US + END_OVERHEAD_US;
    if steps.tcc {
        used += t.msrc_dss_tcc_us + TCC_OVERHEAD_US;
    }
    if steps.dss {
        used += 2 * (t.msrc_dss_tcc_us + DSS_OVERHEAD_US);
    } else if steps.msrc {
        used += t.msrc_dss_tcc_us + MSRC_OVERHEAD_US;
    }
    if steps.pre_range {
        used += t.pre_range_us + PRE_RANGE_OVERHEAD_US;
    }
    used
}

/// Current measurement timing budget in microseconds.
pub fn budget_us(steps: SequenceSteps, t: &StepTimeouts) -> u32 {
    let mut budget = fixed_cost_us(steps, t);
    if steps.final_range {
        budget += t.final_range_us + FINAL_RANGE_OVERHEAD_US;
    }
    budget
}

/// Final-range timeout (MCLKs, including the pre-range share the register
/// expects) that makes the sequence fit `budget_us`.
///
/// `None` when the budget is below the sensor minimum or too small for the
/// other enabled steps. A sequence without a final range has nothing to set.
pub fn final_range_mclks(budget_us: u32, steps: SequenceSteps, t: &StepTimeouts) -> Option<u32> {
    if budget_us < MIN_TIMING_BUDGET_US || !steps.final_range {
        return None;
    }
    let used = fixed_cost_us(steps, t) + FINAL_RANGE_OVERHEAD_US;
    let final_us = budget_us.checked_sub(used)?;
    let mut mclks = us_to_mclks(final_us, t.final_range_vcsel_pclks);
    if steps.pre_range {
        mclks += t.pre_range_mclks;
    }
    Some(mclks)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Power-on defaults: pre-range VCSEL 14 PCLKs, final range 10 PCLKs.
    fn defaults() -> StepTimeouts {
        let pre = decode_vcsel_period(6);
        let fin = decode_vcsel_period(4);
        let pre_range_mclks = decode_timeout(0x0104);
        StepTimeouts {
            pre_range_vcsel_pclks: pre,
            final_range_vcsel_pclks: fin,
            msrc_dss_tcc_us: mclks_to_us(0x0C, pre),
            pre_range_mclks,
            pre_range_us: mclks_to_us(pre_range_mclks, pre),
            final_range_us: 0,
        }
    }

    #[test]
    fn vcsel_and_macro_period() {
        assert_eq!(decode_vcsel_period(6), 14);
        assert_eq!(decode_vcsel_period(4), 10);
        assert_eq!(macro_period_ns(14), 53_384);
    }

    #[test]
    fn timeout_register_format() {
        assert_eq!(decode_timeout(0x0000), 1);
        assert_eq!(decode_timeout(0x0104), 9);
        assert_eq!(encode_timeout(0), 0);
        assert_eq!(encode_timeout(9), 0x0008);
        assert_eq!(decode_timeout(0x0008), 9);
        // Values above one byte trade precision for range.
        let enc = encode_timeout(1000);
        assert!(enc >> 8 > 0);
        assert!(decode_timeout(enc) <= 1000);
    }

    #[test]
    fn sequence_register_bits() {
        let all = SequenceSteps::from_register(0xFF);
        assert!(all.tcc && all.dss && all.msrc && all.pre_range && all.final_range);
        // 0xE8: DSS, pre-range and final range only.
        let s = SequenceSteps::from_register(0xE8);
        assert_eq!(
            s,
            SequenceSteps {
                tcc: false,
                dss: true,
                msrc: false,
                pre_range: true,
                final_range: true,
            }
        );
    }

    #[test]
    fn final_range_fills_the_budget() {
        let steps = SequenceSteps::from_register(0xE8);
        let mut t = defaults();
        let requested = 33_000;
        let mclks = final_range_mclks(requested, steps, &t).unwrap();

        // Read back the way the sensor reports it.
        let final_mclks = decode_timeout(encode_timeout(mclks)) - t.pre_range_mclks;
        t.final_range_us = mclks_to_us(final_mclks, t.final_range_vcsel_pclks);
        let got = budget_us(steps, &t);
        let slack = macro_period_ns(t.final_range_vcsel_pclks) / 1000 * 4;
        assert!(got <= requested + slack, "budget {got} overshoots {requested}");
        assert!(got + slack >= requested, "budget {got} undershoots {requested}");
    }

    #[test]
    fn too_small_budgets_are_rejected() {
        let steps = SequenceSteps::from_register(0xE8);
        assert_eq!(final_range_mclks(MIN_TIMING_BUDGET_US - 1, steps, &defaults()), None);
        let greedy = StepTimeouts {
            pre_range_us: 30_000,
            ..defaults()
        };
        assert_eq!(final_range_mclks(25_000, steps, &greedy), None);
        assert_eq!(final_range_mclks(33_000, SequenceSteps::default(), &defaults()), None);
    }
}
