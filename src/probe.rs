//! Neuropixels 1.0 probe configuration: electrode selection model, shank
//! and base shift-register construction, and the transmit/verify protocol.

use crate::bits::BitVector;
use crate::bridge::RegisterBridge;
use crate::calibration::{AdcCalibration, NUM_ADCS};
use crate::error::DaqResult;
use crate::registers::npix1;
use log::warn;

pub const NUM_CHANNELS: usize = 384;
pub const NUM_ELECTRODES: usize = 960;
pub const NUM_BANKS: usize = 3;

pub const SHANK_BITS: usize = 968;
pub const BASE_BITS: usize = 2448;

/// Selectable AP/LFP amplifier gains, indexed by the 3-bit gain code.
pub const GAIN_STEPS: [u16; 8] = [50, 125, 250, 500, 1000, 1500, 2000, 3000];

const CHANNELS_PER_BASE: usize = NUM_CHANNELS / 2;
const CHANNEL_FIELD_BITS: usize = 11;
const ADCS_PER_BASE: usize = NUM_ADCS / 2;
const ADC_TRIM_BITS: usize = 21;
const ADC_TRIM_OFFSET: usize = CHANNELS_PER_BASE * CHANNEL_FIELD_BITS;

// Shank chain: 4 reference-control bits at each end, electrodes between.
// Even electrodes ascend from the low end, odd electrodes descend from the
// high end.
const SHANK_REF_BITS: usize = 4;
const ELECTRODE_BASE: usize = SHANK_REF_BITS;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReferenceMode {
    External,
    Tip,
}

impl ReferenceMode {
    /// 3-bit per-channel reference code in the base registers.
    fn code(self) -> u32 {
        match self {
            ReferenceMode::External => 0b001,
            ReferenceMode::Tip => 0b010,
        }
    }
}

/// Complete electrode/gain/reference selection for one probe.
///
/// Created with defaults at device construction and mutated by
/// configuration calls; bring-up either applies it fully or leaves the
/// device disabled.
#[derive(Clone, Debug)]
pub struct ProbeSettings {
    /// Selected bank per channel; electrode = bank * 384 + channel.
    pub bank: Vec<u8>,
    pub reference: ReferenceMode,
    /// Index into [`GAIN_STEPS`].
    pub ap_gain: u8,
    pub lfp_gain: u8,
    pub ap_filter: bool,
    /// Per-electrode connected status.
    pub connected: Vec<bool>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            bank: vec![0; NUM_CHANNELS],
            reference: ReferenceMode::External,
            ap_gain: 4,
            lfp_gain: 2,
            ap_filter: true,
            connected: vec![true; NUM_ELECTRODES],
        }
    }
}

impl ProbeSettings {
    /// Electrode wired to `channel` under the current bank selection, or
    /// `None` where the bank has no site for that channel (bank 2 covers
    /// only the first 192 channels).
    pub fn electrode(&self, channel: usize) -> Option<usize> {
        let e = self.bank[channel] as usize * NUM_CHANNELS + channel;
        (e < NUM_ELECTRODES).then_some(e)
    }

    /// Distinct, connected electrodes currently selected by some channel.
    pub fn selected_electrodes(&self) -> Vec<usize> {
        let mut selected: Vec<usize> = (0..NUM_CHANNELS)
            .filter_map(|ch| self.electrode(ch))
            .filter(|&e| self.connected[e])
            .collect();
        selected.sort_unstable();
        selected.dedup();
        selected
    }
}

/// Chain position of one electrode site.
fn shank_bit(electrode: usize) -> usize {
    if electrode % 2 == 0 {
        ELECTRODE_BASE + electrode / 2
    } else {
        SHANK_BITS - 1 - SHANK_REF_BITS - electrode / 2
    }
}

/// Build the 968-bit shank-connectivity chain.
///
/// Reference bits sit in the fixed blocks at both chain ends; on
/// multi-shank parts each shank block repeats this layout, so the builder
/// takes the whole chain length from the probe geometry rather than
/// hard-coding a single span.
pub fn build_shank_vector(settings: &ProbeSettings) -> BitVector {
    let mut v = BitVector::new(SHANK_BITS);

    let selected = settings.selected_electrodes();
    if selected.len() != NUM_CHANNELS {
        warn!(
            "probe selection covers {} electrodes, expected {}; programming anyway",
            selected.len(),
            NUM_CHANNELS
        );
    }
    for e in selected {
        v.set(shank_bit(e), true);
    }

    match settings.reference {
        ReferenceMode::External => {
            v.set(0, true);
            v.set(SHANK_BITS - 1, true);
        }
        ReferenceMode::Tip => {
            v.set(1, true);
            v.set(SHANK_BITS - 2, true);
        }
    }
    v
}

/// Build the even- and odd-channel 2448-bit base chains.
///
/// Per channel: 3 bits reference code, 3 bits AP gain, 3 bits LFP gain,
/// 1 bit AP filter, 1 bit standby. After the 192 channel fields, 16 ADC
/// trim blocks of 21 bits each (compP 5, compN 5, slope 3, coarse 2,
/// fine 2, cfix 4). Even-numbered ADCs go to the even chain.
pub fn build_base_vectors(settings: &ProbeSettings, cal: &AdcCalibration) -> (BitVector, BitVector) {
    let mut even = BitVector::new(BASE_BITS);
    let mut odd = BitVector::new(BASE_BITS);

    for ch in 0..NUM_CHANNELS {
        let v = if ch % 2 == 0 { &mut even } else { &mut odd };
        let offset = (ch / 2) * CHANNEL_FIELD_BITS;
        let standby = settings.electrode(ch).is_none();
        v.set_field(offset, 3, settings.reference.code());
        v.set_field(offset + 3, 3, settings.ap_gain as u32);
        v.set_field(offset + 6, 3, settings.lfp_gain as u32);
        v.set(offset + 9, settings.ap_filter);
        v.set(offset + 10, standby);
    }

    for adc in 0..NUM_ADCS {
        let v = if adc % 2 == 0 { &mut even } else { &mut odd };
        let trim = &cal.adcs[adc];
        let offset = ADC_TRIM_OFFSET + (adc / 2) * ADC_TRIM_BITS;
        debug_assert!(offset + ADC_TRIM_BITS <= BASE_BITS);
        v.set_field(offset, 5, trim.comp_p as u32);
        v.set_field(offset + 5, 5, trim.comp_n as u32);
        v.set_field(offset + 10, 3, trim.slope as u32);
        v.set_field(offset + 13, 2, trim.coarse as u32);
        v.set_field(offset + 15, 2, trim.fine as u32);
        v.set_field(offset + 17, 4, trim.cfix as u32);
    }
    debug_assert_eq!(ADC_TRIM_OFFSET + ADCS_PER_BASE * ADC_TRIM_BITS, BASE_BITS);

    (even, odd)
}

/// Builds, packs, and ships the configuration chains to the probe ASIC
/// through its register bridge.
pub struct ProbeConfigEncoder<'a> {
    bridge: &'a RegisterBridge,
}

impl<'a> ProbeConfigEncoder<'a> {
    pub fn new(bridge: &'a RegisterBridge) -> Self {
        ProbeConfigEncoder { bridge }
    }

    /// Program shank connectivity and both base registers.
    pub fn program(&self, settings: &ProbeSettings, cal: &AdcCalibration) -> DaqResult<()> {
        let shank = build_shank_vector(settings);
        self.transmit(npix1::SR_CHAIN1, &shank)?;

        let (even, odd) = build_base_vectors(settings, cal);
        self.transmit(npix1::SR_CHAIN2, &even)?;
        self.transmit(npix1::SR_CHAIN3, &odd)?;
        Ok(())
    }

    /// Ship one chain: two soft resets, length low/high, the byte-reversed
    /// payload one byte at a time, then the status check. A status mismatch
    /// is logged and tolerated; register transaction failures are not.
    pub fn transmit(&self, chain: u32, bits: &BitVector) -> DaqResult<()> {
        self.bridge.write_byte(npix1::SOFT_RESET, npix1::RESET_ALL)?;
        self.bridge.write_byte(npix1::SOFT_RESET, npix1::RESET_ALL)?;

        let bytes = bits.pack_reversed();
        let len = bytes.len() as u32;
        self.bridge.write_byte(npix1::SR_LENGTH1, (len & 0xFF) as u8)?;
        self.bridge.write_byte(npix1::SR_LENGTH2, (len >> 8) as u8)?;

        for &b in &bytes {
            self.bridge.write_byte(chain, b)?;
        }

        let status = self.bridge.read_byte(npix1::STATUS)?;
        if status != npix1::SR_OK {
            warn!(
                "shift-register chain 0x{chain:02X} verify failed: status 0x{status:02X}, expected 0x{:02X}",
                npix1::SR_OK
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::compose_address;
    use crate::frame::DeviceIndex;
    use crate::link::AcquisitionLink;
    use crate::mock::MockDriver;
    use std::sync::Arc;

    fn test_cal() -> AdcCalibration {
        AdcCalibration {
            serial: 1,
            adcs: (0..NUM_ADCS as u8)
                .map(|i| crate::calibration::AdcTrim {
                    comp_p: i,
                    comp_n: 31 - i,
                    slope: 3,
                    coarse: 1,
                    fine: 2,
                    cfix: 9,
                    offset: 2,
                    threshold: 512,
                })
                .collect(),
        }
    }

    #[test]
    fn full_selection_sets_exactly_384_electrode_bits() {
        let settings = ProbeSettings::default();
        let v = build_shank_vector(&settings);
        // 384 electrode bits plus the two external reference bits.
        assert_eq!(v.count_ones(), NUM_CHANNELS + 2);
        assert!(v.get(0));
        assert!(v.get(SHANK_BITS - 1));
    }

    #[test]
    fn shank_bit_mapping_is_injective() {
        let mut seen = vec![false; SHANK_BITS];
        for e in 0..NUM_ELECTRODES {
            let bit = shank_bit(e);
            assert!(bit >= SHANK_REF_BITS && bit < SHANK_BITS - SHANK_REF_BITS);
            assert!(!seen[bit], "electrode {e} collides at bit {bit}");
            seen[bit] = true;
        }
    }

    #[test]
    fn off_by_one_selection_warns_but_still_builds() {
        let mut settings = ProbeSettings::default();
        settings.connected[0] = false; // 383 selected
        let v = build_shank_vector(&settings);
        assert_eq!(v.count_ones(), NUM_CHANNELS - 1 + 2);

        // Bank 2 rows 192.. have no sites, so more than 384 is only
        // reachable through duplicate-free under-selection; the builder
        // still completes either way.
        settings.bank = vec![2; NUM_CHANNELS];
        let v = build_shank_vector(&settings);
        assert_eq!(v.count_ones(), 192 + 2);
    }

    #[test]
    fn base_vectors_cover_channel_and_trim_regions() {
        let settings = ProbeSettings::default();
        let (even, odd) = build_base_vectors(&settings, &test_cal());
        assert_eq!(even.len(), BASE_BITS);

        // Channel 0 sits in the even chain: external ref code 0b001.
        assert!(even.get(0));
        assert!(!even.get(1));
        // AP gain index 4 = 0b100, LSB-first at offset 3.
        assert!(!even.get(3));
        assert!(even.get(5));
        // AP filter on, standby off for a selected channel.
        assert!(even.get(9));
        assert!(!even.get(10));

        // ADC 1 is the first trim block of the odd chain: comp_n = 30.
        let base = ADC_TRIM_OFFSET;
        let comp_n: u32 = (0..5).map(|i| (odd.get(base + 5 + i) as u32) << i).sum();
        assert_eq!(comp_n, 30);
    }

    #[test]
    fn transmit_resets_writes_length_then_checks_status() {
        let driver = Arc::new(MockDriver::new(48_000_000));
        let dev = DeviceIndex::new(1, 0);
        driver.set_register(
            dev,
            compose_address(npix1::STATUS, npix1::CHIP_ADDR),
            npix1::SR_OK as u32,
        );
        let link = Arc::new(AcquisitionLink::new(Box::new(driver.clone())));
        let bridge = RegisterBridge::new(link, dev, npix1::CHIP_ADDR);

        let mut bits = BitVector::new(2448);
        bits.set(0, true);
        ProbeConfigEncoder::new(&bridge)
            .transmit(npix1::SR_CHAIN2, &bits)
            .unwrap();

        // 306 bytes -> length registers 0x32 / 0x01.
        let lo = driver
            .register(dev, compose_address(npix1::SR_LENGTH1, npix1::CHIP_ADDR))
            .unwrap();
        let hi = driver
            .register(dev, compose_address(npix1::SR_LENGTH2, npix1::CHIP_ADDR))
            .unwrap();
        assert_eq!((hi << 8) | lo, 306);
    }

    #[test]
    fn verify_mismatch_is_non_fatal() {
        let driver = MockDriver::new(48_000_000);
        let dev = DeviceIndex::new(1, 0);
        // STATUS stays 0 -> mismatch, but transmit must still succeed.
        let link = Arc::new(AcquisitionLink::new(Box::new(driver)));
        let bridge = RegisterBridge::new(link, dev, npix1::CHIP_ADDR);
        let bits = BitVector::new(8);
        assert!(ProbeConfigEncoder::new(&bridge)
            .transmit(npix1::SR_CHAIN1, &bits)
            .is_ok());
    }
}
