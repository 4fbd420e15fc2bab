use crate::probe::{ProbeSettings, ReferenceMode, NUM_CHANNELS};
use confique::Config;
use serde::Deserialize;

#[derive(Config, Debug, Clone)]
pub struct Conf {
    #[config(nested)]
    pub run_settings: RunSettings,
    #[config(nested)]
    pub probe_settings: ProbeConf,
    #[config(nested)]
    pub breakout_settings: BreakoutConf,
    #[config(nested)]
    pub imu_settings: ImuConf,
}

#[derive(Config, Debug, Clone)]
pub struct RunSettings {
    /// Acquisition length in seconds.
    pub run_duration: u64,
    pub log_dir: String,
    #[config(default = 0)]
    pub hub: u8,
}

#[derive(Config, Debug, Clone)]
pub struct ProbeConf {
    #[config(default = true)]
    pub enabled: bool,
    /// Electrode bank selected for every channel.
    #[config(default = 0)]
    pub bank: u8,
    pub reference: ReferenceConf,
    #[config(default = 4)]
    pub ap_gain_index: u8,
    #[config(default = 2)]
    pub lfp_gain_index: u8,
    #[config(default = true)]
    pub ap_filter: bool,
    pub adc_calibration: Option<String>,
    pub gain_calibration: Option<String>,
    /// Seconds of data ignored before baseline estimation starts.
    #[config(default = 1.0)]
    pub settle_secs: f64,
    /// Samples accumulated per channel before the baseline latches.
    #[config(default = 3000)]
    pub baseline_samples: usize,
}

#[derive(Deserialize, Clone, Copy, Debug)]
pub enum ReferenceConf {
    External,
    Tip,
}

#[derive(Config, Debug, Clone)]
pub struct BreakoutConf {
    #[config(default = true)]
    pub analog_enabled: bool,
    #[config(default = true)]
    pub digital_enabled: bool,
}

#[derive(Config, Debug, Clone)]
pub struct ImuConf {
    #[config(default = true)]
    pub enabled: bool,
    #[config(default = 10)]
    pub poll_period_ms: u64,
}

impl ProbeConf {
    pub fn to_settings(&self) -> ProbeSettings {
        let mut settings = ProbeSettings::default();
        settings.bank = vec![self.bank; NUM_CHANNELS];
        settings.reference = match self.reference {
            ReferenceConf::External => ReferenceMode::External,
            ReferenceConf::Tip => ReferenceMode::Tip,
        };
        settings.ap_gain = self.ap_gain_index;
        settings.lfp_gain = self.lfp_gain_index;
        settings.ap_filter = self.ap_filter;
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_fill_unset_fields() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[run_settings]
run_duration = 30
log_dir = "/tmp/logs"

[probe_settings]
reference = "External"

[breakout_settings]

[imu_settings]
"#
        )
        .unwrap();
        let conf = Conf::builder().file(file.path()).load().unwrap();
        assert_eq!(conf.run_settings.run_duration, 30);
        assert_eq!(conf.probe_settings.ap_gain_index, 4);
        assert_eq!(conf.imu_settings.poll_period_ms, 10);
        let settings = conf.probe_settings.to_settings();
        assert_eq!(settings.bank.len(), NUM_CHANNELS);
        assert!(matches!(settings.reference, ReferenceMode::External));
    }
}
