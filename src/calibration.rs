//! Factory calibration files for the Neuropixels 1.0 probe.
//!
//! Both files are plain CSV with the probe serial number on the first line.
//! The ADC file carries one row of 8 trim values per ADC; the gain file
//! carries a single row of correction factors, one per AP gain step
//! followed by one per LFP gain step. Any structural problem or a serial
//! mismatch refuses activation of the probe; nothing is partially applied.

use crate::error::{DaqError, DaqResult};
use std::path::Path;

pub const NUM_ADCS: usize = 32;
pub const NUM_GAIN_STEPS: usize = 8;

/// Per-ADC correction set. The first six fields feed the base
/// shift-register trim blocks; `offset` and `threshold` are applied to
/// every raw sample at decode time. Immutable once loaded for a session.
#[derive(Clone, Copy, Debug, Default)]
pub struct AdcTrim {
    pub comp_p: u8,
    pub comp_n: u8,
    pub slope: u8,
    pub coarse: u8,
    pub fine: u8,
    pub cfix: u8,
    pub offset: i32,
    pub threshold: i32,
}

#[derive(Clone, Debug)]
pub struct AdcCalibration {
    pub serial: u64,
    pub adcs: Vec<AdcTrim>,
}

#[derive(Clone, Debug)]
pub struct GainCalibration {
    pub serial: u64,
    pub ap_factors: Vec<f64>,
    pub lfp_factors: Vec<f64>,
}

fn reject(path: &Path, reason: impl std::fmt::Display) -> DaqError {
    DaqError::Calibration(format!("{}: {}", path.display(), reason))
}

fn read_lines(path: &Path) -> DaqResult<Vec<String>> {
    let text =
        std::fs::read_to_string(path).map_err(|e| reject(path, format!("cannot read: {e}")))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect())
}

fn parse_serial(lines: &[String], path: &Path, expected: u64) -> DaqResult<u64> {
    let serial = lines
        .first()
        .ok_or_else(|| reject(path, "file is empty"))?
        .parse::<u64>()
        .map_err(|_| reject(path, "first line is not a serial number"))?;
    if serial != expected {
        return Err(reject(
            path,
            format!("serial {serial} does not match probe serial {expected}"),
        ));
    }
    Ok(serial)
}

fn parse_row<T: std::str::FromStr>(line: &str, path: &Path) -> DaqResult<Vec<T>> {
    line.split(',')
        .map(str::trim)
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| reject(path, format!("unparsable value '{v}'")))
        })
        .collect()
}

/// Load and validate the per-ADC trim file against the probe serial.
pub fn load_adc_calibration(path: &Path, probe_serial: u64) -> DaqResult<AdcCalibration> {
    let lines = read_lines(path)?;
    let serial = parse_serial(&lines, path, probe_serial)?;

    let rows = &lines[1..];
    if rows.len() != NUM_ADCS {
        return Err(reject(
            path,
            format!("expected {} ADC rows, found {}", NUM_ADCS, rows.len()),
        ));
    }

    let mut adcs = Vec::with_capacity(NUM_ADCS);
    for row in rows {
        let values: Vec<i32> = parse_row(row, path)?;
        if values.len() != 8 {
            return Err(reject(
                path,
                format!("expected 8 trim values per ADC, found {}", values.len()),
            ));
        }
        adcs.push(AdcTrim {
            comp_p: values[0] as u8,
            comp_n: values[1] as u8,
            slope: values[2] as u8,
            coarse: values[3] as u8,
            fine: values[4] as u8,
            cfix: values[5] as u8,
            offset: values[6],
            threshold: values[7],
        });
    }

    Ok(AdcCalibration { serial, adcs })
}

/// Load and validate the gain-correction file against the probe serial.
pub fn load_gain_calibration(path: &Path, probe_serial: u64) -> DaqResult<GainCalibration> {
    let lines = read_lines(path)?;
    let serial = parse_serial(&lines, path, probe_serial)?;

    if lines.len() != 2 {
        return Err(reject(
            path,
            format!("expected 1 gain-correction row, found {}", lines.len() - 1),
        ));
    }
    let values: Vec<f64> = parse_row(&lines[1], path)?;
    if values.len() != 2 * NUM_GAIN_STEPS {
        return Err(reject(
            path,
            format!(
                "expected {} gain factors, found {}",
                2 * NUM_GAIN_STEPS,
                values.len()
            ),
        ));
    }

    Ok(GainCalibration {
        serial,
        ap_factors: values[..NUM_GAIN_STEPS].to_vec(),
        lfp_factors: values[NUM_GAIN_STEPS..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn adc_file(serial: u64, rows: usize, cols: usize) -> String {
        let mut s = format!("{serial}\n");
        for adc in 0..rows {
            let row: Vec<String> = (0..cols).map(|c| format!("{}", adc + c)).collect();
            s.push_str(&row.join(","));
            s.push('\n');
        }
        s
    }

    #[test]
    fn valid_adc_file_loads() {
        let f = write_temp(&adc_file(19051010, 32, 8));
        let cal = load_adc_calibration(f.path(), 19051010).unwrap();
        assert_eq!(cal.adcs.len(), 32);
        assert_eq!(cal.adcs[5].comp_p, 5);
        assert_eq!(cal.adcs[5].threshold, 12);
    }

    #[test]
    fn serial_mismatch_is_rejected() {
        let f = write_temp(&adc_file(1111, 32, 8));
        let err = load_adc_calibration(f.path(), 2222).unwrap_err();
        assert!(!err.is_fatal());
        assert!(matches!(err, DaqError::Calibration(_)));
    }

    #[test]
    fn wrong_row_or_column_counts_are_rejected() {
        let f = write_temp(&adc_file(1, 31, 8));
        assert!(load_adc_calibration(f.path(), 1).is_err());
        let f = write_temp(&adc_file(1, 32, 7));
        assert!(load_adc_calibration(f.path(), 1).is_err());
    }

    #[test]
    fn gain_file_splits_ap_and_lfp_factors() {
        let f = write_temp("77\n1.0,1.1,1.2,1.3,1.4,1.5,1.6,1.7,2.0,2.1,2.2,2.3,2.4,2.5,2.6,2.7\n");
        let cal = load_gain_calibration(f.path(), 77).unwrap();
        assert_eq!(cal.ap_factors.len(), 8);
        assert_eq!(cal.lfp_factors[0], 2.0);
    }

    #[test]
    fn gain_file_with_extra_rows_is_rejected() {
        let f = write_temp("77\n1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1\n1,1\n");
        assert!(load_gain_calibration(f.path(), 77).is_err());
    }
}
