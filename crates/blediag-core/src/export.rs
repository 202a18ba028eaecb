//! CSV export of a sample series.
//!
//! Columns: `timestamp,value,hex,ADC_CH1,ADC_CH2,ADC_CH3,ADC_CH4`. The value
//! column is always quoted; ADC columns carry the channel voltage, or are
//! empty when the sample has no ADC frame.

use std::fmt::Write as _;
use std::io;

use time::format_description::well_known::Rfc3339;

use blediag_types::Sample;

/// CSV header row.
pub const CSV_HEADER: &str = "timestamp,value,hex,ADC_CH1,ADC_CH2,ADC_CH3,ADC_CH4";

/// Render samples as CSV, header included.
pub fn to_csv(samples: &[Sample]) -> String {
    let mut out = String::with_capacity(64 * (samples.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for sample in samples {
        push_row(&mut out, sample);
        out.push('\n');
    }
    out
}

/// Write samples as CSV to `writer`.
pub fn write_csv<W: io::Write>(mut writer: W, samples: &[Sample]) -> io::Result<()> {
    writer.write_all(to_csv(samples).as_bytes())?;
    writer.flush()
}

fn push_row(out: &mut String, sample: &Sample) {
    let timestamp = sample
        .timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| sample.timestamp.to_string());
    let _ = write!(
        out,
        "{},\"{}\",{}",
        timestamp,
        sample.value.replace('"', "\"\""),
        sample.raw_hex
    );
    match &sample.adc {
        Some(channels) => {
            for channel in channels {
                let _ = write!(out, ",{:.3}", channel.voltage);
            }
        }
        None => out.push_str(",,,,"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blediag_types::{AdcDecoder, CharacteristicRef};
    use bytes::Bytes;
    use time::macros::datetime;

    fn sample(value: &str, raw: &[u8]) -> Sample {
        Sample::new(
            datetime!(2024-05-01 12:30:00 UTC),
            value,
            Bytes::copy_from_slice(raw),
        )
    }

    #[test]
    fn test_header_only_for_empty_series() {
        assert_eq!(to_csv(&[]), format!("{}\n", CSV_HEADER));
    }

    #[test]
    fn test_row_without_adc() {
        let csv = to_csv(&[sample("hello", b"hi")]);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(row, "2024-05-01T12:30:00Z,\"hello\",68 69,,,,");
    }

    #[test]
    fn test_quotes_are_doubled() {
        let csv = to_csv(&[sample("say \"hi\"", b"")]);
        assert!(csv.contains("\"say \"\"hi\"\"\""));
    }

    #[test]
    fn test_row_with_adc_voltages() {
        let raw = [0x0f, 0xff, 0x00, 0x00, 0x07, 0xff, 0x00, 0x01];
        let target = CharacteristicRef::parse("0xffe0", "0xffe3").unwrap();
        let adc = AdcDecoder::default().decode(&raw, &target);
        let row_sample = sample("x", &raw).with_adc(adc);

        let csv = to_csv(&[row_sample]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.ends_with(",3.300,0.000,1.650,0.001"), "row: {}", row);
    }

    #[test]
    fn test_write_csv() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &[sample("1", &[1])]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
