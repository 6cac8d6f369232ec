//! Oximeter wire formats
//!
//! Consumer pulse oximeters speak a zoo of binary formats over BLE, most of
//! them undocumented. This module holds one pure decoder per supported
//! format plus the fixed priority order in which a live device is probed.
//!
//! Every decoder is a total function from raw notification bytes to an
//! optional candidate reading: a malformed payload, or a candidate outside
//! the physiological bounds, yields `None` and the stream self-heals on the
//! next packet. Nothing here performs I/O.
//!
//! # Supported formats (probe priority order)
//!
//! 1. Standard Bluetooth SIG Pulse Oximeter profile (PLX, SFLOAT payloads),
//!    continuous measurement first, then spot-check
//! 2. BerryMed BM1000-family 5-byte packets
//! 3. Serial-over-BLE streams framed with an `0xAA 0x55` sync word
//!    (Viatom/Wellue and similar, behind a Nordic UART service)
//! 4. Heuristic byte scan for generic HM-10 modules; approximate by
//!    construction, and tagged as such on every reading it produces

use uuid::Uuid;

use crate::types::{pulse_rate_in_range, spo2_in_range, ProtocolId};

// ============================================================================
// GATT Identifiers
// ============================================================================

/// Standard Pulse Oximeter service (Bluetooth SIG assigned 0x1822)
pub const PLX_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001822_0000_1000_8000_00805f9b34fb);

/// PLX Continuous Measurement characteristic (0x2A5F, notify)
pub const PLX_CONTINUOUS_UUID: Uuid = Uuid::from_u128(0x00002a5f_0000_1000_8000_00805f9b34fb);

/// PLX Spot-Check Measurement characteristic (0x2A5E, indicate)
pub const PLX_SPOT_CHECK_UUID: Uuid = Uuid::from_u128(0x00002a5e_0000_1000_8000_00805f9b34fb);

/// BerryMed proprietary data service
pub const BERRYMED_SERVICE_UUID: Uuid = Uuid::from_u128(0x49535343_fe7d_4ae5_8fa9_9fafd205e455);

/// BerryMed notification characteristic
pub const BERRYMED_NOTIFY_UUID: Uuid = Uuid::from_u128(0x49535343_1e4d_4bd9_ba61_23c647249616);

/// Nordic UART Service, used by Viatom/Wellue devices as a serial tunnel
pub const NUS_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// Nordic UART TX characteristic (device-to-host, notify)
pub const NUS_TX_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Generic HM-10 serial module service
pub const HM10_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);

/// Generic HM-10 data characteristic
pub const HM10_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

// ============================================================================
// Probe Priority Table
// ============================================================================

/// One candidate (service, characteristic, decoder) to try on a device.
#[derive(Copy, Clone, Debug)]
pub struct ProbeTarget {
    /// GATT service to look up
    pub service: Uuid,
    /// Characteristic within the service to subscribe to
    pub characteristic: Uuid,
    /// Decoder to run against its notifications
    pub protocol: ProtocolId,
    /// Short label for logs
    pub label: &'static str,
}

/// Fixed probe order: standard profile first, vendor formats after, the
/// heuristic scan dead last. Attempts against a device must be strictly
/// sequential; overlapping GATT discovery on one transport is unsafe.
pub const PROBE_ORDER: [ProbeTarget; 5] = [
    ProbeTarget {
        service: PLX_SERVICE_UUID,
        characteristic: PLX_CONTINUOUS_UUID,
        protocol: ProtocolId::Plx,
        label: "PLX continuous",
    },
    ProbeTarget {
        service: PLX_SERVICE_UUID,
        characteristic: PLX_SPOT_CHECK_UUID,
        protocol: ProtocolId::Plx,
        label: "PLX spot-check",
    },
    ProbeTarget {
        service: BERRYMED_SERVICE_UUID,
        characteristic: BERRYMED_NOTIFY_UUID,
        protocol: ProtocolId::BerryMed,
        label: "BerryMed",
    },
    ProbeTarget {
        service: NUS_SERVICE_UUID,
        characteristic: NUS_TX_UUID,
        protocol: ProtocolId::SerialFramed,
        label: "Nordic UART",
    },
    ProbeTarget {
        service: HM10_SERVICE_UUID,
        characteristic: HM10_CHAR_UUID,
        protocol: ProtocolId::Heuristic,
        label: "HM-10 heuristic",
    },
];

// ============================================================================
// SFLOAT (IEEE 11073)
// ============================================================================

/// Decode an IEEE 11073 16-bit SFLOAT.
///
/// Top 4 bits are a signed exponent, low 12 bits a signed mantissa; the
/// value is `mantissa × 10^exponent`. The reserved codes map to NaN and
/// the infinities, which the bounds check downstream rejects.
#[must_use]
pub fn decode_sfloat(raw: u16) -> f32 {
    match raw {
        0x07FF | 0x0800 | 0x0801 => return f32::NAN,
        0x07FE => return f32::INFINITY,
        0x0802 => return f32::NEG_INFINITY,
        _ => {}
    }

    let mut exponent = i32::from(raw >> 12);
    if exponent >= 8 {
        exponent -= 16;
    }

    let mut mantissa = i32::from(raw & 0x0FFF);
    if mantissa >= 0x0800 {
        mantissa -= 0x1000;
    }

    mantissa as f32 * 10f32.powi(exponent)
}

// ============================================================================
// Decoders
// ============================================================================

/// A candidate (SpO2, pulse rate) pair that passed the bounds check.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawVitals {
    /// Blood-oxygen saturation percentage
    pub spo2: u8,
    /// Pulse rate in beats per minute
    pub pulse_rate: u16,
}

fn checked(spo2: f32, pulse_rate: f32) -> Option<RawVitals> {
    if !spo2_in_range(spo2) || !pulse_rate_in_range(pulse_rate) {
        return None;
    }
    Some(RawVitals {
        spo2: spo2.round() as u8,
        pulse_rate: pulse_rate.round() as u16,
    })
}

/// Decode a standard PLX measurement payload.
///
/// Layout: flags byte, SpO2 SFLOAT at offset 1 (little-endian), pulse-rate
/// SFLOAT at offset 3.
#[must_use]
pub fn decode_plx(payload: &[u8]) -> Option<RawVitals> {
    if payload.len() < 5 {
        return None;
    }

    let spo2 = decode_sfloat(u16::from_le_bytes([payload[1], payload[2]]));
    let pulse_rate = decode_sfloat(u16::from_le_bytes([payload[3], payload[4]]));

    checked(spo2, pulse_rate)
}

/// Decode a BerryMed 5-byte packet.
///
/// Pulse rate is split across bytes: the low 7+ bits in byte 3 with bit 6
/// of byte 2 supplying bit 7. SpO2 sits in byte 4.
#[must_use]
pub fn decode_berrymed(payload: &[u8]) -> Option<RawVitals> {
    if payload.len() < 5 {
        return None;
    }

    let pulse_rate = u16::from(payload[3]) | (u16::from(payload[2] & 0x40) << 1);
    let spo2 = payload[4];

    checked(f32::from(spo2), f32::from(pulse_rate))
}

/// Decode a sync-word framed serial packet (Viatom/Wellue style).
///
/// Scans for the `0xAA 0x55` marker; a match needs a type-indicator byte of
/// `0x0F` or `0xF0` two bytes later and a data-type byte of `8` five bytes
/// past the marker. SpO2 and pulse rate follow at +7 and +8. Non-matching
/// or out-of-range windows are skipped, not fatal; a notification can
/// carry partial frames on either side of a valid one.
#[must_use]
pub fn decode_serial_framed(payload: &[u8]) -> Option<RawVitals> {
    if payload.len() < 8 {
        return None;
    }

    for i in 0..payload.len() - 7 {
        if payload[i] != 0xAA || payload[i + 1] != 0x55 {
            continue;
        }

        let type_indicator = payload[i + 2];
        if type_indicator != 0x0F && type_indicator != 0xF0 {
            continue;
        }

        if payload[i + 5] != 8 || i + 8 >= payload.len() {
            continue;
        }

        let spo2 = payload[i + 7];
        let pulse_rate = payload[i + 8];

        if let Some(vitals) = checked(f32::from(spo2), f32::from(pulse_rate)) {
            return Some(vitals);
        }
    }

    None
}

/// Best-effort decode for generic HM-10 modules with unknown layouts.
///
/// Takes the first byte in [85, 100] as an SpO2 candidate and pairs it with
/// the first other byte passing the pulse-rate bounds. Arbitrary bytes can
/// satisfy both, so this is an approximation; readings it produces carry
/// [`ProtocolId::Heuristic`] so consumers can discount them.
#[must_use]
pub fn decode_heuristic(payload: &[u8]) -> Option<RawVitals> {
    if payload.len() < 4 {
        return None;
    }

    for (spo2_idx, &candidate) in payload.iter().enumerate() {
        if !(85..=100).contains(&candidate) {
            continue;
        }

        for (pr_idx, &pr_candidate) in payload.iter().enumerate() {
            if pr_idx == spo2_idx {
                continue;
            }
            if pulse_rate_in_range(f32::from(pr_candidate)) {
                return checked(f32::from(candidate), f32::from(pr_candidate));
            }
        }
    }

    None
}

impl ProtocolId {
    /// Run this protocol's decoder against a notification payload.
    #[must_use]
    pub fn decode(self, payload: &[u8]) -> Option<RawVitals> {
        match self {
            Self::Plx => decode_plx(payload),
            Self::BerryMed => decode_berrymed(payload),
            Self::SerialFramed => decode_serial_framed(payload),
            Self::Heuristic => decode_heuristic(payload),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sfloat_plain_values() {
        assert_eq!(decode_sfloat(0x0064), 100.0);
        assert_eq!(decode_sfloat(0x0048), 72.0);
        assert_eq!(decode_sfloat(0x0000), 0.0);
    }

    #[test]
    fn test_sfloat_negative_exponent() {
        // Mantissa 1000, exponent -1: 100.0
        assert_eq!(decode_sfloat(0xF3E8), 100.0);
    }

    #[test]
    fn test_sfloat_negative_mantissa() {
        // Mantissa 0xFFF is -1 two's-complement, exponent 0
        assert_eq!(decode_sfloat(0x0FFF), -1.0);
    }

    #[test]
    fn test_sfloat_reserved_codes() {
        assert!(decode_sfloat(0x07FF).is_nan());
        assert!(decode_sfloat(0x0800).is_nan());
        assert!(decode_sfloat(0x0801).is_nan());
        assert_eq!(decode_sfloat(0x07FE), f32::INFINITY);
        assert_eq!(decode_sfloat(0x0802), f32::NEG_INFINITY);
    }

    #[test]
    fn test_plx_decode() {
        // flags, spo2=98 (0x0062 LE), pr=72 (0x0048 LE)
        let payload = [0x00, 0x62, 0x00, 0x48, 0x00];
        assert_eq!(
            decode_plx(&payload),
            Some(RawVitals { spo2: 98, pulse_rate: 72 })
        );
    }

    #[test]
    fn test_plx_rejects_reserved_spo2() {
        // SpO2 field holds the NaN code
        let payload = [0x00, 0xFF, 0x07, 0x48, 0x00];
        assert_eq!(decode_plx(&payload), None);
    }

    #[test]
    fn test_plx_rejects_out_of_range() {
        // spo2 = 45, below the floor
        let payload = [0x00, 0x2D, 0x00, 0x48, 0x00];
        assert_eq!(decode_plx(&payload), None);
    }

    #[test]
    fn test_plx_rejects_short_payload() {
        assert_eq!(decode_plx(&[0x00, 0x62, 0x00, 0x48]), None);
    }

    #[test]
    fn test_berrymed_decode() {
        let payload = [0x00, 0x00, 0x00, 72, 98];
        assert_eq!(
            decode_berrymed(&payload),
            Some(RawVitals { spo2: 98, pulse_rate: 72 })
        );
    }

    #[test]
    fn test_berrymed_high_bit_pulse_rate() {
        // Bit 6 of byte 2 is bit 7 of the pulse rate: 72 | 128 = 200
        let payload = [0x00, 0x00, 0x40, 72, 98];
        assert_eq!(
            decode_berrymed(&payload),
            Some(RawVitals { spo2: 98, pulse_rate: 200 })
        );
    }

    #[test]
    fn test_berrymed_rejects_out_of_range() {
        // pulse 255 exceeds the ceiling
        assert_eq!(decode_berrymed(&[0x00, 0x00, 0x00, 255, 98]), None);
        // spo2 45 below the floor
        assert_eq!(decode_berrymed(&[0x00, 0x00, 0x00, 72, 45]), None);
    }

    #[test]
    fn test_serial_framed_decode() {
        let payload = [0xAA, 0x55, 0x0F, 0x00, 0x00, 8, 0x00, 97, 65];
        assert_eq!(
            decode_serial_framed(&payload),
            Some(RawVitals { spo2: 97, pulse_rate: 65 })
        );
    }

    #[test]
    fn test_serial_framed_scans_past_junk() {
        let payload = [0x01, 0xAA, 0xAA, 0x55, 0xF0, 0x00, 0x00, 8, 0x00, 96, 70];
        assert_eq!(
            decode_serial_framed(&payload),
            Some(RawVitals { spo2: 96, pulse_rate: 70 })
        );
    }

    #[test]
    fn test_serial_framed_skips_invalid_frame_then_accepts() {
        // First frame carries spo2=40 (out of range); a later frame is valid
        let payload = [
            0xAA, 0x55, 0x0F, 0x00, 0x00, 8, 0x00, 40, 65, //
            0xAA, 0x55, 0x0F, 0x00, 0x00, 8, 0x00, 98, 65,
        ];
        assert_eq!(
            decode_serial_framed(&payload),
            Some(RawVitals { spo2: 98, pulse_rate: 65 })
        );
    }

    #[test]
    fn test_serial_framed_rejects_wrong_type_indicator() {
        let payload = [0xAA, 0x55, 0x01, 0x00, 0x00, 8, 0x00, 97, 65];
        assert_eq!(decode_serial_framed(&payload), None);
    }

    #[test]
    fn test_serial_framed_rejects_wrong_data_type() {
        let payload = [0xAA, 0x55, 0x0F, 0x00, 0x00, 7, 0x00, 97, 65];
        assert_eq!(decode_serial_framed(&payload), None);
    }

    #[test]
    fn test_heuristic_decode() {
        let payload = [0x00, 72, 98, 0x00];
        assert_eq!(
            decode_heuristic(&payload),
            Some(RawVitals { spo2: 98, pulse_rate: 72 })
        );
    }

    #[test]
    fn test_heuristic_no_spo2_candidate() {
        assert_eq!(decode_heuristic(&[0x00, 72, 120, 0x00]), None);
    }

    #[test]
    fn test_heuristic_does_not_pair_value_with_itself() {
        // 90 is a valid SpO2 and a valid pulse rate, but it is one byte
        assert_eq!(decode_heuristic(&[0, 90, 0, 0]), None);
    }

    #[test]
    fn test_probe_order_is_standard_first() {
        let protocols: Vec<ProtocolId> = PROBE_ORDER.iter().map(|t| t.protocol).collect();
        assert_eq!(
            protocols,
            vec![
                ProtocolId::Plx,
                ProtocolId::Plx,
                ProtocolId::BerryMed,
                ProtocolId::SerialFramed,
                ProtocolId::Heuristic,
            ]
        );

        assert_eq!(PROBE_ORDER[0].characteristic, PLX_CONTINUOUS_UUID);
        assert_eq!(PROBE_ORDER[1].characteristic, PLX_SPOT_CHECK_UUID);
    }

    #[test]
    fn test_probe_targets_are_distinct() {
        for (i, a) in PROBE_ORDER.iter().enumerate() {
            for b in PROBE_ORDER.iter().skip(i + 1) {
                assert!(
                    a.service != b.service || a.characteristic != b.characteristic,
                    "duplicate probe target: {}",
                    a.label
                );
            }
        }
    }
}
