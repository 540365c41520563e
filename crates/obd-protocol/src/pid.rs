//! OBD-II PID Catalog and Encoding Rules
//!
//! Every Mode 01 PID the emulator answers is described by a [`PidDescriptor`]:
//! its catalog id (`mode << 8 | pid`), the vehicle signal it reports and the
//! rule that turns a physical value into response bytes and back.

use serde::Serialize;

use crate::error::ModelError;
use crate::mode;
use crate::vehicle::Signal;

/// Byte encoding applied to a physical value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Encoding {
    /// 4-byte supported-PID bitmap, synthesized from the catalog
    Bitmap,
    /// A = value * 255 / 100
    Percent,
    /// A = value + 40
    Temperature,
    /// A = value
    Raw8,
    /// A = value / 3
    Pressure3,
    /// A = (value + 64) * 2
    Advance,
    /// AB = value * 4
    Rpm,
    /// AB = value * 100
    Centi16,
    /// AB = value * 1000
    Milli16,
    /// AB = value
    Raw16,
}

impl Encoding {
    /// Number of data bytes this rule produces
    pub fn byte_len(&self) -> usize {
        match self {
            Encoding::Bitmap => 4,
            Encoding::Percent | Encoding::Temperature | Encoding::Raw8 | Encoding::Pressure3 | Encoding::Advance => 1,
            Encoding::Rpm | Encoding::Centi16 | Encoding::Milli16 | Encoding::Raw16 => 2,
        }
    }

    /// Smallest representable step in physical units
    pub fn resolution(&self) -> f64 {
        match self {
            Encoding::Percent => 100.0 / 255.0,
            Encoding::Pressure3 => 3.0,
            Encoding::Advance => 0.5,
            Encoding::Rpm => 0.25,
            Encoding::Centi16 => 0.01,
            Encoding::Milli16 => 0.001,
            Encoding::Bitmap | Encoding::Temperature | Encoding::Raw8 | Encoding::Raw16 => 1.0,
        }
    }

    /// Encode a physical value, rounding to the nearest step and saturating
    pub fn encode(&self, value: f64) -> Vec<u8> {
        match self {
            Encoding::Bitmap => (value.max(0.0).min(u32::MAX as f64) as u32).to_be_bytes().to_vec(),
            Encoding::Percent => vec![saturate_u8(value * 255.0 / 100.0)],
            Encoding::Temperature => vec![saturate_u8(value + 40.0)],
            Encoding::Raw8 => vec![saturate_u8(value)],
            Encoding::Pressure3 => vec![saturate_u8(value / 3.0)],
            Encoding::Advance => vec![saturate_u8((value + 64.0) * 2.0)],
            Encoding::Rpm => saturate_u16(value * 4.0).to_be_bytes().to_vec(),
            Encoding::Centi16 => saturate_u16(value * 100.0).to_be_bytes().to_vec(),
            Encoding::Milli16 => saturate_u16(value * 1000.0).to_be_bytes().to_vec(),
            Encoding::Raw16 => saturate_u16(value).to_be_bytes().to_vec(),
        }
    }

    /// Decode response bytes back to a physical value
    pub fn decode(&self, bytes: &[u8]) -> Option<f64> {
        if bytes.len() < self.byte_len() {
            return None;
        }
        let a = bytes[0] as f64;
        let ab = || ((bytes[0] as u16) << 8 | bytes[1] as u16) as f64;
        let value = match self {
            Encoding::Bitmap => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            Encoding::Percent => a * 100.0 / 255.0,
            Encoding::Temperature => a - 40.0,
            Encoding::Raw8 => a,
            Encoding::Pressure3 => a * 3.0,
            Encoding::Advance => a / 2.0 - 64.0,
            Encoding::Rpm => ab() / 4.0,
            Encoding::Centi16 => ab() / 100.0,
            Encoding::Milli16 => ab() / 1000.0,
            Encoding::Raw16 => ab(),
        };
        Some(value)
    }
}

fn saturate_u8(v: f64) -> u8 {
    v.round().clamp(0.0, u8::MAX as f64) as u8
}

fn saturate_u16(v: f64) -> u16 {
    v.round().clamp(0.0, u16::MAX as f64) as u16
}

/// Description of one catalog PID
#[derive(Debug, Clone, Serialize)]
pub struct PidDescriptor {
    /// `(mode << 8) | pid`
    pub id: u16,
    pub name: &'static str,
    pub unit: &'static str,
    pub min: f64,
    pub max: f64,
    pub encoding: Encoding,
    /// Vehicle signal reported by this PID, `None` for bitmaps
    pub signal: Option<Signal>,
}

impl PidDescriptor {
    pub fn mode(&self) -> u8 {
        (self.id >> 8) as u8
    }

    pub fn pid(&self) -> u8 {
        (self.id & 0xFF) as u8
    }

    pub fn byte_len(&self) -> usize {
        self.encoding.byte_len()
    }

    pub fn is_bitmap(&self) -> bool {
        self.encoding == Encoding::Bitmap
    }

    pub fn encode(&self, value: f64) -> Vec<u8> {
        self.encoding.encode(value.clamp(self.min, self.max))
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<f64, ModelError> {
        self.encoding.decode(bytes).ok_or(ModelError::Decode {
            pid: self.id,
            expected: self.byte_len(),
            actual: bytes.len(),
        })
    }

    pub fn in_range(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

const fn entry(
    pid: u8,
    name: &'static str,
    unit: &'static str,
    min: f64,
    max: f64,
    encoding: Encoding,
    signal: Option<Signal>,
) -> PidDescriptor {
    PidDescriptor {
        id: ((mode::CURRENT_DATA as u16) << 8) | pid as u16,
        name,
        unit,
        min,
        max,
        encoding,
        signal,
    }
}

/// Lookup table of the PIDs the emulator answers
#[derive(Debug, Clone)]
pub struct PidCatalog {
    entries: Vec<PidDescriptor>,
}

impl PidCatalog {
    /// Empty catalog
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// The standard Mode 01 set
    pub fn standard() -> Self {
        use Encoding::*;
        let entries = vec![
            entry(0x00, "Supported PIDs 01-20", "", 0.0, u32::MAX as f64, Bitmap, None),
            entry(0x04, "Calculated engine load", "%", 0.0, 100.0, Percent, Some(Signal::EngineLoad)),
            entry(0x05, "Engine coolant temperature", "°C", -40.0, 215.0, Temperature, Some(Signal::CoolantTemp)),
            entry(0x0A, "Fuel pressure", "kPa", 0.0, 765.0, Pressure3, Some(Signal::FuelPressure)),
            entry(0x0B, "Intake manifold absolute pressure", "kPa", 0.0, 255.0, Raw8, Some(Signal::MapPressure)),
            entry(0x0C, "Engine speed", "rpm", 0.0, 16383.75, Rpm, Some(Signal::Rpm)),
            entry(0x0D, "Vehicle speed", "km/h", 0.0, 255.0, Raw8, Some(Signal::Speed)),
            entry(0x0E, "Timing advance", "° before TDC", -64.0, 63.5, Advance, Some(Signal::TimingAdvance)),
            entry(0x0F, "Intake air temperature", "°C", -40.0, 215.0, Temperature, Some(Signal::IntakeTemp)),
            entry(0x10, "Mass air flow rate", "g/s", 0.0, 655.35, Centi16, Some(Signal::MafRate)),
            entry(0x11, "Throttle position", "%", 0.0, 100.0, Percent, Some(Signal::Throttle)),
            entry(0x1F, "Run time since engine start", "s", 0.0, 65535.0, Raw16, Some(Signal::Runtime)),
            entry(0x20, "Supported PIDs 21-40", "", 0.0, u32::MAX as f64, Bitmap, None),
            entry(0x2F, "Fuel tank level input", "%", 0.0, 100.0, Percent, Some(Signal::FuelLevel)),
            entry(0x40, "Supported PIDs 41-60", "", 0.0, u32::MAX as f64, Bitmap, None),
            entry(0x42, "Control module voltage", "V", 0.0, 65.535, Milli16, Some(Signal::BatteryVoltage)),
            entry(0x46, "Ambient air temperature", "°C", -40.0, 215.0, Temperature, Some(Signal::AmbientTemp)),
        ];
        Self { entries }
    }

    /// Add a descriptor, rejecting duplicate ids
    pub fn insert(&mut self, descriptor: PidDescriptor) -> Result<(), ModelError> {
        if self.get(descriptor.id).is_some() {
            return Err(ModelError::DuplicatePid(descriptor.id));
        }
        self.entries.push(descriptor);
        self.entries.sort_by_key(|d| d.id);
        Ok(())
    }

    pub fn get(&self, id: u16) -> Option<&PidDescriptor> {
        self.entries.iter().find(|d| d.id == id)
    }

    /// Mode 01 lookup by PID byte
    pub fn current_data(&self, pid: u8) -> Option<&PidDescriptor> {
        self.get(((mode::CURRENT_DATA as u16) << 8) | pid as u16)
    }

    pub fn contains(&self, id: u16) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PidDescriptor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Supported-PID bitmap for the Mode 01 block following `base`
    ///
    /// `base` is the bitmap PID itself (0x00, 0x20, 0x40, ...). Bit 31 stands
    /// for `base + 1`, bit 0 for `base + 0x20`.
    pub fn supported_bitmap(&self, base: u8) -> u32 {
        let first = base as u16 + 1;
        let last = base as u16 + 0x20;
        self.entries
            .iter()
            .filter(|d| d.mode() == mode::CURRENT_DATA)
            .map(|d| d.pid() as u16)
            .filter(|pid| (first..=last).contains(pid))
            .fold(0u32, |bits, pid| bits | 1 << (31 - (pid - first)))
    }
}

impl Default for PidCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rpm_encoding() {
        let catalog = PidCatalog::standard();
        let rpm = catalog.current_data(0x0C).unwrap();
        assert_eq!(rpm.encode(1726.0), vec![0x1A, 0xF8]);
        assert!((rpm.decode(&[0x1A, 0xF8]).unwrap() - 1726.0).abs() < 1e-9);
    }

    #[test]
    fn test_temperature_offset() {
        let catalog = PidCatalog::standard();
        let coolant = catalog.current_data(0x05).unwrap();
        assert_eq!(coolant.encode(90.0), vec![130]);
        assert_eq!(coolant.encode(-40.0), vec![0]);
        assert_eq!(coolant.decode(&[0x73]).unwrap(), 75.0);
    }

    #[test]
    fn test_percent_and_voltage() {
        let catalog = PidCatalog::standard();
        assert_eq!(catalog.current_data(0x2F).unwrap().encode(75.0), vec![191]);
        assert_eq!(catalog.current_data(0x11).unwrap().encode(100.0), vec![255]);
        assert_eq!(catalog.current_data(0x42).unwrap().encode(12.6), vec![0x31, 0x38]);
    }

    #[test]
    fn test_fuel_pressure_and_timing_advance() {
        let catalog = PidCatalog::standard();
        let fuel = catalog.current_data(0x0A).unwrap();
        assert_eq!(fuel.encode(300.0), vec![100]);
        assert_eq!(fuel.encode(765.0), vec![255]);
        assert_eq!(fuel.decode(&[0x64]).unwrap(), 300.0);

        let timing = catalog.current_data(0x0E).unwrap();
        assert_eq!(timing.encode(10.0), vec![148]);
        assert_eq!(timing.encode(-64.0), vec![0]);
        assert_eq!(timing.encode(63.5), vec![255]);
        assert_eq!(timing.decode(&[0x80]).unwrap(), 0.0);
        assert_eq!(timing.encode(-90.0), vec![0]);
    }

    #[test]
    fn test_encode_clamps_to_range() {
        let catalog = PidCatalog::standard();
        let load = catalog.current_data(0x04).unwrap();
        assert_eq!(load.encode(150.0), vec![255]);
        assert_eq!(load.encode(-5.0), vec![0]);
    }

    #[test]
    fn test_decode_short_input() {
        let catalog = PidCatalog::standard();
        let err = catalog.current_data(0x0C).unwrap().decode(&[0x1A]).unwrap_err();
        assert!(matches!(err, ModelError::Decode { pid: 0x010C, expected: 2, actual: 1 }));
    }

    #[test]
    fn test_standard_bitmaps() {
        let catalog = PidCatalog::standard();
        // 04 05 0A 0B 0C 0D 0E 0F 10 11 1F 20
        assert_eq!(catalog.supported_bitmap(0x00), 0x187F_8003);
        // 2F 40
        assert_eq!(catalog.supported_bitmap(0x20), 0x0002_0001);
        // 42 46
        assert_eq!(catalog.supported_bitmap(0x40), 0x4400_0000);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut catalog = PidCatalog::standard();
        let dup = catalog.current_data(0x0C).unwrap().clone();
        assert!(matches!(catalog.insert(dup), Err(ModelError::DuplicatePid(0x010C))));
    }

    #[test]
    fn test_byte_lengths_match_rules() {
        for d in PidCatalog::standard().iter() {
            assert_eq!(d.encode(d.min).len(), d.byte_len(), "{}", d.name);
        }
    }

    fn valued_pids() -> Vec<PidDescriptor> {
        PidCatalog::standard().iter().filter(|d| !d.is_bitmap()).cloned().collect()
    }

    proptest! {
        #[test]
        fn prop_decode_recovers_value(index in 0usize..14, fraction in 0.0f64..=1.0) {
            let pids = valued_pids();
            let d = &pids[index % pids.len()];
            let value = d.min + (d.max - d.min) * fraction;
            let decoded = d.decode(&d.encode(value)).unwrap();
            prop_assert!((decoded - value).abs() <= d.encoding.resolution() / 2.0 + 1e-9,
                "{}: {} -> {}", d.name, value, decoded);
        }

        #[test]
        fn prop_bitmap_matches_catalog(pids in proptest::collection::btree_set(1u8..=0x20, 0..20)) {
            let mut catalog = PidCatalog::empty();
            for pid in &pids {
                catalog.insert(entry(*pid, "test", "", 0.0, 255.0, Encoding::Raw8, None)).unwrap();
            }
            let bitmap = catalog.supported_bitmap(0x00);
            for pid in 1u8..=0x20 {
                let bit = bitmap & (1 << (31 - (pid - 1))) != 0;
                prop_assert_eq!(bit, pids.contains(&pid));
            }
        }
    }
}
