//! Instrument-specific behaviour layered on top of the generic map.
//!
//! Each source knows how to recognise its headers, repair known header
//! quirks before normalization, and pick display defaults.

use crate::io::header::MetaDict;
use crate::io::normalize::NormalizedMetadata;
use crate::types::MapResult;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use super::render::{PlotSettings, Stretch};

/// Behaviour of one instrument family
pub trait InstrumentSource: fmt::Debug + Send + Sync {
    /// Registry name, e.g. "aia"
    fn name(&self) -> &str;

    /// Whether a raw header was produced by this instrument
    fn matches(&self, _header: &MetaDict) -> bool {
        false
    }

    /// Repair known header quirks before normalization
    fn fix_metadata(&self, _header: &mut MetaDict) -> MapResult<()> {
        Ok(())
    }

    fn nickname(&self, meta: &NormalizedMetadata, _header: &MetaDict) -> String {
        match (&meta.instrument, &meta.detector, &meta.observatory) {
            (Some(instrument), Some(detector), _) if instrument != detector => {
                format!("{}-{}", instrument, detector)
            }
            (Some(instrument), _, _) => instrument.clone(),
            (None, Some(detector), _) => detector.clone(),
            (None, None, Some(observatory)) => observatory.clone(),
            (None, None, None) => "Generic".to_string(),
        }
    }

    fn measurement(&self, meta: &NormalizedMetadata, _header: &MetaDict) -> Option<String> {
        meta.wavelength.as_ref().map(|w| w.to_string())
    }

    fn plot_settings(&self, _meta: &NormalizedMetadata, _header: &MetaDict) -> PlotSettings {
        PlotSettings::default()
    }
}

fn cached_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid source pattern"))
}

fn header_matches(header: &MetaDict, key: &str, pattern: &Regex) -> bool {
    header.get_str(key).map_or(false, |value| pattern.is_match(value))
}

/// Wavelength rounded to whole angstrom, as used in colour map names
fn wavelength_tag(meta: &NormalizedMetadata) -> Option<i64> {
    meta.wavelength
        .as_ref()
        .map(|w| w.to_angstrom().unwrap_or(w.value).round() as i64)
}

/// Split "MISSION/INSTRUMENT" telescope strings into an observatory keyword
fn observatory_from_telescop(header: &mut MetaDict) {
    if header.contains_key("obsrvtry") {
        return;
    }
    let observatory = header
        .get_str("telescop")
        .and_then(|t| t.split('/').next())
        .map(|s| s.trim().to_string());
    if let Some(observatory) = observatory.filter(|o| !o.is_empty()) {
        header.insert("obsrvtry", observatory);
    }
}

fn default_keyword(header: &mut MetaDict, key: &str, value: &str) {
    if !header.contains_key(key) {
        header.insert(key, value);
    }
}

pub const GENERIC_SOURCE_NAME: &str = "generic";

/// Fallback used when no registered source claims a header
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericSource;

impl InstrumentSource for GenericSource {
    fn name(&self) -> &str {
        GENERIC_SOURCE_NAME
    }
}

/// SDO Atmospheric Imaging Assembly
#[derive(Debug, Clone, Copy, Default)]
pub struct AiaSource;

impl InstrumentSource for AiaSource {
    fn name(&self) -> &str {
        "aia"
    }

    fn matches(&self, header: &MetaDict) -> bool {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        header_matches(header, "instrume", cached_regex(&PATTERN, r"(?i)^AIA"))
    }

    fn fix_metadata(&self, header: &mut MetaDict) -> MapResult<()> {
        default_keyword(header, "detector", "AIA");
        default_keyword(header, "waveunit", "angstrom");
        observatory_from_telescop(header);
        Ok(())
    }

    fn nickname(&self, _meta: &NormalizedMetadata, _header: &MetaDict) -> String {
        "AIA".to_string()
    }

    fn plot_settings(&self, meta: &NormalizedMetadata, _header: &MetaDict) -> PlotSettings {
        PlotSettings {
            cmap: wavelength_tag(meta)
                .map(|wl| format!("sdoaia{}", wl))
                .unwrap_or_else(|| "gray".to_string()),
            stretch: Stretch::Asinh(0.01),
            ..PlotSettings::default()
        }
    }
}

/// SDO Helioseismic and Magnetic Imager
#[derive(Debug, Clone, Copy, Default)]
pub struct HmiSource;

impl InstrumentSource for HmiSource {
    fn name(&self) -> &str {
        "hmi"
    }

    fn matches(&self, header: &MetaDict) -> bool {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        header_matches(header, "telescop", cached_regex(&PATTERN, r"(?i)HMI$"))
    }

    fn fix_metadata(&self, header: &mut MetaDict) -> MapResult<()> {
        default_keyword(header, "detector", "HMI");
        observatory_from_telescop(header);
        Ok(())
    }

    fn nickname(&self, _meta: &NormalizedMetadata, _header: &MetaDict) -> String {
        "HMI".to_string()
    }

    /// First word of CONTENT, e.g. "magnetogram" or "continuum"
    fn measurement(&self, meta: &NormalizedMetadata, header: &MetaDict) -> Option<String> {
        header
            .get_str("content")
            .and_then(|content| content.split_whitespace().next())
            .map(|word| word.to_lowercase())
            .or_else(|| meta.wavelength.as_ref().map(|w| w.to_string()))
    }

    fn plot_settings(&self, meta: &NormalizedMetadata, header: &MetaDict) -> PlotSettings {
        match self.measurement(meta, header).as_deref() {
            Some("magnetogram") => PlotSettings {
                cmap: "hmimag".to_string(),
                symmetric: true,
                ..PlotSettings::default()
            },
            _ => PlotSettings::default(),
        }
    }
}

/// SOHO Extreme ultraviolet Imaging Telescope
#[derive(Debug, Clone, Copy, Default)]
pub struct EitSource;

impl InstrumentSource for EitSource {
    fn name(&self) -> &str {
        "eit"
    }

    fn matches(&self, header: &MetaDict) -> bool {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        header_matches(header, "instrume", cached_regex(&PATTERN, r"(?i)^EIT$"))
    }

    fn fix_metadata(&self, header: &mut MetaDict) -> MapResult<()> {
        default_keyword(header, "detector", "EIT");
        default_keyword(header, "waveunit", "angstrom");
        Ok(())
    }

    fn plot_settings(&self, meta: &NormalizedMetadata, _header: &MetaDict) -> PlotSettings {
        PlotSettings {
            cmap: wavelength_tag(meta)
                .map(|wl| format!("sohoeit{}", wl))
                .unwrap_or_else(|| "gray".to_string()),
            stretch: Stretch::Sqrt,
            ..PlotSettings::default()
        }
    }
}

/// STEREO SECCHI Extreme Ultraviolet Imager
#[derive(Debug, Clone, Copy, Default)]
pub struct EuviSource;

impl InstrumentSource for EuviSource {
    fn name(&self) -> &str {
        "euvi"
    }

    fn matches(&self, header: &MetaDict) -> bool {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        header_matches(header, "detector", cached_regex(&PATTERN, r"(?i)^EUVI$"))
    }

    fn fix_metadata(&self, header: &mut MetaDict) -> MapResult<()> {
        default_keyword(header, "waveunit", "angstrom");
        if let Some(observatory) = header.get_str("obsrvtry").map(|o| o.replace('_', " ")) {
            header.insert("obsrvtry", observatory);
        }
        Ok(())
    }

    fn nickname(&self, meta: &NormalizedMetadata, _header: &MetaDict) -> String {
        match meta.observatory.as_deref() {
            Some(observatory) => format!("EUVI-{}", observatory.trim_start_matches("STEREO ")),
            None => "EUVI".to_string(),
        }
    }

    fn plot_settings(&self, meta: &NormalizedMetadata, _header: &MetaDict) -> PlotSettings {
        PlotSettings {
            cmap: wavelength_tag(meta)
                .map(|wl| format!("euvi{}", wl))
                .unwrap_or_else(|| "gray".to_string()),
            stretch: Stretch::Sqrt,
            ..PlotSettings::default()
        }
    }
}

/// SOHO Large Angle and Spectrometric Coronagraph
#[derive(Debug, Clone, Copy, Default)]
pub struct LascoSource;

impl InstrumentSource for LascoSource {
    fn name(&self) -> &str {
        "lasco"
    }

    fn matches(&self, header: &MetaDict) -> bool {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        header_matches(header, "instrume", cached_regex(&PATTERN, r"(?i)^LASCO$"))
    }

    /// LASCO headers split DATE-OBS/TIME-OBS with slashes in the date, omit
    /// CUNIT, and put the filter name in WAVELNTH
    fn fix_metadata(&self, header: &mut MetaDict) -> MapResult<()> {
        let combined = match (header.get_str("date-obs"), header.get_str("time-obs")) {
            (Some(date), Some(time)) if !date.contains('T') => {
                Some(format!("{}T{}", date.replace('/', "-"), time))
            }
            _ => None,
        };
        if let Some(combined) = combined {
            log::debug!("LASCO: combined DATE-OBS and TIME-OBS into {}", combined);
            header.insert("date-obs", combined);
            header.remove("time-obs");
        }

        for key in ["cunit1", "cunit2"] {
            if !header.contains_key(key) {
                log::warn!("LASCO: {} missing, assuming arcsec", key.to_uppercase());
                header.insert(key, "arcsec");
            }
        }

        let filter = header
            .get("wavelnth")
            .filter(|value| value.as_f64().is_none())
            .map(|value| value.as_str().unwrap_or_default().trim().to_string());
        if let Some(filter) = filter {
            header.remove("wavelnth");
            if !filter.is_empty() && !header.contains_key("filter") {
                header.insert("filter", filter);
            }
        }
        Ok(())
    }

    fn nickname(&self, meta: &NormalizedMetadata, _header: &MetaDict) -> String {
        match meta.detector.as_deref() {
            Some(detector) => format!("LASCO-{}", detector),
            None => "LASCO".to_string(),
        }
    }

    fn measurement(&self, _meta: &NormalizedMetadata, header: &MetaDict) -> Option<String> {
        Some(
            header
                .get_str("filter")
                .filter(|f| !f.is_empty())
                .unwrap_or("white-light")
                .to_string(),
        )
    }

    fn plot_settings(&self, meta: &NormalizedMetadata, _header: &MetaDict) -> PlotSettings {
        let cmap = match meta.detector.as_deref() {
            Some(detector) => format!(
                "soholasco{}",
                detector.trim_start_matches(|c: char| c.is_ascii_alphabetic())
            ),
            None => "gray".to_string(),
        };
        PlotSettings {
            cmap,
            ..PlotSettings::default()
        }
    }
}

/// Hinode X-Ray Telescope
#[derive(Debug, Clone, Copy, Default)]
pub struct XrtSource;

impl InstrumentSource for XrtSource {
    fn name(&self) -> &str {
        "xrt"
    }

    fn matches(&self, header: &MetaDict) -> bool {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        header_matches(header, "instrume", cached_regex(&PATTERN, r"(?i)^XRT$"))
    }

    fn fix_metadata(&self, header: &mut MetaDict) -> MapResult<()> {
        default_keyword(header, "detector", "XRT");
        observatory_from_telescop(header);
        Ok(())
    }

    fn nickname(&self, _meta: &NormalizedMetadata, _header: &MetaDict) -> String {
        "XRT".to_string()
    }

    /// Filter wheel positions joined with '-', open positions skipped
    fn measurement(&self, _meta: &NormalizedMetadata, header: &MetaDict) -> Option<String> {
        let filters: Vec<&str> = ["ec_fw1_", "ec_fw2_"]
            .iter()
            .filter_map(|key| header.get_str(key))
            .filter(|f| !f.is_empty() && !f.eq_ignore_ascii_case("open"))
            .collect();
        if filters.is_empty() {
            None
        } else {
            Some(filters.join("-"))
        }
    }

    fn plot_settings(&self, _meta: &NormalizedMetadata, _header: &MetaDict) -> PlotSettings {
        PlotSettings {
            cmap: "hinodexrt".to_string(),
            stretch: Stretch::Log,
            ..PlotSettings::default()
        }
    }
}

/// PROBA2 Sun Watcher using APS detectors
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapSource;

impl InstrumentSource for SwapSource {
    fn name(&self) -> &str {
        "swap"
    }

    fn matches(&self, header: &MetaDict) -> bool {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        header_matches(header, "instrume", cached_regex(&PATTERN, r"(?i)^SWAP$"))
    }

    fn fix_metadata(&self, header: &mut MetaDict) -> MapResult<()> {
        default_keyword(header, "detector", "SWAP");
        default_keyword(header, "waveunit", "angstrom");
        Ok(())
    }

    fn nickname(&self, _meta: &NormalizedMetadata, _header: &MetaDict) -> String {
        "SWAP".to_string()
    }

    fn plot_settings(&self, _meta: &NormalizedMetadata, _header: &MetaDict) -> PlotSettings {
        PlotSettings {
            cmap: "sdoaia171".to_string(),
            stretch: Stretch::Sqrt,
            ..PlotSettings::default()
        }
    }
}
