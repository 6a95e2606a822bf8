//! Turning user input into numbers for `AnimationSpec`
//!
//! Everything here fails with `Error::InvalidParameterValue` and a message that can be shown
//! to the user as-is.

use crate::error::*;
use crate::{EncodingPolicy, QualityTier};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Common screen sizes, landscape and portrait
pub const RESOLUTION_PRESETS: [(u32, u32); 6] = [
    (1920, 1080), (1080, 1920),
    (2560, 1440), (1440, 2560),
    (3840, 2160), (2160, 3840),
];

pub const DEFAULT_RESOLUTION: (u32, u32) = RESOLUTION_PRESETS[0];
pub const DEFAULT_BLOCK_SIZE: u32 = 10;
pub const DEFAULT_FRAME_COUNT: u32 = 30;
pub const DEFAULT_DURATION_MS: u32 = 100;
pub const DEFAULT_FILE_STEM: &str = "GIFHD";
pub const DEFAULT_DURATION_SECS: f64 = 0.1;

/// A whole number greater than zero
pub fn parse_positive<T>(name: &str, text: &str) -> CatResult<T>
    where T: FromStr + PartialOrd + Default + Display
{
    let text = text.trim();
    let value: T = text.parse()
        .map_err(|_| Error::InvalidParameterValue(format!("{} must be a whole number, not '{}'", name, text)))?;
    if value <= T::default() {
        return Err(Error::InvalidParameterValue(format!("{} must be greater than 0, not {}", name, value)));
    }
    Ok(value)
}

/// Fractional, finite and greater than zero
pub fn parse_seconds(name: &str, text: &str) -> CatResult<f64> {
    let text = text.trim();
    let value: f64 = text.parse()
        .map_err(|_| Error::InvalidParameterValue(format!("{} must be a number of seconds, not '{}'", name, text)))?;
    if !value.is_finite() || value <= 0. {
        return Err(Error::InvalidParameterValue(format!("{} must be greater than 0 seconds, not {}", name, value)));
    }
    Ok(value)
}

/// `1920x1080`. The separator can also be `X` or `×`.
pub fn parse_resolution(text: &str) -> CatResult<(u32, u32)> {
    let text = text.trim();
    let (w, h) = text.split_once(|c| c == 'x' || c == 'X' || c == '×')
        .ok_or_else(|| Error::InvalidParameterValue(format!("resolution must look like 1920x1080, not '{}'", text)))?;
    Ok((parse_positive("width", w)?, parse_positive("height", h)?))
}

/// Picks the encoding mode from the user's choices.
///
/// Without `quality` the duration is in milliseconds. With it, the duration is given as `seconds`,
/// and a millisecond duration is rejected rather than ignored.
pub fn encoding_policy(duration_ms: Option<&str>, quality: Option<&str>, seconds: Option<&str>) -> CatResult<EncodingPolicy> {
    match (quality, duration_ms) {
        (Some(_), Some(_)) => {
            Err(Error::InvalidParameterValue("with a quality setting the frame duration is given in seconds, not milliseconds".into()))
        },
        (Some(quality), None) => Ok(EncodingPolicy::QualityTiered {
            frame_duration_secs: seconds.map_or(Ok(DEFAULT_DURATION_SECS), |s| parse_seconds("seconds", s))?,
            quality: quality.parse::<QualityTier>()?,
        }),
        (None, _) if seconds.is_some() => {
            Err(Error::InvalidParameterValue("a duration in seconds needs a quality setting".into()))
        },
        (None, duration_ms) => Ok(EncodingPolicy::Palette {
            frame_duration_ms: duration_ms.map_or(Ok(DEFAULT_DURATION_MS), |d| parse_positive("duration", d))?,
        }),
    }
}

/// `folder/stem.gif`
pub fn output_path_in(folder: &Path, stem: &str) -> CatResult<PathBuf> {
    let stem = stem.trim();
    if stem.is_empty() {
        return Err(Error::InvalidParameterValue("file name can't be empty".into()));
    }
    if stem.contains(|c| c == '/' || c == '\\') {
        return Err(Error::InvalidParameterValue(format!("file name '{}' can't contain a path separator", stem)));
    }
    Ok(folder.join(format!("{}.gif", stem)))
}

#[test]
fn positive_numbers() {
    assert_eq!(parse_positive::<u32>("frames", " 30 ").unwrap(), 30);
    assert!(matches!(parse_positive::<u32>("frames", "0"), Err(Error::InvalidParameterValue(_))));
    assert!(matches!(parse_positive::<u32>("frames", "-3"), Err(Error::InvalidParameterValue(_))));
    assert!(matches!(parse_positive::<u32>("frames", "lots"), Err(Error::InvalidParameterValue(_))));
    assert!(matches!(parse_positive::<u32>("frames", ""), Err(Error::InvalidParameterValue(_))));
    assert!(matches!(parse_positive::<i32>("frames", "-3"), Err(Error::InvalidParameterValue(_))));
}

#[test]
fn seconds() {
    assert_eq!(parse_seconds("duration", "0.25").unwrap(), 0.25);
    assert_eq!(parse_seconds("duration", "2").unwrap(), 2.);
    for bad in &["0", "-1", "inf", "NaN", "soon"] {
        assert!(parse_seconds("duration", bad).is_err(), "{}", bad);
    }
}

#[test]
fn resolutions() {
    assert_eq!(parse_resolution("1920x1080").unwrap(), (1920, 1080));
    assert_eq!(parse_resolution(" 64X48 ").unwrap(), (64, 48));
    assert_eq!(parse_resolution("10×10").unwrap(), (10, 10));
    assert!(parse_resolution("1920").is_err());
    assert!(parse_resolution("0x10").is_err());
    assert!(parse_resolution("axb").is_err());
    assert!(RESOLUTION_PRESETS.contains(&DEFAULT_RESOLUTION));
}

#[test]
fn output_paths() {
    assert_eq!(output_path_in(Path::new("out"), " GIFHD ").unwrap(), Path::new("out/GIFHD.gif"));
    assert!(output_path_in(Path::new("out"), "  ").is_err());
    assert!(output_path_in(Path::new("out"), "a/b").is_err());
}

#[test]
fn policies() {
    assert_eq!(encoding_policy(None, None, None).unwrap(), EncodingPolicy::Palette { frame_duration_ms: DEFAULT_DURATION_MS });
    assert_eq!(encoding_policy(Some("40"), None, None).unwrap(), EncodingPolicy::Palette { frame_duration_ms: 40 });
    assert_eq!(encoding_policy(None, Some("low"), Some("0.5")).unwrap(),
        EncodingPolicy::QualityTiered { frame_duration_secs: 0.5, quality: QualityTier::Low });
    assert_eq!(encoding_policy(None, Some("HIGH"), None).unwrap(),
        EncodingPolicy::QualityTiered { frame_duration_secs: DEFAULT_DURATION_SECS, quality: QualityTier::High });

    assert!(matches!(encoding_policy(Some("50"), Some("high"), None), Err(Error::InvalidParameterValue(_))));
    assert!(matches!(encoding_policy(None, None, Some("1")), Err(Error::InvalidParameterValue(_))));
    assert!(matches!(encoding_policy(Some("0"), None, None), Err(Error::InvalidParameterValue(_))));
    assert!(matches!(encoding_policy(None, Some("best"), None), Err(Error::InvalidParameterValue(_))));
}
