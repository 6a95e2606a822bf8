/*
 noisegif block-noise GIF generator

 This program is free software: you can redistribute it and/or modify
 it under the terms of the GNU Affero General Public License as
 published by the Free Software Foundation, either version 3 of the
 License, or (at your option) any later version.

 This program is distributed in the hope that it will be useful,
 but WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 GNU Affero General Public License for more details.

 You should have received a copy of the GNU Affero General Public License
 along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

#[macro_use] extern crate quick_error;

use imagequant::*;
use imgref::*;
use rgb::*;

mod error;
pub use crate::error::*;
mod ordqueue;
use crate::ordqueue::*;
pub mod progress;
use crate::progress::*;
pub mod synth;
pub use crate::synth::{BlockNoise, Frame, FrameProvider};
pub mod background;
pub mod params;
mod encoderust;

use std::fmt;
use std::io::prelude::*;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst};
use std::thread;

/// Coarse trade-off between file size and color fidelity
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    /// Target quality for the quantizer, 0-100
    pub fn liq_quality(self) -> u8 {
        match self {
            Self::High => 100,
            Self::Medium => 50,
            Self::Low => 10,
        }
    }
}

impl Default for QualityTier {
    fn default() -> Self {
        Self::Medium
    }
}

impl FromStr for QualityTier {
    type Err = Error;

    fn from_str(s: &str) -> CatResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "h" => Ok(Self::High),
            "medium" | "m" => Ok(Self::Medium),
            "low" | "l" => Ok(Self::Low),
            other => Err(Error::InvalidParameterValue(format!("quality must be high, medium or low, not '{}'", other))),
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        })
    }
}

/// How frames are color-mapped and how long each one is shown
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum EncodingPolicy {
    /// NeuQuant palette per frame. Quality is whatever the palette manages to keep.
    Palette {
        frame_duration_ms: u32,
    },
    /// pngquant palette per frame, with the tier's quality target
    QualityTiered {
        /// Fractional seconds
        frame_duration_secs: f64,
        quality: QualityTier,
    },
}

impl EncodingPolicy {
    /// GIF frame delay, in 1/100ths of a second
    pub fn delay(&self) -> u16 {
        let centis = match *self {
            Self::Palette { frame_duration_ms } => f64::from(frame_duration_ms) / 10.,
            Self::QualityTiered { frame_duration_secs, .. } => frame_duration_secs * 100.,
        };
        centis.round().max(1.).min(f64::from(u16::MAX)) as u16
    }

    fn validate(&self) -> CatResult<()> {
        match *self {
            Self::Palette { frame_duration_ms: 0 } => {
                Err(Error::InvalidParameterValue("frame duration must be greater than 0ms".into()))
            },
            Self::QualityTiered { frame_duration_secs, .. } if !(frame_duration_secs > 0.) || !frame_duration_secs.is_finite() => {
                Err(Error::InvalidParameterValue(format!("frame duration must be a positive number of seconds, not {}", frame_duration_secs)))
            },
            _ => Ok(()),
        }
    }
}

impl Default for EncodingPolicy {
    fn default() -> Self {
        Self::Palette { frame_duration_ms: params::DEFAULT_DURATION_MS }
    }
}

/// Everything needed for one run
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationSpec {
    pub width: u32,
    pub height: u32,
    /// Edge of a single-color square, in pixels. 1 is plain per-pixel noise.
    pub block_size: u32,
    /// 1..
    pub frame_count: u32,
    pub policy: EncodingPolicy,
    /// Must end with `.gif`. An existing file is replaced.
    pub output_path: PathBuf,
    /// Lower quality, but faster encode
    pub fast: bool,
}

impl AnimationSpec {
    /// Checks all fields without touching any frames.
    ///
    /// Returns absolute path of the file that is going to be written.
    pub fn validate(&self) -> CatResult<PathBuf> {
        let max = u32::from(u16::MAX);
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidDimension(format!("{}×{} has no pixels", self.width, self.height)));
        }
        if self.width > max || self.height > max {
            return Err(Error::InvalidDimension(format!("{}×{} is larger than the GIF maximum of {}×{}", self.width, self.height, max, max)));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidBlockSize("blocks must be at least 1px wide".into()));
        }
        if self.frame_count == 0 {
            return Err(Error::InvalidParameterValue("at least one frame is needed".into()));
        }
        self.policy.validate()?;
        resolve_output_path(&self.output_path)
    }
}

fn resolve_output_path(path: &Path) -> CatResult<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(Error::InvalidOutputPath("no output file given".into()));
    }
    if !path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("gif")) {
        return Err(Error::InvalidOutputPath(format!("{} must have a .gif extension", path.display())));
    }
    let file_name = path.file_name()
        .ok_or_else(|| Error::InvalidOutputPath(format!("{} is not a file name", path.display())))?;
    let parent = path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let dir = dunce::canonicalize(parent)
        .map_err(|err| Error::InvalidOutputPath(format!("{}: {}", parent.display(), err)))?;
    if !dir.is_dir() {
        return Err(Error::InvalidOutputPath(format!("{} is not a directory", dir.display())));
    }
    let dest = dir.join(file_name);
    if dest.is_dir() {
        return Err(Error::InvalidOutputPath(format!("{} is a directory", dest.display())));
    }
    Ok(dest)
}

/// A frame after color mapping
struct GIFFrame {
    image: ImgVec<u8>,
    pal: Vec<RGB8>,
}

trait Encoder {
    fn write_frame(&mut self, frame: &GIFFrame, delay: u16) -> CatResult<()>;
    fn finish(&mut self) -> CatResult<()> {
        Ok(())
    }
}

/// Generate the whole animation and write it to `spec.output_path`.
///
/// Frames come from `provider`, exactly `spec.frame_count` of them, and are written in the order
/// they were requested. Synthesis runs on all CPUs; this function returns when the file is complete.
///
/// The file is first written under a temporary name in the same directory, and renamed into place
/// only when everything succeeded. On error nothing is left behind.
pub fn assemble(spec: &AnimationSpec, provider: &dyn FrameProvider, reporter: &mut dyn ProgressReporter) -> CatResult<PathBuf> {
    let res = assemble_inner(spec, provider, reporter);
    match &res {
        Ok(path) => reporter.done(&format!("Created {}", path.display())),
        Err(err) => reporter.error(err.to_string()),
    }
    res
}

fn assemble_inner(spec: &AnimationSpec, provider: &dyn FrameProvider, reporter: &mut dyn ProgressReporter) -> CatResult<PathBuf> {
    let dest = spec.validate()?;
    log::info!("generating {} frames of {}×{} (blocks of {}px) into {}",
        spec.frame_count, spec.width, spec.height, spec.block_size, dest.display());

    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".noisegif")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|err| Error::InvalidOutputPath(format!("can't create a file in {}: {}", dir.display(), err)))?;

    {
        let mut out = BufWriter::new(tmp.as_file_mut());
        Writer::new(spec).write(provider, &mut out, reporter)?;
        out.flush()?;
    }
    tmp.as_file().sync_all()?;
    if let Ok(meta) = tmp.as_file().metadata() {
        reporter.written_bytes(meta.len());
    }

    tmp.persist(&dest)
        .map_err(|err| Error::InvalidOutputPath(format!("{}: {}", dest.display(), err.error)))?;
    log::info!("wrote {}", dest.display());
    Ok(dest)
}

/// Raises the failure flag if a worker unwinds, so the remaining workers stop claiming frames
struct FailOnUnwind<'a>(&'a AtomicBool);

impl Drop for FailOnUnwind<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(true, SeqCst);
        }
    }
}

/// Synthesizes, color-maps and encodes frames
struct Writer<'a> {
    spec: &'a AnimationSpec,
}

impl<'a> Writer<'a> {
    fn new(spec: &'a AnimationSpec) -> Self {
        Self { spec }
    }

    fn write<W: Write>(self, provider: &dyn FrameProvider, writer: W, reporter: &mut dyn ProgressReporter) -> CatResult<()> {
        self.write_with_encoder(provider, &mut encoderust::RustEncoder::new(writer), reporter)
    }

    fn write_with_encoder(self, provider: &dyn FrameProvider, encoder: &mut dyn Encoder, reporter: &mut dyn ProgressReporter) -> CatResult<()> {
        let spec = self.spec;
        let threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
            .min(spec.frame_count as usize)
            .max(1);
        let (queue, queue_iter) = ordqueue::new(threads * 2);
        let next_index = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);

        thread::scope(|s| {
            let mut handles = Vec::with_capacity(threads);
            for n in 0..threads {
                let queue = queue.clone();
                let next_index = &next_index;
                let failed = &failed;
                let handle = thread::Builder::new().name(format!("synth{}", n)).spawn_scoped(s, move || {
                    Self::make_frames(queue, provider, spec, next_index, failed)
                }).map_err(|err| Error::EncodeFailure(format!("can't start a worker thread: {}", err)))?;
                handles.push(handle);
            }
            drop(queue); // only workers may keep the queue open

            let res = Self::write_frames(queue_iter, encoder, spec, reporter);
            if res.is_err() {
                failed.store(true, SeqCst);
            }

            let joined = handles.into_iter().try_for_each(|h| {
                h.join().map_err(|_| Error::EncodeFailure("frame synthesis thread crashed".into()))
            });
            res.and(joined)
        })
    }

    /// Worker loop. Takes the next unclaimed frame index until all are done or something failed.
    fn make_frames(queue: OrdQueue<CatResult<GIFFrame>>, provider: &dyn FrameProvider, spec: &AnimationSpec, next_index: &AtomicUsize, failed: &AtomicBool) {
        let total = spec.frame_count as usize;
        let _stop_others_on_panic = FailOnUnwind(failed);
        let mut made = 0;
        while !failed.load(SeqCst) {
            let i = next_index.fetch_add(1, SeqCst);
            if i >= total {
                break;
            }
            let res = provider.synthesize(spec.width, spec.height, spec.block_size)
                .and_then(|frame| Self::remap(frame, spec));
            let is_err = res.is_err();
            if is_err {
                failed.store(true, SeqCst);
            }
            // every claimed index must be pushed, or the writer would wait for it
            if queue.push(i, res).is_err() || is_err {
                break;
            }
            made += 1;
        }
        log::debug!("{} made {} frames", thread::current().name().unwrap_or("worker"), made);
    }

    fn remap(frame: Frame, spec: &AnimationSpec) -> CatResult<GIFFrame> {
        if frame.width() != spec.width as usize || frame.height() != spec.height as usize {
            return Err(Error::EncodeFailure(format!("frame has wrong size ({}×{}, expected {}×{})",
                frame.width(), frame.height(), spec.width, spec.height)));
        }
        match spec.policy {
            EncodingPolicy::Palette { .. } => Ok(Self::neuquant(frame, spec.fast)),
            EncodingPolicy::QualityTiered { quality, .. } => Self::quantize(frame, quality, spec.fast),
        }
    }

    /// The `gif` crate's own quantizer
    fn neuquant(frame: Frame, fast: bool) -> GIFFrame {
        let (width, height) = (frame.width(), frame.height());
        let speed = if fast { 30 } else { 10 };
        let (buf, _, _) = frame.as_ref().to_contiguous_buf();
        let gif_frame = gif::Frame::from_rgb_speed(width as u16, height as u16, buf.as_bytes(), speed);
        let pal = gif_frame.palette.unwrap_or_default();
        GIFFrame {
            image: ImgVec::new(gif_frame.buffer.into_owned(), width, height),
            pal: pal.as_rgb().to_vec(),
        }
    }

    /// pngquant, aiming for the tier's quality
    fn quantize(frame: Frame, quality: QualityTier, fast: bool) -> CatResult<GIFFrame> {
        let (width, height) = (frame.width(), frame.height());
        let rgba: Vec<RGBA8> = frame.as_ref().pixels().map(|px| px.alpha(255)).collect();

        let mut liq = Attributes::new();
        if fast {
            liq.set_speed(10);
        }
        liq.set_quality(0, quality.liq_quality().into());
        let mut img = liq.new_image(&rgba[..], width, height, 0.)?;
        let mut res = liq.quantize(&img)?;
        // dithering would speckle the blocks
        res.set_dithering_level(0.);

        let (pal, pal_img) = res.remapped(&mut img)?;
        debug_assert_eq!(width * height, pal_img.len());

        Ok(GIFFrame {
            image: Img::new(pal_img, width, height),
            pal: pal.iter().map(|p| p.rgb()).collect(),
        })
    }

    fn write_frames(frames: OrdQueueIter<CatResult<GIFFrame>>, enc: &mut dyn Encoder, spec: &AnimationSpec, reporter: &mut dyn ProgressReporter) -> CatResult<()> {
        let total = spec.frame_count as usize;
        let delay = spec.policy.delay();

        let mut n_done = 0;
        for frame in frames {
            enc.write_frame(&frame?, delay)?;
            n_done += 1;
            reporter.increase(n_done, total);
        }

        if n_done == 0 {
            return Err(Error::NoFramesProduced);
        }
        if n_done != total {
            return Err(Error::EncodeFailure(format!("only {} of {} frames were made", n_done, total)));
        }
        enc.finish()
    }
}

#[cfg(test)]
fn test_spec(dir: &Path) -> AnimationSpec {
    AnimationSpec {
        width: 16,
        height: 8,
        block_size: 4,
        frame_count: 3,
        policy: EncodingPolicy::Palette { frame_duration_ms: 100 },
        output_path: dir.join("t.gif"),
        fast: true,
    }
}

#[test]
fn delays() {
    assert_eq!(EncodingPolicy::Palette { frame_duration_ms: 100 }.delay(), 10);
    assert_eq!(EncodingPolicy::Palette { frame_duration_ms: 15 }.delay(), 2);
    assert_eq!(EncodingPolicy::Palette { frame_duration_ms: 1 }.delay(), 1);
    assert_eq!(EncodingPolicy::Palette { frame_duration_ms: u32::MAX }.delay(), u16::MAX);
    assert_eq!(EncodingPolicy::QualityTiered { frame_duration_secs: 0.25, quality: QualityTier::Low }.delay(), 25);
    assert_eq!(EncodingPolicy::QualityTiered { frame_duration_secs: 2., quality: QualityTier::High }.delay(), 200);
}

#[test]
fn tiers_keep_their_order() {
    assert!(QualityTier::High.liq_quality() > QualityTier::Medium.liq_quality());
    assert!(QualityTier::Medium.liq_quality() > QualityTier::Low.liq_quality());
    assert_eq!(QualityTier::High.liq_quality(), 100);
    assert_eq!(QualityTier::Medium.liq_quality(), 50);
    assert_eq!(QualityTier::Low.liq_quality(), 10);
    assert_eq!("HIGH".parse::<QualityTier>().unwrap(), QualityTier::High);
    assert_eq!(" m ".parse::<QualityTier>().unwrap(), QualityTier::Medium);
    assert!(matches!("best".parse::<QualityTier>(), Err(Error::InvalidParameterValue(_))));
}

#[test]
fn validation() {
    let dir = tempfile::tempdir().unwrap();
    let ok = test_spec(dir.path());
    assert_eq!(ok.validate().unwrap().file_name().unwrap(), "t.gif");

    let check = |f: &dyn Fn(&mut AnimationSpec)| {
        let mut spec = ok.clone();
        f(&mut spec);
        spec.validate().unwrap_err()
    };
    assert!(matches!(check(&|s| s.width = 0), Error::InvalidDimension(_)));
    assert!(matches!(check(&|s| s.height = 70000), Error::InvalidDimension(_)));
    assert!(matches!(check(&|s| s.block_size = 0), Error::InvalidBlockSize(_)));
    assert!(matches!(check(&|s| s.frame_count = 0), Error::InvalidParameterValue(_)));
    assert!(matches!(check(&|s| s.policy = EncodingPolicy::Palette { frame_duration_ms: 0 }), Error::InvalidParameterValue(_)));
    assert!(matches!(check(&|s| s.policy = EncodingPolicy::QualityTiered { frame_duration_secs: f64::NAN, quality: QualityTier::High }), Error::InvalidParameterValue(_)));
    assert!(matches!(check(&|s| s.policy = EncodingPolicy::QualityTiered { frame_duration_secs: -1., quality: QualityTier::High }), Error::InvalidParameterValue(_)));
    assert!(matches!(check(&|s| s.output_path = PathBuf::new()), Error::InvalidOutputPath(_)));
    assert!(matches!(check(&|s| s.output_path = s.output_path.with_extension("png")), Error::InvalidOutputPath(_)));
    assert!(matches!(check(&|s| s.output_path = s.output_path.parent().unwrap().join("nope/t.gif")), Error::InvalidOutputPath(_)));
}

#[test]
fn existing_directory_is_not_a_destination() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("taken.gif")).unwrap();
    let mut spec = test_spec(dir.path());
    spec.output_path = dir.path().join("taken.gif");
    assert!(matches!(spec.validate(), Err(Error::InvalidOutputPath(_))));
}

#[test]
fn uppercase_extension_is_fine() {
    let dir = tempfile::tempdir().unwrap();
    let mut spec = test_spec(dir.path());
    spec.output_path = dir.path().join("LOUD.GIF");
    assert!(spec.validate().is_ok());
}

#[test]
fn quantized_blocks_stay_uniform() {
    let frame = synth::synthesize(16, 16, 4).unwrap();
    let gif_frame = Writer::quantize(frame.clone(), QualityTier::High, true).unwrap();
    assert_eq!((gif_frame.image.width(), gif_frame.image.height()), (16, 16));

    let indices = gif_frame.image.buf();
    for y in 0..16 {
        for x in 0..16 {
            assert_eq!(indices[y * 16 + x], indices[(y / 4 * 4) * 16 + x / 4 * 4]);
        }
    }
    // 16 colors fit in the palette without merging
    for (px, idx) in frame.as_ref().pixels().zip(indices.iter().copied()) {
        let mapped = gif_frame.pal[idx as usize];
        assert!((i16::from(px.r) - i16::from(mapped.r)).abs() <= 2);
        assert!((i16::from(px.g) - i16::from(mapped.g)).abs() <= 2);
        assert!((i16::from(px.b) - i16::from(mapped.b)).abs() <= 2);
    }
}

#[test]
fn neuquant_keeps_size() {
    let frame = synth::synthesize(9, 7, 2).unwrap();
    let gif_frame = Writer::neuquant(frame, false);
    assert_eq!((gif_frame.image.width(), gif_frame.image.height()), (9, 7));
    assert!(!gif_frame.pal.is_empty() && gif_frame.pal.len() <= 256);
    assert!(gif_frame.image.buf().iter().all(|&i| (i as usize) < gif_frame.pal.len()));
}
