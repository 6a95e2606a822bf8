use noisegif::progress::{NoProgress, ProgressReporter};
use noisegif::synth::synthesize;
use noisegif::*;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};

struct Decoded {
    width: u16,
    height: u16,
    /// delay, rgba
    frames: Vec<(u16, Vec<u8>)>,
}

fn decode(path: &Path) -> Decoded {
    let mut opts = gif::DecodeOptions::new();
    opts.set_color_output(gif::ColorOutput::RGBA);
    let mut dec = opts.read_info(fs::File::open(path).unwrap()).unwrap();
    let (width, height) = (dec.width(), dec.height());
    let mut frames = Vec::new();
    while let Some(frame) = dec.read_next_frame().unwrap() {
        assert_eq!((frame.width, frame.height), (width, height));
        assert_eq!((frame.left, frame.top), (0, 0));
        frames.push((frame.delay, frame.buffer.to_vec()));
    }
    Decoded { width, height, frames }
}

fn assert_uniform_blocks(rgba: &[u8], width: usize, height: usize, block: usize) {
    for y in 0..height {
        for x in 0..width {
            let px = &rgba[(y * width + x) * 4..][..4];
            let origin = &rgba[((y / block * block) * width + x / block * block) * 4..][..4];
            assert_eq!(px, origin, "pixel {},{} differs from its block", x, y);
        }
    }
}

fn loops_forever(path: &Path) -> bool {
    fs::read(path).unwrap().windows(11).any(|w| w == b"NETSCAPE2.0")
}

fn spec_in(dir: &Path, name: &str) -> AnimationSpec {
    AnimationSpec {
        width: 64,
        height: 64,
        block_size: 8,
        frame_count: 20,
        policy: EncodingPolicy::Palette { frame_duration_ms: 100 },
        output_path: dir.join(name),
        fast: false,
    }
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir).unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn twenty_frames_of_8px_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec_in(dir.path(), "out.gif");
    let path = assemble(&spec, &BlockNoise, &mut NoProgress {}).unwrap();

    assert_eq!(path, dunce::canonicalize(dir.path()).unwrap().join("out.gif"));
    assert!(loops_forever(&path));
    let gif = decode(&path);
    assert_eq!((gif.width, gif.height), (64, 64));
    assert_eq!(gif.frames.len(), 20);
    for (delay, rgba) in &gif.frames {
        assert_eq!(*delay, 10);
        assert_eq!(rgba.len(), 64 * 64 * 4);
        assert_uniform_blocks(rgba, 64, 64, 8);
    }
    // frames are independently random
    assert!(gif.frames.iter().any(|(_, rgba)| rgba != &gif.frames[0].1));
    assert_eq!(dir_entries(dir.path()), vec!["out.gif"]);
}

#[test]
fn clipped_edge_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let spec = AnimationSpec {
        width: 10,
        height: 10,
        block_size: 3,
        frame_count: 2,
        ..spec_in(dir.path(), "edge.gif")
    };
    let gif = decode(&assemble(&spec, &BlockNoise, &mut NoProgress {}).unwrap());
    assert_eq!((gif.width, gif.height), (10, 10));
    assert_eq!(gif.frames.len(), 2);
    for (_, rgba) in &gif.frames {
        assert_uniform_blocks(rgba, 10, 10, 3);
    }
}

#[test]
fn per_pixel_noise() {
    let dir = tempfile::tempdir().unwrap();
    let spec = AnimationSpec {
        width: 33,
        height: 17,
        block_size: 1,
        frame_count: 3,
        policy: EncodingPolicy::Palette { frame_duration_ms: 40 },
        ..spec_in(dir.path(), "px.gif")
    };
    let gif = decode(&assemble(&spec, &BlockNoise, &mut NoProgress {}).unwrap());
    assert_eq!((gif.width, gif.height), (33, 17));
    assert!(gif.frames.iter().all(|(delay, _)| *delay == 4));
}

#[test]
fn quality_tiers() {
    let dir = tempfile::tempdir().unwrap();
    for &quality in &[QualityTier::High, QualityTier::Medium, QualityTier::Low] {
        let spec = AnimationSpec {
            width: 32,
            height: 24,
            block_size: 4,
            frame_count: 4,
            policy: EncodingPolicy::QualityTiered { frame_duration_secs: 0.2, quality },
            ..spec_in(dir.path(), &format!("{}.gif", quality))
        };
        let path = assemble(&spec, &BlockNoise, &mut NoProgress {}).unwrap();
        assert!(loops_forever(&path));
        let gif = decode(&path);
        assert_eq!((gif.width, gif.height), (32, 24));
        assert_eq!(gif.frames.len(), 4);
        for (delay, rgba) in &gif.frames {
            assert_eq!(*delay, 20);
            assert_uniform_blocks(rgba, 32, 24, 4);
        }
    }
    assert_eq!(dir_entries(dir.path()), vec!["high.gif", "low.gif", "medium.gif"]);
}

#[test]
fn same_spec_twice() {
    let dir = tempfile::tempdir().unwrap();
    let spec = AnimationSpec { frame_count: 5, ..spec_in(dir.path(), "again.gif") };
    let first = decode(&assemble(&spec, &BlockNoise, &mut NoProgress {}).unwrap());
    let second = decode(&assemble(&spec, &BlockNoise, &mut NoProgress {}).unwrap());
    assert_eq!((first.width, first.height, first.frames.len()), (second.width, second.height, second.frames.len()));
    assert_eq!(first.frames[0].0, second.frames[0].0);
}

#[test]
fn missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec_in(&dir.path().join("nope"), "out.gif");
    let err = assemble(&spec, &BlockNoise, &mut NoProgress {}).unwrap_err();
    assert!(matches!(err, Error::InvalidOutputPath(_)), "{}", err);
    assert!(dir_entries(dir.path()).is_empty());
}

#[test]
fn failed_frame_leaves_old_file_alone() {
    let dir = tempfile::tempdir().unwrap();
    let spec = spec_in(dir.path(), "keep.gif");
    fs::write(&spec.output_path, b"previous").unwrap();

    let calls = AtomicUsize::new(0);
    let flaky = |w: u32, h: u32, b: u32| -> CatResult<Frame> {
        if calls.fetch_add(1, SeqCst) == 7 {
            return Err(Error::InvalidBlockSize("injected".into()));
        }
        synthesize(w, h, b)
    };
    let err = assemble(&spec, &flaky, &mut NoProgress {}).unwrap_err();
    assert!(matches!(err, Error::InvalidBlockSize(_)), "{}", err);
    assert_eq!(fs::read(&spec.output_path).unwrap(), b"previous");
    assert_eq!(dir_entries(dir.path()), vec!["keep.gif"]);
}

#[test]
fn provider_that_produces_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let spec = AnimationSpec { frame_count: 3, ..spec_in(dir.path(), "none.gif") };
    let broken = |_: u32, _: u32, _: u32| -> CatResult<Frame> { panic!("no frames today") };
    let err = assemble(&spec, &broken, &mut NoProgress {}).unwrap_err();
    assert!(matches!(err, Error::NoFramesProduced), "{}", err);
    assert!(dir_entries(dir.path()).is_empty());
}

#[test]
fn wrong_frame_size() {
    let dir = tempfile::tempdir().unwrap();
    let spec = AnimationSpec { frame_count: 2, ..spec_in(dir.path(), "size.gif") };
    let off_by_one = |w: u32, h: u32, b: u32| synthesize(w + 1, h, b);
    let err = assemble(&spec, &off_by_one, &mut NoProgress {}).unwrap_err();
    assert!(matches!(err, Error::EncodeFailure(_)), "{}", err);
    assert!(dir_entries(dir.path()).is_empty());
}

#[derive(Default)]
struct Recorder {
    steps: Vec<(usize, usize)>,
    bytes: u64,
    done: Option<String>,
    errors: Vec<String>,
}

impl ProgressReporter for Recorder {
    fn increase(&mut self, completed: usize, total: usize) {
        self.steps.push((completed, total));
    }

    fn written_bytes(&mut self, bytes: u64) {
        self.bytes = bytes;
    }

    fn error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn done(&mut self, msg: &str) {
        self.done = Some(msg.to_owned());
    }
}

#[test]
fn progress_is_reported_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let spec = AnimationSpec { frame_count: 12, ..spec_in(dir.path(), "progress.gif") };
    let mut rec = Recorder::default();
    let path = assemble(&spec, &BlockNoise, &mut rec).unwrap();

    assert_eq!(rec.steps, (1..=12).map(|n| (n, 12)).collect::<Vec<_>>());
    assert_eq!(rec.bytes, fs::metadata(&path).unwrap().len());
    assert!(rec.done.unwrap().contains("progress.gif"));
    assert!(rec.errors.is_empty());
}

#[test]
fn errors_reach_the_reporter() {
    let dir = tempfile::tempdir().unwrap();
    let spec = AnimationSpec { width: 0, ..spec_in(dir.path(), "bad.gif") };
    let mut rec = Recorder::default();
    assert!(matches!(assemble(&spec, &BlockNoise, &mut rec), Err(Error::InvalidDimension(_))));
    assert!(rec.steps.is_empty());
    assert_eq!(rec.errors.len(), 1);
    assert!(rec.done.is_none());
}

#[test]
fn panicking_provider_stops_the_run_early() {
    let dir = tempfile::tempdir().unwrap();
    let spec = AnimationSpec { frame_count: 400, ..spec_in(dir.path(), "crash.gif") };
    let calls = AtomicUsize::new(0);
    let crashes_once = |w: u32, h: u32, b: u32| -> CatResult<Frame> {
        if calls.fetch_add(1, SeqCst) == 0 {
            panic!("first frame crashes");
        }
        synthesize(w, h, b)
    };
    let err = assemble(&spec, &crashes_once, &mut NoProgress {}).unwrap_err();
    assert!(matches!(err, Error::NoFramesProduced), "{}", err);
    let calls = calls.load(SeqCst);
    assert!(calls < 200, "kept going for {} frames after a worker crashed", calls);
    assert!(dir_entries(dir.path()).is_empty());
}
