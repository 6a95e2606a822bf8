//! Random block-noise frames

use crate::error::*;
use imgref::*;
use rand::Rng;
use rgb::*;

/// One frame of the animation, `width × height` RGB pixels
pub type Frame = ImgVec<RGB8>;

/// Makes a frame of random noise using the current thread's generator.
///
/// Every `block_size × block_size` square gets one random color. Blocks on
/// the right and bottom edges are cut off where the frame ends.
pub fn synthesize(width: u32, height: u32, block_size: u32) -> CatResult<Frame> {
    synthesize_with_rng(&mut rand::thread_rng(), width, height, block_size)
}

/// Same as `synthesize`, but draws colors from the given generator.
pub fn synthesize_with_rng<R: Rng + ?Sized>(rng: &mut R, width: u32, height: u32, block_size: u32) -> CatResult<Frame> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimension(format!("{}×{} has no pixels", width, height)));
    }
    if block_size == 0 {
        return Err(Error::InvalidBlockSize("blocks must be at least 1px wide".into()));
    }
    let width = width as usize;
    let height = height as usize;
    let block = block_size as usize;
    let area = width.checked_mul(height)
        .ok_or_else(|| Error::InvalidDimension(format!("{}×{} is too large", width, height)))?;

    let cols = (width + block - 1) / block;
    let rows = (height + block - 1) / block;
    let cells: Vec<RGB8> = (0..cols * rows)
        .map(|_| RGB8::new(rng.gen(), rng.gen(), rng.gen()))
        .collect();

    let mut pixels = Vec::with_capacity(area);
    for y in 0..height {
        let cell_row = &cells[(y / block) * cols..][..cols];
        pixels.extend((0..width).map(|x| cell_row[x / block]));
    }
    debug_assert_eq!(pixels.len(), area);
    Ok(ImgVec::new(pixels, width, height))
}

/// Where the frames of an animation come from.
///
/// Called from several worker threads at once, once per frame.
pub trait FrameProvider: Sync {
    fn synthesize(&self, width: u32, height: u32, block_size: u32) -> CatResult<Frame>;
}

/// The default provider: independent random noise for every frame
#[derive(Debug, Copy, Clone, Default)]
pub struct BlockNoise;

impl FrameProvider for BlockNoise {
    fn synthesize(&self, width: u32, height: u32, block_size: u32) -> CatResult<Frame> {
        synthesize(width, height, block_size)
    }
}

impl<F> FrameProvider for F where F: Fn(u32, u32, u32) -> CatResult<Frame> + Sync {
    fn synthesize(&self, width: u32, height: u32, block_size: u32) -> CatResult<Frame> {
        self(width, height, block_size)
    }
}

#[cfg(test)]
fn assert_uniform_blocks(frame: &Frame, block: usize) {
    for y in 0..frame.height() {
        for x in 0..frame.width() {
            let px = frame.buf()[y * frame.stride() + x];
            let origin = frame.buf()[(y / block * block) * frame.stride() + x / block * block];
            assert_eq!(px, origin, "pixel {},{} differs from its block", x, y);
        }
    }
}

#[test]
fn frame_has_requested_size() {
    let frame = synthesize(37, 21, 1).unwrap();
    assert_eq!((frame.width(), frame.height()), (37, 21));
    assert_eq!(frame.buf().len(), 37 * 21);
}

#[test]
fn blocks_are_uniform() {
    let frame = synthesize(64, 64, 8).unwrap();
    assert_uniform_blocks(&frame, 8);

    // 64 cells of 24 random bits each; all of them matching is not going to happen
    let first = frame.buf()[0];
    assert!(frame.buf().iter().any(|&px| px != first));
}

#[test]
fn edge_blocks_are_clipped() {
    let frame = synthesize(10, 10, 3).unwrap();
    assert_eq!((frame.width(), frame.height()), (10, 10));
    assert_uniform_blocks(&frame, 3);

    // the last column of cells is 1px wide and starts at x=9
    for y in 0..10 {
        let row = &frame.buf()[y * 10..][..10];
        assert_eq!(row[6], row[8]);
    }
}

#[test]
fn block_larger_than_frame() {
    let frame = synthesize(5, 3, 100).unwrap();
    let first = frame.buf()[0];
    assert!(frame.buf().iter().all(|&px| px == first));
}

#[test]
fn seeded_generator_is_repeatable() {
    use rand::SeedableRng;
    let a = synthesize_with_rng(&mut rand::rngs::StdRng::seed_from_u64(7), 16, 9, 2).unwrap();
    let b = synthesize_with_rng(&mut rand::rngs::StdRng::seed_from_u64(7), 16, 9, 2).unwrap();
    assert_eq!(a.buf(), b.buf());
}

#[test]
fn zero_sizes_are_rejected() {
    assert!(matches!(synthesize(0, 10, 1), Err(Error::InvalidDimension(_))));
    assert!(matches!(synthesize(10, 0, 1), Err(Error::InvalidDimension(_))));
    assert!(matches!(synthesize(10, 10, 0), Err(Error::InvalidBlockSize(_))));
}

#[test]
fn closures_are_providers() {
    let provider = |w: u32, h: u32, _: u32| -> CatResult<Frame> {
        Ok(ImgVec::new(vec![RGB8::new(1, 2, 3); (w * h) as usize], w as usize, h as usize))
    };
    let frame = FrameProvider::synthesize(&provider, 2, 2, 1).unwrap();
    assert_eq!(frame.buf()[3], RGB8::new(1, 2, 3));
}
