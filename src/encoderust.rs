use crate::error::CatResult;
use crate::Encoder;
use crate::GIFFrame;
use rgb::*;
use std::borrow::Cow;
use std::io::Write;

/// Writes frames with the `gif` crate's LZW encoder
pub(crate) struct RustEncoder<W: Write> {
    writer: Option<W>,
    gif_enc: Option<gif::Encoder<W>>,
}

impl<W: Write> RustEncoder<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
            gif_enc: None,
        }
    }
}

impl<W: Write> Encoder for RustEncoder<W> {
    fn write_frame(&mut self, f: &GIFFrame, delay: u16) -> CatResult<()> {
        let GIFFrame {ref pal, ref image} = *f;

        let writer = &mut self.writer;
        let enc = match self.gif_enc {
            None => {
                let w = writer.take().expect("writer");
                let mut enc = gif::Encoder::new(w, image.width() as u16, image.height() as u16, &[])?;
                enc.write_extension(gif::ExtensionData::Repetitions(gif::Repeat::Infinite))?;
                self.gif_enc.get_or_insert(enc)
            },
            Some(ref mut enc) => enc,
        };

        enc.write_frame(&gif::Frame {
            delay,
            dispose: gif::DisposalMethod::Keep,
            transparent: None,
            needs_user_input: false,
            top: 0,
            left: 0,
            width: image.width() as u16,
            height: image.height() as u16,
            interlaced: false,
            palette: Some(pal.as_bytes().to_vec()),
            buffer: Cow::Borrowed(image.buf()),
        })?;
        Ok(())
    }

    fn finish(&mut self) -> CatResult<()> {
        // the trailer is written when the encoder is dropped
        self.gif_enc.take();
        Ok(())
    }
}

#[test]
fn writes_looping_gif() {
    use imgref::ImgVec;

    let frame = GIFFrame {
        image: ImgVec::new(vec![0, 1, 1, 0], 2, 2),
        pal: vec![RGB8::new(0, 0, 0), RGB8::new(255, 255, 255)],
    };
    let mut out = Vec::new();
    {
        let mut enc = RustEncoder::new(&mut out);
        enc.write_frame(&frame, 7).unwrap();
        enc.write_frame(&frame, 7).unwrap();
        enc.finish().unwrap();
    }
    assert!(out.starts_with(b"GIF89a"));
    assert!(out.windows(11).any(|w| w == b"NETSCAPE2.0"));
    assert_eq!(out.last(), Some(&0x3B));

    let mut opts = gif::DecodeOptions::new();
    opts.set_color_output(gif::ColorOutput::RGBA);
    let mut dec = opts.read_info(&out[..]).unwrap();
    let mut frames = 0;
    while let Some(f) = dec.read_next_frame().unwrap() {
        assert_eq!(f.delay, 7);
        assert_eq!(&f.buffer[..8], &[0, 0, 0, 255, 255, 255, 255, 255]);
        frames += 1;
    }
    assert_eq!(frames, 2);
}
