use std::io;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        InvalidDimension(msg: String) {
            display("Invalid frame size: {}", msg)
        }
        InvalidBlockSize(msg: String) {
            display("Invalid block size: {}", msg)
        }
        InvalidParameterValue(msg: String) {
            display("Invalid value: {}", msg)
        }
        NoFramesProduced {
            display("No usable frames were produced")
        }
        EncodeFailure(msg: String) {
            display("Can't encode the animation: {}", msg)
        }
        InvalidOutputPath(msg: String) {
            display("Can't write to the destination: {}", msg)
        }
    }
}

pub type CatResult<T, E = Error> = Result<T, E>;

impl From<gif::EncodingError> for Error {
    #[cold]
    fn from(err: gif::EncodingError) -> Self {
        Self::EncodeFailure(format!("GIF writer: {}", err))
    }
}

impl From<imagequant::liq_error> for Error {
    #[cold]
    fn from(err: imagequant::liq_error) -> Self {
        Self::EncodeFailure(format!("pngquant error: {}", err))
    }
}

impl From<io::Error> for Error {
    #[cold]
    fn from(err: io::Error) -> Self {
        Self::EncodeFailure(format!("I/O: {}", err))
    }
}

