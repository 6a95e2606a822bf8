//! Running a generation off the caller's thread
//!
//! ```no_run
//! # fn main() -> noisegif::CatResult<()> {
//! # let spec: noisegif::AnimationSpec = unimplemented!();
//! let generation = noisegif::background::spawn(spec)?;
//! for event in generation.events() {
//!     match event {
//!         noisegif::background::Event::Progress { completed, total } => println!("{}/{}", completed, total),
//!         noisegif::background::Event::Finished(res) => { res?; break; },
//!     }
//! }
//! # Ok(()) }
//! ```

use crate::error::*;
use crate::progress::ProgressReporter;
use crate::{AnimationSpec, BlockNoise};
use crossbeam_channel::{Receiver, Sender};
use std::path::PathBuf;
use std::thread;

/// What the generation thread tells the host
#[derive(Debug)]
pub enum Event {
    /// Frame `completed` of `total` is done
    Progress { completed: usize, total: usize },
    /// Always the last event. The path of the written file, or why there isn't one.
    Finished(CatResult<PathBuf>),
}

/// A generation running on its own thread
pub struct Generation {
    events: Receiver<Event>,
    handle: Option<thread::JoinHandle<()>>,
}

/// Forwards progress into a channel. Never blocks; a closed channel is ignored.
struct ChannelProgress {
    sender: Sender<Event>,
}

impl ProgressReporter for ChannelProgress {
    fn increase(&mut self, completed: usize, total: usize) {
        let _ = self.sender.try_send(Event::Progress { completed, total });
    }

    fn error(&mut self, message: String) {
        log::debug!("generation failed: {}", message);
    }
}

/// Validate `spec` and start generating random block noise on a new thread.
///
/// Invalid settings are reported here, before the thread is started.
pub fn spawn(spec: AnimationSpec) -> CatResult<Generation> {
    spec.validate()?;

    let (sender, events) = crossbeam_channel::unbounded();
    let handle = thread::Builder::new().name("noisegif".into()).spawn(move || {
        let mut progress = ChannelProgress { sender };
        let res = crate::assemble(&spec, &BlockNoise, &mut progress);
        let _ = progress.sender.send(Event::Finished(res));
    }).map_err(|err| Error::EncodeFailure(format!("can't start the generator thread: {}", err)))?;

    Ok(Generation {
        events,
        handle: Some(handle),
    })
}

impl Generation {
    /// Poll this from the host's own loop, e.g. with `try_recv()`.
    ///
    /// The channel disconnects after `Event::Finished`.
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    /// Block until the run is over, ignoring progress
    pub fn wait(mut self) -> CatResult<PathBuf> {
        let res = self.events.iter()
            .find_map(|ev| match ev {
                Event::Finished(res) => Some(res),
                Event::Progress { .. } => None,
            });
        let crashed = self.handle.take().map_or(false, |h| h.join().is_err());
        match res {
            Some(res) => res,
            None if crashed => Err(Error::EncodeFailure("generator thread crashed".into())),
            None => Err(Error::EncodeFailure("generator thread exited without a result".into())),
        }
    }
}

#[test]
fn runs_in_background() {
    let dir = tempfile::tempdir().unwrap();
    let spec = AnimationSpec {
        width: 12,
        height: 12,
        block_size: 3,
        frame_count: 5,
        policy: crate::EncodingPolicy::Palette { frame_duration_ms: 50 },
        output_path: dir.path().join("bg.gif"),
        fast: true,
    };
    let generation = spawn(spec).unwrap();

    let mut progress = Vec::new();
    let res = loop {
        match generation.events().recv().unwrap() {
            Event::Progress { completed, total } => {
                assert_eq!(total, 5);
                progress.push(completed);
            },
            Event::Finished(res) => break res,
        }
    };
    let path = res.unwrap();
    assert!(path.exists());
    assert_eq!(progress, vec![1, 2, 3, 4, 5]);
    assert!(generation.events().recv().is_err());
}

#[test]
fn invalid_spec_fails_before_starting() {
    let dir = tempfile::tempdir().unwrap();
    let spec = AnimationSpec {
        width: 0,
        height: 12,
        block_size: 3,
        frame_count: 5,
        policy: crate::EncodingPolicy::Palette { frame_duration_ms: 50 },
        output_path: dir.path().join("bg.gif"),
        fast: true,
    };
    assert!(matches!(spawn(spec), Err(Error::InvalidDimension(_))));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn wait_returns_path() {
    let dir = tempfile::tempdir().unwrap();
    let spec = AnimationSpec {
        width: 4,
        height: 4,
        block_size: 1,
        frame_count: 2,
        policy: crate::EncodingPolicy::QualityTiered { frame_duration_secs: 0.5, quality: crate::QualityTier::Low },
        output_path: dir.path().join("wait.gif"),
        fast: false,
    };
    let path = spawn(spec).unwrap().wait().unwrap();
    assert_eq!(path.file_name().unwrap(), "wait.gif");
    assert!(std::fs::metadata(&path).unwrap().len() > 0);
}

#[test]
fn errors_are_delivered_only_as_finished() {
    let (sender, events) = crossbeam_channel::unbounded();
    let mut progress = ChannelProgress { sender };
    progress.increase(1, 2);
    progress.error("nope".into());
    drop(progress);
    let all: Vec<_> = events.iter().collect();
    assert_eq!(all.len(), 1);
    assert!(matches!(all[0], Event::Progress { completed: 1, total: 2 }));
}
