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

#[macro_use] extern crate clap;

use clap::{App, AppSettings, Arg};
use noisegif::background::Event;
use noisegif::params::{self, parse_positive, parse_resolution};
use noisegif::AnimationSpec;

use std::path::{Path, PathBuf};
use std::time::Duration;

type BinResult<T, E = Box<dyn std::error::Error + Send + Sync>> = Result<T, E>;

fn main() {
    env_logger::init();
    if let Err(e) = bin_main() {
        eprintln!("error: {}", e);
        if let Some(e) = e.source() {
            eprintln!("error: {}", e);
        }
        std::process::exit(1);
    }
}

fn bin_main() -> BinResult<()> {
    let resolution_help = format!("Frame size, e.g. {}", params::RESOLUTION_PRESETS.iter()
        .map(|(w, h)| format!("{}x{}", w, h))
        .collect::<Vec<_>>()
        .join(", "));
    let default_resolution = format!("{}x{}", params::DEFAULT_RESOLUTION.0, params::DEFAULT_RESOLUTION.1);
    let default_block_size = params::DEFAULT_BLOCK_SIZE.to_string();
    let default_frames = params::DEFAULT_FRAME_COUNT.to_string();
    let default_duration = params::DEFAULT_DURATION_MS.to_string();

    let matches = App::new(crate_name!())
                        .version(crate_version!())
                        .about("Animated GIFs of random colored blocks")
                        .setting(AppSettings::UnifiedHelpMessage)
                        .setting(AppSettings::DeriveDisplayOrder)
                        .arg(Arg::with_name("output")
                            .long("output")
                            .short("o")
                            .help("Destination file to write to. If it's a directory, the file is called GIFHD.gif")
                            .empty_values(false)
                            .takes_value(true)
                            .value_name("a.gif")
                            .default_value("."))
                        .arg(Arg::with_name("resolution")
                            .long("resolution")
                            .short("r")
                            .help(&resolution_help)
                            .takes_value(true)
                            .value_name("WxH")
                            .conflicts_with_all(&["width", "height"]))
                        .arg(Arg::with_name("width")
                            .long("width")
                            .short("W")
                            .takes_value(true)
                            .value_name("px")
                            .requires("height")
                            .help("Frame width"))
                        .arg(Arg::with_name("height")
                            .long("height")
                            .short("H")
                            .takes_value(true)
                            .value_name("px")
                            .requires("width")
                            .help("Frame height"))
                        .arg(Arg::with_name("block-size")
                            .long("block-size")
                            .short("b")
                            .takes_value(true)
                            .value_name("px")
                            .default_value(&default_block_size)
                            .help("Edge of each single-color square. 1 is per-pixel noise"))
                        .arg(Arg::with_name("frames")
                            .long("frames")
                            .short("n")
                            .takes_value(true)
                            .value_name("num")
                            .default_value(&default_frames)
                            .help("Number of frames"))
                        .arg(Arg::with_name("duration")
                            .long("duration")
                            .short("d")
                            .takes_value(true)
                            .value_name("ms")
                            .default_value(&default_duration)
                            .help("How long each frame is shown, without --quality"))
                        .arg(Arg::with_name("quality")
                            .long("quality")
                            .short("q")
                            .takes_value(true)
                            .possible_values(&["high", "medium", "low"])
                            .case_insensitive(true)
                            .help("Use pngquant with this quality instead of the default palette. Frame duration is then given with --seconds"))
                        .arg(Arg::with_name("seconds")
                            .long("seconds")
                            .takes_value(true)
                            .value_name("s")
                            .requires("quality")
                            .help("How long each frame is shown, with --quality [default: 0.1]"))
                        .arg(Arg::with_name("fast")
                            .long("fast")
                            .help("Faster encoding, but lower quality"))
                        .arg(Arg::with_name("quiet")
                            .long("quiet")
                            .help("Do not show a progress bar"))
                        .get_matches_from(wild::args_os());

    let (width, height) = match (matches.value_of("width"), matches.value_of("height")) {
        (Some(w), Some(h)) => (parse_positive("width", w)?, parse_positive("height", h)?),
        _ => parse_resolution(matches.value_of("resolution").unwrap_or(&default_resolution))?,
    };

    // the default duration is only for the help text; an explicit one can't be mixed with --quality
    let duration = if matches.occurrences_of("duration") > 0 { matches.value_of("duration") } else { None };
    let policy = params::encoding_policy(duration, matches.value_of("quality"), matches.value_of("seconds"))?;

    let output = Path::new(matches.value_of_os("output").ok_or("Missing output")?);
    let spec = AnimationSpec {
        width,
        height,
        block_size: parse_positive("block size", matches.value_of("block-size").ok_or("Missing block size")?)?,
        frame_count: parse_positive("frames", matches.value_of("frames").ok_or("Missing frame count")?)?,
        policy,
        output_path: output_file(output)?,
        fast: matches.is_present("fast"),
    };
    let quiet = matches.is_present("quiet");

    let generation = noisegif::background::spawn(spec.clone())?;

    let mut pb = if quiet {
        None
    } else {
        let mut pb = pbr::ProgressBar::new(u64::from(spec.frame_count));
        pb.show_speed = false;
        pb.show_percent = false;
        pb.format(" #_. ");
        pb.message("Frame ");
        pb.set_max_refresh_rate(Some(Duration::from_millis(250)));
        Some(pb)
    };

    for event in generation.events() {
        match event {
            Event::Progress { completed, .. } => {
                if let Some(pb) = &mut pb {
                    pb.set(completed as u64);
                }
            },
            Event::Finished(res) => {
                let path = res?;
                let msg = format!("noisegif created {}", path.display());
                match &mut pb {
                    Some(pb) => pb.finish_print(&msg),
                    None => println!("{}", msg),
                }
                return Ok(());
            },
        }
    }
    generation.wait()?;
    Ok(())
}

/// A directory gets the default file name
fn output_file(output: &Path) -> BinResult<PathBuf> {
    if output.is_dir() {
        Ok(params::output_path_in(output, params::DEFAULT_FILE_STEM)?)
    } else {
        Ok(output.to_path_buf())
    }
}
