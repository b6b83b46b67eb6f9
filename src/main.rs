mod alg;
mod image;
mod imgio;
mod stack;

use crate::{
    image::{Image, Pixel},
    stack::Threshold,
};
use clap::Parser;
use failure::{err_msg, format_err, Error};
use flexi_logger::{Logger, LoggerHandle};
use log::{debug, error, info};
use rayon::prelude::*;
use std::{
    path::{Path, PathBuf},
    process,
};

/// Merges aligned photos of a static scene, dropping pixels that stray more
/// than N standard deviations from the per-pixel mean.
#[derive(Parser, Debug)]
#[command(name = "depict", version)]
struct Cli {
    /// Input images, or directories to search recursively.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output file; the extension picks the format.
    #[arg(short, long)]
    output: PathBuf,

    /// Strength of the pixel rejection, in multiples of standard deviation.
    #[arg(
        short = 'n',
        long,
        visible_short_alias = 'N',
        default_value_t = Threshold::DEFAULT
    )]
    threshold: Threshold,

    /// JPEG output quality.
    #[arg(short, long, default_value_t = 100, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Worker threads (defaults to one per core).
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// More logging; repeat for trace output.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn setup_logging(verbose: u8) -> Result<LoggerHandle, Error> {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    Logger::try_with_env_or_str(level)
        .and_then(|logger| logger.start())
        .map_err(|err| format_err!("logger initialization failed: {}", err))
}

fn paths_to_read(images: &mut Vec<PathBuf>, path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    if path.is_dir() {
        for entry in path.read_dir()? {
            let entry = entry?;
            paths_to_read(images, entry.path())?;
        }
    } else {
        images.push(path.to_owned());
    }
    Ok(())
}

/// Expands directories, sorts and drops repeats, so the same inputs always load
/// in the same order and each file counts once.
fn collect_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, Error> {
    let mut image_paths = Vec::new();
    for input in inputs {
        paths_to_read(&mut image_paths, input)?;
    }
    image_paths.sort();
    image_paths.dedup();
    if image_paths.is_empty() {
        return Err(err_msg("no input images found"));
    }
    Ok(image_paths)
}

fn load_all(paths: &[PathBuf]) -> Result<Vec<Image<Pixel>>, Error> {
    paths
        .par_iter()
        .map(|path| {
            debug!("Reading {}", path.display());
            match imgio::load(path) {
                Ok(img) => Ok(img),
                Err(err) => Err(format_err!(
                    "failed decoding image {}: {}",
                    path.display(),
                    err
                )),
            }
        })
        .collect::<Result<Vec<_>, Error>>()
}

fn go(cli: Cli) -> Result<(), Error> {
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|err| format_err!("failed to start {} worker threads: {}", threads, err))?;
    }
    let paths = collect_paths(&cli.inputs)?;
    info!("Reading {} images", paths.len());
    let images = load_all(&paths)?;
    let stacked = stack::stack(&images, cli.threshold)?;
    info!("Saving {}", cli.output.display());
    imgio::save(&cli.output, &stacked, cli.quality).map_err(|err| {
        format_err!(
            "failed to save image to output file {}: {}",
            cli.output.display(),
            err
        )
    })
}

fn main() {
    let cli = Cli::parse();
    let _logger = match setup_logging(cli.verbose) {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(2);
        }
    };
    if let Err(err) = go(cli) {
        error!("{}", err);
        for cause in err.iter_causes() {
            error!("  caused by: {}", cause);
        }
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("depict-{}-{}", process::id(), name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::try_parse_from(["depict", "-o", "out.png", "a.png", "b.png"]).unwrap();
        assert_eq!(cli.threshold, Threshold::DEFAULT);
        assert_eq!(cli.quality, 100);
        assert_eq!(cli.threads, None);
        assert_eq!(cli.inputs.len(), 2);
    }

    #[test]
    fn cli_threshold_alias_and_validation() {
        let cli = Cli::try_parse_from(["depict", "-N", "2.5", "-o", "o.jpg", "a"]).unwrap();
        assert_eq!(cli.threshold.get(), 2.5);
        assert!(Cli::try_parse_from(["depict", "-n", "0", "-o", "o.jpg", "a"]).is_err());
        assert!(Cli::try_parse_from(["depict", "-q", "0", "-o", "o.jpg", "a"]).is_err());
        assert!(Cli::try_parse_from(["depict", "-o", "o.jpg"]).is_err());
    }

    #[test]
    fn collects_directories_sorted() {
        let dir = temp_dir("collect");
        fs::create_dir_all(dir.join("nested")).unwrap();
        for name in &["b.png", "a.png", "nested/c.png"] {
            fs::write(dir.join(name), b"").unwrap();
        }
        let paths = collect_paths(&[dir.clone()]).unwrap();
        fs::remove_dir_all(&dir).unwrap();
        assert_eq!(
            paths,
            vec![
                dir.join("a.png"),
                dir.join("b.png"),
                dir.join("nested/c.png")
            ]
        );
    }

    #[test]
    fn file_reached_twice_loads_once() {
        let dir = temp_dir("repeat");
        fs::write(dir.join("a.png"), b"").unwrap();
        fs::write(dir.join("b.png"), b"").unwrap();
        let inputs = [dir.join("a.png"), dir.clone(), dir.join("a.png")];
        let paths = collect_paths(&inputs).unwrap();
        fs::remove_dir_all(&dir).unwrap();
        assert_eq!(paths, vec![dir.join("a.png"), dir.join("b.png")]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = temp_dir("empty");
        let err = collect_paths(&[dir.clone()]).unwrap_err();
        fs::remove_dir_all(&dir).unwrap();
        assert!(err.to_string().contains("no input images"));
    }

    #[test]
    fn merges_files_end_to_end() {
        let dir = temp_dir("e2e");
        let background = [12000, 24000, 36000, 65535];
        let bounds = crate::image::Bounds::from_size(2, 2);
        for i in 0..6 {
            let mut frame = Image::new_val(background, bounds);
            if i == 2 {
                frame[(1, 0)] = [65535, 65535, 0, 65535];
            }
            imgio::save(dir.join(format!("{}.png", i)), &frame, 100).unwrap();
        }
        let output = dir.join("out.png");
        let cli = Cli::try_parse_from([
            "depict",
            "-o",
            output.to_str().unwrap(),
            dir.to_str().unwrap(),
        ])
        .unwrap();
        let paths = collect_paths(&cli.inputs).unwrap();
        let images = load_all(&paths).unwrap();
        let stacked = stack::stack(&images, cli.threshold).unwrap();
        assert!(stacked.data.iter().all(|&p| p == background));
        imgio::save(&output, &stacked, cli.quality).unwrap();
        let reloaded = imgio::load(&output).unwrap();
        fs::remove_dir_all(&dir).unwrap();
        assert_eq!(reloaded, stacked);
    }
}
