use crate::{
    alg::{self, ChannelStats, StatsError},
    image::{Bounds, Channel, Image, Pixel},
};
use failure::Fail;
use log::{debug, info};
use rayon::prelude::*;
use std::{fmt, str::FromStr};

/// Rejection strength, in multiples of the per-channel sample standard deviation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Threshold(f64);

impl Threshold {
    pub const DEFAULT: Threshold = Threshold(1.3);

    pub fn new(n: f64) -> Result<Self, String> {
        if n.is_finite() && n > 0.0 {
            Ok(Threshold(n))
        } else {
            Err(format!("threshold must be a positive number, got {}", n))
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Threshold {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String> {
        let n = s
            .trim()
            .parse::<f64>()
            .map_err(|err| format!("invalid threshold {:?}: {}", s, err))?;
        Self::new(n)
    }
}

#[derive(Debug, Fail, Clone, PartialEq)]
pub enum PixelError {
    #[fail(display = "failed to compute {} channel statistics", channel)]
    Statistics {
        channel: Channel,
        #[fail(cause)]
        cause: StatsError,
    },
    #[fail(display = "standard deviation filter removed all {} samples", count)]
    AllRejected { count: usize },
}

#[derive(Debug, Fail, Clone, PartialEq)]
pub enum StackError {
    #[fail(display = "need at least two images to merge, got {}", count)]
    InsufficientImages { count: usize },
    #[fail(
        display = "cannot merge images of different sizes: image {} has bounds {}, expected {}",
        index, found, expected
    )]
    DimensionMismatch {
        index: usize,
        expected: Bounds,
        found: Bounds,
    },
    #[fail(
        display = "failed to compute {} channel statistics at x={} y={}",
        channel, x, y
    )]
    Statistics {
        x: i32,
        y: i32,
        channel: Channel,
        #[fail(cause)]
        cause: StatsError,
    },
    #[fail(
        display = "standard deviation filter removed all pixels at x={} y={} with N={}; use a higher N value to make the filter more permissive",
        x, y, threshold
    )]
    AllPixelsRejected { x: i32, y: i32, threshold: Threshold },
}

impl StackError {
    fn at(err: PixelError, (x, y): (i32, i32), threshold: Threshold) -> Self {
        match err {
            PixelError::Statistics { channel, cause } => StackError::Statistics {
                x,
                y,
                channel,
                cause,
            },
            PixelError::AllRejected { .. } => StackError::AllPixelsRejected { x, y, threshold },
        }
    }
}

/// Per-row buffers so the hot loop does not allocate per pixel.
#[derive(Default)]
struct Scratch {
    values: Vec<f64>,
    keep: Vec<bool>,
}

/// Merges the stack of samples at one coordinate into a single pixel.
///
/// Per channel, the mean and sample standard deviation are taken across all
/// samples. A sample is dropped as a whole if *any* of its channels falls
/// outside `mean ± n * stdev`; the output is the per-channel mean of what
/// remains, truncated to 16 bits.
pub fn composite_pixel(samples: &[Pixel], threshold: Threshold) -> Result<Pixel, PixelError> {
    composite_pixel_with(samples, threshold, &mut Scratch::default())
}

fn composite_pixel_with(
    samples: &[Pixel],
    threshold: Threshold,
    scratch: &mut Scratch,
) -> Result<Pixel, PixelError> {
    let n = threshold.get();
    let Scratch { values, keep } = scratch;

    let mut stats = [ChannelStats::default(); 4];
    for &channel in &Channel::ALL {
        values.clear();
        values.extend(samples.iter().map(|p| f64::from(p[channel.index()])));
        stats[channel.index()] = ChannelStats::from_samples(values)
            .map_err(|cause| PixelError::Statistics { channel, cause })?;
    }

    keep.clear();
    keep.extend(samples.iter().map(|pixel| {
        Channel::ALL
            .iter()
            .all(|c| stats[c.index()].admits(f64::from(pixel[c.index()]), n))
    }));
    if !keep.iter().any(|&k| k) {
        return Err(PixelError::AllRejected {
            count: samples.len(),
        });
    }

    let mut result = [0; 4];
    for &channel in &Channel::ALL {
        values.clear();
        values.extend(
            samples
                .iter()
                .zip(keep.iter())
                .filter(|(_, k)| **k)
                .map(|(p, _)| f64::from(p[channel.index()])),
        );
        let mean =
            alg::mean(values).map_err(|cause| PixelError::Statistics { channel, cause })?;
        // saturating, truncates toward zero
        result[channel.index()] = mean as u16;
    }
    Ok(result)
}

/// Checks the stack preconditions, returning the shared bounds.
pub fn check_stack(images: &[Image<Pixel>]) -> Result<Bounds, StackError> {
    if images.len() < 2 {
        return Err(StackError::InsufficientImages {
            count: images.len(),
        });
    }
    let expected = images[0].bounds;
    for (index, image) in images.iter().enumerate().skip(1) {
        if image.bounds != expected {
            return Err(StackError::DimensionMismatch {
                index,
                expected,
                found: image.bounds,
            });
        }
    }
    Ok(expected)
}

fn composite_row(
    images: &[Image<Pixel>],
    y: i32,
    threshold: Threshold,
    out: &mut [Pixel],
) -> Result<(), StackError> {
    let rows = images.iter().map(|img| img.row(y)).collect::<Vec<_>>();
    let min_x = images[0].bounds.min.x;
    let mut samples = Vec::with_capacity(images.len());
    let mut scratch = Scratch::default();
    for (col, out_pix) in out.iter_mut().enumerate() {
        samples.clear();
        samples.extend(rows.iter().map(|row| row[col]));
        *out_pix = composite_pixel_with(&samples, threshold, &mut scratch)
            .map_err(|err| StackError::at(err, (min_x + col as i32, y), threshold))?;
    }
    Ok(())
}

/// Merges aligned, equally sized images, rows in parallel.
///
/// If several coordinates fail, the first one in row-major order is reported.
pub fn stack(images: &[Image<Pixel>], threshold: Threshold) -> Result<Image<Pixel>, StackError> {
    let bounds = check_stack(images)?;
    info!(
        "Stacking {} images of bounds {} with N={} on {} threads",
        images.len(),
        bounds,
        threshold,
        rayon::current_num_threads()
    );
    let mut result = Image::zero(bounds);
    let min_y = bounds.min.y;
    let rows = result
        .par_rows_mut()
        .enumerate()
        .map(|(row, out)| composite_row(images, min_y + row as i32, threshold, out))
        .collect::<Vec<_>>();
    rows.into_iter().collect::<Result<(), _>>()?;
    debug!("Stacked {} rows", result.height());
    Ok(result)
}
