use failure::Fail;

#[derive(Debug, Fail, Clone, Copy, PartialEq)]
pub enum StatsError {
    #[fail(display = "cannot compute the mean of an empty sequence")]
    EmptyInput,
    #[fail(
        display = "sample standard deviation needs at least two values, got {}",
        count
    )]
    InsufficientSamples { count: usize },
}

pub fn mean(seq: &[f64]) -> Result<f64, StatsError> {
    if seq.is_empty() {
        return Err(StatsError::EmptyInput);
    }
    Ok(seq.iter().sum::<f64>() / seq.len() as f64)
}

/// Standard deviation with Bessel's correction (divides by `n - 1`).
pub fn sample_stdev(seq: &[f64]) -> Result<f64, StatsError> {
    if seq.len() < 2 {
        return Err(StatsError::InsufficientSamples { count: seq.len() });
    }
    let mean = mean(seq)?;
    let ssd = seq.iter().map(|x| x - mean).map(|x| x * x).sum::<f64>();
    Ok((ssd / (seq.len() - 1) as f64).sqrt())
}

/// Mean and spread of one channel across the stack at a single coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChannelStats {
    pub mean: f64,
    pub stdev: f64,
}

impl ChannelStats {
    pub fn from_samples(seq: &[f64]) -> Result<Self, StatsError> {
        Ok(Self {
            mean: mean(seq)?,
            stdev: sample_stdev(seq)?,
        })
    }

    /// Values exactly on `mean ± n * stdev` are kept.
    pub fn admits(&self, value: f64, n: f64) -> bool {
        let spread = n * self.stdev;
        !(value < self.mean - spread || value > self.mean + spread)
    }
}
