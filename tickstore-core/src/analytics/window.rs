//! Window kernels: pure functions from an ordered value series to a derived
//! series of the same length.
//!
//! Positions without enough history hold `f64::NAN` (warmup). A NaN anywhere
//! in a window makes that window's output NaN.

/// A statistic computed over one entity's time-ordered values.
pub trait WindowStat: Send + Sync {
    /// Column-style name, e.g. `rolling_mean_5`.
    fn name(&self) -> String;

    /// Number of leading positions that are always NaN.
    fn lookback(&self) -> usize;

    /// Compute over the whole series. Output length equals input length.
    fn compute(&self, values: &[f64]) -> Vec<f64>;
}

/// Trailing arithmetic mean over `window` observations.
#[derive(Debug, Clone)]
pub struct RollingMean {
    window: usize,
}

impl RollingMean {
    pub fn new(window: usize) -> Self {
        assert!(window >= 1, "rolling mean window must be >= 1");
        Self { window }
    }
}

impl WindowStat for RollingMean {
    fn name(&self) -> String {
        format!("rolling_mean_{}", self.window)
    }

    fn lookback(&self) -> usize {
        self.window - 1
    }

    fn compute(&self, values: &[f64]) -> Vec<f64> {
        let mut result = vec![f64::NAN; values.len()];
        for (i, win) in values.windows(self.window).enumerate() {
            result[i + self.window - 1] = mean(win);
        }
        result
    }
}

/// Fractional change from the immediately preceding observation.
#[derive(Debug, Clone, Default)]
pub struct SimpleReturn;

impl WindowStat for SimpleReturn {
    fn name(&self) -> String {
        "return".to_string()
    }

    fn lookback(&self) -> usize {
        1
    }

    fn compute(&self, values: &[f64]) -> Vec<f64> {
        let mut result = vec![f64::NAN; values.len()];
        for (i, pair) in values.windows(2).enumerate() {
            result[i + 1] = pair[1] / pair[0] - 1.0;
        }
        result
    }
}

/// Sample standard deviation (n - 1 denominator) of simple returns over the
/// trailing `window` observations.
///
/// The first return is always missing, so the first defined value sits at
/// index `window`. A window of 1 has no sample deviation and is NaN
/// everywhere.
#[derive(Debug, Clone)]
pub struct RollingVolatility {
    window: usize,
}

impl RollingVolatility {
    pub fn new(window: usize) -> Self {
        assert!(window >= 1, "rolling volatility window must be >= 1");
        Self { window }
    }

    /// Volatility over an already computed return series.
    pub fn over_returns(&self, returns: &[f64]) -> Vec<f64> {
        let mut result = vec![f64::NAN; returns.len()];
        if self.window < 2 {
            return result;
        }
        for (i, win) in returns.windows(self.window).enumerate() {
            result[i + self.window - 1] = sample_std(win);
        }
        result
    }
}

impl WindowStat for RollingVolatility {
    fn name(&self) -> String {
        format!("rolling_volatility_{}", self.window)
    }

    fn lookback(&self) -> usize {
        self.window
    }

    fn compute(&self, values: &[f64]) -> Vec<f64> {
        self.over_returns(&SimpleReturn.compute(values))
    }
}

fn mean(win: &[f64]) -> f64 {
    win.iter().sum::<f64>() / win.len() as f64
}

fn sample_std(win: &[f64]) -> f64 {
    let m = mean(win);
    let ss: f64 = win.iter().map(|x| (x - m) * (x - m)).sum();
    (ss / (win.len() - 1) as f64).sqrt()
}

/// Non-finite to `None`, for result rows. Covers the warmup NaN and the
/// infinite return after a zero close.
pub fn defined(v: f64) -> Option<f64> {
    if v.is_finite() {
        Some(v)
    } else {
        None
    }
}
