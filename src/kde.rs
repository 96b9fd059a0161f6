//! One-dimensional Gaussian kernel density estimates.

use rayon::prelude::*;

/// `num` evenly spaced values from `start` to `stop`, both included.
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Evaluation grid of a density plot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub start: f64,
    pub stop: f64,
    pub points: usize,
}

impl Grid {
    pub const fn new(start: f64, stop: f64, points: usize) -> Self {
        Grid {
            start,
            stop,
            points,
        }
    }

    pub fn values(&self) -> Vec<f64> {
        linspace(self.start, self.stop, self.points)
    }
}

/// Gaussian KDE with Scott's rule bandwidth: the sample standard deviation
/// times n^(-1/5).
#[derive(Debug, Clone)]
pub struct GaussianKde {
    samples: Vec<f64>,
    bandwidth: f64,
}

impl GaussianKde {
    /// `None` for fewer than two samples or samples with no spread.
    pub fn new(samples: Vec<f64>) -> Option<Self> {
        let n = samples.len();
        if n < 2 {
            return None;
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        let bandwidth = var.sqrt() * (n as f64).powf(-0.2);
        if !(bandwidth > 0.0 && bandwidth.is_finite()) {
            return None;
        }
        Some(GaussianKde { samples, bandwidth })
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn density(&self, x: f64) -> f64 {
        let norm = self.samples.len() as f64 * self.bandwidth * (2.0 * std::f64::consts::PI).sqrt();
        self.samples
            .iter()
            .map(|s| (-0.5 * ((x - s) / self.bandwidth).powi(2)).exp())
            .sum::<f64>()
            / norm
    }

    pub fn evaluate(&self, grid: &[f64]) -> Vec<f64> {
        grid.par_iter().map(|&x| self.density(x)).collect()
    }
}

/// The grid value where `density` peaks; the first one on ties.
pub fn mode(grid: &[f64], density: &[f64]) -> Option<f64> {
    let (i, _) = density
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &d)| match best {
            Some((_, b)) if b >= d => best,
            _ => Some((i, d)),
        })?;
    grid.get(i).copied()
}

/// A density evaluated on a grid, ready to plot.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityCurve {
    pub label: String,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub mode: f64,
}

impl DensityCurve {
    pub fn estimate(label: &str, samples: Vec<f64>, grid: Grid) -> Option<Self> {
        let n = samples.len();
        let Some(kde) = GaussianKde::new(samples) else {
            log::warn!("{label}: {n} samples are not enough for a density estimate");
            return None;
        };
        let xs = grid.values();
        let ys = kde.evaluate(&xs);
        let mode = mode(&xs, &ys)?;
        log::info!("{label}: mode {mode:.2} from {n} samples");
        Some(DensityCurve {
            label: label.to_string(),
            xs,
            ys,
            mode,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_linspace_includes_both_ends() {
        let xs = linspace(0.0, 80.0, 801);
        assert_eq!(xs.len(), 801);
        assert_eq!(xs[0], 0.0);
        assert!((xs[800] - 80.0).abs() < 1e-9);
        assert!((xs[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_scott_bandwidth() {
        let kde = GaussianKde::new(vec![-1.0, 0.0, 1.0]).unwrap();
        assert!((kde.bandwidth() - 3f64.powf(-0.2)).abs() < 1e-12);
    }

    #[test]
    fn test_mode_of_symmetric_sample() {
        let kde = GaussianKde::new(vec![-2.0, -1.0, 0.0, 0.0, 1.0, 2.0]).unwrap();
        let xs = linspace(-5.0, 5.0, 1001);
        let ys = kde.evaluate(&xs);
        assert!(mode(&xs, &ys).unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_density_integrates_to_one() {
        let kde = GaussianKde::new(vec![3.0, 4.5, 5.0, 9.0, 12.0]).unwrap();
        let xs = linspace(-40.0, 60.0, 10_001);
        let step = xs[1] - xs[0];
        let area: f64 = kde.evaluate(&xs).iter().sum::<f64>() * step;
        assert!((area - 1.0).abs() < 1e-3, "{area}");
    }

    #[test]
    fn test_degenerate_samples() {
        assert!(GaussianKde::new(vec![1.0]).is_none());
        assert!(GaussianKde::new(vec![2.0, 2.0, 2.0]).is_none());
        assert!(DensityCurve::estimate("empty", vec![], Grid::new(0.0, 1.0, 11)).is_none());
    }
}
