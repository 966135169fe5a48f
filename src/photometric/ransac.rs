use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::foundation::error::{StitchError, StitchResult};

const MODEL_POINTS: usize = 2;

/// RANSAC line-fit settings.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RansacOpts {
    /// Perpendicular distance below which a point counts as an inlier.
    pub threshold: f64,
    /// Target probability that at least one sample was outlier-free.
    pub confidence: f64,
    pub max_iters: usize,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for RansacOpts {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            confidence: 0.99,
            max_iters: 1000,
            seed: None,
        }
    }
}

/// Line in point/direction form. `dir` is unit length with `dir[0] >= 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Line {
    pub point: [f64; 2],
    pub dir: [f64; 2],
}

impl Line {
    /// Line through two samples; vertical when they share an x.
    pub fn through(a: [f64; 2], b: [f64; 2]) -> Self {
        let point = [(a[0] + b[0]) * 0.5, (a[1] + b[1]) * 0.5];
        if a[0] == b[0] {
            return Self {
                point,
                dir: [0.0, 1.0],
            };
        }
        let k = (b[1] - a[1]) / (b[0] - a[0]);
        let dy = k / (1.0 + k * k).sqrt();
        Self {
            point,
            dir: [(1.0 - dy * dy).sqrt(), dy],
        }
    }

    pub fn distance(&self, q: [f64; 2]) -> f64 {
        // |cross(q - p, dir)| with a unit direction.
        ((q[0] - self.point[0]) * self.dir[1] - (q[1] - self.point[1]) * self.dir[0]).abs()
    }

    /// `(slope, intercept)` of `y = slope * x + intercept`.
    pub fn slope_intercept(&self) -> StitchResult<(f64, f64)> {
        if self.dir[0].abs() < 1e-12 {
            return Err(StitchError::render(
                "vertical line has no slope/intercept form",
            ));
        }
        let k = self.dir[1] / self.dir[0];
        Ok((k, self.point[1] - k * self.point[0]))
    }
}

/// Result of [`fit_line_ransac`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineFit {
    /// Least-squares refit over all points.
    pub line: Line,
    /// Inlier count of the best sampled model.
    pub inliers: usize,
    pub iterations: usize,
}

/// Remaining-iteration estimate for a target `confidence` given outlier ratio `outliers`.
pub(crate) fn update_num_iters(
    confidence: f64,
    outliers: f64,
    model_points: usize,
    max_iters: usize,
) -> usize {
    let p = confidence.clamp(0.0, 1.0);
    let ep = outliers.clamp(0.0, 1.0);
    let num = (1.0 - p).max(f64::MIN_POSITIVE);
    let denom = 1.0 - (1.0 - ep).powi(model_points as i32);
    if denom < f64::MIN_POSITIVE {
        return 0;
    }
    let num = num.ln();
    let denom = denom.ln();
    if denom >= 0.0 || -num >= (max_iters as f64) * (-denom) {
        max_iters
    } else {
        (num / denom).round() as usize
    }
}

fn count_inliers(points: &[[f64; 2]], line: &Line, threshold: f64) -> usize {
    points
        .iter()
        .filter(|&&q| line.distance(q) < threshold)
        .count()
}

/// Robust line through `points`: RANSAC for the consensus, then a total-least-squares refit over
/// every point.
#[tracing::instrument(skip(points), fields(points = points.len()))]
pub fn fit_line_ransac(points: &[[f64; 2]], opts: &RansacOpts) -> StitchResult<LineFit> {
    if points.len() <= 3 {
        return Err(StitchError::render(format!(
            "line fit needs more than 3 points, got {}",
            points.len()
        )));
    }
    if opts.max_iters == 0 {
        return Err(StitchError::validation("ransac max_iters must be >= 1"));
    }

    let mut rng = match opts.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let n = points.len();
    let mut budget = opts.max_iters;
    let mut best_inliers = 0usize;
    let mut iterations = 0usize;
    while iterations < budget {
        iterations += 1;
        let pick = rand::seq::index::sample(&mut rng, n, MODEL_POINTS);
        let candidate = Line::through(points[pick.index(0)], points[pick.index(1)]);
        let inliers = count_inliers(points, &candidate, opts.threshold);
        if inliers > best_inliers.max(MODEL_POINTS - 1) {
            budget = update_num_iters(
                opts.confidence,
                (n - inliers) as f64 / n as f64,
                MODEL_POINTS,
                opts.max_iters,
            );
            best_inliers = inliers;
        }
    }

    let line = fit_line_least_squares(points)?;
    tracing::debug!(iterations, inliers = best_inliers, ?line, "ransac line fit");
    Ok(LineFit {
        line,
        inliers: best_inliers,
        iterations,
    })
}

/// Orthogonal-regression line: through the centroid along the principal axis.
pub fn fit_line_least_squares(points: &[[f64; 2]]) -> StitchResult<Line> {
    if points.len() < 2 {
        return Err(StitchError::render("least-squares line needs 2+ points"));
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    let (mx, my) = (sx / n, sy / n);
    let (mut cxx, mut cyy, mut cxy) = (0.0f64, 0.0f64, 0.0f64);
    for p in points {
        let dx = p[0] - mx;
        let dy = p[1] - my;
        cxx += dx * dx;
        cyy += dy * dy;
        cxy += dx * dy;
    }
    if cxx == 0.0 && cyy == 0.0 {
        return Err(StitchError::render("all points coincide; line is undefined"));
    }
    let theta = 0.5 * (2.0 * cxy).atan2(cxx - cyy);
    let (mut dx, mut dy) = (theta.cos(), theta.sin());
    if dx < 0.0 {
        dx = -dx;
        dy = -dy;
    }
    Ok(Line {
        point: [mx, my],
        dir: [dx, dy],
    })
}

#[cfg(test)]
#[path = "../../tests/unit/photometric/ransac.rs"]
mod tests;
