// Posterior simulation for the Gaussian linear model.
//
// Model: y = X b + e, e ~ Normal(0, sigma), with the priors
//   coefficient k:  Normal(0, 2.5 * sd(y) / sd(x_k))
//   intercept:      Normal(0, 2.5 * sd(y)), on the centred outcome with
//                   centred predictors
//   sigma:          Exponential(rate = 1 / sd(y))
//
// All the work happens on centred data. Draws are converted back to the raw
// scale before being stored.

use std::time::Instant;

use log::{debug, warn};
use rand::prelude::*;
use rand::SeedableRng;
use rand_distr::{Exp1, StandardNormal};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::config::*;
use crate::encoder::DesignRow;
use crate::linalg::{dot, Cholesky, SquareMatrix};
use crate::summary::{mean, variance};

pub(crate) const PRIOR_SCALE: f64 = 2.5;
pub(crate) const SIGMA_PRIOR_RATE: f64 = 1.0;

/// Sigma never goes below this fraction of the outcome scale. Without a
/// floor, an outcome that the predictors fit exactly (all the polls at the
/// same value, or fewer polls than coefficients) sends sigma to zero.
pub(crate) const SIGMA_FLOOR_RATIO: f64 = 1e-4;

const SLICE_WIDTH: f64 = 1.0;
const SLICE_MAX_STEPS: usize = 50;
const SLICE_MAX_SHRINKS: usize = 200;
const GOLDEN_ITERATIONS: usize = 200;

/// The sufficient statistics of the centred regression and its priors.
#[derive(PartialEq, Debug, Clone)]
pub(crate) struct RegressionProblem {
    n: usize,
    /// Number of coefficients, intercept included.
    p: usize,
    /// Column means; zero for the intercept column.
    x_means: Vec<f64>,
    y_mean: f64,
    y_scale: f64,
    ztz: SquareMatrix,
    zty: Vec<f64>,
    yty: f64,
    prior_sd: Vec<f64>,
    sigma_rate: f64,
}

/// The draws of one chain, stored by parameter: the coefficients on the raw
/// scale, then sigma.
#[derive(PartialEq, Debug, Clone)]
pub(crate) struct ChainDraws {
    pub(crate) draws: Vec<Vec<f64>>,
    pub(crate) truncated: bool,
}

impl ChainDraws {
    fn new(num_params: usize, capacity: usize) -> ChainDraws {
        ChainDraws {
            draws: (0..num_params).map(|_| Vec::with_capacity(capacity)).collect(),
            truncated: false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.draws.first().map_or(0, |d| d.len())
    }

    fn push(&mut self, coefficients: &[f64], sigma: f64) {
        for (k, c) in coefficients.iter().enumerate() {
            self.draws[k].push(*c);
        }
        self.draws[coefficients.len()].push(sigma);
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        for d in self.draws.iter_mut() {
            d.truncate(len);
        }
    }
}

/// Falls back to 1 for scales that are zero or undefined.
fn usable_scale(sd: f64) -> f64 {
    if sd > 0.0 && sd.is_finite() {
        sd
    } else {
        1.0
    }
}

impl RegressionProblem {
    /// `rows` all start with the intercept column.
    pub(crate) fn new(rows: &[DesignRow], y: &[f64]) -> Result<RegressionProblem, ModelError> {
        let n = rows.len();
        if n == 0 {
            return Err(ModelError::EmptyInput);
        }
        let p = rows[0].0.len();
        let y_mean = mean(y);
        let y_scale = usable_scale(variance(y).sqrt());

        let mut x_means = vec![0.0; p];
        let mut prior_sd = vec![PRIOR_SCALE * y_scale; p];
        for k in 1..p {
            let col: Vec<f64> = rows.iter().map(|r| r.0[k]).collect();
            x_means[k] = mean(&col);
            prior_sd[k] = PRIOR_SCALE * y_scale / usable_scale(variance(&col).sqrt());
        }

        let mut ztz = SquareMatrix::zeros(p);
        let mut zty = vec![0.0; p];
        let mut yty = 0.0;
        let mut z = vec![0.0; p];
        for (r, yi) in rows.iter().zip(y.iter()) {
            z[0] = 1.0;
            for k in 1..p {
                z[k] = r.0[k] - x_means[k];
            }
            let yc = yi - y_mean;
            for i in 0..p {
                zty[i] += z[i] * yc;
                for j in 0..p {
                    ztz.add_to(i, j, z[i] * z[j]);
                }
            }
            yty += yc * yc;
        }

        debug!(
            "RegressionProblem: n: {} p: {} y_mean: {:.3} y_scale: {:.3} prior_sd: {:?}",
            n, p, y_mean, y_scale, prior_sd
        );
        Ok(RegressionProblem {
            n,
            p,
            x_means,
            y_mean,
            y_scale,
            ztz,
            zty,
            yty,
            prior_sd,
            sigma_rate: SIGMA_PRIOR_RATE / y_scale,
        })
    }

    pub(crate) fn num_coefficients(&self) -> usize {
        self.p
    }

    pub(crate) fn num_rows(&self) -> usize {
        self.n
    }

    /// The smallest value of log(sigma) the samplers visit.
    fn log_sigma_floor(&self) -> f64 {
        (SIGMA_FLOOR_RATIO * self.y_scale).ln()
    }

    /// The Cholesky factor of the conditional posterior precision of the
    /// centred coefficients given sigma, and the scaled cross product.
    fn conditional(&self, sigma: f64) -> Result<(Cholesky, Vec<f64>), ModelError> {
        let inv_s2 = 1.0 / (sigma * sigma);
        let mut precision = SquareMatrix::zeros(self.p);
        for i in 0..self.p {
            for j in 0..self.p {
                precision.set(i, j, self.ztz.get(i, j) * inv_s2);
            }
            precision.add_to(i, i, 1.0 / (self.prior_sd[i] * self.prior_sd[i]));
        }
        let chol = Cholesky::decompose(&precision).ok_or_else(|| {
            ModelError::NumericalFailure(format!(
                "posterior precision is not positive definite (sigma: {})",
                sigma
            ))
        })?;
        let b: Vec<f64> = self.zty.iter().map(|v| v * inv_s2).collect();
        Ok((chol, b))
    }

    /// Draws the centred coefficients from their full conditional given sigma.
    fn draw_theta<R: Rng>(&self, sigma: f64, rng: &mut R) -> Result<Vec<f64>, ModelError> {
        let (chol, b) = self.conditional(sigma)?;
        let centre = chol.solve(&b);
        let noise: Vec<f64> = (0..self.p)
            .map(|_| rng.sample::<f64, _>(StandardNormal))
            .collect();
        let offset = chol.solve_upper(&noise);
        Ok(centre.iter().zip(offset.iter()).map(|(m, o)| m + o).collect())
    }

    /// Sum of squared residuals of the centred coefficients.
    fn ssr(&self, theta: &[f64]) -> f64 {
        (self.yty - 2.0 * dot(theta, &self.zty) + self.ztz.quad_form(theta)).max(0.0)
    }

    /// Log density of u = log(sigma) given the coefficients, up to a constant.
    fn log_density_log_sigma(&self, u: f64, ssr: f64) -> f64 {
        -(self.n as f64) * u - 0.5 * ssr * (-2.0 * u).exp() - self.sigma_rate * u.exp() + u
    }

    /// Log density of u = log(sigma) with the coefficients integrated out, up
    /// to a constant.
    fn log_marginal_log_sigma(&self, u: f64) -> Result<f64, ModelError> {
        let sigma = u.exp();
        let (chol, b) = self.conditional(sigma)?;
        let v = chol.solve_lower(&b);
        let log_lik = -(self.n as f64) * u
            - 0.5 * chol.log_det()
            - 0.5 * (self.yty / (sigma * sigma) - dot(&v, &v));
        Ok(log_lik - self.sigma_rate * sigma + u)
    }

    /// Converts centred coefficients to the raw scale.
    fn to_raw(&self, theta: &[f64]) -> Vec<f64> {
        let mut raw = theta.to_vec();
        raw[0] = self.y_mean + theta[0]
            - (1..self.p)
                .map(|k| theta[k] * self.x_means[k])
                .sum::<f64>();
        raw
    }
}

/// One step of a univariate slice sampler (stepping out, then shrinking).
fn slice_step<R: Rng, F: Fn(f64) -> f64>(rng: &mut R, x0: f64, log_f: F) -> f64 {
    let level = log_f(x0) - rng.sample::<f64, _>(Exp1);
    let mut left = x0 - SLICE_WIDTH * rng.gen::<f64>();
    let mut right = left + SLICE_WIDTH;
    for _ in 0..SLICE_MAX_STEPS {
        if log_f(left) <= level {
            break;
        }
        left -= SLICE_WIDTH;
    }
    for _ in 0..SLICE_MAX_STEPS {
        if log_f(right) <= level {
            break;
        }
        right += SLICE_WIDTH;
    }
    for _ in 0..SLICE_MAX_SHRINKS {
        let x1 = left + rng.gen::<f64>() * (right - left);
        if log_f(x1) > level {
            return x1;
        }
        if x1 < x0 {
            left = x1;
        } else {
            right = x1;
        }
    }
    x0
}

/// Runs one Gibbs chain: the coefficients are drawn exactly given sigma,
/// and log(sigma) with a slice sampler given the coefficients.
///
/// When the deadline passes, the chain stops and returns the draws kept so
/// far, flagged as truncated.
pub(crate) fn run_chain(
    problem: &RegressionProblem,
    settings: &FitSettings,
    chain: usize,
    deadline: Option<Instant>,
) -> Result<ChainDraws, ModelError> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(settings.seed.wrapping_add(chain as u64));
    let mut res = ChainDraws::new(problem.p + 1, settings.kept_per_chain());

    // Overdispersed start around the scale of the outcome.
    let mut u = problem.y_scale.ln() + rng.gen_range(-1.0..1.0);
    let floor = problem.log_sigma_floor();
    for iter in 0..settings.iterations_per_chain {
        if deadline.map_or(false, |d| Instant::now() >= d) {
            warn!(
                "run_chain: chain {} stopped at iteration {} (time budget exhausted)",
                chain, iter
            );
            res.truncated = true;
            break;
        }
        let theta = problem.draw_theta(u.exp(), &mut rng)?;
        let ssr = problem.ssr(&theta);
        u = slice_step(&mut rng, u, |x| {
            if x < floor {
                f64::NEG_INFINITY
            } else {
                problem.log_density_log_sigma(x, ssr)
            }
        });
        if iter >= settings.warmup_iterations {
            res.push(&problem.to_raw(&theta), u.exp());
        }
    }
    debug!("run_chain: chain {} kept {} draws", chain, res.len());
    Ok(res)
}

/// Maximizes a unimodal function on an interval.
fn golden_section<F: Fn(f64) -> Result<f64, ModelError>>(
    f: F,
    mut lo: f64,
    mut hi: f64,
) -> Result<f64, ModelError> {
    let ratio = (5f64.sqrt() - 1.0) / 2.0;
    let mut a = hi - ratio * (hi - lo);
    let mut b = lo + ratio * (hi - lo);
    let mut fa = f(a)?;
    let mut fb = f(b)?;
    for _ in 0..GOLDEN_ITERATIONS {
        if fa < fb {
            lo = a;
            a = b;
            fa = fb;
            b = lo + ratio * (hi - lo);
            fb = f(b)?;
        } else {
            hi = b;
            b = a;
            fb = fa;
            a = hi - ratio * (hi - lo);
            fa = f(a)?;
        }
        if hi - lo < 1e-10 {
            break;
        }
    }
    Ok((lo + hi) / 2.0)
}

/// Finds the posterior mode of log(sigma) with the coefficients integrated
/// out, and draws from a normal approximation at that mode. The
/// coefficients are then drawn exactly given each sigma.
pub(crate) fn run_optimizing(
    problem: &RegressionProblem,
    settings: &FitSettings,
) -> Result<ChainDraws, ModelError> {
    let floor = problem.log_sigma_floor();
    let g = |u: f64| problem.log_marginal_log_sigma(u);
    let u_hat = golden_section(&g, floor, problem.y_scale.ln() + 4.0)?;
    let h = 1e-3;
    // A mode on the floor has no curvature to speak of: sigma stays there.
    let u_sd = if u_hat - floor < h {
        0.0
    } else {
        let curvature = (g(u_hat + h)? - 2.0 * g(u_hat)? + g(u_hat - h)?) / (h * h);
        if !(curvature < 0.0 && curvature.is_finite()) {
            return Err(ModelError::NumericalFailure(format!(
                "no curvature at the mode of log(sigma) (second derivative: {})",
                curvature
            )));
        }
        (-1.0 / curvature).sqrt()
    };
    debug!(
        "run_optimizing: sigma mode: {:.4} log-scale sd: {:.4}",
        u_hat.exp(),
        u_sd
    );

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(settings.seed);
    let kept = settings.kept_per_chain();
    let mut res = ChainDraws::new(problem.p + 1, kept);
    for _ in 0..kept {
        let u = (u_hat + u_sd * rng.sample::<f64, _>(StandardNormal)).max(floor);
        let theta = problem.draw_theta(u.exp(), &mut rng)?;
        res.push(&problem.to_raw(&theta), u.exp());
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rows() -> (Vec<DesignRow>, Vec<f64>) {
        let rows = vec![
            DesignRow(vec![1.0, 0.0, 1.0]),
            DesignRow(vec![1.0, 1.0, 0.0]),
            DesignRow(vec![1.0, 1.0, 1.0]),
            DesignRow(vec![1.0, 0.0, 0.0]),
        ];
        (rows, vec![50.0, 46.0, 48.0, 47.0])
    }

    #[test]
    fn autoscaled_priors() {
        let (rows, y) = rows();
        let p = RegressionProblem::new(&rows, &y).unwrap();
        let y_sd = variance(&y).sqrt();
        let x_sd = variance(&[0.0, 1.0, 1.0, 0.0]).sqrt();
        assert_abs_diff_eq!(p.prior_sd[0], 2.5 * y_sd, epsilon = 1e-12);
        assert_abs_diff_eq!(p.prior_sd[1], 2.5 * y_sd / x_sd, epsilon = 1e-12);
        assert_abs_diff_eq!(p.sigma_rate, 1.0 / y_sd, epsilon = 1e-12);
        assert_abs_diff_eq!(p.x_means[1], 0.5);
    }

    #[test]
    fn degenerate_scales_fall_back_to_one() {
        let rows = vec![DesignRow(vec![1.0, 0.0, 1.0])];
        let p = RegressionProblem::new(&rows, &[50.0]).unwrap();
        assert_abs_diff_eq!(p.y_scale, 1.0);
        assert_abs_diff_eq!(p.prior_sd[1], 2.5);
        assert_abs_diff_eq!(p.prior_sd[2], 2.5);
    }

    #[test]
    fn raw_conversion_undoes_centring() {
        let (rows, y) = rows();
        let p = RegressionProblem::new(&rows, &y).unwrap();
        let theta = vec![0.5, -2.0, 3.0];
        let raw = p.to_raw(&theta);
        // A row predicts the same on both scales.
        for r in rows.iter() {
            let centred = p.y_mean + theta[0] + theta[1] * (r.0[1] - 0.5) + theta[2] * (r.0[2] - 0.5);
            assert_abs_diff_eq!(dot(&raw, &r.0), centred, epsilon = 1e-9);
        }
    }

    #[test]
    fn slice_sampler_targets_the_density() {
        // Standard normal log density.
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let mut x = 3.0;
        let mut draws = Vec::new();
        for _ in 0..5000 {
            x = slice_step(&mut rng, x, |v| -0.5 * v * v);
            draws.push(x);
        }
        assert!(mean(&draws).abs() < 0.1);
        assert!((variance(&draws) - 1.0).abs() < 0.1);
    }

    #[test]
    fn chains_are_reproducible() {
        let (rows, y) = rows();
        let p = RegressionProblem::new(&rows, &y).unwrap();
        let settings = FitSettings {
            iterations_per_chain: 50,
            warmup_iterations: 10,
            ..FitSettings::DEFAULT_SETTINGS
        };
        let a = run_chain(&p, &settings, 1, None).unwrap();
        let b = run_chain(&p, &settings, 1, None).unwrap();
        let c = run_chain(&p, &settings, 2, None).unwrap();
        assert_eq!(a.len(), 40);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn sigma_stays_above_the_floor_on_a_constant_outcome() {
        let (rows, _) = rows();
        let p = RegressionProblem::new(&rows, &[48.0; 4]).unwrap();
        let floor = SIGMA_FLOOR_RATIO * p.y_scale;
        let settings = FitSettings {
            iterations_per_chain: 500,
            warmup_iterations: 100,
            ..FitSettings::DEFAULT_SETTINGS
        };
        for chain in 0..4 {
            let res = run_chain(&p, &settings, chain, None).unwrap();
            assert!(res.draws[3].iter().all(|s| *s >= floor * (1.0 - 1e-12)));
        }
        let res = run_optimizing(&p, &settings).unwrap();
        assert!(res.draws[3].iter().all(|s| *s >= floor * (1.0 - 1e-12)));
        assert!(res.draws[0].iter().all(|b| (b - 48.0).abs() < 0.01));
    }

    #[test]
    fn expired_deadline_keeps_nothing() {
        let (rows, y) = rows();
        let p = RegressionProblem::new(&rows, &y).unwrap();
        let res = run_chain(&p, &FitSettings::DEFAULT_SETTINGS, 0, Some(Instant::now())).unwrap();
        assert!(res.truncated);
        assert_eq!(res.len(), 0);
    }
}
