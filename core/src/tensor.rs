//! Minimal tensor utilities for the spectral autoencoder.
//!
//! All operations are free functions on flat f32 slices with explicit
//! dimensions. No generics, no traits on buffers — row-major layout
//! throughout.

/// Matrix multiply: C[M,N] = A[M,K] @ B[K,N].  Row-major.
/// `out` must be pre-allocated with M*N elements (will be overwritten).
pub fn matmul_f32(a: &[f32], b: &[f32], out: &mut [f32], m: usize, k: usize, n: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    debug_assert_eq!(out.len(), m * n);

    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f32;
            for p in 0..k {
                sum += a[i * k + p] * b[p * n + j];
            }
            out[i * n + j] = sum;
        }
    }
}

/// Transpose A[M,K] → out[K,M].
pub fn transpose_f32(a: &[f32], out: &mut [f32], m: usize, k: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(out.len(), k * m);

    for i in 0..m {
        for j in 0..k {
            out[j * m + i] = a[i * k + j];
        }
    }
}

/// Add a bias row to every row of X[rows, cols] in place.
pub fn add_bias_f32(x: &mut [f32], bias: &[f32], rows: usize, cols: usize) {
    debug_assert_eq!(x.len(), rows * cols);
    debug_assert_eq!(bias.len(), cols);

    for r in 0..rows {
        let base = r * cols;
        for c in 0..cols {
            x[base + c] += bias[c];
        }
    }
}

/// ReLU in place: x[i] = max(x[i], 0).
pub fn relu_f32(x: &mut [f32]) {
    for v in x.iter_mut() {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
}

/// Mean squared error over all elements of two equal-length buffers.
pub fn mse_f32(pred: &[f32], target: &[f32]) -> f32 {
    debug_assert_eq!(pred.len(), target.len());
    if pred.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0f32;
    for i in 0..pred.len() {
        let d = pred[i] - target[i];
        sum += d * d;
    }
    sum / pred.len() as f32
}

/// Sum of squares of a buffer. Building block for the L2 penalty and
/// global-norm clipping.
pub fn sum_squares_f32(a: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for &v in a {
        sum += v * v;
    }
    sum
}

/// Simple xorshift64 PRNG for deterministic init, shuffling, and dropout.
/// Not crypto-safe.
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        SimpleRng { state: seed.max(1) } // avoid zero state
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Uniform in [0, 1).
    pub fn uniform01(&mut self) -> f32 {
        ((self.next_u64() >> 11) as f64 / (1u64 << 53) as f64) as f32
    }

    /// Standard normal via Box–Muller. One draw per call; the second
    /// Box–Muller value is discarded for simplicity.
    pub fn normal(&mut self) -> f32 {
        let mut u1 = self.uniform01();
        if u1 < 1e-12 {
            u1 = 1e-12;
        }
        let u2 = self.uniform01();
        let r = (-2.0 * (u1 as f64).ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2 as f64;
        (r * theta.cos()) as f32
    }

    /// Fill slice with N(0, std²) values. He-normal init uses
    /// std = sqrt(2 / fan_in).
    pub fn fill_normal(&mut self, buf: &mut [f32], std: f32) {
        for v in buf.iter_mut() {
            *v = self.normal() * std;
        }
    }

    /// Uniform index in [0, n).
    pub fn index_below(&mut self, n: usize) -> usize {
        debug_assert!(n > 0);
        (self.next_u64() % n as u64) as usize
    }

    /// Fresh random permutation of 0..n (Fisher–Yates).
    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        let mut perm: Vec<usize> = (0..n).collect();
        for i in (1..n).rev() {
            let j = self.index_below(i + 1);
            perm.swap(i, j);
        }
        perm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matmul_identity() {
        let a = [1.0, 0.0, 0.0, 1.0f32];
        let b = [1.0, 2.0, 3.0, 4.0f32];
        let mut out = [0.0f32; 4];
        matmul_f32(&a, &b, &mut out, 2, 2, 2);
        assert_eq!(out, b);
    }

    #[test]
    fn test_matmul_2x3_3x2() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0f32];
        let b = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0f32];
        let mut out = [0.0f32; 4];
        matmul_f32(&a, &b, &mut out, 2, 3, 2);
        assert_eq!(out, [58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_transpose() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0f32];
        let mut out = [0.0f32; 6];
        transpose_f32(&a, &mut out, 2, 3);
        assert_eq!(out, [1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_add_bias() {
        let mut x = [1.0, 2.0, 3.0, 4.0f32];
        add_bias_f32(&mut x, &[10.0, 20.0], 2, 2);
        assert_eq!(x, [11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn test_relu() {
        let mut x = [-1.0, 0.0, 2.5f32];
        relu_f32(&mut x);
        assert_eq!(x, [0.0, 0.0, 2.5]);
    }

    #[test]
    fn test_mse_zero_for_equal() {
        let a = [1.0, -2.0, 3.0f32];
        assert_eq!(mse_f32(&a, &a), 0.0);
    }

    #[test]
    fn test_mse_known_value() {
        let pred = [1.0, 2.0f32];
        let target = [0.0, 0.0f32];
        // (1 + 4) / 2 = 2.5
        assert!((mse_f32(&pred, &target) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_sum_squares() {
        let a = [3.0, 4.0f32];
        assert!((sum_squares_f32(&a) - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_rng_deterministic() {
        let mut rng1 = SimpleRng::new(42);
        let mut rng2 = SimpleRng::new(42);
        for _ in 0..100 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_uniform01_range() {
        let mut rng = SimpleRng::new(7);
        for _ in 0..1000 {
            let u = rng.uniform01();
            assert!((0.0..1.0).contains(&u), "uniform01 out of range: {u}");
        }
    }

    #[test]
    fn test_normal_moments() {
        let mut rng = SimpleRng::new(123);
        let n = 20_000;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for _ in 0..n {
            let x = rng.normal() as f64;
            sum += x;
            sum_sq += x * x;
        }
        let mean = sum / n as f64;
        let var = sum_sq / n as f64 - mean * mean;
        assert!(mean.abs() < 0.05, "normal mean too far from 0: {mean}");
        assert!((var - 1.0).abs() < 0.1, "normal variance too far from 1: {var}");
    }

    #[test]
    fn test_permutation_is_bijection() {
        let mut rng = SimpleRng::new(9);
        let perm = rng.permutation(100);
        let mut seen = vec![false; 100];
        for &p in &perm {
            assert!(!seen[p], "index {p} repeated in permutation");
            seen[p] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_permutation_differs_across_draws() {
        let mut rng = SimpleRng::new(11);
        let a = rng.permutation(50);
        let b = rng.permutation(50);
        assert_ne!(a, b, "two fresh permutations should almost surely differ");
    }
}
