// SPDX-License-Identifier: AGPL-3.0-only

//! AXPY data sets

use crate::axpy::AXPY_ID;
use crate::error::{KernelError, Result};
use occamy_runtime::{LaunchParams, SharedBuffer};

/// Inputs of one AXPY problem.
#[derive(Debug, Clone, PartialEq)]
pub struct AxpyData {
    /// Scale factor.
    pub a: f64,
    /// Scaled vector.
    pub x: Vec<f64>,
    /// Offset vector.
    pub y: Vec<f64>,
}

impl AxpyData {
    /// Build a data set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if `x` and `y` differ in length.
    pub fn new(a: f64, x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(KernelError::invalid_data(format!(
                "x has {} elements, y has {}",
                x.len(),
                y.len()
            )));
        }
        Ok(Self { a, x, y })
    }

    /// The four-element reference problem.
    pub fn reference() -> Self {
        Self {
            a: 2.0,
            x: vec![1.0, 2.0, 3.0, 4.0],
            y: vec![10.0, 20.0, 30.0, 40.0],
        }
    }

    /// Pseudo-random problem of `len` elements; equal seeds give equal data.
    pub fn generate(len: usize, seed: u64) -> Self {
        let mut rng = Lcg::new(seed);
        let a = rng.next_f64() * 4.0;
        let x = (0..len).map(|_| rng.next_f64() * 100.0).collect();
        let y = (0..len).map(|_| rng.next_f64() * 100.0).collect();
        Self { a, x, y }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// True for an empty problem.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// `a·x + y`, computed on the host.
    pub fn expected(&self) -> Vec<f64> {
        self.x
            .iter()
            .zip(&self.y)
            .map(|(x, y)| self.a * x + y)
            .collect()
    }

    /// Launch parameters for this problem and the output buffer they write.
    pub fn launch_params(&self) -> (LaunchParams, SharedBuffer) {
        let z = SharedBuffer::zeroed(self.len());
        let params = LaunchParams::new(AXPY_ID, self.len())
            .with_scalar(self.a)
            .with_input(SharedBuffer::from_slice(&self.x))
            .with_input(SharedBuffer::from_slice(&self.y))
            .with_output(z.clone());
        (params, z)
    }
}

/// 64-bit linear congruential generator (Knuth's MMIX constants).
#[derive(Debug, Clone)]
struct Lcg(u64);

impl Lcg {
    const MUL: u64 = 6_364_136_223_846_793_005;
    const INC: u64 = 1_442_695_040_888_963_407;

    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(Self::MUL).wrapping_add(Self::INC);
        self.0
    }

    /// Uniform in `[0, 1)` from the top 53 bits.
    #[allow(clippy::cast_precision_loss)]
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_expectation() {
        assert_eq!(AxpyData::reference().expected(), vec![12.0, 24.0, 36.0, 48.0]);
    }

    #[test]
    fn generation_is_deterministic() {
        let a = AxpyData::generate(64, 42);
        let b = AxpyData::generate(64, 42);
        let c = AxpyData::generate(64, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.x.iter().all(|v| (0.0..100.0).contains(v)));
    }

    #[test]
    fn mismatched_lengths_rejected() {
        assert!(AxpyData::new(1.0, vec![1.0], vec![]).is_err());
    }

    #[test]
    fn params_carry_the_problem() {
        let data = AxpyData::reference();
        let (params, z) = data.launch_params();
        assert_eq!(params.length, 4);
        assert_eq!(params.scalar(0).unwrap(), 2.0);
        assert_eq!(params.input(1).unwrap().to_vec(), data.y);
        assert!(params.output().unwrap().ptr_eq(&z));
    }
}
