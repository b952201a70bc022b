// SPDX-License-Identifier: AGPL-3.0-only

//! AXPY: `z = a·x + y`
//!
//! | Argument | Slot |
//! |----------|------|
//! | `a` | scalar 0 |
//! | `x` | input 0 |
//! | `y` | input 1 |
//! | `z` | output |

use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use occamy_runtime::{LaunchParams, SharedBuffer};
use std::ops::Range;

/// Kernel id of [`Axpy`].
pub const AXPY_ID: u32 = 1;

/// The AXPY kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Axpy;

impl Axpy {
    fn check_len(argument: &'static str, buffer: &SharedBuffer, needed: usize) -> Result<()> {
        if buffer.len() < needed {
            return Err(KernelError::ShortBuffer {
                kernel: "axpy",
                argument,
                len: buffer.len(),
                needed,
            });
        }
        Ok(())
    }
}

impl Kernel for Axpy {
    fn id(&self) -> u32 {
        AXPY_ID
    }

    fn name(&self) -> &'static str {
        "axpy"
    }

    fn validate(&self, params: &LaunchParams) -> Result<()> {
        params.scalar(0)?;
        Self::check_len("x", params.input(0)?, params.length)?;
        Self::check_len("y", params.input(1)?, params.length)?;
        Self::check_len("z", params.output()?, params.length)?;
        Ok(())
    }

    fn run(&self, params: &LaunchParams, range: Range<usize>) -> Result<()> {
        if range.end > params.length {
            return Err(KernelError::RangeOutOfBounds {
                kernel: "axpy",
                start: range.start,
                end: range.end,
                len: params.length,
            });
        }
        self.validate(params)?;

        let a = params.scalar(0)?;
        let (x, y, z) = (params.input(0)?, params.input(1)?, params.output()?);
        for i in range {
            // lengths checked in validate
            let (xi, yi) = (x.get(i).unwrap_or_default(), y.get(i).unwrap_or_default());
            z.set(i, a * xi + yi)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(len: usize) -> (LaunchParams, SharedBuffer) {
        let z = SharedBuffer::zeroed(len);
        let p = LaunchParams::new(AXPY_ID, len)
            .with_scalar(2.0)
            .with_input(SharedBuffer::from_slice(&[1.0, 2.0, 3.0, 4.0][..len]))
            .with_input(SharedBuffer::from_slice(&[10.0, 20.0, 30.0, 40.0][..len]))
            .with_output(z.clone());
        (p, z)
    }

    #[test]
    fn computes_reference_vector() {
        let (p, z) = params(4);
        Axpy.run(&p, 0..4).unwrap();
        assert_eq!(z.to_vec(), vec![12.0, 24.0, 36.0, 48.0]);
    }

    #[test]
    fn partial_range_touches_only_its_elements() {
        let (p, z) = params(4);
        Axpy.run(&p, 2..4).unwrap();
        assert_eq!(z.to_vec(), vec![0.0, 0.0, 36.0, 48.0]);
    }

    #[test]
    fn rejects_short_and_missing_arguments() {
        let (p, _) = params(4);
        let mut long = p.clone();
        long.length = 5;
        assert!(matches!(Axpy.validate(&long), Err(KernelError::ShortBuffer { .. })));
        assert!(matches!(Axpy.run(&p, 3..5), Err(KernelError::RangeOutOfBounds { .. })));

        let bare = LaunchParams::new(AXPY_ID, 4);
        assert!(matches!(Axpy.validate(&bare), Err(KernelError::Runtime(_))));
    }
}
