use std::ops::Range;

use log::{debug, trace, warn};
use pdhg_core::{GpuDevice, GpuVector, Matrix, PdhgCoreError, Real};

use crate::block::Block;

/// A block-structured linear operator `A` assembled from independent tiles.
///
/// Every global row is written by at least one block and every global column
/// is read by at least one block; block rectangles never intersect. Blocks
/// sharing rows accumulate, so `A` is the sum of its (zero-padded) tiles.
#[derive(Debug)]
pub struct LinearOperator<T: Real> {
    nrows: usize,
    ncols: usize,
    blocks: Vec<Box<dyn Block<T>>>,
    gpu_mem_amount: usize,
}

impl<T: Real> LinearOperator<T> {
    /// Builds an operator whose extents are the furthest block ends.
    pub fn new(blocks: Vec<Box<dyn Block<T>>>) -> Result<Self, PdhgCoreError> {
        let (mut nrows, mut ncols) = (0, 0);
        for (i, block) in blocks.iter().enumerate() {
            let (row_end, col_end) = block_ends(i, block.as_ref())?;
            nrows = nrows.max(row_end);
            ncols = ncols.max(col_end);
        }
        Self::with_dims(nrows, ncols, blocks)
    }

    /// Builds an operator with explicit extents; every block must lie inside them.
    pub fn with_dims(
        nrows: usize,
        ncols: usize,
        blocks: Vec<Box<dyn Block<T>>>,
    ) -> Result<Self, PdhgCoreError> {
        if blocks.is_empty() {
            return Err(PdhgCoreError::EmptyOperator);
        }
        for (i, block) in blocks.iter().enumerate() {
            let (row_end, col_end) = block_ends(i, block.as_ref())?;
            if row_end > nrows || col_end > ncols {
                return Err(PdhgCoreError::InvalidDimensions(format!(
                    "Block {} (rows {:?}, cols {:?}) exceeds operator dims {}x{}",
                    i,
                    block.rows(),
                    block.cols(),
                    nrows,
                    ncols
                )));
            }
        }
        check_disjoint(&blocks)?;
        if let Some(row) = first_uncovered(nrows, blocks.iter().map(|b| b.rows())) {
            return Err(PdhgCoreError::RowGap(row));
        }
        if let Some(col) = first_uncovered(ncols, blocks.iter().map(|b| b.cols())) {
            return Err(PdhgCoreError::ColumnGap(col));
        }

        let gpu_mem_amount = blocks.iter().map(|b| b.gpu_mem_amount()).sum();
        debug!(
            "LinearOperator {}x{} with {} blocks, {} bytes auxiliary device memory",
            nrows,
            ncols,
            blocks.len(),
            gpu_mem_amount
        );
        Ok(Self {
            nrows,
            ncols,
            blocks,
            gpu_mem_amount,
        })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn blocks(&self) -> &[Box<dyn Block<T>>] {
        &self.blocks
    }

    /// Auxiliary device memory of all blocks, in bytes.
    pub fn gpu_mem_amount(&self) -> usize {
        self.gpu_mem_amount
    }

    /// `Σ_j |A[row, j]|^alpha`.
    pub fn row_sum(&self, row: usize, alpha: T) -> T {
        self.blocks
            .iter()
            .fold(T::zero(), |acc, b| acc + b.row_sum(row, alpha))
    }

    /// `Σ_i |A[i, col]|^alpha`.
    pub fn col_sum(&self, col: usize, alpha: T) -> T {
        self.blocks
            .iter()
            .fold(T::zero(), |acc, b| acc + b.col_sum(col, alpha))
    }

    /// `result = A * rhs` on the host.
    pub fn eval_host(&self, result: &mut [T], rhs: &[T]) -> Result<(), PdhgCoreError> {
        check_len("result", result.len(), self.nrows)?;
        check_len("rhs", rhs.len(), self.ncols)?;
        result.fill(T::zero());
        for block in &self.blocks {
            block.eval_local_add_host(&mut result[block.rows()], &rhs[block.cols()]);
        }
        Ok(())
    }

    /// `result = Aᵗ * rhs` on the host.
    pub fn eval_adjoint_host(&self, result: &mut [T], rhs: &[T]) -> Result<(), PdhgCoreError> {
        check_len("result", result.len(), self.ncols)?;
        check_len("rhs", rhs.len(), self.nrows)?;
        result.fill(T::zero());
        for block in &self.blocks {
            block.eval_adjoint_local_add_host(&mut result[block.cols()], &rhs[block.rows()]);
        }
        Ok(())
    }

    /// Records and submits `result = A * rhs`.
    ///
    /// The result is visible once `result.read_contents()` resolves.
    pub fn eval(
        &self,
        device: &GpuDevice,
        result: &mut GpuVector<T>,
        rhs: &GpuVector<T>,
    ) -> Result<(), PdhgCoreError> {
        check_len("result", result.size(), self.nrows)?;
        check_len("rhs", rhs.size(), self.ncols)?;
        let mut encoder = device.create_command_encoder("LinearOperator::eval");
        device.clear_vector(&mut encoder, result)?;
        for block in &self.blocks {
            block.eval_local_add(
                device,
                &mut encoder,
                result.range_mut(block.row(), block.nrows())?,
                rhs.range(block.col(), block.ncols())?,
            )?;
        }
        device.submit(encoder);
        trace!("Submitted forward evaluation of {} blocks", self.blocks.len());
        Ok(())
    }

    /// Records and submits `result = Aᵗ * rhs`.
    pub fn eval_adjoint(
        &self,
        device: &GpuDevice,
        result: &mut GpuVector<T>,
        rhs: &GpuVector<T>,
    ) -> Result<(), PdhgCoreError> {
        check_len("result", result.size(), self.ncols)?;
        check_len("rhs", rhs.size(), self.nrows)?;
        let mut encoder = device.create_command_encoder("LinearOperator::eval_adjoint");
        device.clear_vector(&mut encoder, result)?;
        for block in &self.blocks {
            block.eval_adjoint_local_add(
                device,
                &mut encoder,
                result.range_mut(block.col(), block.ncols())?,
                rhs.range(block.row(), block.nrows())?,
            )?;
        }
        device.submit(encoder);
        trace!("Submitted adjoint evaluation of {} blocks", self.blocks.len());
        Ok(())
    }

    /// Checks the memory footprint against the device budget and compiles every kernel.
    pub fn prepare(&self, device: &GpuDevice) -> Result<(), PdhgCoreError> {
        device.check_memory(self.gpu_mem_amount as u64)?;
        for block in &self.blocks {
            block.prepare(device)?;
        }
        debug!("Prepared {} blocks", self.blocks.len());
        Ok(())
    }

    /// Estimates `‖A‖₂` by power iteration on `AᵗA` over the host path.
    ///
    /// Stops when the relative change of the estimate drops below `tol` or
    /// after `max_iters` iterations.
    pub fn normest_host(&self, tol: T, max_iters: usize) -> Result<T, PdhgCoreError> {
        if !(tol > T::zero()) || max_iters == 0 {
            return Err(PdhgCoreError::InvalidParameter(format!(
                "normest needs tol > 0 and max_iters > 0, got {:?} and {}",
                tol, max_iters
            )));
        }
        let mut rng = fastrand::Rng::with_seed(0x5eed);
        let mut x: Vec<T> = (0..self.ncols)
            .map(|_| num_traits::cast(rng.f64()).unwrap_or_else(T::one))
            .collect();
        let mut ax = vec![T::zero(); self.nrows];
        let mut atax = vec![T::zero(); self.ncols];

        let mut norm = l2_norm(&x);
        scale(&mut x, norm);
        let mut estimate = T::zero();
        for iter in 0..max_iters {
            self.eval_host(&mut ax, &x)?;
            self.eval_adjoint_host(&mut atax, &ax)?;
            norm = l2_norm(&atax);
            if norm == T::zero() {
                return Ok(T::zero());
            }
            let next = norm.sqrt();
            std::mem::swap(&mut x, &mut atax);
            scale(&mut x, norm);
            if (next - estimate).abs() <= tol * next {
                trace!("normest converged after {} iterations: {:?}", iter + 1, next);
                return Ok(next);
            }
            estimate = next;
        }
        warn!(
            "normest did not converge in {} iterations, returning {:?}",
            max_iters, estimate
        );
        Ok(estimate)
    }
}

impl<T: Real> Matrix for LinearOperator<T> {
    type Value = T;

    fn dims(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }
}

fn check_len(what: &str, actual: usize, expected: usize) -> Result<(), PdhgCoreError> {
    if actual != expected {
        return Err(PdhgCoreError::InvalidDimensions(format!(
            "{} has length {}, operator expects {}",
            what, actual, expected
        )));
    }
    Ok(())
}

fn intersects(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn check_disjoint<T: Real>(blocks: &[Box<dyn Block<T>>]) -> Result<(), PdhgCoreError> {
    for (i, a) in blocks.iter().enumerate() {
        for (j, b) in blocks.iter().enumerate().skip(i + 1) {
            if intersects(&a.rows(), &b.rows()) && intersects(&a.cols(), &b.cols()) {
                return Err(PdhgCoreError::BlockOverlap {
                    first: i,
                    first_rows: a.rows(),
                    first_cols: a.cols(),
                    second: j,
                    second_rows: b.rows(),
                    second_cols: b.cols(),
                });
            }
        }
    }
    Ok(())
}

/// First index in `[0, extent)` no range covers.
fn first_uncovered(extent: usize, ranges: impl Iterator<Item = Range<usize>>) -> Option<usize> {
    let mut ranges: Vec<_> = ranges.collect();
    ranges.sort_by_key(|r| r.start);
    let mut covered = 0;
    for r in ranges {
        if r.start > covered {
            return Some(covered);
        }
        covered = covered.max(r.end);
    }
    (covered < extent).then_some(covered)
}

fn l2_norm<T: Real>(v: &[T]) -> T {
    v.iter().fold(T::zero(), |acc, &x| acc + x * x).sqrt()
}

fn scale<T: Real>(v: &mut [T], norm: T) {
    if norm > T::zero() {
        for x in v.iter_mut() {
            *x = *x / norm;
        }
    }
}

// `(row + nrows, col + ncols)`, rejecting placements past `usize::MAX`.
fn block_ends<T: Real>(i: usize, block: &dyn Block<T>) -> Result<(usize, usize), PdhgCoreError> {
    let row_end = block.row().checked_add(block.nrows());
    let col_end = block.col().checked_add(block.ncols());
    match (row_end, col_end) {
        (Some(row_end), Some(col_end)) => Ok((row_end, col_end)),
        _ => Err(PdhgCoreError::InvalidDimensions(format!(
            "Block {} at ({}, {}) with extent {}x{} overflows the index range",
            i,
            block.row(),
            block.col(),
            block.nrows(),
            block.ncols()
        ))),
    }
}
