use nalgebra::DMatrix;
use ndarray::{Array, Array1, Array2, ArrayView, ArrayView1, Axis, RemoveAxis};

use crate::error::{KernelError, Result};

/// Composite trapezoidal rule along `axis`. Uses the grid `x` when given, else a uniform step `dx`.
pub fn trapz<D>(
    y: ArrayView<'_, f64, D>,
    x: Option<ArrayView1<'_, f64>>,
    dx: f64,
    axis: Axis,
) -> Result<Array<f64, D::Smaller>>
where
    D: RemoveAxis,
{
    if axis.index() >= y.ndim() {
        return Err(KernelError::configuration(
            "trapz",
            format!("axis {} out of range for {}-d input", axis.index(), y.ndim()),
        ));
    }
    let len = y.len_of(axis);
    if let Some(grid) = x.as_ref() {
        if grid.len() != len {
            return Err(KernelError::shape(
                "trapz grid",
                format!("{len} samples"),
                format!("{} samples", grid.len()),
            ));
        }
    }

    let mut out = Array::zeros(y.raw_dim().remove_axis(axis));
    for i in 1..len {
        let step = match x.as_ref() {
            Some(grid) => grid[i] - grid[i - 1],
            None => dx,
        };
        let left = y.index_axis(axis, i - 1);
        let right = y.index_axis(axis, i);
        out.zip_mut_with(&left, |acc, l| *acc += 0.5 * step * l);
        out.zip_mut_with(&right, |acc, r| *acc += 0.5 * step * r);
    }
    Ok(out)
}

/// `num` values `base^e` with exponents evenly spaced over `[start, stop]`.
pub fn logspace(start: f64, stop: f64, num: usize, base: f64) -> Array1<f64> {
    match num {
        0 => Array1::zeros(0),
        1 => Array1::from_elem(1, base.powf(start)),
        _ => Array1::linspace(start, stop, num).mapv(|e| base.powf(e)),
    }
}

/// Copy of `array` with position `index` replaced by `value`.
pub fn set_value(array: &Array1<f64>, index: usize, value: f64) -> Result<Array1<f64>> {
    if index >= array.len() {
        return Err(KernelError::shape(
            "set_value",
            format!("index below {}", array.len()),
            index,
        ));
    }
    let mut updated = array.clone();
    updated[index] = value;
    Ok(updated)
}

pub fn array_to_dmatrix(array: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = array.dim();
    DMatrix::from_fn(rows, cols, |i, j| array[(i, j)])
}

pub fn dmatrix_to_array(matrix: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((matrix.nrows(), matrix.ncols()), |(i, j)| matrix[(i, j)])
}
