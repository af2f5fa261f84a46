// src/utils/candle.rs
use anyhow::{Context, Result as AnyhowResult};
use candle_core::{Device, Tensor};
use once_cell::sync::Lazy;

pub static CANDLE_DEVICE: Lazy<Device> = Lazy::new(|| match Device::new_metal(0) {
    Ok(metal_device) if metal_device.is_metal() => {
        log::info!("Successfully initialized Candle Metal device (GPU).");
        metal_device
    }
    Ok(_) => {
        log::warn!("Device::new_metal(0) succeeded but device.is_metal() is false. Using CPU.");
        Device::Cpu
    }
    Err(err) => {
        log::debug!(
            "Candle Metal device unavailable: {:?}. Falling back to CPU device.",
            err
        );
        Device::Cpu
    }
});

/// Packs row vectors of equal length `dim` into an `(n, dim)` matrix on the shared device.
pub fn stack_rows(rows: &[Vec<f32>], dim: usize) -> AnyhowResult<Tensor> {
    let mut flat = Vec::with_capacity(rows.len() * dim);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != dim {
            return Err(anyhow::anyhow!(
                "Row {} has length {}, expected {}",
                i,
                row.len(),
                dim
            ));
        }
        flat.extend_from_slice(row);
    }
    Tensor::from_vec(flat, (rows.len(), dim), &CANDLE_DEVICE)
        .with_context(|| format!("Failed to build ({}, {}) matrix", rows.len(), dim))
}

/// Inner product of `query` with every row of `matrix`.
pub fn inner_products(matrix: &Tensor, query: &[f32]) -> AnyhowResult<Vec<f32>> {
    let (rows, dim) = matrix.dims2().context("Matrix must be two-dimensional")?;
    if query.len() != dim {
        return Err(anyhow::anyhow!(
            "Query length {} does not match matrix width {}",
            query.len(),
            dim
        ));
    }
    if rows == 0 {
        return Ok(Vec::new());
    }
    let q = Tensor::from_slice(query, (dim, 1), matrix.device())
        .context("Failed to create query tensor")?;
    matrix
        .matmul(&q)
        .and_then(|t| t.squeeze(1))
        .and_then(|t| t.to_vec1::<f32>())
        .context("Batch inner product failed")
}

/// Inner product of `query` with the selected rows of `matrix`, in `rows` order.
pub fn selected_inner_products(matrix: &Tensor, rows: &[u32], query: &[f32]) -> AnyhowResult<Vec<f32>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let indexes = Tensor::new(rows, matrix.device()).context("Failed to create row index tensor")?;
    let selected = matrix
        .index_select(&indexes, 0)
        .with_context(|| format!("Failed to select {} rows", rows.len()))?;
    inner_products(&selected, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_products() {
        let matrix = stack_rows(&[vec![1.0, 0.0], vec![0.6, 0.8], vec![0.0, 1.0]], 2).unwrap();
        let scores = inner_products(&matrix, &[0.0, 1.0]).unwrap();
        assert_eq!(scores.len(), 3);
        assert!((scores[0] - 0.0).abs() < 1e-6);
        assert!((scores[1] - 0.8).abs() < 1e-6);
        assert!((scores[2] - 1.0).abs() < 1e-6);
        assert!(inner_products(&matrix, &[1.0]).is_err());
    }

    #[test]
    fn test_selected_inner_products_follow_row_order() {
        let matrix = stack_rows(&[vec![1.0, 0.0], vec![0.6, 0.8], vec![0.0, 1.0]], 2).unwrap();
        let scores = selected_inner_products(&matrix, &[2, 0], &[0.0, 1.0]).unwrap();
        assert_eq!(scores.len(), 2);
        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert!(scores[1].abs() < 1e-6);
        assert!(selected_inner_products(&matrix, &[], &[0.0, 1.0]).unwrap().is_empty());
    }

    #[test]
    fn test_stack_rows_rejects_ragged() {
        assert!(stack_rows(&[vec![1.0, 0.0], vec![1.0]], 2).is_err());
    }
}
