//! Mask combination.
//!
//! ASL acquisitions often need a brain mask cut below the neck: the scanner's
//! binary mask is intersected with a thresholded probabilistic tissue map.
//!
//! Output invariant: every voxel is exactly 0 or 1, and a voxel is 1 iff the
//! probabilistic mask exceeds the threshold *and* the binary mask is nonzero.

use ndarray::{Array3, Zip};

use crate::error::AppError;
use crate::io::volume::{check_same_grid, Volume3};

/// Intersect a binary mask with a thresholded probabilistic mask.
pub fn combine_masks(
    binary: &Volume3,
    probabilistic: &Volume3,
    threshold: f64,
) -> Result<Array3<u8>, AppError> {
    if !(threshold.is_finite() && (0.0..=1.0).contains(&threshold)) {
        return Err(AppError::input(format!(
            "Mask threshold {threshold} must be in [0, 1]."
        )));
    }
    check_same_grid(binary, probabilistic, "binary and probabilistic masks")?;

    let dim = binary.data.raw_dim();
    let mut out = Array3::<u8>::zeros(dim);
    Zip::from(&mut out)
        .and(&binary.data)
        .and(&probabilistic.data)
        .for_each(|o, &b, &p| {
            *o = u8::from(p > threshold && b != 0.0);
        });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix4;
    use nifti::NiftiHeader;

    fn volume(data: Array3<f64>) -> Volume3 {
        Volume3 {
            data,
            affine: Matrix4::identity(),
            header: NiftiHeader::default(),
        }
    }

    #[test]
    fn output_matches_binary_mask_where_probability_exceeds_threshold() {
        let mut binary = Array3::zeros((2, 2, 1));
        binary[[0, 0, 0]] = 1.0;
        binary[[0, 1, 0]] = 1.0;
        binary[[1, 0, 0]] = 0.0;
        binary[[1, 1, 0]] = 1.0;

        let mut prob = Array3::zeros((2, 2, 1));
        prob[[0, 0, 0]] = 0.9; // in: both pass
        prob[[0, 1, 0]] = 0.2; // out: probability too low
        prob[[1, 0, 0]] = 0.9; // out: binary is zero
        prob[[1, 1, 0]] = 0.5; // out: not strictly above threshold

        let out = combine_masks(&volume(binary), &volume(prob), 0.5).unwrap();
        assert_eq!(out[[0, 0, 0]], 1);
        assert_eq!(out[[0, 1, 0]], 0);
        assert_eq!(out[[1, 0, 0]], 0);
        assert_eq!(out[[1, 1, 0]], 0);
    }

    #[test]
    fn output_is_strictly_binary() {
        let binary = Array3::from_elem((3, 3, 3), 2.0);
        let prob = Array3::from_elem((3, 3, 3), 0.8);
        let out = combine_masks(&volume(binary), &volume(prob), 0.5).unwrap();
        assert!(out.iter().all(|&v| v == 1));
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let binary = volume(Array3::zeros((2, 2, 2)));
        let prob = volume(Array3::zeros((2, 2, 3)));
        assert!(combine_masks(&binary, &prob, 0.5).is_err());
    }

    #[test]
    fn mismatched_affines_are_rejected() {
        let binary = volume(Array3::from_elem((2, 2, 2), 1.0));
        let mut prob = volume(Array3::from_elem((2, 2, 2), 0.9));
        prob.affine[(0, 3)] = 5.0;
        assert!(combine_masks(&binary, &prob, 0.5).is_err());
    }

    #[test]
    fn out_of_range_threshold_is_an_input_error() {
        let binary = volume(Array3::zeros((2, 2, 2)));
        let prob = volume(Array3::zeros((2, 2, 2)));
        let err = combine_masks(&binary, &prob, 1.5).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
