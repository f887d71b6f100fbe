//! NIfTI volume load/save and voxel-grid compatibility checks.
//!
//! Volumes are converted to `f64` ndarrays on load (`.nii` and `.nii.gz` both
//! work). The affine is taken from the sform rows when set, otherwise from the
//! voxel sizes, and is used only for grid-compatibility checks; writing always
//! goes through a reference header so orientation metadata survives untouched.

use std::path::Path;

use nalgebra::Matrix4;
use ndarray::{ArrayD, Axis, Ix3, Ix4};
use nifti::writer::WriterOptions;
use nifti::{InMemNiftiObject, IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::error::AppError;

/// Absolute tolerance for affine equality.
pub const AFFINE_TOL: f64 = 1e-6;

/// A 3-D volume with its header and affine.
#[derive(Debug, Clone)]
pub struct Volume3 {
    pub data: ndarray::Array3<f64>,
    pub affine: Matrix4<f64>,
    pub header: NiftiHeader,
}

/// A 4-D series with its header and affine.
#[derive(Debug, Clone)]
pub struct Volume4 {
    pub data: ndarray::Array4<f64>,
    pub affine: Matrix4<f64>,
    pub header: NiftiHeader,
}

impl Volume4 {
    pub fn nscans(&self) -> usize {
        self.data.len_of(Axis(3))
    }
}

/// Voxel-to-world affine from a header: sform rows when set, else voxel sizes.
pub fn header_affine(header: &NiftiHeader) -> Matrix4<f64> {
    if header.sform_code > 0 {
        let x = &header.srow_x;
        let y = &header.srow_y;
        let z = &header.srow_z;
        Matrix4::new(
            x[0] as f64, x[1] as f64, x[2] as f64, x[3] as f64,
            y[0] as f64, y[1] as f64, y[2] as f64, y[3] as f64,
            z[0] as f64, z[1] as f64, z[2] as f64, z[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        )
    } else {
        let mut m = Matrix4::identity();
        m[(0, 0)] = header.pixdim[1] as f64;
        m[(1, 1)] = header.pixdim[2] as f64;
        m[(2, 2)] = header.pixdim[3] as f64;
        m
    }
}

/// Whether two affines agree within `AFFINE_TOL`.
pub fn affines_match(a: &Matrix4<f64>, b: &Matrix4<f64>) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= AFFINE_TOL)
}

fn load_object(path: &Path) -> Result<InMemNiftiObject, AppError> {
    ReaderOptions::new()
        .read_file(path)
        .map_err(|e| AppError::input(format!("Failed to read NIfTI '{}': {e}", path.display())))
}

/// Drop trailing singleton axes down to `ndim` dimensions.
fn squeeze_to(mut data: ArrayD<f64>, ndim: usize) -> ArrayD<f64> {
    while data.ndim() > ndim && data.shape()[data.ndim() - 1] == 1 {
        let last = data.ndim() - 1;
        data = data.index_axis_move(Axis(last), 0);
    }
    data
}

/// Load a 3-D volume (trailing singleton dimensions are squeezed).
pub fn load_volume3(path: &Path) -> Result<Volume3, AppError> {
    let obj = load_object(path)?;
    let header = obj.header().clone();
    let affine = header_affine(&header);

    let data = obj
        .into_volume()
        .into_ndarray::<f64>()
        .map_err(|e| AppError::input(format!("Failed to decode '{}': {e}", path.display())))?;
    let data = squeeze_to(data, 3);
    let data = data.into_dimensionality::<Ix3>().map_err(|_| {
        AppError::data(format!("'{}' is not a 3-D volume.", path.display()))
    })?;

    Ok(Volume3 { data, affine, header })
}

/// Load a 4-D series (trailing singleton dimensions beyond 4 are squeezed).
pub fn load_volume4(path: &Path) -> Result<Volume4, AppError> {
    let obj = load_object(path)?;
    let header = obj.header().clone();
    let affine = header_affine(&header);

    let data = obj
        .into_volume()
        .into_ndarray::<f64>()
        .map_err(|e| AppError::input(format!("Failed to decode '{}': {e}", path.display())))?;
    let data = squeeze_to(data, 4);
    let data = data.into_dimensionality::<Ix4>().map_err(|_| {
        AppError::data(format!("'{}' is not a 4-D series.", path.display()))
    })?;

    Ok(Volume4 { data, affine, header })
}

fn save_err(path: &Path) -> impl Fn(nifti::NiftiError) -> AppError + '_ {
    move |e| AppError::input(format!("Failed to write NIfTI '{}': {e}", path.display()))
}

/// Write a 3-D volume, inheriting orientation metadata from `reference`.
pub fn save_volume3(
    path: &Path,
    data: &ndarray::Array3<f64>,
    reference: &NiftiHeader,
) -> Result<(), AppError> {
    WriterOptions::new(path)
        .reference_header(reference)
        .write_nifti(data)
        .map_err(save_err(path))
}

/// Write a 4-D series, inheriting orientation metadata from `reference`.
pub fn save_volume4(
    path: &Path,
    data: &ndarray::Array4<f64>,
    reference: &NiftiHeader,
) -> Result<(), AppError> {
    WriterOptions::new(path)
        .reference_header(reference)
        .write_nifti(data)
        .map_err(save_err(path))
}

/// Write a binary mask, inheriting orientation metadata from `reference`.
pub fn save_mask(
    path: &Path,
    data: &ndarray::Array3<u8>,
    reference: &NiftiHeader,
) -> Result<(), AppError> {
    WriterOptions::new(path)
        .reference_header(reference)
        .write_nifti(data)
        .map_err(save_err(path))
}

/// Check that a mask volume sits on the same grid as a 4-D series.
pub fn check_mask_grid(series: &Volume4, mask: &Volume3) -> Result<(), AppError> {
    let s = series.data.shape();
    let m = mask.data.shape();
    if s[..3] != m[..3] {
        return Err(AppError::data(format!(
            "Series grid {:?} does not match mask grid {:?}.",
            &s[..3],
            m
        )));
    }
    if !affines_match(&series.affine, &mask.affine) {
        return Err(AppError::data("Series and mask have different affines."));
    }
    Ok(())
}

/// Check that two 3-D volumes share shape and affine.
pub fn check_same_grid(a: &Volume3, b: &Volume3, what: &str) -> Result<(), AppError> {
    if a.data.shape() != b.data.shape() {
        return Err(AppError::data(format!(
            "{what} have different shapes: {:?} vs {:?}.",
            a.data.shape(),
            b.data.shape()
        )));
    }
    if !affines_match(&a.affine, &b.affine) {
        return Err(AppError::data(format!("{what} have different affines.")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn volume_with_affine(affine: Matrix4<f64>) -> Volume3 {
        Volume3 {
            data: Array3::zeros((4, 4, 4)),
            affine,
            header: NiftiHeader::default(),
        }
    }

    #[test]
    fn identity_affines_match() {
        let a = volume_with_affine(Matrix4::identity());
        let b = volume_with_affine(Matrix4::identity());
        assert!(check_same_grid(&a, &b, "masks").is_ok());
    }

    #[test]
    fn affine_mismatch_is_a_data_error() {
        let a = volume_with_affine(Matrix4::identity());
        let mut m = Matrix4::identity();
        m[(0, 3)] = 2.0;
        let b = volume_with_affine(m);
        let err = check_same_grid(&a, &b, "masks").unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn shape_mismatch_is_a_data_error() {
        let a = volume_with_affine(Matrix4::identity());
        let b = Volume3 {
            data: Array3::zeros((4, 4, 5)),
            affine: Matrix4::identity(),
            header: NiftiHeader::default(),
        };
        assert!(check_same_grid(&a, &b, "masks").is_err());
    }

    #[test]
    fn header_affine_falls_back_to_voxel_sizes() {
        let mut header = NiftiHeader::default();
        header.sform_code = 0;
        header.pixdim = [1.0, 2.0, 3.0, 4.0, 0.0, 0.0, 0.0, 0.0];
        let m = header_affine(&header);
        assert!((m[(0, 0)] - 2.0).abs() < 1e-12);
        assert!((m[(1, 1)] - 3.0).abs() < 1e-12);
        assert!((m[(2, 2)] - 4.0).abs() < 1e-12);
        assert!((m[(3, 3)] - 1.0).abs() < 1e-12);
    }
}
