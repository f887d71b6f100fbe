//! Figure rendering.
//!
//! Responsibilities:
//!
//! - slice extraction from volumes
//! - statistic overlays on anatomy (colormapped through a shared window)
//! - palette bars, design-matrix rasters, automatic border cropping
//! - kernel charts (`kernels`)

pub mod colormap;
pub mod kernels;

pub use colormap::*;
pub use kernels::*;

use std::path::Path;

use image::{Rgb, RgbImage};
use ndarray::{Array2, Array3, Axis};

use crate::domain::{DesignMatrix, FigureFormat, SliceAxis};
use crate::error::AppError;

/// Extract a 2-D plane from a volume along a display axis.
pub fn extract_slice(data: &Array3<f64>, axis: SliceAxis, index: usize) -> Result<Array2<f64>, AppError> {
    let ax = axis.to_index();
    let len = data.len_of(Axis(ax));
    if index >= len {
        return Err(AppError::input(format!(
            "Slice index {index} out of range for {axis:?} axis of length {len}."
        )));
    }
    Ok(data.index_axis(Axis(ax), index).to_owned())
}

/// Render a statistic slice over an anatomical slice.
///
/// Anatomy is normalized to its own range and drawn in grayscale; functional
/// values are colormapped wherever the mask is positive (or wherever the map
/// is nonzero when no mask is given). `zoom` repeats each voxel as a
/// `zoom x zoom` pixel block.
pub fn overlay_image(
    func: &Array2<f64>,
    anat: &Array2<f64>,
    mask: Option<&Array2<f64>>,
    cmap: &Colormap,
    window: NormWindow,
    zoom: u32,
) -> Result<RgbImage, AppError> {
    if anat.dim() != func.dim() {
        return Err(AppError::data(format!(
            "Anatomy slice {:?} does not match map slice {:?}.",
            anat.dim(),
            func.dim()
        )));
    }
    if let Some(m) = mask {
        if m.dim() != func.dim() {
            return Err(AppError::data(format!(
                "Mask slice {:?} does not match map slice {:?}.",
                m.dim(),
                func.dim()
            )));
        }
    }
    let zoom = zoom.max(1);

    let anat_window = NormWindow::from_values(anat.iter().copied())
        .ok_or_else(|| AppError::data("Anatomy slice has no finite values."))?;

    let (nx, ny) = func.dim();
    let width = nx as u32 * zoom;
    let height = ny as u32 * zoom;

    let img = RgbImage::from_fn(width, height, |px, py| {
        let ix = (px / zoom) as usize;
        // Flip vertically so the second array axis increases upward.
        let iy = ny - 1 - (py / zoom) as usize;

        let shown = match mask {
            Some(m) => m[[ix, iy]] > 0.0,
            None => func[[ix, iy]] != 0.0,
        };
        if shown {
            Rgb(cmap.eval(window.normalize(func[[ix, iy]])))
        } else {
            let g = (anat_window.normalize(anat[[ix, iy]]) * 255.0).round() as u8;
            Rgb([g, g, g])
        }
    });

    Ok(img)
}

/// Nearest-neighbor resample of a slice onto a target grid.
///
/// Used when the anatomical volume sits on a finer grid than the maps.
pub fn resample_nearest(slice: &Array2<f64>, dims: (usize, usize)) -> Array2<f64> {
    let (sx, sy) = slice.dim();
    let (tx, ty) = dims;
    Array2::from_shape_fn((tx.max(1), ty.max(1)), |(i, j)| {
        let si = (i * sx / tx.max(1)).min(sx - 1);
        let sj = (j * sy / ty.max(1)).min(sy - 1);
        slice[[si, sj]]
    })
}

/// Trim a uniform border (the corner color) from an image.
pub fn autocrop(img: &RgbImage) -> RgbImage {
    let background = *img.get_pixel(0, 0);
    let (w, h) = img.dimensions();

    let mut x0 = w;
    let mut x1 = 0u32;
    let mut y0 = h;
    let mut y1 = 0u32;
    for (x, y, p) in img.enumerate_pixels() {
        if *p != background {
            x0 = x0.min(x);
            x1 = x1.max(x);
            y0 = y0.min(y);
            y1 = y1.max(y);
        }
    }

    if x0 > x1 || y0 > y1 {
        return img.clone();
    }
    image::imageops::crop_imm(img, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image()
}

/// Vertical palette bar: top = window maximum.
pub fn palette_bar(cmap: &Colormap, width: u32, height: u32) -> RgbImage {
    let height = height.max(2);
    RgbImage::from_fn(width.max(1), height, |_, y| {
        let u = 1.0 - y as f64 / (height as f64 - 1.0);
        Rgb(cmap.eval(u))
    })
}

/// Grayscale raster of a design matrix (darker = larger value), one
/// `cell_w x cell_h` pixel block per matrix element.
pub fn design_raster(design: &DesignMatrix, cell_w: u32, cell_h: u32) -> Result<RgbImage, AppError> {
    let window = NormWindow::from_values(design.matrix.iter().copied())
        .ok_or_else(|| AppError::numeric("Design matrix has no finite values."))?;

    let cell_w = cell_w.max(1);
    let cell_h = cell_h.max(1);
    let width = design.nregressors() as u32 * cell_w;
    let height = design.nscans() as u32 * cell_h;

    Ok(RgbImage::from_fn(width, height, |px, py| {
        let j = (px / cell_w) as usize;
        let i = (py / cell_h) as usize;
        let g = 255 - (window.normalize(design.matrix[(i, j)]) * 255.0).round() as u8;
        Rgb([g, g, g])
    }))
}

/// Encode a figure to disk in the requested format.
pub fn save_figure(img: &RgbImage, path: &Path, format: FigureFormat) -> Result<(), AppError> {
    let fmt = match format {
        FigureFormat::Png => image::ImageFormat::Png,
        FigureFormat::Jpeg => image::ImageFormat::Jpeg,
    };
    img.save_with_format(path, fmt)
        .map_err(|e| AppError::input(format!("Failed to write figure '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use ndarray::Array3;

    #[test]
    fn extract_slice_picks_the_right_plane() {
        let mut vol = Array3::zeros((3, 4, 5));
        vol[[1, 2, 3]] = 9.0;
        let plane = extract_slice(&vol, SliceAxis::Axial, 3).unwrap();
        assert_eq!(plane.dim(), (3, 4));
        assert!((plane[[1, 2]] - 9.0).abs() < 1e-12);

        let plane = extract_slice(&vol, SliceAxis::Sagittal, 1).unwrap();
        assert_eq!(plane.dim(), (4, 5));
        assert!((plane[[2, 3]] - 9.0).abs() < 1e-12);
    }

    #[test]
    fn extract_slice_checks_bounds() {
        let vol = Array3::<f64>::zeros((3, 4, 5));
        assert!(extract_slice(&vol, SliceAxis::Axial, 5).is_err());
    }

    #[test]
    fn overlay_colors_masked_voxels_and_grays_the_rest() {
        let mut func = Array2::zeros((2, 2));
        func[[0, 0]] = 1.0;
        let mut anat = Array2::zeros((2, 2));
        anat[[1, 1]] = 10.0;
        let mut mask = Array2::zeros((2, 2));
        mask[[0, 0]] = 1.0;

        let cmap = Colormap::activation();
        let window = NormWindow::new(0.0, 1.0);
        let img = overlay_image(&func, &anat, Some(&mask), &cmap, window, 1).unwrap();

        // (0,0) in array coordinates lands at the bottom-left pixel.
        assert_eq!(*img.get_pixel(0, 1), Rgb([255, 0, 0]));
        // Unmasked voxels are grayscale.
        let p = img.get_pixel(1, 0);
        assert_eq!(p.0[0], p.0[1]);
        assert_eq!(p.0[1], p.0[2]);
    }

    #[test]
    fn overlay_rejects_shape_mismatch() {
        let func = Array2::zeros((2, 2));
        let anat = Array2::zeros((3, 2));
        let cmap = Colormap::activation();
        let window = NormWindow::new(0.0, 1.0);
        assert!(overlay_image(&func, &anat, None, &cmap, window, 1).is_err());
    }

    #[test]
    fn resample_nearest_downsamples_by_picking_source_voxels() {
        let mut fine = Array2::zeros((4, 4));
        fine[[0, 0]] = 1.0;
        fine[[2, 2]] = 5.0;
        let coarse = resample_nearest(&fine, (2, 2));
        assert_eq!(coarse.dim(), (2, 2));
        assert!((coarse[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((coarse[[1, 1]] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn autocrop_trims_uniform_border() {
        let mut img = RgbImage::from_pixel(10, 8, Rgb([0, 0, 0]));
        img.put_pixel(3, 2, Rgb([255, 0, 0]));
        img.put_pixel(6, 5, Rgb([0, 255, 0]));
        let cropped = autocrop(&img);
        assert_eq!(cropped.dimensions(), (4, 4));
        assert_eq!(*cropped.get_pixel(0, 0), Rgb([255, 0, 0]));
    }

    #[test]
    fn autocrop_of_uniform_image_is_identity() {
        let img = RgbImage::from_pixel(5, 5, Rgb([7, 7, 7]));
        assert_eq!(autocrop(&img).dimensions(), (5, 5));
    }

    #[test]
    fn palette_bar_runs_hot_to_cold_top_down() {
        let cmap = Colormap::activation();
        let bar = palette_bar(&cmap, 4, 64);
        assert_eq!(*bar.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert_eq!(*bar.get_pixel(0, 63), Rgb([0, 0, 0]));
    }

    #[test]
    fn design_raster_has_one_block_per_cell() {
        let design = DesignMatrix {
            names: vec!["a".to_string(), "b".to_string()],
            matrix: DMatrix::from_row_slice(3, 2, &[0.0, 1.0, 0.5, 0.5, 1.0, 0.0]),
            tr: 2.0,
            dt: 0.5,
        };
        let img = design_raster(&design, 8, 2).unwrap();
        assert_eq!(img.dimensions(), (16, 6));
        // Max value renders dark, min renders light.
        assert_eq!(*img.get_pixel(8, 0), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(0, 0), Rgb([255, 255, 255]));
    }
}
