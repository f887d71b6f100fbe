//! MATLAB level-5 `.mat` export of design matrices.
//!
//! SPM-style batch pipelines consume regressors from a `.mat` file holding:
//!
//! - `r`: the design matrix (`nscans x nregressors`, double, column-major)
//! - `reg_names`: a char matrix of regressor names (one row per name,
//!   space-padded)
//!
//! Only the subset of the format needed for these two variables is written:
//! a level-5 header followed by two `miMATRIX` elements, little-endian, no
//! compression.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::domain::DesignMatrix;
use crate::error::AppError;

const MI_INT8: u32 = 1;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;

const MX_CHAR_CLASS: u32 = 4;
const MX_DOUBLE_CLASS: u32 = 6;

/// Write a design matrix as a MAT5 file with variables `r` and `reg_names`.
pub fn write_design_mat(path: &Path, design: &DesignMatrix) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::input(format!("Failed to create MAT file '{}': {e}", path.display()))
    })?;
    let mut w = BufWriter::new(file);

    write_header(&mut w).map_err(write_err(path))?;
    write_double_matrix(&mut w, "r", design).map_err(write_err(path))?;
    write_char_matrix(&mut w, "reg_names", &design.names).map_err(write_err(path))?;
    w.flush().map_err(write_err(path))?;
    Ok(())
}

fn write_err(path: &Path) -> impl Fn(std::io::Error) -> AppError + '_ {
    move |e| AppError::input(format!("Failed to write MAT file '{}': {e}", path.display()))
}

/// 128-byte header: 116 bytes of text, 8 reserved bytes, version, endian tag.
fn write_header<W: Write>(w: &mut W) -> std::io::Result<()> {
    let mut text = [b' '; 116];
    let banner = b"MATLAB 5.0 MAT-file, created by aslfit";
    text[..banner.len()].copy_from_slice(banner);
    w.write_all(&text)?;
    w.write_all(&[0u8; 8])?;
    w.write_u16::<LittleEndian>(0x0100)?;
    w.write_all(b"IM")?;
    Ok(())
}

fn padded(len: usize) -> usize {
    (len + 7) / 8 * 8
}

fn write_tag<W: Write>(w: &mut W, mtype: u32, nbytes: usize) -> std::io::Result<()> {
    w.write_u32::<LittleEndian>(mtype)?;
    w.write_u32::<LittleEndian>(nbytes as u32)?;
    Ok(())
}

fn write_padding<W: Write>(w: &mut W, nbytes: usize) -> std::io::Result<()> {
    let pad = padded(nbytes) - nbytes;
    w.write_all(&[0u8; 8][..pad])
}

/// Sub-element sizes shared by both matrix kinds: flags, dims, name.
fn common_subelement_bytes(name: &str) -> usize {
    // array flags: tag + 8 data bytes
    // dimensions:  tag + 8 data bytes (two i32)
    // name:        tag + padded name bytes
    (8 + 8) + (8 + 8) + (8 + padded(name.len()))
}

fn write_common_subelements<W: Write>(
    w: &mut W,
    class: u32,
    rows: usize,
    cols: usize,
    name: &str,
) -> std::io::Result<()> {
    write_tag(w, MI_UINT32, 8)?;
    w.write_u32::<LittleEndian>(class)?;
    w.write_u32::<LittleEndian>(0)?;

    write_tag(w, MI_INT32, 8)?;
    w.write_i32::<LittleEndian>(rows as i32)?;
    w.write_i32::<LittleEndian>(cols as i32)?;

    write_tag(w, MI_INT8, name.len())?;
    w.write_all(name.as_bytes())?;
    write_padding(w, name.len())?;
    Ok(())
}

fn write_double_matrix<W: Write>(w: &mut W, name: &str, design: &DesignMatrix) -> std::io::Result<()> {
    let rows = design.nscans();
    let cols = design.nregressors();
    let data_bytes = 8 * rows * cols;
    let total = common_subelement_bytes(name) + 8 + padded(data_bytes);

    write_tag(w, MI_MATRIX, total)?;
    write_common_subelements(w, MX_DOUBLE_CLASS, rows, cols, name)?;

    write_tag(w, MI_DOUBLE, data_bytes)?;
    for j in 0..cols {
        for i in 0..rows {
            w.write_f64::<LittleEndian>(design.matrix[(i, j)])?;
        }
    }
    write_padding(w, data_bytes)
}

fn write_char_matrix<W: Write>(w: &mut W, name: &str, names: &[String]) -> std::io::Result<()> {
    let rows = names.len();
    let cols = names.iter().map(|n| n.chars().count()).max().unwrap_or(0);
    let cells: Vec<Vec<u16>> = names
        .iter()
        .map(|n| {
            let mut row: Vec<u16> = n.encode_utf16().collect();
            row.resize(cols, b' ' as u16);
            row
        })
        .collect();

    let data_bytes = 2 * rows * cols;
    let total = common_subelement_bytes(name) + 8 + padded(data_bytes);

    write_tag(w, MI_MATRIX, total)?;
    write_common_subelements(w, MX_CHAR_CLASS, rows, cols, name)?;

    write_tag(w, MI_UINT16, data_bytes)?;
    // Column-major: all first characters, then all second characters, ...
    for j in 0..cols {
        for row in &cells {
            w.write_u16::<LittleEndian>(row[j])?;
        }
    }
    write_padding(w, data_bytes)
}
