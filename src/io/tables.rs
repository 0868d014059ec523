use ndarray::prelude::*;
use std::fs::{self, File, OpenOptions};
use std::io::{prelude::*, BufReader};
use std::path::Path;

use crate::base::*;

/// Write a matrix as whitespace separated text with a commented header.
/// Extra comment lines (e.g. row names) follow the header.
pub fn write_table(
    fname_output: &Path,
    header: &[String],
    comments: &[String],
    data: &Array2<f64>,
) -> Result<String> {
    if !header.is_empty() && header.len() != data.ncols() {
        return Err(HivfitError::Dimension(format!(
            "{} header fields for {} columns",
            header.len(),
            data.ncols()
        )));
    }
    if let Some(dir) = fname_output.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let mut file_out = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(fname_output)?;
    file_out.write_all(("# ".to_owned() + &header.join("\t") + "\n").as_bytes())?;
    for c in comments.iter() {
        file_out.write_all(("# ".to_owned() + c + "\n").as_bytes())?;
    }
    for row in data.outer_iter() {
        let line = row
            .iter()
            .map(|x| format!("{:.18e}", x))
            .collect::<Vec<String>>()
            .join(" ")
            + "\n";
        file_out.write_all(line.as_bytes())?;
    }
    let out = fname_output.display().to_string();
    log::info!("Wrote {}", out);
    Ok(out)
}

/// Read a table written by `write_table`, returning the header and the values
pub fn read_table(fname: &Path) -> Result<(Vec<String>, Array2<f64>)> {
    let name = fname.display().to_string();
    let reader = BufReader::new(File::open(fname)?);
    let mut header: Option<Vec<String>> = None;
    let mut values: Vec<f64> = vec![];
    let mut ncols: Option<usize> = None;
    let mut nrows = 0;
    for (i, l) in reader.lines().enumerate() {
        let line = l?;
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with('#') {
            if header.is_none() {
                header = Some(
                    line.trim_start_matches('#')
                        .split_whitespace()
                        .map(|x| x.to_owned())
                        .collect(),
                );
            }
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|x| x.parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
            .map_err(|e| HivfitError::parse(&name, i + 1, e.to_string()))?;
        match ncols {
            None => ncols = Some(row.len()),
            Some(n) if n != row.len() => {
                return Err(HivfitError::parse(
                    &name,
                    i + 1,
                    format!("expected {} columns, found {}", n, row.len()),
                ))
            }
            _ => (),
        }
        values.extend(row);
        nrows += 1;
    }
    let data = Array2::from_shape_vec((nrows, ncols.unwrap_or(0)), values)?;
    Ok((header.unwrap_or_default(), data))
}

/// Header of fitted parameters: s1..sq, mu, D
pub fn parameter_header(q: usize) -> Vec<String> {
    let mut header = (0..q)
        .map(|j| "s".to_owned() + &(j + 1).to_string())
        .collect::<Vec<String>>();
    header.push("mu".to_owned());
    header.push("D".to_owned());
    header
}
