//! Reading allele count matrices and writing demultiplexing results.
//!
//! Count matrices are CSV files with one SNV per row and one barcode per
//! column. The first header cell names the index column and is ignored.

use crate::counts::AlleleCounts;
use crate::Demultiplexed;
use anyhow::{Context, Result};
use serde::Serialize;
use sprs::{CsMat, TriMat};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One count matrix as read from disk.
struct CountTable {
    snvs: Vec<String>,
    barcodes: Vec<String>,
    counts: CsMat<u32>,
}

fn read_count_table(path: &Path) -> Result<CountTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| path.display().to_string())?;
    let barcodes: Vec<String> = rdr
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .iter()
        .skip(1)
        .map(|bc| bc.trim().to_string())
        .collect();

    let mut snvs = Vec::new();
    let mut triplets = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("reading {}", path.display()))?;
        snvs.push(record[0].trim().to_string());
        for (col, cell) in record.iter().skip(1).enumerate() {
            let n: u32 = cell.trim().parse().with_context(|| {
                format!(
                    "{}: row {} column {}: invalid count {cell:?}",
                    path.display(),
                    row + 1,
                    barcodes[col]
                )
            })?;
            if n > 0 {
                triplets.push((row, col, n));
            }
        }
    }

    let mut tri = TriMat::new((snvs.len(), barcodes.len()));
    for (row, col, n) in triplets {
        tri.add_triplet(row, col, n);
    }
    Ok(CountTable {
        snvs,
        barcodes,
        counts: tri.to_csr(),
    })
}

/// Load the reference and alternative count matrices.
///
/// Both files must carry identical SNV and barcode labels in the same order.
pub fn load_allele_counts(ref_path: &Path, alt_path: &Path) -> Result<AlleleCounts> {
    let ref_table = read_count_table(ref_path)?;
    let alt_table = read_count_table(alt_path)?;
    AlleleCounts::check_labels(
        (&ref_table.snvs, &ref_table.barcodes),
        (&alt_table.snvs, &alt_table.barcodes),
    )
    .with_context(|| {
        format!(
            "comparing {} and {}",
            ref_path.display(),
            alt_path.display()
        )
    })?;
    Ok(AlleleCounts::new(
        ref_table.counts,
        alt_table.counts,
        ref_table.snvs,
        ref_table.barcodes,
    )?)
}

#[derive(Serialize)]
struct Summary<'a> {
    doublet_state: Option<usize>,
    doublet: &'a crate::DoubletCall,
    log_likelihood: f64,
    best_run: usize,
    em_iterations: usize,
    converged: bool,
    assigned_per_state: Vec<usize>,
}

fn write_barcode_list(path: &Path, barcodes: &[String]) -> Result<()> {
    let mut writer =
        BufWriter::new(File::create(path).with_context(|| path.display().to_string())?);
    for barcode in barcodes {
        writeln!(writer, "{barcode}")?;
    }
    writer.flush()?;
    Ok(())
}

/// File written for state `n`'s initial grouping is grouping `(n - 1) mod (K + 1)`.
fn initial_grouping_for_state(state: usize, num_states: usize) -> usize {
    (state + num_states - 1) % num_states
}

/// Write `barcodes_{n}.csv`, `initial_{n}.csv` for every state and `summary.json`.
pub fn write_outputs(out_dir: &Path, result: &Demultiplexed) -> Result<()> {
    std::fs::create_dir_all(out_dir).with_context(|| out_dir.display().to_string())?;
    let num_states = result.assigned.len();
    for (state, assigned) in result.assigned.iter().enumerate() {
        write_barcode_list(&out_dir.join(format!("barcodes_{state}.csv")), assigned)?;
        let initial = result
            .initial
            .get(initial_grouping_for_state(state, num_states))
            .map_or(&[][..], Vec::as_slice);
        write_barcode_list(&out_dir.join(format!("initial_{state}.csv")), initial)?;
    }

    let summary = Summary {
        doublet_state: result.doublet.state(),
        doublet: &result.doublet,
        log_likelihood: result.best_run.log_likelihood,
        best_run: result.best_run.run_idx,
        em_iterations: result.best_run.iterations(),
        converged: result.best_run.converged,
        assigned_per_state: result.assigned.iter().map(Vec::len).collect(),
    };
    let path = out_dir.join("summary.json");
    let writer = BufWriter::new(File::create(&path).with_context(|| path.display().to_string())?);
    serde_json::to_writer_pretty(writer, &summary)?;
    Ok(())
}
