// Deployment archives: seed model, weather files, measures and support files.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use openstudio_analysis::{Analysis, SeedModel};

use crate::osa::io_common::simplify_file_name;
use crate::osa::*;

/// A measure directory found under one of the measure paths.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ResolvedMeasure {
    pub directory: String,
    pub path: PathBuf,
}

/// The content of one archive entry.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum EntrySource {
    File(PathBuf),
    Text(String),
}

/// Looks up the directory of every enabled measure.
///
/// The measure paths are searched in order and the first directory holding a
/// `measure.rb` wins. All the measures that cannot be found are reported together.
pub fn resolve_measures(analysis: &Analysis) -> OsaResult<Vec<ResolvedMeasure>> {
    let mut res: Vec<ResolvedMeasure> = Vec::new();
    let mut unresolved: Vec<String> = Vec::new();
    for m in analysis.enabled_measures() {
        let found = analysis
            .measure_paths
            .iter()
            .map(|p| p.join(&m.directory))
            .find(|d| d.join("measure.rb").is_file());
        match found {
            Some(path) => {
                debug!("resolve_measures: {} -> {}", m.directory, path.display());
                res.push(ResolvedMeasure {
                    directory: m.directory.clone(),
                    path,
                });
            }
            None => unresolved.push(m.directory.clone()),
        }
    }
    ensure!(
        unresolved.is_empty(),
        UnresolvedMeasuresSnafu {
            measures: unresolved.join(", "),
            searched: analysis
                .measure_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<String>>()
                .join(", "),
        }
    );
    Ok(res)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

// Entry name of a path relative to some base, with forward slashes.
fn relative_name(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    Some(parts.join("/"))
}

fn walk_files(dir: &Path) -> OsaResult<Vec<PathBuf>> {
    let mut res: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.context(WalkingDirectorySnafu {
            path: dir.display().to_string(),
        })?;
        if entry.file_type().is_file() {
            res.push(entry.into_path());
        }
    }
    Ok(res)
}

/// Lists the entries of the archive of one seed model, in archive order.
pub fn archive_entries(
    analysis: &Analysis,
    model: &SeedModel,
    measures: &[ResolvedMeasure],
) -> OsaResult<Vec<(String, EntrySource)>> {
    let mut entries: Vec<(String, EntrySource)> = Vec::new();

    for w in analysis.weather_files.iter() {
        entries.push((
            format!("weather/{}", file_name(w)),
            EntrySource::File(w.clone()),
        ));
    }
    entries.push((
        format!("seed/{}", file_name(&model.path)),
        EntrySource::File(model.path.clone()),
    ));

    for m in measures.iter() {
        for f in walk_files(&m.path)? {
            if let Some(rel) = relative_name(&m.path, &f) {
                // Top-level measure files are not packaged.
                if rel.starts_with("resources/") || rel.starts_with("lib/") {
                    entries.push((
                        format!("measures/{}/{}", m.directory, rel),
                        EntrySource::File(f),
                    ));
                }
            }
        }
    }

    for lib in analysis.other_files.iter() {
        if lib.path.is_dir() {
            for f in walk_files(&lib.path)? {
                if let Some(rel) = relative_name(&lib.path, &f) {
                    entries.push((format!("lib/{}/{}", lib.lib_name, rel), EntrySource::File(f)));
                }
            }
        } else {
            entries.push((
                format!("lib/{}/{}", lib.lib_name, file_name(&lib.path)),
                EntrySource::File(lib.path.clone()),
            ));
        }
    }

    for (dir, scripts) in [
        ("worker_initialize", &analysis.worker_inits),
        ("worker_finalize", &analysis.worker_finalizes),
    ] {
        for (idx, s) in scripts.iter().enumerate() {
            entries.push((
                format!("lib/{}/{:02}_{}", dir, idx, file_name(&s.path)),
                EntrySource::File(s.path.clone()),
            ));
            if let Some(args) = &s.args {
                entries.push((
                    format!(
                        "lib/{}/{:02}_{}.args",
                        dir,
                        idx,
                        simplify_file_name(&s.path)
                    ),
                    EntrySource::Text(args.clone()),
                ));
            }
        }
    }
    Ok(entries)
}

fn add_entries(
    zip: &mut ZipWriter<File>,
    entries: &[(String, EntrySource)],
    archive: &str,
) -> OsaResult<()> {
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, source) in entries.iter() {
        debug!("add_entries: {}: {}", archive, name);
        zip.start_file(name.as_str(), options)
            .context(ArchiveSnafu { path: archive })?;
        match source {
            EntrySource::File(p) => {
                let mut f = File::open(p).context(IoSnafu {
                    path: p.display().to_string(),
                })?;
                io::copy(&mut f, zip).context(IoSnafu {
                    path: p.display().to_string(),
                })?;
            }
            EntrySource::Text(text) => {
                zip.write_all(text.as_bytes())
                    .context(IoSnafu { path: archive })?;
            }
        }
    }
    Ok(())
}

/// Writes the archive of one seed model.
///
/// The archive is always finished, even when an entry could not be added; the first
/// error is returned.
pub fn write_archive(path: &Path, entries: &[(String, EntrySource)]) -> OsaResult<()> {
    let archive = path.display().to_string();
    info!("write_archive: writing {} entries to {}", entries.len(), archive);
    let file = File::create(path).context(IoSnafu {
        path: archive.clone(),
    })?;
    let mut zip = ZipWriter::new(file);
    let added = add_entries(&mut zip, entries, &archive);
    let finished = zip.finish().context(ArchiveSnafu {
        path: archive.clone(),
    });
    added?;
    finished?;
    Ok(())
}

/// Removes a partially written output file. Errors are only logged.
pub fn discard_output(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("discard_output: could not remove {}: {}", path.display(), e);
        }
    }
}
