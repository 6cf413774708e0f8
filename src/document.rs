use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::ConvertError;
use crate::pipeline::features::FeatureCollection;

#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub bytes: u64,
    pub features: usize,
}

impl WriteOutcome {
    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Write the collection as compact JSON. The document lands under a
/// temporary name first and is renamed into place once fully flushed.
pub fn write_collection(path: &Path, collection: &FeatureCollection) -> Result<WriteOutcome, ConvertError> {
    let tmp = tmp_path(path);

    let file = File::create(&tmp).map_err(io_err(&tmp))?;
    let mut writer = BufWriter::new(file);
    if let Err(e) = serde_json::to_writer(&mut writer, collection) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    writer.flush().map_err(io_err(&tmp))?;
    writer
        .into_inner()
        .map_err(|e| ConvertError::Write {
            path: tmp.clone(),
            source: e.into_error(),
        })?
        .sync_all()
        .map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))?;

    let bytes = fs::metadata(path).map_err(io_err(path))?.len();
    info!(path = ?path, bytes, features = collection.len(), "wrote feature collection");
    Ok(WriteOutcome {
        path: path.to_path_buf(),
        bytes,
        features: collection.len(),
    })
}

pub fn read_collection(path: &Path) -> Result<FeatureCollection, ConvertError> {
    let file = File::open(path).map_err(|e| ConvertError::ReadBack {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| ConvertError::ReadBack {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ConvertError {
    let path = path.to_path_buf();
    move |source| ConvertError::Write { path, source }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
