// Index artifacts on disk: bincode vectors plus a JSON id map, always
// written and read as a pair


use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::flat::{FlatIndex, IndexState};
use crate::IndexError;
use crate::database::LogEntryId;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    dimension: u64,
    count: u64,
    data: Vec<f32>,
}

/// Serialized forms of both artifacts, produced under the index read lock
/// and written afterwards
#[derive(Debug)]
pub struct EncodedIndex {
    index: Vec<u8>,
    id_map: Vec<u8>,
}

#[inline]
pub fn encode(index: &FlatIndex) -> Result<EncodedIndex, IndexError> {
    let file = IndexFile {
        version: FORMAT_VERSION,
        dimension: index.dimension().unwrap_or(0) as u64,
        count: index.len() as u64,
        data: index.data().to_vec(),
    };

    let index_bytes = bincode::serialize(&file)
        .map_err(|e| IndexError::IndexIo(format!("Failed to encode index: {}", e)))?;
    let id_map = serde_json::to_vec(index.ids())
        .map_err(|e| IndexError::IndexIo(format!("Failed to encode id map: {}", e)))?;

    Ok(EncodedIndex {
        index: index_bytes,
        id_map,
    })
}

/// Write both artifacts through temporary files, renaming them into place
/// only after both writes succeeded.
///
/// Each rename is atomic but the pair is not. A crash after `index.bin` is
/// renamed and before `id_map.json` is leaves the new vectors next to the old
/// id map. `load` reports that as `IndexCorrupt` when the counts differ; when
/// they agree the positions are misattributed until `reindex` rebuilds both.
#[inline]
pub fn write(encoded: &EncodedIndex, index_path: &Path, id_map_path: &Path) -> Result<(), IndexError> {
    let index_tmp = temp_path(index_path);
    let id_map_tmp = temp_path(id_map_path);

    if let Some(parent) = index_path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("create index directory", parent, &e))?;
    }
    if let Some(parent) = id_map_path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("create id map directory", parent, &e))?;
    }

    fs::write(&index_tmp, &encoded.index).map_err(|e| io_error("write", &index_tmp, &e))?;
    if let Err(e) = fs::write(&id_map_tmp, &encoded.id_map) {
        let _ = fs::remove_file(&index_tmp);
        return Err(io_error("write", &id_map_tmp, &e));
    }

    if let Err(e) = fs::rename(&index_tmp, index_path) {
        let _ = fs::remove_file(&index_tmp);
        let _ = fs::remove_file(&id_map_tmp);
        return Err(io_error("rename", &index_tmp, &e));
    }
    fs::rename(&id_map_tmp, id_map_path).map_err(|e| io_error("rename", &id_map_tmp, &e))?;

    debug!(
        "Persisted index to {} and id map to {}",
        index_path.display(),
        id_map_path.display()
    );
    Ok(())
}

/// Load a persisted index.
///
/// `Ok(None)` means there is nothing usable on disk: an artifact is missing,
/// cannot be read, or cannot be decoded. Artifacts that decode but disagree
/// with each other are `IndexCorrupt`.
#[inline]
pub fn load(index_path: &Path, id_map_path: &Path) -> Result<Option<FlatIndex>, IndexError> {
    let Some(index_bytes) = read_artifact(index_path) else {
        return Ok(None);
    };
    let Some(id_map_bytes) = read_artifact(id_map_path) else {
        return Ok(None);
    };

    let file: IndexFile = match bincode::deserialize(&index_bytes) {
        Ok(file) => file,
        Err(e) => {
            warn!("Ignoring undecodable index {}: {}", index_path.display(), e);
            return Ok(None);
        }
    };
    if file.version != FORMAT_VERSION {
        warn!(
            "Ignoring index {} with unsupported format version {}",
            index_path.display(),
            file.version
        );
        return Ok(None);
    }

    let ids: Vec<LogEntryId> = match serde_json::from_slice(&id_map_bytes) {
        Ok(ids) => ids,
        Err(e) => {
            warn!("Ignoring undecodable id map {}: {}", id_map_path.display(), e);
            return Ok(None);
        }
    };

    if file.count != ids.len() as u64 {
        return Err(IndexError::IndexCorrupt(format!(
            "index holds {} vectors but id map holds {} ids",
            file.count,
            ids.len()
        )));
    }

    let dimension = usize::try_from(file.dimension)
        .map_err(|_| IndexError::IndexCorrupt(format!("dimension {} out of range", file.dimension)))?;
    let state = if dimension == 0 {
        IndexState::Unbound
    } else {
        IndexState::Bound { dimension }
    };

    FlatIndex::from_parts(state, file.data, ids).map(Some)
}

fn read_artifact(path: &Path) -> Option<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No persisted artifact at {}", path.display());
            None
        }
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            None
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn io_error(action: &str, path: &Path, error: &std::io::Error) -> IndexError {
    IndexError::IndexIo(format!("Failed to {} {}: {}", action, path.display(), error))
}
