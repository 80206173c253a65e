//! Pooled access to the `Dat_*.dat` files backing tile and associated-data
//! bytes, plus the bounds checks the original reader applies before ever
//! touching disk.

use std::path::{Path, PathBuf};

use crate::config::PoolConfig;
use crate::error::{MrxsError, Result};
use crate::io::{FileSource, QuickHashBuilder, RangeSource};
use crate::pool::HandlePool;

use super::constants::MAX_TILE_SIZE;
use super::types::MiraxTileRecord;

fn validate_tile_params(tile: &MiraxTileRecord) -> Result<()> {
    if tile.offset < 0 {
        return Err(MrxsError::InvalidRecord(format!(
            "invalid negative offset {} for tile at ({}, {})",
            tile.offset, tile.x, tile.y
        ))
        .into());
    }
    if tile.length <= 0 {
        return Err(MrxsError::InvalidRecord(format!(
            "invalid length {} for tile at ({}, {})",
            tile.length, tile.x, tile.y
        ))
        .into());
    }
    if tile.length > MAX_TILE_SIZE {
        return Err(MrxsError::RecordTooLarge { length: tile.length, max: MAX_TILE_SIZE }.into());
    }
    Ok(())
}

/// One pooled handle per `Dat_*.dat` file. Pools are built eagerly in
/// [`MrxsDataFiles::new`] (opening no file descriptors yet — [`HandlePool`]
/// only opens on first `acquire`), so reads need no interior mutability and
/// can run concurrently from a parallel plan executor.
pub struct MrxsDataFiles {
    paths: Vec<String>,
    pools: Vec<HandlePool<FileSource>>,
}

impl MrxsDataFiles {
    pub fn new(dirname: impl AsRef<Path>, datafile_paths: Vec<String>) -> Self {
        Self::new_with_config(dirname, datafile_paths, PoolConfig::default())
    }

    /// Builds one pool per data file, each sized per `pool.max_handles`.
    pub fn new_with_config(dirname: impl AsRef<Path>, datafile_paths: Vec<String>, pool: PoolConfig) -> Self {
        let dirname = dirname.as_ref().to_path_buf();
        let pools = datafile_paths
            .iter()
            .map(|path| {
                let full_path = dirname.join(path);
                HandlePool::new(pool.max_handles, move || FileSource::open(&full_path))
            })
            .collect();
        MrxsDataFiles { paths: datafile_paths, pools }
    }

    fn pool_for(&self, file_number: usize) -> Result<&HandlePool<FileSource>> {
        self.pools.get(file_number).ok_or_else(|| {
            MrxsError::InvalidRecord(format!(
                "invalid file number: {file_number} (must be 0-{})",
                self.paths.len().saturating_sub(1)
            ))
            .into()
        })
    }

    /// Reads one tile's compressed bytes, validating bounds first.
    pub fn read_tile_data(&self, tile: &MiraxTileRecord) -> Result<Vec<u8>> {
        validate_tile_params(tile)?;
        if tile.data_file_number < 0 {
            return Err(MrxsError::InvalidRecord(format!(
                "invalid file number: {} (must be 0-{})",
                tile.data_file_number,
                self.paths.len().saturating_sub(1)
            ))
            .into());
        }
        let pool = self.pool_for(tile.data_file_number as usize)?;
        let guard = pool.acquire()?;
        let bytes = guard.read_exact_at(tile.offset as u64, tile.length as u64)?;
        Ok(bytes.to_vec())
    }

    /// Reads an arbitrary byte range from one numbered data file, used for
    /// associated data and camera-position records.
    pub fn read_range(&self, file_number: usize, offset: i64, size: i64) -> Result<Vec<u8>> {
        if offset < 0 {
            return Err(MrxsError::InvalidRecord(format!("invalid negative offset: {offset}")).into());
        }
        if size <= 0 {
            return Err(MrxsError::InvalidRecord(format!("invalid size: {size}")).into());
        }
        let pool = self.pool_for(file_number)?;
        let guard = pool.acquire()?;
        let bytes = guard.read_exact_at(offset as u64, size as u64)?;
        Ok(bytes.to_vec())
    }

    /// Feeds one tile's compressed bytes straight into a hash builder,
    /// without materializing them as a standalone buffer.
    pub fn hash_tile_bytes(&self, builder: &mut QuickHashBuilder, tile: &MiraxTileRecord) -> Result<()> {
        validate_tile_params(tile)?;
        let pool = self.pool_for(tile.data_file_number as usize)?;
        let guard = pool.acquire()?;
        builder.hash_file_part(&*guard, tile.offset as u64, tile.length as u64)
    }
}
