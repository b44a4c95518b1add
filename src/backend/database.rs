//! Read-only access to the working feature database.
//!
//! The extractor and matchers own the schema; this module only counts rows
//! so the orchestrator can report what a stage produced.

use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::errors::PipelineError;

pub struct FeatureDb {
    conn: Connection,
}

impl FeatureDb {
    /// Open an existing database without write access.
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::Collaborator(format!(
                "Feature database not found: {}",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    pub fn image_count(&self) -> Result<u64, PipelineError> {
        self.count("SELECT COUNT(*) FROM images")
    }

    /// Total correspondences across all image pairs.
    pub fn match_count(&self) -> Result<u64, PipelineError> {
        self.count("SELECT COALESCE(SUM(rows), 0) FROM matches")
    }

    /// Image pairs that survived geometric verification.
    pub fn verified_pair_count(&self) -> Result<u64, PipelineError> {
        self.count("SELECT COUNT(*) FROM two_view_geometries WHERE rows > 0")
    }

    fn count(&self, sql: &str) -> Result<u64, PipelineError> {
        let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }
}
