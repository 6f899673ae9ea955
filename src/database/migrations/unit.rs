use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::MigrationError;

/// One self-contained schema change loaded from disk.
#[derive(Debug, Clone)]
pub struct MigrationUnit {
    /// Numeric prefix of the file name.
    pub version: i64,
    /// Rest of the file name, underscores shown as spaces.
    pub description: String,
    /// Name of the file the unit was read from.
    pub file_name: String,
    /// Statements executed as one transaction.
    pub sql: String,
    /// Hex SHA-256 of `sql`.
    pub checksum: String,
}

impl MigrationUnit {
    /// Parses `<version>_<description>.sql` and hashes `sql`.
    pub fn new(file_name: &str, sql: String) -> Result<Self, MigrationError> {
        let invalid = || MigrationError::InvalidFileName(file_name.to_string());

        let stem = file_name.strip_suffix(".sql").ok_or_else(invalid)?;
        let (version, description) = stem.split_once('_').ok_or_else(invalid)?;
        if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) || description.is_empty() {
            return Err(invalid());
        }
        let version: i64 = version.parse().map_err(|_| invalid())?;

        Ok(Self {
            version,
            description: description.replace('_', " "),
            file_name: file_name.to_string(),
            checksum: checksum(&sql),
            sql,
        })
    }
}

/// Migration units ordered by ascending version.
#[derive(Debug, Clone, Default)]
pub struct MigrationSet {
    units: Vec<MigrationUnit>,
}

impl MigrationSet {
    /// Loads every `*.sql` file in `dir`. Other entries are ignored.
    pub fn from_dir(dir: &Path) -> Result<Self, MigrationError> {
        let io_error = |source| MigrationError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut units = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("sql") {
                continue;
            }

            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| MigrationError::InvalidFileName(path.display().to_string()))?;
            let sql = fs::read_to_string(&path).map_err(|source| MigrationError::Io {
                path: path.clone(),
                source,
            })?;
            units.push(MigrationUnit::new(file_name, sql)?);
        }

        Self::from_units(units)
    }

    /// Orders `units` by version and rejects duplicate versions.
    pub fn from_units(mut units: Vec<MigrationUnit>) -> Result<Self, MigrationError> {
        units.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.file_name.cmp(&b.file_name)));

        if let Some(pair) = units.windows(2).find(|pair| pair[0].version == pair[1].version) {
            return Err(MigrationError::DuplicateVersion {
                version: pair[0].version,
                first: pair[0].file_name.clone(),
                second: pair[1].file_name.clone(),
            });
        }

        Ok(Self { units })
    }

    /// Units in ascending version order.
    pub fn units(&self) -> &[MigrationUnit] {
        &self.units
    }

    /// Unit with exactly this version.
    pub fn get(&self, version: i64) -> Option<&MigrationUnit> {
        self.units.iter().find(|unit| unit.version == version)
    }

    /// No units were found.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Highest known version.
    pub fn latest_version(&self) -> Option<i64> {
        self.units.last().map(|unit| unit.version)
    }
}

fn checksum(sql: &str) -> String {
    Sha256::digest(sql.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
