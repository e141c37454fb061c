//! Schema metadata and catalog persistence.
//!
//! A table's catalog file (`<base_dir>/<name>.table`) is a line-oriented
//! dump: the literal header line `TableMeta`, a JSON header record with the
//! table name and section counts, then one JSON record per field and per
//! index. Reading is the exact inverse of writing.
//!
//! Catalog rewrites (index creation) go through a temp file in the same
//! directory that is fsynced and renamed over the live file, so a crash in
//! between leaves the previous catalog intact.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::TableError;
use crate::datum::AttrType;

/// Number of leading system fields in every row (deletion mark and
/// transaction stamp, consumed by the transaction layer).
pub const SYS_FIELD_NUM: usize = 2;

const HEADER_LINE: &str = "TableMeta";
const SYS_FIELD_DEL: &str = "__del";
const SYS_FIELD_TRX: &str = "__trx";

/// Returns the catalog file path of a table.
pub fn table_meta_path(base_dir: &Path, table: &str) -> PathBuf {
    base_dir.join(format!("{}.table", table))
}

/// Returns the heap file path of a table.
pub fn table_data_path(base_dir: &Path, table: &str) -> PathBuf {
    base_dir.join(format!("{}.data", table))
}

/// Returns the index file path of one of a table's indexes.
pub fn index_file_path(base_dir: &Path, table: &str, index: &str) -> PathBuf {
    base_dir.join(format!("{}_{}.bplustree", table, index))
}

/// DDL attribute descriptor handed in by the query layer.
#[derive(Debug, Clone)]
pub struct AttrInfo {
    /// Column name.
    pub name: String,
    /// Column type.
    pub attr_type: AttrType,
    /// Declared width; ignored for self-sizing types.
    pub length: usize,
    /// Whether NULL values are accepted.
    pub nullable: bool,
}

impl AttrInfo {
    /// Creates an attribute descriptor.
    pub fn new(name: &str, attr_type: AttrType, length: usize, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            attr_type,
            length,
            nullable,
        }
    }
}

/// Layout of one field within the row buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMeta {
    /// Field name; unique within the table.
    pub name: String,
    /// Field type.
    pub attr_type: AttrType,
    /// Byte offset within the row buffer.
    pub offset: usize,
    /// Width of the field's slot in bytes.
    pub len: usize,
    /// Whether NULL values are accepted.
    pub nullable: bool,
    /// False for the system-reserved fields.
    pub visible: bool,
}

/// One secondary index over a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Index name; unique within the table.
    pub name: String,
    /// Name of the indexed field.
    pub field_name: String,
}

#[derive(Serialize, Deserialize)]
struct CatalogHeader {
    name: String,
    fields: usize,
    indexes: usize,
}

/// Complete schema of one table: ordered fields plus attached indexes.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    name: String,
    fields: Vec<FieldMeta>,
    indexes: Vec<IndexMeta>,
}

impl TableMeta {
    /// Builds the schema for a new table, prepending the system fields.
    pub fn new(name: &str, attrs: &[AttrInfo]) -> Result<Self, TableError> {
        if name.trim().is_empty() {
            return Err(TableError::InvalidArgument("table name is blank".into()));
        }
        if attrs.is_empty() {
            return Err(TableError::InvalidArgument(format!(
                "table {} declares no attributes",
                name
            )));
        }

        let mut fields = Vec::with_capacity(attrs.len() + SYS_FIELD_NUM);
        let mut offset = 0;
        for sys_name in [SYS_FIELD_DEL, SYS_FIELD_TRX] {
            fields.push(FieldMeta {
                name: sys_name.to_string(),
                attr_type: AttrType::Int,
                offset,
                len: 4,
                nullable: false,
                visible: false,
            });
            offset += 4;
        }

        for attr in attrs {
            if attr.name.trim().is_empty() {
                return Err(TableError::InvalidArgument("attribute name is blank".into()));
            }
            if !attr.attr_type.is_field_type() {
                return Err(TableError::InvalidArgument(format!(
                    "attribute {} has type {}",
                    attr.name, attr.attr_type
                )));
            }
            if fields.iter().any(|f| f.name == attr.name) {
                return Err(TableError::InvalidArgument(format!(
                    "duplicate attribute name {}",
                    attr.name
                )));
            }
            let len = match attr.attr_type.fixed_size() {
                Some(n) => n,
                None if attr.length > 0 => attr.length,
                None => {
                    return Err(TableError::InvalidArgument(format!(
                        "attribute {} has zero length",
                        attr.name
                    )))
                }
            };
            fields.push(FieldMeta {
                name: attr.name.clone(),
                attr_type: attr.attr_type,
                offset,
                len,
                nullable: attr.nullable,
                visible: true,
            });
            offset += len;
        }

        Ok(Self {
            name: name.to_string(),
            fields,
            indexes: Vec::new(),
        })
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all fields, system fields first.
    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    /// Returns the total field count including system fields.
    pub fn field_num(&self) -> usize {
        self.fields.len()
    }

    /// Returns the number of user-declared fields.
    pub fn user_field_num(&self) -> usize {
        self.fields.len() - SYS_FIELD_NUM
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field and its position by name.
    pub fn field_with_position(&self, name: &str) -> Option<(usize, &FieldMeta)> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| (i, &self.fields[i]))
    }

    /// Width of the declared fields region of the row buffer.
    pub fn record_size(&self) -> usize {
        self.fields.last().map(|f| f.offset + f.len).unwrap_or(0)
    }

    /// Total persisted row width: declared fields plus one trailing null
    /// flag byte per user field.
    pub fn row_width(&self) -> usize {
        self.record_size() + self.user_field_num()
    }

    /// Byte offset of a field's null flag in the row buffer, or `None` for
    /// system fields (which carry no flag).
    pub fn null_flag_index(&self, field_position: usize) -> Option<usize> {
        if field_position < SYS_FIELD_NUM || field_position >= self.fields.len() {
            None
        } else {
            Some(self.record_size() + field_position - SYS_FIELD_NUM)
        }
    }

    /// Returns all indexes in declaration order.
    pub fn indexes(&self) -> &[IndexMeta] {
        &self.indexes
    }

    /// Looks up an index by name.
    pub fn index(&self, name: &str) -> Option<&IndexMeta> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Looks up the index attached to a field, if any.
    pub fn index_on_field(&self, field_name: &str) -> Option<&IndexMeta> {
        self.indexes.iter().find(|i| i.field_name == field_name)
    }

    /// Returns the position of the index attached to a field, if any.
    pub fn index_position_on_field(&self, field_name: &str) -> Option<usize> {
        self.indexes.iter().position(|i| i.field_name == field_name)
    }

    /// Attaches an index to the schema.
    ///
    /// # Errors
    ///
    /// Rejects duplicate index names, a second index on the same field, and
    /// indexes over unknown fields.
    pub fn add_index(&mut self, index: IndexMeta) -> Result<(), TableError> {
        if self.index(&index.name).is_some() {
            return Err(TableError::IndexExists(index.name));
        }
        if self.index_on_field(&index.field_name).is_some() {
            return Err(TableError::IndexExists(format!(
                "field {} is already indexed",
                index.field_name
            )));
        }
        if self.field(&index.field_name).is_none() {
            return Err(TableError::FieldMissing(index.field_name));
        }
        self.indexes.push(index);
        Ok(())
    }

    /// Writes the catalog dump to `w`.
    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<(), TableError> {
        writeln!(w, "{}", HEADER_LINE)?;
        let header = CatalogHeader {
            name: self.name.clone(),
            fields: self.fields.len(),
            indexes: self.indexes.len(),
        };
        writeln!(w, "{}", to_json(&header)?)?;
        for field in &self.fields {
            writeln!(w, "{}", to_json(field)?)?;
        }
        for index in &self.indexes {
            writeln!(w, "{}", to_json(index)?)?;
        }
        Ok(())
    }

    /// Reads a catalog dump produced by [`serialize`](Self::serialize).
    pub fn deserialize<R: BufRead>(r: R) -> Result<Self, TableError> {
        let mut lines = r.lines();
        let mut next_line = || -> Result<String, TableError> {
            match lines.next() {
                Some(line) => Ok(line?),
                None => Err(TableError::CorruptCatalog("truncated catalog file".into())),
            }
        };

        let tag = next_line()?;
        if tag.trim() != HEADER_LINE {
            return Err(TableError::CorruptCatalog(format!(
                "bad catalog header line: {:?}",
                tag
            )));
        }
        let header: CatalogHeader = from_json(&next_line()?)?;

        let mut fields = Vec::with_capacity(header.fields);
        for _ in 0..header.fields {
            fields.push(from_json::<FieldMeta>(&next_line()?)?);
        }
        let mut indexes = Vec::with_capacity(header.indexes);
        for _ in 0..header.indexes {
            indexes.push(from_json::<IndexMeta>(&next_line()?)?);
        }

        let meta = Self {
            name: header.name,
            fields,
            indexes,
        };
        meta.validate()?;
        Ok(meta)
    }

    /// Creates the catalog file with exclusive-create semantics.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::TableExists`] if the file is already present.
    pub fn save_create(&self, path: &Path) -> Result<(), TableError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    TableError::TableExists(self.name.clone())
                } else {
                    TableError::Io(e)
                }
            })?;
        self.write_and_sync(file)
    }

    /// Rewrites the catalog atomically: temp file in the same directory,
    /// fsync, rename over the live file.
    pub fn save_atomic(&self, path: &Path) -> Result<(), TableError> {
        let mut tmp_os = path.as_os_str().to_os_string();
        tmp_os.push(".tmp");
        let tmp_path = PathBuf::from(tmp_os);

        let file = File::create(&tmp_path)?;
        self.write_and_sync(file)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Loads and validates a catalog file.
    pub fn load(path: &Path) -> Result<Self, TableError> {
        let file = File::open(path)?;
        Self::deserialize(BufReader::new(file))
    }

    fn write_and_sync(&self, file: File) -> Result<(), TableError> {
        let mut w = BufWriter::new(file);
        self.serialize(&mut w)?;
        w.flush()?;
        w.get_ref().sync_all()?;
        Ok(())
    }

    /// Checks the structural invariants of a deserialized schema.
    fn validate(&self) -> Result<(), TableError> {
        if self.name.trim().is_empty() {
            return Err(TableError::CorruptCatalog("blank table name".into()));
        }
        if self.fields.len() <= SYS_FIELD_NUM {
            return Err(TableError::CorruptCatalog("no user fields".into()));
        }

        let mut offset = 0;
        for (i, field) in self.fields.iter().enumerate() {
            if field.offset != offset {
                return Err(TableError::CorruptCatalog(format!(
                    "field {} at offset {}, expected {}",
                    field.name, field.offset, offset
                )));
            }
            offset += field.len;
            if (i < SYS_FIELD_NUM) == field.visible {
                return Err(TableError::CorruptCatalog(format!(
                    "field {} has wrong visibility",
                    field.name
                )));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(TableError::CorruptCatalog(format!(
                    "duplicate field name {}",
                    field.name
                )));
            }
        }

        for (i, index) in self.indexes.iter().enumerate() {
            if self.indexes[..i].iter().any(|x| x.name == index.name) {
                return Err(TableError::CorruptCatalog(format!(
                    "duplicate index name {}",
                    index.name
                )));
            }
            if self.indexes[..i].iter().any(|x| x.field_name == index.field_name) {
                return Err(TableError::CorruptCatalog(format!(
                    "field {} indexed twice",
                    index.field_name
                )));
            }
            if self.field(&index.field_name).is_none() {
                return Err(TableError::CorruptCatalog(format!(
                    "index {} references unknown field {}",
                    index.name, index.field_name
                )));
            }
        }
        Ok(())
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, TableError> {
    serde_json::to_string(value).map_err(|e| TableError::CorruptCatalog(e.to_string()))
}

fn from_json<T: for<'de> Deserialize<'de>>(line: &str) -> Result<T, TableError> {
    serde_json::from_str(line).map_err(|e| TableError::CorruptCatalog(e.to_string()))
}
