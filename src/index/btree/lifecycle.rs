//! Opening an existing index file or building a new one from a relation.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::buffer::BufferPoolManager;
use crate::common::config::IndexConfig;
use crate::common::{Error, PageId, Result};
use crate::relation::{extract_key, RecordSource};
use crate::storage::DiskManager;

use super::header::{encode_relation_name, index_file_name, AttrType, IndexHeader};
use super::node::LeafNode;
use super::scan::ScanState;
use super::{BTreeIndex, TreeHandle};

/// The attribute an index is built on.
#[derive(Debug, Clone, Copy)]
struct Attribute<'a> {
    relation_name: &'a str,
    byte_offset: i32,
    attr_type: AttrType,
}

impl BTreeIndex {
    /// Open the index on `relation_name` at `attr_byte_offset`, building it
    /// from `source` if its file does not exist in `dir` yet.
    ///
    /// The file is named `"<relation_name>.<attr_byte_offset>"`. An existing
    /// file keeps the capacities it was built with; `config` then only sizes
    /// the buffer pool.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` / `Error::UnsupportedAttrType` up front
    /// - `Error::BadIndexMetadata` if an existing file describes another index
    /// - `Error::TupleTooShort` or a source error while building; the partial
    ///   file is removed
    pub fn open_or_create<P: AsRef<Path>>(
        dir: P,
        relation_name: &str,
        attr_byte_offset: i32,
        attr_type: AttrType,
        source: &mut dyn RecordSource,
        config: IndexConfig,
    ) -> Result<Self> {
        config.validate()?;
        attr_type.ensure_indexable()?;

        let attribute = Attribute {
            relation_name,
            byte_offset: attr_byte_offset,
            attr_type,
        };
        let index_name = index_file_name(relation_name, attr_byte_offset);
        let path = dir.as_ref().join(&index_name);

        if path.exists() {
            Self::open_existing(path, index_name, attribute, config)
        } else {
            Self::create(path, index_name, attribute, source, config)
        }
    }

    fn open_existing(
        path: PathBuf,
        index_name: String,
        attribute: Attribute<'_>,
        config: IndexConfig,
    ) -> Result<Self> {
        let dm = DiskManager::open(&path)?;
        let header_page_id = dm.first_page_id();
        let bpm = BufferPoolManager::new(config.pool_size, dm);

        let header = read_header(&bpm, header_page_id)?;
        if !header.matches(attribute.relation_name, attribute.byte_offset, attribute.attr_type) {
            return Err(Error::BadIndexMetadata { index_name });
        }
        // The stored capacities decide how tall the tree can grow.
        config
            .with_leaf_capacity(header.leaf_capacity as usize)
            .with_internal_capacity(header.internal_capacity as usize)
            .validate()?;

        let tree = TreeHandle::from_header(header_page_id, &header);
        debug!(
            target: "pagedindex::btree",
            index = %index_name,
            root = %tree.root,
            height = tree.height,
            "opened index"
        );

        Ok(Self {
            index_name,
            path,
            bpm,
            tree,
            scan: ScanState::Idle,
        })
    }

    fn create(
        path: PathBuf,
        index_name: String,
        attribute: Attribute<'_>,
        source: &mut dyn RecordSource,
        config: IndexConfig,
    ) -> Result<Self> {
        let dm = DiskManager::create(&path)?;

        let built = Self::initialize(dm, path.clone(), index_name, attribute, config).and_then(
            |mut index| {
                let entries = index.bulk_load(source)?;
                index.flush()?;
                debug!(
                    target: "pagedindex::btree",
                    index = %index.index_name,
                    entries,
                    height = index.tree.height,
                    "built index"
                );
                Ok(index)
            },
        );

        if let Err(err) = &built {
            warn!(
                target: "pagedindex::btree",
                path = %path.display(),
                error = %err,
                "index build failed, removing file"
            );
            if let Err(rm_err) = std::fs::remove_file(&path) {
                warn!(target: "pagedindex::btree", path = %path.display(), error = %rm_err, "could not remove partial index");
            }
        }
        built
    }

    /// Header page and an empty root leaf.
    fn initialize(
        dm: DiskManager,
        path: PathBuf,
        index_name: String,
        attribute: Attribute<'_>,
        config: IndexConfig,
    ) -> Result<Self> {
        let expected_header = dm.first_page_id();
        let bpm = BufferPoolManager::new(config.pool_size, dm);

        let header_page_id = bpm.new_page()?.page_id();
        if header_page_id != expected_header {
            return Err(Error::corrupted(
                header_page_id.0,
                format!("header must be page {}", expected_header),
            ));
        }

        let root = {
            let mut guard = bpm.new_page()?;
            LeafNode::new(config.leaf_capacity).encode_into(&mut guard);
            guard.page_id()
        };

        let tree = TreeHandle {
            header_page_id,
            root,
            height: 1,
            leaf_capacity: config.leaf_capacity,
            internal_capacity: config.internal_capacity,
            relation_name: encode_relation_name(attribute.relation_name),
            attr_byte_offset: attribute.byte_offset,
            attr_type: attribute.attr_type,
            poisoned: false,
        };
        tree.persist(&bpm)?;

        debug!(
            target: "pagedindex::btree",
            index = %index_name,
            leaf_capacity = tree.leaf_capacity,
            internal_capacity = tree.internal_capacity,
            "created index file"
        );

        Ok(Self {
            index_name,
            path,
            bpm,
            tree,
            scan: ScanState::Idle,
        })
    }

    /// Insert the key of every record in `source`, from the start.
    fn bulk_load(&mut self, source: &mut dyn RecordSource) -> Result<usize> {
        source.rewind()?;
        let mut entries = 0;
        while let Some((rid, tuple)) = source.next_record()? {
            let key = extract_key(&tuple, self.tree.attr_byte_offset)?;
            self.insert_entry(key, rid)?;
            entries += 1;
        }
        Ok(entries)
    }
}

fn read_header(bpm: &BufferPoolManager, page_id: PageId) -> Result<IndexHeader> {
    let guard = bpm.fetch_page_read(page_id)?;
    let header = IndexHeader::decode(&guard, page_id)?;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::relation::{tuple_with_key, MemoryRelation};

    fn small_config() -> IndexConfig {
        IndexConfig::default()
            .with_pool_size(40)
            .with_leaf_capacity(3)
            .with_internal_capacity(3)
    }

    fn relation(keys: &[i32]) -> MemoryRelation {
        let mut relation = MemoryRelation::new("emp");
        for &key in keys {
            relation.push_record(tuple_with_key(12, 4, key));
        }
        relation
    }

    #[test]
    fn test_create_writes_header_and_root() {
        let dir = TempDir::new().unwrap();
        let mut source = relation(&[]);
        let index = BTreeIndex::open_or_create(
            dir.path(),
            "emp",
            4,
            AttrType::Integer,
            &mut source,
            small_config(),
        )
        .unwrap();

        assert_eq!(index.index_name(), "emp.4");
        assert!(dir.path().join("emp.4").exists());
        assert_eq!(index.height(), 1);
        assert_eq!(index.tree.header_page_id, PageId::new(0));

        let header = read_header(&index.bpm, index.tree.header_page_id).unwrap();
        assert_eq!(header.root_page_id, index.root_page_id());
        assert_eq!(header.leaf_capacity, 3);
        assert!(header.matches("emp", 4, AttrType::Integer));
    }

    #[test]
    fn test_bulk_load_rewinds_source() {
        let dir = TempDir::new().unwrap();
        let mut source = relation(&[3, 1, 2]);
        // Leave the source partly consumed; creation starts over.
        source.next_record().unwrap();

        let mut index = BTreeIndex::open_or_create(
            dir.path(),
            "emp",
            4,
            AttrType::Integer,
            &mut source,
            small_config(),
        )
        .unwrap();

        let keys: Vec<i32> = index.leaf_entries().unwrap().iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 2, 3]);
        assert_eq!(index.scan_range(0, crate::Operator::Gt, 9, crate::Operator::Lt).unwrap().len(), 3);
    }

    #[test]
    fn test_failed_build_removes_file() {
        let dir = TempDir::new().unwrap();
        let mut source = MemoryRelation::new("emp");
        source.push_record(tuple_with_key(12, 4, 1));
        source.push_record(vec![0u8; 6]);

        let err = BTreeIndex::open_or_create(
            dir.path(),
            "emp",
            4,
            AttrType::Integer,
            &mut source,
            small_config(),
        )
        .err()
        .unwrap();

        assert!(matches!(err, Error::TupleTooShort { offset: 4, len: 6 }));
        assert!(!dir.path().join("emp.4").exists());
    }

    #[test]
    fn test_rejects_before_touching_disk() {
        let dir = TempDir::new().unwrap();
        let mut source = relation(&[1]);

        let err = BTreeIndex::open_or_create(
            dir.path(),
            "emp",
            4,
            AttrType::String,
            &mut source,
            small_config(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::UnsupportedAttrType(_)));

        let err = BTreeIndex::open_or_create(
            dir.path(),
            "emp",
            4,
            AttrType::Integer,
            &mut source,
            small_config().with_leaf_capacity(0),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::InvalidConfig(_)));

        assert!(!dir.path().join("emp.4").exists());
    }
}
