//! Property-graph layer over redb.
//!
//! Nodes carry a label and string properties, relationships are typed and
//! directed, and both can be registered in named secondary indexes. Every
//! mutation happens through a [`GraphWriter`] scoped to one write transaction;
//! reads go through a [`GraphReader`] pinned to one snapshot.

use redb::{
    Database, ReadOnlyTable, ReadTransaction, ReadableDatabase, ReadableTable,
    ReadableTableMetadata, Table, TableDefinition, WriteTransaction,
};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const DB_FILE: &str = "graph.redb";
const KEY_SEP: char = '\x1f';

const NODES_TABLE: TableDefinition<u64, &str> = TableDefinition::new("nodes");
const NODE_DATA_TABLE: TableDefinition<&str, &str> = TableDefinition::new("node_data");
const RELATIONSHIPS_TABLE: TableDefinition<u64, (u64, u64)> =
    TableDefinition::new("relationships");
const RELATIONSHIP_TYPES_TABLE: TableDefinition<u64, &str> =
    TableDefinition::new("relationship_types");
const OUTGOING_TABLE: TableDefinition<(u64, u64), u64> = TableDefinition::new("outgoing");
const NODE_INDEX_TABLE: TableDefinition<&str, u64> = TableDefinition::new("node_index");
const RELATIONSHIP_INDEX_TABLE: TableDefinition<&str, u64> =
    TableDefinition::new("relationship_index");

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("cannot prepare database directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// An index lookup matched more than one entity.
    #[error("index {index} holds more than one entry for {key}={value}")]
    NotUnique {
        index: String,
        key: String,
        value: String,
    },

    #[error("node {0} not found")]
    NodeNotFound(u64),

    #[error("index {index} has no entry for {key}={value}")]
    MissingIndexEntry {
        index: String,
        key: String,
        value: String,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    pub id: RelationshipId,
    pub start: NodeId,
    pub end: NodeId,
}

pub struct GraphDb {
    db: Database,
    path: PathBuf,
}

impl GraphDb {
    /// Opens (or creates) the graph stored under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(DB_FILE);
        info!(path = %path.display(), "opening graph database");
        let db = Database::create(&path)?;
        init_db(&db)?;
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs `operation` inside one write transaction. The transaction commits
    /// only if `operation` succeeds; on error it is dropped, which aborts it.
    pub fn write<T, F>(&self, operation: F) -> StoreResult<T>
    where
        F: FnOnce(&mut GraphWriter<'_>) -> StoreResult<T>,
    {
        let write_txn = self.db.begin_write()?;
        let result = {
            let mut writer = GraphWriter::open(&write_txn)?;
            operation(&mut writer)?
        };
        write_txn.commit()?;
        Ok(result)
    }

    pub fn read(&self) -> StoreResult<GraphReader> {
        let read_txn = self.db.begin_read()?;
        GraphReader::open(&read_txn)
    }
}

fn init_db(db: &Database) -> StoreResult<()> {
    let write_txn = db.begin_write()?;
    write_txn.open_table(NODES_TABLE)?;
    write_txn.open_table(NODE_DATA_TABLE)?;
    write_txn.open_table(RELATIONSHIPS_TABLE)?;
    write_txn.open_table(RELATIONSHIP_TYPES_TABLE)?;
    write_txn.open_table(OUTGOING_TABLE)?;
    write_txn.open_table(NODE_INDEX_TABLE)?;
    write_txn.open_table(RELATIONSHIP_INDEX_TABLE)?;
    write_txn.commit()?;
    Ok(())
}

pub struct GraphWriter<'txn> {
    nodes: Table<'txn, u64, &'static str>,
    node_data: Table<'txn, &'static str, &'static str>,
    relationships: Table<'txn, u64, (u64, u64)>,
    relationship_types: Table<'txn, u64, &'static str>,
    outgoing: Table<'txn, (u64, u64), u64>,
    node_index: Table<'txn, &'static str, u64>,
    relationship_index: Table<'txn, &'static str, u64>,
    next_node_id: u64,
    next_relationship_id: u64,
}

impl<'txn> GraphWriter<'txn> {
    fn open(write_txn: &'txn WriteTransaction) -> StoreResult<Self> {
        let nodes = write_txn.open_table(NODES_TABLE)?;
        let relationships = write_txn.open_table(RELATIONSHIPS_TABLE)?;
        let next_node_id = next_id(&nodes)?;
        let next_relationship_id = next_id(&relationships)?;
        debug!(next_node_id, next_relationship_id, "write transaction opened");
        Ok(Self {
            nodes,
            node_data: write_txn.open_table(NODE_DATA_TABLE)?,
            relationships,
            relationship_types: write_txn.open_table(RELATIONSHIP_TYPES_TABLE)?,
            outgoing: write_txn.open_table(OUTGOING_TABLE)?,
            node_index: write_txn.open_table(NODE_INDEX_TABLE)?,
            relationship_index: write_txn.open_table(RELATIONSHIP_INDEX_TABLE)?,
            next_node_id,
            next_relationship_id,
        })
    }

    pub fn create_node(&mut self, label: &str) -> StoreResult<NodeId> {
        let id = self.next_node_id;
        self.nodes.insert(id, label)?;
        self.next_node_id += 1;
        Ok(NodeId(id))
    }

    pub fn set_node_property(&mut self, node: NodeId, key: &str, value: &str) -> StoreResult<()> {
        if self.nodes.get(node.0)?.is_none() {
            return Err(StoreError::NodeNotFound(node.0));
        }
        let data_key = node_data_key(node, key);
        self.node_data.insert(data_key.as_str(), value)?;
        Ok(())
    }

    pub fn create_relationship(
        &mut self,
        start: NodeId,
        end: NodeId,
        rel_type: &str,
    ) -> StoreResult<RelationshipId> {
        for node in [start, end] {
            if self.nodes.get(node.0)?.is_none() {
                return Err(StoreError::NodeNotFound(node.0));
            }
        }
        let id = self.next_relationship_id;
        self.relationships.insert(id, (start.0, end.0))?;
        self.relationship_types.insert(id, rel_type)?;
        self.outgoing.insert((start.0, id), end.0)?;
        self.next_relationship_id += 1;
        Ok(RelationshipId(id))
    }

    pub fn index_node(&mut self, index: &str, key: &str, value: &str, node: NodeId) -> StoreResult<()> {
        let entry_key = index_entry_key(index, key, value, node.0);
        self.node_index.insert(entry_key.as_str(), node.0)?;
        Ok(())
    }

    pub fn index_relationship(
        &mut self,
        index: &str,
        key: &str,
        value: &str,
        relationship: RelationshipId,
    ) -> StoreResult<()> {
        let entry_key = index_entry_key(index, key, value, relationship.0);
        self.relationship_index.insert(entry_key.as_str(), relationship.0)?;
        Ok(())
    }

    pub fn single_node(&self, index: &str, key: &str, value: &str) -> StoreResult<Option<NodeId>> {
        Ok(single_entry(&self.node_index, index, key, value)?.map(NodeId))
    }

    pub fn single_relationship(
        &self,
        index: &str,
        key: &str,
        value: &str,
    ) -> StoreResult<Option<RelationshipId>> {
        Ok(single_entry(&self.relationship_index, index, key, value)?.map(RelationshipId))
    }
}

pub struct GraphReader {
    nodes: ReadOnlyTable<u64, &'static str>,
    node_data: ReadOnlyTable<&'static str, &'static str>,
    relationships: ReadOnlyTable<u64, (u64, u64)>,
    relationship_types: ReadOnlyTable<u64, &'static str>,
    outgoing: ReadOnlyTable<(u64, u64), u64>,
    node_index: ReadOnlyTable<&'static str, u64>,
}

impl GraphReader {
    fn open(read_txn: &ReadTransaction) -> StoreResult<Self> {
        Ok(Self {
            nodes: read_txn.open_table(NODES_TABLE)?,
            node_data: read_txn.open_table(NODE_DATA_TABLE)?,
            relationships: read_txn.open_table(RELATIONSHIPS_TABLE)?,
            relationship_types: read_txn.open_table(RELATIONSHIP_TYPES_TABLE)?,
            outgoing: read_txn.open_table(OUTGOING_TABLE)?,
            node_index: read_txn.open_table(NODE_INDEX_TABLE)?,
        })
    }

    pub fn single_node(&self, index: &str, key: &str, value: &str) -> StoreResult<Option<NodeId>> {
        Ok(single_entry(&self.node_index, index, key, value)?.map(NodeId))
    }

    pub fn node_property(&self, node: NodeId, key: &str) -> StoreResult<Option<String>> {
        let data_key = node_data_key(node, key);
        Ok(self
            .node_data
            .get(data_key.as_str())?
            .map(|value| value.value().to_string()))
    }

    /// Relationships starting at `node`, in creation order.
    pub fn outgoing(&self, node: NodeId) -> StoreResult<Vec<Relationship>> {
        let mut relationships = Vec::new();
        for entry in self.outgoing.range((node.0, 0u64)..=(node.0, u64::MAX))? {
            let (key, end) = entry?;
            let (start, id) = key.value();
            relationships.push(Relationship {
                id: RelationshipId(id),
                start: NodeId(start),
                end: NodeId(end.value()),
            });
        }
        Ok(relationships)
    }

    pub fn relationship_type(&self, relationship: RelationshipId) -> StoreResult<Option<String>> {
        Ok(self
            .relationship_types
            .get(relationship.0)?
            .map(|rel_type| rel_type.value().to_string()))
    }

    pub fn relationships(&self) -> StoreResult<Vec<Relationship>> {
        let mut relationships = Vec::new();
        for entry in self.relationships.iter()? {
            let (id, endpoints) = entry?;
            let (start, end) = endpoints.value();
            relationships.push(Relationship {
                id: RelationshipId(id.value()),
                start: NodeId(start),
                end: NodeId(end),
            });
        }
        Ok(relationships)
    }

    pub fn node_count(&self) -> StoreResult<u64> {
        Ok(self.nodes.len()?)
    }

    pub fn relationship_count(&self) -> StoreResult<u64> {
        Ok(self.relationships.len()?)
    }
}

fn next_id<V: redb::Value + 'static>(table: &impl ReadableTable<u64, V>) -> StoreResult<u64> {
    Ok(table.last()?.map(|(key, _)| key.value() + 1).unwrap_or(0))
}

fn single_entry(
    index_table: &impl ReadableTable<&'static str, u64>,
    index: &str,
    key: &str,
    value: &str,
) -> StoreResult<Option<u64>> {
    type StrGuard<'a> = redb::AccessGuard<'a, &'static str>;
    type IdGuard<'a> = redb::AccessGuard<'a, u64>;

    let prefix = index_prefix(index, key, value);
    let mut found = None;
    for entry in index_table.range(prefix.as_str()..)? {
        let (entry_key, id): (StrGuard<'_>, IdGuard<'_>) = entry?;
        if !entry_key.value().starts_with(&prefix) {
            break;
        }
        if found.is_some() {
            return Err(StoreError::NotUnique {
                index: index.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        found = Some(id.value());
    }
    Ok(found)
}

fn node_data_key(node: NodeId, key: &str) -> String {
    format!("{}{KEY_SEP}{}", node.0, encode_component(key))
}

fn index_prefix(index: &str, key: &str, value: &str) -> String {
    format!(
        "{}{KEY_SEP}{}{KEY_SEP}{}{KEY_SEP}",
        encode_component(index),
        encode_component(key),
        encode_component(value)
    )
}

fn index_entry_key(index: &str, key: &str, value: &str, id: u64) -> String {
    format!("{}{id:020}", index_prefix(index, key, value))
}

fn encode_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.as_bytes() {
        if *byte == (KEY_SEP as u8) || *byte == b'%' || !byte.is_ascii() {
            encoded.push('%');
            encoded.push(nibble_to_hex(byte >> 4));
            encoded.push(nibble_to_hex(byte & 0x0f));
        } else {
            encoded.push(*byte as char);
        }
    }
    encoded
}

fn nibble_to_hex(value: u8) -> char {
    match value {
        0..=9 => (b'0' + value) as char,
        10..=15 => (b'A' + (value - 10)) as char,
        _ => '0',
    }
}
