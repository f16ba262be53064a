pub mod builder;
pub mod error;

pub use builder::SchemaDefBuilder;

use bitflags::bitflags;
use indexmap::IndexMap;
use semistr::SemiStr;
use smallvec::SmallVec;
use std::fmt;
use std::marker::PhantomData;

/// Typed identifier of a database object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectID<T> {
    id: u32,
    _marker: PhantomData<T>,
}

impl<T> fmt::Debug for ObjectID<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectID").field("id", &self.id).finish()
    }
}

impl<T> ObjectID<T> {
    /// Ids are assigned by the external DDL layer, not generated here.
    #[inline]
    pub fn new(id: u32) -> Self {
        ObjectID {
            id,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn value(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct T;
pub type TableId = ObjectID<T>;

/// Storage-typed column model.
/// Variable-width types carry the declared maximum byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    BigInt,
    VarChar(u32),
    VarBinary(u32),
}

impl ColumnType {
    #[inline]
    pub const fn is_fixed(&self) -> bool {
        !matches!(self, ColumnType::VarChar(_) | ColumnType::VarBinary(_))
    }

    /// Width in bytes of a fixed type, None for variable types.
    #[inline]
    pub const fn fixed_len(&self) -> Option<usize> {
        match self {
            ColumnType::TinyInt => Some(1),
            ColumnType::SmallInt => Some(2),
            ColumnType::MediumInt => Some(3),
            ColumnType::Int => Some(4),
            ColumnType::BigInt => Some(8),
            ColumnType::VarChar(_) | ColumnType::VarBinary(_) => None,
        }
    }

    /// Maximum data byte length, excluding any length prefix.
    #[inline]
    pub const fn max_len(&self) -> usize {
        match self {
            ColumnType::VarChar(n) | ColumnType::VarBinary(n) => *n as usize,
            _ => match self.fixed_len() {
                Some(n) => n,
                None => unreachable!(),
            },
        }
    }
}

bitflags! {
    pub struct ColumnAttr: u8 {
        const PK = 0x01; // primary key
        const UK = 0x02; // unique key
        const FK = 0x04; // foreign key
        const AUTO_INC = 0x08; // auto-increment
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: SemiStr,
    /// 0-based index within the owning table, stable for its lifetime.
    pub position: usize,
    pub col_type: ColumnType,
    pub nullable: bool,
    pub attr: ColumnAttr,
}

impl Column {
    #[inline]
    pub fn new(name: &str, position: usize, col_type: ColumnType, nullable: bool) -> Self {
        Column {
            name: SemiStr::new(name),
            position,
            col_type,
            nullable,
            attr: ColumnAttr::empty(),
        }
    }

    #[inline]
    pub fn with_attr(mut self, attr: ColumnAttr) -> Self {
        self.attr = attr;
        self
    }
}

/// Index definition as supplied by the DDL layer: a named, ordered
/// list of column positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: SemiStr,
    pub index_id: u32,
    pub primary: bool,
    pub columns: SmallVec<[usize; 4]>,
}

impl IndexSpec {
    #[inline]
    pub fn new(name: &str, index_id: u32, primary: bool, columns: &[usize]) -> Self {
        IndexSpec {
            name: SemiStr::new(name),
            index_id,
            primary,
            columns: SmallVec::from_slice(columns),
        }
    }
}

/// Join from a child table to its immediate parent within the same
/// group. Column pairs are (parent position, child position).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub parent: TableId,
    pub columns: SmallVec<[(usize, usize); 4]>,
}

impl JoinSpec {
    #[inline]
    pub fn new(parent: TableId, columns: &[(usize, usize)]) -> Self {
        JoinSpec {
            parent,
            columns: SmallVec::from_slice(columns),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserTable {
    pub id: TableId,
    pub schema_name: SemiStr,
    pub name: SemiStr,
    pub columns: Vec<Column>,
    pub indexes: Vec<IndexSpec>,
    pub join: Option<JoinSpec>,
    pub charset: SemiStr,
}

impl UserTable {
    #[inline]
    pub fn new(id: TableId, schema_name: &str, name: &str, columns: Vec<Column>) -> Self {
        UserTable {
            id,
            schema_name: SemiStr::new(schema_name),
            name: SemiStr::new(name),
            columns,
            indexes: vec![],
            join: None,
            charset: SemiStr::new("UTF-8"),
        }
    }

    #[inline]
    pub fn with_indexes(mut self, indexes: Vec<IndexSpec>) -> Self {
        self.indexes = indexes;
        self
    }

    #[inline]
    pub fn with_join(mut self, join: JoinSpec) -> Self {
        self.join = Some(join);
        self
    }

    /// First auto-increment column position, if any.
    #[inline]
    pub fn auto_increment(&self) -> Option<usize> {
        self.columns
            .iter()
            .find(|c| c.attr.contains(ColumnAttr::AUTO_INC))
            .map(|c| c.position)
    }

    #[inline]
    pub fn primary_index(&self) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.primary)
    }
}

/// A group clusters one root table and all its joined descendants in
/// a single storage tree. Tables are listed in hierarchical order:
/// root first, then depth-first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Table id of the derived group table.
    pub id: TableId,
    pub name: SemiStr,
    pub tree_name: SemiStr,
    pub tables: Vec<TableId>,
}

impl Group {
    #[inline]
    pub fn new(id: TableId, name: &str, tree_name: &str, tables: Vec<TableId>) -> Self {
        Group {
            id,
            name: SemiStr::new(name),
            tree_name: SemiStr::new(tree_name),
            tables,
        }
    }

    #[inline]
    pub fn root(&self) -> TableId {
        self.tables[0]
    }
}

/// Fully-resolved schema: the input the storage layer materializes
/// row definitions from. Assembled and validated by
/// [`SchemaDefBuilder`]; immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct SchemaDef {
    pub(crate) tables: IndexMap<TableId, UserTable>,
    pub(crate) groups: Vec<Group>,
}

impl SchemaDef {
    #[inline]
    pub fn user_tables(&self) -> impl Iterator<Item = &UserTable> {
        self.tables.values()
    }

    #[inline]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    #[inline]
    pub fn table(&self, id: TableId) -> Option<&UserTable> {
        self.tables.get(&id)
    }

    #[inline]
    pub fn find_table_by_name(&self, schema_name: &str, name: &str) -> Option<&UserTable> {
        self.tables
            .values()
            .find(|t| t.schema_name == schema_name && t.name == name)
    }

    /// Group containing the given user table.
    #[inline]
    pub fn group_of(&self, id: TableId) -> Option<&Group> {
        self.groups.iter().find(|g| g.tables.contains(&id))
    }
}
