//! Schema materialization.
//!
//! Builds one immutable [`RowDef`] per user table and per group table
//! from a resolved [`SchemaDef`] in a single pass, then swaps the
//! whole generation atomically. Readers holding a previous
//! generation's RowDefs keep a consistent view until they release it.

use crate::codec::Charset;
use crate::error::{Error, Result};
use crate::rowdef::{FieldLayout, IndexDef, RowDef, RowDefBuilder, RowDefKind};
use crate::status::cache::TableStatusCache;
use crate::status::update::StatusUpdate;
use crate::tree::TreeExchange;
use arbordb_catalog::{Group, SchemaDef, TableId, UserTable};
use parking_lot::RwLock;
use semistr::SemiStr;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Default)]
pub struct RowDefCache {
    current: RwLock<Arc<Generation>>,
}

/// One immutable schema generation.
#[derive(Default)]
struct Generation {
    row_defs: HashMap<u32, Arc<RowDef>>,
    by_name: HashMap<(SemiStr, SemiStr), u32>,
}

impl RowDefCache {
    #[inline]
    pub fn new() -> Self {
        RowDefCache::default()
    }

    #[inline]
    pub fn row_def(&self, id: TableId) -> Option<Arc<RowDef>> {
        self.current.read().row_defs.get(&id.value()).cloned()
    }

    #[inline]
    pub fn row_def_by_name(&self, schema_name: &str, table_name: &str) -> Option<Arc<RowDef>> {
        let generation = self.current.read();
        generation
            .by_name
            .get(&(SemiStr::new(schema_name), SemiStr::new(table_name)))
            .and_then(|id| generation.row_defs.get(id))
            .cloned()
    }

    pub fn all_row_defs(&self) -> Vec<Arc<RowDef>> {
        self.current.read().row_defs.values().cloned().collect()
    }

    /// Replaces the whole RowDef set with one built from `schema`.
    /// Completes atomically: on any failure the prior generation stays
    /// fully intact. Ordinal assignment persists to the status tree
    /// eagerly, before the swap, and is idempotent under retry.
    pub fn set_schema(
        &self,
        schema: &SchemaDef,
        status_cache: &TableStatusCache,
        tree: &mut dyn TreeExchange,
    ) -> Result<()> {
        let offsets = column_offsets(schema)?;
        let mut generation = Generation::default();
        let mut row_defs = vec![];
        for table in schema.user_tables() {
            let group = schema.group_of(table.id);
            let offset = offsets.get(&table.id.value()).copied().unwrap_or(0);
            let row_def = build_user_row_def(schema, table, group, offset, status_cache)?;
            register(&mut generation, row_def.clone())?;
            row_defs.push(row_def);
        }
        for group in schema.groups() {
            let row_def = build_group_row_def(schema, group, &offsets, status_cache)?;
            register(&mut generation, row_def.clone())?;
            row_defs.push(row_def);
        }
        fix_up_ordinals(schema, status_cache)?;
        for row_def in &row_defs {
            row_def.table_status().set_row_def(row_def);
        }
        status_cache.save(tree)?;
        let tables = generation.row_defs.len();
        *self.current.write() = Arc::new(generation);
        info!(tables, "schema generation swapped");
        Ok(())
    }
}

fn register(generation: &mut Generation, row_def: Arc<RowDef>) -> Result<()> {
    let id = row_def.row_def_id().value();
    if generation.row_defs.contains_key(&id) {
        return Err(Error::DuplicateRowDef(id));
    }
    let key = (
        SemiStr::new(row_def.schema_name()),
        SemiStr::new(row_def.table_name()),
    );
    if generation.by_name.contains_key(&key) {
        return Err(Error::DuplicateTableName(format!(
            "{}.{}",
            row_def.schema_name(),
            row_def.table_name()
        )));
    }
    generation.by_name.insert(key, id);
    generation.row_defs.insert(id, row_def);
    Ok(())
}

/// Position of each user table's first column within its flattened
/// group row.
fn column_offsets(schema: &SchemaDef) -> Result<HashMap<u32, usize>> {
    let mut offsets = HashMap::new();
    for group in schema.groups() {
        let mut offset = 0;
        for table_id in &group.tables {
            let table = schema
                .table(*table_id)
                .ok_or(Error::UnknownTable(table_id.value()))?;
            offsets.insert(table_id.value(), offset);
            offset += table.columns.len();
        }
    }
    Ok(offsets)
}

fn build_user_row_def(
    schema: &SchemaDef,
    table: &UserTable,
    group: Option<&Group>,
    column_offset: usize,
    status_cache: &TableStatusCache,
) -> Result<Arc<RowDef>> {
    let fields: Vec<_> = table.columns.iter().map(FieldLayout::from_column).collect();
    let parent_join: Vec<usize> = table
        .join
        .iter()
        .flat_map(|j| j.columns.iter().map(|(_, child)| *child))
        .collect();
    // a table outside any group stores alone in its own tree.
    let tree_name = match group {
        Some(g) => g.tree_name.to_string(),
        None => format!("{}.{}", table.schema_name, table.name),
    };
    let indexes = build_indexes(table, &tree_name);
    let depth = hkey_depth(schema, table)?;
    let charset = Charset::from_name(&table.charset)?;
    let status = status_cache.get_or_create(table.id.value());
    Ok(RowDefBuilder::new(
        table.id,
        RowDefKind::User,
        &table.schema_name,
        &table.name,
    )
    .fields(fields)
    .tree_name(&tree_name)
    .charset(charset)
    .auto_increment(table.auto_increment(), 1)
    .parent_join_fields(&parent_join)
    .column_offset(column_offset)
    .hkey_depth(depth)
    .indexes(indexes)
    .group_row_def_id(group.map(|g| g.id))
    .build(status))
}

/// Indexes with at least one column, primary key first.
fn build_indexes(table: &UserTable, tree_name: &str) -> Vec<IndexDef> {
    let mut indexes: Vec<IndexDef> = table
        .indexes
        .iter()
        .filter(|i| !i.columns.is_empty())
        .map(|i| IndexDef {
            name: i.name.to_string(),
            index_id: i.index_id,
            primary: i.primary,
            fields: i.columns.to_vec(),
            tree_name: format!("{}${}", tree_name, i.name),
        })
        .collect();
    indexes.sort_by_key(|i| !i.primary);
    indexes
}

/// The flattened group row concatenates every member table's columns
/// in hierarchical order; member indexes are carried over with their
/// field positions shifted by the member's column offset.
fn build_group_row_def(
    schema: &SchemaDef,
    group: &Group,
    offsets: &HashMap<u32, usize>,
    status_cache: &TableStatusCache,
) -> Result<Arc<RowDef>> {
    let root = schema
        .table(group.root())
        .ok_or(Error::UnknownTable(group.root().value()))?;
    let mut fields = vec![];
    let mut indexes = vec![];
    for table_id in &group.tables {
        let table = schema
            .table(*table_id)
            .ok_or(Error::UnknownTable(table_id.value()))?;
        let offset = offsets[&table_id.value()];
        for col in &table.columns {
            let mut layout = FieldLayout::from_column(col);
            layout.position = offset + col.position;
            fields.push(layout);
        }
        for index in table.indexes.iter().filter(|i| !i.columns.is_empty()) {
            indexes.push(IndexDef {
                name: format!(
                    "{}$${}$${}$${}",
                    group.name, table.schema_name, table.name, index.name
                ),
                index_id: index.index_id,
                primary: false,
                fields: index.columns.iter().map(|c| offset + c).collect(),
                tree_name: group.tree_name.to_string(),
            });
        }
    }
    // group row counts derive from storage, never from the counter.
    let status = status_cache.get_or_create_computed(group.id.value());
    Ok(RowDefBuilder::new(
        group.id,
        RowDefKind::Group,
        &root.schema_name,
        &group.name,
    )
    .fields(fields)
    .tree_name(&group.tree_name)
    .indexes(indexes)
    .member_row_def_ids(group.tables.clone())
    .build(status))
}

/// Collects already-persisted ordinals per group, failing on a
/// repeat, then fills the gaps with the smallest unused values so
/// pre-existing assignments survive restarts untouched.
fn fix_up_ordinals(schema: &SchemaDef, status_cache: &TableStatusCache) -> Result<()> {
    for group in schema.groups() {
        let mut used = HashSet::new();
        let mut unassigned = vec![];
        for table_id in &group.tables {
            let status = status_cache.get_or_create(table_id.value());
            let ordinal = status.ordinal();
            if ordinal != 0 {
                if !used.insert(ordinal) {
                    return Err(Error::DuplicateOrdinal {
                        group: group.name.to_string(),
                        ordinal,
                    });
                }
            } else {
                unassigned.push(table_id.value());
            }
        }
        let mut candidate = 1u32;
        for table_id in unassigned {
            while used.contains(&candidate) {
                candidate += 1;
            }
            used.insert(candidate);
            status_cache.submit(StatusUpdate::AssignOrdinal {
                table_id,
                ordinal: candidate,
            });
            debug!(table_id, ordinal = candidate, "ordinal assigned");
        }
    }
    status_cache.apply_pending();
    Ok(())
}

/// Depth of the table's key path within its group's hierarchical key:
/// the position of the last hkey segment's last column, or the
/// segment's own position if it contributes no columns.
fn hkey_depth(schema: &SchemaDef, table: &UserTable) -> Result<usize> {
    let mut chain = vec![table];
    let mut current = table;
    while let Some(join) = &current.join {
        current = schema
            .table(join.parent)
            .ok_or(Error::UnknownTable(join.parent.value()))?;
        chain.push(current);
        debug_assert!(chain.len() <= schema.user_tables().count());
    }
    chain.reverse();
    let mut depth = 0;
    for (i, t) in chain.iter().enumerate() {
        depth += 1; // the segment's ordinal position
        let own = own_hkey_column_count(t);
        if i + 1 == chain.len() {
            return Ok(if own == 0 { depth } else { depth + own });
        }
        depth += own;
    }
    unreachable!("chain always contains the table itself")
}

/// Primary-key columns a table contributes to its hkey segment:
/// columns inherited through the parent join are already part of the
/// ancestor's segment.
fn own_hkey_column_count(table: &UserTable) -> usize {
    let pk = match table.primary_index() {
        Some(index) => index,
        None => return 0,
    };
    match &table.join {
        None => pk.columns.len(),
        Some(join) => pk
            .columns
            .iter()
            .filter(|c| !join.columns.iter().any(|(_, child)| child == *c))
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::cache::STATUS_TREE_NAME;
    use crate::tree::MemTree;
    use arbordb_catalog::{Column, ColumnAttr, ColumnType, IndexSpec, JoinSpec, SchemaDefBuilder};

    const CUSTOMER: u32 = 1;
    const ORDERS: u32 = 2;
    const ITEMS: u32 = 3;
    const GROUP: u32 = 100;

    fn coi_schema() -> SchemaDef {
        let customer = UserTable::new(
            TableId::new(CUSTOMER),
            "test",
            "customer",
            vec![
                Column::new("cid", 0, ColumnType::Int, false)
                    .with_attr(ColumnAttr::PK | ColumnAttr::AUTO_INC),
                Column::new("name", 1, ColumnType::VarChar(64), true),
            ],
        )
        .with_indexes(vec![IndexSpec::new("pk", 1, true, &[0])]);
        let orders = UserTable::new(
            TableId::new(ORDERS),
            "test",
            "orders",
            vec![
                Column::new("oid", 0, ColumnType::Int, false).with_attr(ColumnAttr::PK),
                Column::new("cid", 1, ColumnType::Int, false).with_attr(ColumnAttr::FK),
                Column::new("note", 2, ColumnType::VarChar(32), true),
            ],
        )
        .with_indexes(vec![
            IndexSpec::new("by_cid", 3, false, &[1]),
            IndexSpec::new("pk", 2, true, &[0]),
        ])
        .with_join(JoinSpec::new(TableId::new(CUSTOMER), &[(0, 1)]));
        let items = UserTable::new(
            TableId::new(ITEMS),
            "test",
            "items",
            vec![
                Column::new("iid", 0, ColumnType::Int, false).with_attr(ColumnAttr::PK),
                Column::new("oid", 1, ColumnType::Int, false).with_attr(ColumnAttr::FK),
            ],
        )
        .with_indexes(vec![IndexSpec::new("pk", 4, true, &[0])])
        .with_join(JoinSpec::new(TableId::new(ORDERS), &[(0, 1)]));

        let mut builder = SchemaDefBuilder::new();
        builder.add_table(customer).unwrap();
        builder.add_table(orders).unwrap();
        builder.add_table(items).unwrap();
        builder
            .add_group(arbordb_catalog::Group::new(
                TableId::new(GROUP),
                "coi",
                "coi_tree",
                vec![
                    TableId::new(CUSTOMER),
                    TableId::new(ORDERS),
                    TableId::new(ITEMS),
                ],
            ))
            .unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn test_set_schema_builds_all_row_defs() {
        let schema = coi_schema();
        let cache = RowDefCache::new();
        let status_cache = TableStatusCache::new();
        let mut tree = MemTree::new();
        cache.set_schema(&schema, &status_cache, &mut tree).unwrap();

        assert_eq!(cache.all_row_defs().len(), 4);
        let customer = cache.row_def(TableId::new(CUSTOMER)).unwrap();
        assert_eq!(customer.kind(), RowDefKind::User);
        assert_eq!(customer.tree_name(), "coi_tree");
        assert_eq!(customer.auto_increment_field(), Some(0));
        assert!(customer.parent_join_fields().is_empty());
        assert_eq!(customer.column_offset(), 0);

        let orders = cache.row_def_by_name("test", "orders").unwrap();
        assert_eq!(orders.parent_join_fields(), &[1]);
        assert_eq!(orders.column_offset(), 2);
        // primary key first despite declaration order.
        assert!(orders.indexes()[0].primary);

        let items = cache.row_def(TableId::new(ITEMS)).unwrap();
        assert_eq!(items.column_offset(), 5);

        let group = cache.row_def(TableId::new(GROUP)).unwrap();
        assert_eq!(group.kind(), RowDefKind::Group);
        // flattened columns: 2 + 3 + 2.
        assert_eq!(group.field_count(), 7);
        assert_eq!(group.member_row_def_ids().len(), 3);
        assert!(group
            .indexes()
            .iter()
            .any(|i| i.name == "coi$$test$$orders$$by_cid"));
        // group index fields are shifted into the flattened row.
        let by_cid = group
            .indexes()
            .iter()
            .find(|i| i.name == "coi$$test$$orders$$by_cid")
            .unwrap();
        assert_eq!(by_cid.fields, vec![3]);
    }

    #[test]
    fn test_hkey_depths() {
        let schema = coi_schema();
        let cache = RowDefCache::new();
        let status_cache = TableStatusCache::new();
        let mut tree = MemTree::new();
        cache.set_schema(&schema, &status_cache, &mut tree).unwrap();
        // customer: segment + cid.
        assert_eq!(cache.row_def(TableId::new(CUSTOMER)).unwrap().hkey_depth(), 2);
        // orders: customer's (2) + segment + oid.
        assert_eq!(cache.row_def(TableId::new(ORDERS)).unwrap().hkey_depth(), 4);
        // items: orders' (4) + segment + iid.
        assert_eq!(cache.row_def(TableId::new(ITEMS)).unwrap().hkey_depth(), 6);
    }

    #[test]
    fn test_ordinal_fills_smallest_gap() {
        let schema = coi_schema();
        let cache = RowDefCache::new();
        let status_cache = TableStatusCache::new();
        // two tables already carry persisted ordinals {1, 3}.
        status_cache.get_or_create(CUSTOMER).set_ordinal(1);
        status_cache.get_or_create(ITEMS).set_ordinal(3);
        let mut tree = MemTree::new();
        cache.set_schema(&schema, &status_cache, &mut tree).unwrap();
        assert_eq!(cache.row_def(TableId::new(CUSTOMER)).unwrap().ordinal(), 1);
        assert_eq!(cache.row_def(TableId::new(ORDERS)).unwrap().ordinal(), 2);
        assert_eq!(cache.row_def(TableId::new(ITEMS)).unwrap().ordinal(), 3);
    }

    #[test]
    fn test_duplicate_ordinal_aborts_swap() {
        let schema = coi_schema();
        let cache = RowDefCache::new();
        let status_cache = TableStatusCache::new();
        status_cache.get_or_create(CUSTOMER).set_ordinal(3);
        status_cache.get_or_create(ORDERS).set_ordinal(3);
        let mut tree = MemTree::new();
        let res = cache.set_schema(&schema, &status_cache, &mut tree);
        assert!(matches!(res, Err(Error::DuplicateOrdinal { ordinal: 3, .. })));
        // the failed swap left nothing visible.
        assert!(cache.all_row_defs().is_empty());
    }

    #[test]
    fn test_ordinals_persisted_eagerly() {
        let schema = coi_schema();
        let cache = RowDefCache::new();
        let status_cache = TableStatusCache::new();
        let mut tree = MemTree::new();
        cache.set_schema(&schema, &status_cache, &mut tree).unwrap();
        // a fresh status cache restarted from the same tree sees the
        // assigned ordinals.
        let restarted = TableStatusCache::new();
        restarted.load(&tree).unwrap();
        assert_eq!(restarted.get(CUSTOMER).unwrap().ordinal(), 1);
        assert_eq!(restarted.get(ORDERS).unwrap().ordinal(), 2);
        assert_eq!(restarted.get(ITEMS).unwrap().ordinal(), 3);
        assert!(tree.next(STATUS_TREE_NAME, None).is_some());
    }

    #[test]
    fn test_computed_guard_survives_restart() {
        let schema = coi_schema();
        let cache = RowDefCache::new();
        let status_cache = TableStatusCache::new();
        let mut tree = MemTree::new();
        cache.set_schema(&schema, &status_cache, &mut tree).unwrap();
        let group = cache.row_def(TableId::new(GROUP)).unwrap();
        assert!(group.table_status().set_row_count(10).is_err());

        // restart: statuses reload without the computed flag, which
        // must come back when the schema is materialized again.
        let restarted_status = TableStatusCache::new();
        restarted_status.load(&tree).unwrap();
        let restarted = RowDefCache::new();
        restarted
            .set_schema(&schema, &restarted_status, &mut tree)
            .unwrap();
        let group = restarted.row_def(TableId::new(GROUP)).unwrap();
        assert!(matches!(
            group.table_status().set_row_count(10),
            Err(Error::IllegalRowCountMutation(GROUP))
        ));
    }

    #[test]
    fn test_generation_swap_keeps_old_readers_valid() {
        let schema = coi_schema();
        let cache = RowDefCache::new();
        let status_cache = TableStatusCache::new();
        let mut tree = MemTree::new();
        cache.set_schema(&schema, &status_cache, &mut tree).unwrap();
        let held = cache.row_def(TableId::new(CUSTOMER)).unwrap();
        // swap in the same schema again: a new generation replaces
        // the old wholesale.
        cache.set_schema(&schema, &status_cache, &mut tree).unwrap();
        let fresh = cache.row_def(TableId::new(CUSTOMER)).unwrap();
        assert!(!Arc::ptr_eq(&held, &fresh));
        // the old reference still answers layout queries.
        assert_eq!(held.field_count(), 2);
    }

    #[test]
    fn test_table_without_group_gets_own_tree() {
        let lone = UserTable::new(
            TableId::new(9),
            "test",
            "lone",
            vec![Column::new("id", 0, ColumnType::Int, false).with_attr(ColumnAttr::PK)],
        )
        .with_indexes(vec![IndexSpec::new("pk", 9, true, &[0])]);
        let mut builder = SchemaDefBuilder::new();
        builder.add_table(lone).unwrap();
        let schema = builder.finish().unwrap();
        let cache = RowDefCache::new();
        let status_cache = TableStatusCache::new();
        let mut tree = MemTree::new();
        cache.set_schema(&schema, &status_cache, &mut tree).unwrap();
        let def = cache.row_def(TableId::new(9)).unwrap();
        assert_eq!(def.tree_name(), "test.lone");
    }
}
