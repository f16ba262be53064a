use crate::error::{Error, Result};
use crate::{Group, SchemaDef, TableId, UserTable};
use indexmap::IndexMap;

/// Assembles a [`SchemaDef`] from tables and groups, validating all
/// cross references before the definition is handed to the storage
/// layer. A builder that fails leaves no partial state behind.
#[derive(Debug, Default)]
pub struct SchemaDefBuilder {
    tables: IndexMap<TableId, UserTable>,
    groups: Vec<Group>,
}

impl SchemaDefBuilder {
    #[inline]
    pub fn new() -> Self {
        SchemaDefBuilder::default()
    }

    pub fn add_table(&mut self, table: UserTable) -> Result<()> {
        if self.tables.contains_key(&table.id) {
            return Err(Error::DuplicateTableId(table.id.value()));
        }
        if self
            .tables
            .values()
            .any(|t| t.schema_name == table.schema_name && t.name == table.name)
        {
            return Err(Error::TableAlreadyExists(table.name.to_string()));
        }
        validate_table(&table)?;
        self.tables.insert(table.id, table);
        Ok(())
    }

    pub fn add_group(&mut self, group: Group) -> Result<()> {
        if group.tables.is_empty() {
            return Err(Error::InvalidGroupMember(group.name.to_string()));
        }
        for (i, tid) in group.tables.iter().enumerate() {
            let table = self
                .tables
                .get(tid)
                .ok_or_else(|| Error::InvalidGroupMember(group.name.to_string()))?;
            match &table.join {
                None => {
                    // only the root may be joinless.
                    if i != 0 {
                        return Err(Error::InvalidGroupMember(group.name.to_string()));
                    }
                }
                Some(join) => {
                    // parent must precede child in hierarchical order.
                    let parent_pos = group.tables.iter().position(|t| *t == join.parent);
                    match parent_pos {
                        Some(p) if p < i => {}
                        _ => return Err(Error::InvalidJoinParent(table.name.to_string())),
                    }
                    let parent = &self.tables[&join.parent];
                    for (pc, cc) in &join.columns {
                        if *pc >= parent.columns.len() || *cc >= table.columns.len() {
                            return Err(Error::InvalidJoinColumns(table.name.to_string()));
                        }
                    }
                }
            }
        }
        self.groups.push(group);
        Ok(())
    }

    pub fn finish(self) -> Result<SchemaDef> {
        // group-table ids must not collide with user-table ids.
        for group in &self.groups {
            if self.tables.contains_key(&group.id) {
                return Err(Error::DuplicateTableId(group.id.value()));
            }
        }
        Ok(SchemaDef {
            tables: self.tables,
            groups: self.groups,
        })
    }
}

fn validate_table(table: &UserTable) -> Result<()> {
    for (i, col) in table.columns.iter().enumerate() {
        if col.position != i {
            return Err(Error::ColumnPositionOutOfRange(col.position));
        }
        if table.columns[..i].iter().any(|c| c.name == col.name) {
            return Err(Error::ColumnNameNotUnique(col.name.to_string()));
        }
    }
    for index in &table.indexes {
        for pos in &index.columns {
            if *pos >= table.columns.len() {
                return Err(Error::ColumnPositionOutOfRange(*pos));
            }
        }
    }
    if let Some(join) = &table.join {
        for (_, cc) in &join.columns {
            if *cc >= table.columns.len() {
                return Err(Error::ColumnPositionOutOfRange(*cc));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Column, ColumnType, IndexSpec, JoinSpec};

    fn customer() -> UserTable {
        UserTable::new(
            TableId::new(1),
            "test",
            "customer",
            vec![
                Column::new("cid", 0, ColumnType::Int, false),
                Column::new("name", 1, ColumnType::VarChar(64), true),
            ],
        )
        .with_indexes(vec![IndexSpec::new("pk", 1, true, &[0])])
    }

    fn orders() -> UserTable {
        UserTable::new(
            TableId::new(2),
            "test",
            "orders",
            vec![
                Column::new("oid", 0, ColumnType::Int, false),
                Column::new("cid", 1, ColumnType::Int, false),
            ],
        )
        .with_indexes(vec![IndexSpec::new("pk", 2, true, &[0])])
        .with_join(JoinSpec::new(TableId::new(1), &[(0, 1)]))
    }

    #[test]
    fn test_builder_valid_group() {
        let mut builder = SchemaDefBuilder::new();
        builder.add_table(customer()).unwrap();
        builder.add_table(orders()).unwrap();
        builder
            .add_group(Group::new(
                TableId::new(100),
                "customer_group",
                "customer_group_tree",
                vec![TableId::new(1), TableId::new(2)],
            ))
            .unwrap();
        let schema = builder.finish().unwrap();
        assert_eq!(schema.user_tables().count(), 2);
        assert_eq!(schema.group_of(TableId::new(2)).unwrap().root(), TableId::new(1));
    }

    #[test]
    fn test_builder_rejects_dangling_join() {
        let mut builder = SchemaDefBuilder::new();
        builder.add_table(orders()).unwrap();
        // parent (customer) is missing from the group.
        let res = builder.add_group(Group::new(
            TableId::new(100),
            "g",
            "g_tree",
            vec![TableId::new(2)],
        ));
        assert!(res.is_err());
    }

    #[test]
    fn test_builder_rejects_duplicate_table() {
        let mut builder = SchemaDefBuilder::new();
        builder.add_table(customer()).unwrap();
        let res = builder.add_table(customer());
        assert!(matches!(res, Err(Error::DuplicateTableId(1))));
    }

    #[test]
    fn test_builder_rejects_bad_column_order() {
        let table = UserTable::new(
            TableId::new(3),
            "test",
            "bad",
            vec![Column::new("a", 1, ColumnType::Int, false)],
        );
        let mut builder = SchemaDefBuilder::new();
        assert!(builder.add_table(table).is_err());
    }
}
