//! Schema compiler: from the field model to the physical star schema.
//!
//! `bind()` derives the table definitions and the join graph once;
//! the resulting [`SchemaBinding`] is cached on the cube and read-only
//! thereafter. DDL plans are ordered for dependencies: dimension tables
//! are created before the fact table whose foreign keys reference them,
//! and dropped after it.

use std::collections::BTreeMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::{CubeError, CubeResult};
use crate::model::{CubeModel, DataType};
use crate::sql::{ColumnDef, CreateTable, DropTable, TableConstraint, Truncate};

/// A column of a physical table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    pub primary_key: bool,
}

/// A physical table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableDef {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// A join edge of the star: fact table foreign key to a dimension
/// table's hash key.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinEdge {
    pub dimension: String,
    pub table: String,
    pub fact_column: String,
    pub key_column: String,
}

/// The compiled physical schema of one dataset: table definitions plus
/// the star-topology join graph (fact table at the center, one edge per
/// compound dimension).
#[derive(Debug, Clone)]
pub struct SchemaBinding {
    fact: TableDef,
    dimensions: BTreeMap<String, TableDef>,
    graph: DiGraph<String, JoinEdge>,
    fact_node: NodeIndex,
}

impl SchemaBinding {
    /// Derive the physical schema for a model.
    pub fn bind(model: &CubeModel) -> Self {
        let dataset = &model.dataset().name;

        let mut fact_columns = vec![ColumnSpec {
            name: "id".into(),
            data_type: DataType::Id,
            primary_key: true,
        }];
        for field in model.fields() {
            fact_columns.push(ColumnSpec {
                name: field.fact_column(),
                data_type: field.fact_column_type(),
                primary_key: false,
            });
        }
        let fact = TableDef {
            name: format!("{dataset}__entry"),
            columns: fact_columns,
        };

        let mut graph = DiGraph::new();
        let fact_node = graph.add_node(fact.name.clone());

        let mut dimensions = BTreeMap::new();
        for field in model.compounds() {
            let attributes = field
                .attributes()
                .expect("compound fields declare attributes");
            let mut columns = vec![ColumnSpec {
                name: "id".into(),
                data_type: DataType::Id,
                primary_key: true,
            }];
            for attribute in attributes.values() {
                columns.push(ColumnSpec {
                    name: attribute.name.clone(),
                    data_type: attribute.data_type,
                    primary_key: false,
                });
            }
            let table = TableDef {
                name: format!("{dataset}__{}", field.name()),
                columns,
            };

            let node = graph.add_node(table.name.clone());
            graph.add_edge(
                fact_node,
                node,
                JoinEdge {
                    dimension: field.name().to_string(),
                    table: table.name.clone(),
                    fact_column: field.fact_column(),
                    key_column: "id".into(),
                },
            );
            dimensions.insert(field.name().to_string(), table);
        }

        SchemaBinding {
            fact,
            dimensions,
            graph,
            fact_node,
        }
    }

    pub fn fact_table(&self) -> &TableDef {
        &self.fact
    }

    pub fn dimension_table(&self, dimension: &str) -> Option<&TableDef> {
        self.dimensions.get(dimension)
    }

    /// The join edge from the fact table to a dimension's table.
    pub fn join_for(&self, dimension: &str) -> Option<&JoinEdge> {
        self.graph
            .edges(self.fact_node)
            .map(|e| e.weight())
            .find(|edge| edge.dimension == dimension)
    }

    /// All tables, dimension tables first (dependency order).
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.dimensions.values().chain(std::iter::once(&self.fact))
    }

    /// CREATE TABLE statements in dependency order.
    pub fn create_plan(&self) -> Vec<CreateTable> {
        let mut plan = Vec::with_capacity(self.dimensions.len() + 1);
        for table in self.dimensions.values() {
            plan.push(create_table(table));
        }

        let mut fact = create_table(&self.fact);
        for edge in self.graph.edges(self.fact_node).map(|e| e.weight()) {
            fact = fact.constraint(TableConstraint::foreign_key(
                [edge.fact_column.clone()],
                edge.table.clone(),
                [edge.key_column.clone()],
            ));
        }
        plan.push(fact);
        plan
    }

    /// DROP TABLE statements in reverse dependency order, tolerating
    /// already-absent tables.
    pub fn drop_plan(&self) -> Vec<DropTable> {
        let mut plan = vec![DropTable::new(self.fact.name.clone()).if_exists()];
        for table in self.dimensions.values() {
            plan.push(DropTable::new(table.name.clone()).if_exists());
        }
        plan
    }

    /// TRUNCATE statements, fact table first so dimension rows are never
    /// referenced by surviving facts.
    pub fn flush_plan(&self) -> Vec<Truncate> {
        let mut plan = vec![Truncate::table(self.fact.name.clone())];
        for table in self.dimensions.values() {
            plan.push(Truncate::table(table.name.clone()));
        }
        plan
    }

    /// Check an existing fact table's columns against the model.
    ///
    /// Any missing or surplus column means the physical shape no longer
    /// matches and needs a manual migration.
    pub fn verify_fact_columns(&self, actual: &[String]) -> CubeResult<()> {
        let expected = self.fact.column_names();
        for column in &expected {
            if !actual.contains(column) {
                return Err(CubeError::SchemaConflict {
                    table: self.fact.name.clone(),
                    reason: format!("existing table lacks column '{column}'"),
                });
            }
        }
        for column in actual {
            if !expected.contains(column) {
                return Err(CubeError::SchemaConflict {
                    table: self.fact.name.clone(),
                    reason: format!("existing table has unexpected column '{column}'"),
                });
            }
        }
        Ok(())
    }
}

fn create_table(table: &TableDef) -> CreateTable {
    let mut stmt = CreateTable::new(table.name.clone()).if_not_exists();
    for column in &table.columns {
        let mut def = ColumnDef::new(column.name.clone(), column.data_type);
        if column.primary_key {
            def = def.primary_key();
        }
        stmt = stmt.column(def);
    }
    stmt
}
