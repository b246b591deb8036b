//! Schema normalization.
//!
//! Turns origin table descriptors into destination-ready ones: every column
//! type is mapped through the pair's [`TypeMapper`], origin-only metadata
//! (defaults, autoincrement, comments) is dropped, identifiers are cut to
//! the narrower of the two dialects' limits, and constraints are split into
//! the ones created with the table and the ones deferred until after load.
//!
//! The origin descriptor is kept alongside the destination one so readers
//! and writers each address their own side with matching column positions.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::MigrationConfig;
use crate::core::identifier::{truncate_identifier, validate_check_constraint};
use crate::core::schema::{CheckConstraint, Column, ForeignKey, Index, Table, UniqueConstraint};
use crate::core::traits::TypeMapper;
use crate::dialect::DialectKind;
use crate::error::{MigrateError, Result};

/// Tables and columns left out of a migration.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    tables: BTreeSet<String>,
    columns: BTreeMap<String, BTreeSet<String>>,
}

impl Exclusions {
    /// Build from table names and (table, column) pairs.
    pub fn new<T, C>(tables: T, columns: C) -> Self
    where
        T: IntoIterator<Item = String>,
        C: IntoIterator<Item = (String, String)>,
    {
        let mut by_table: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (table, column) in columns {
            by_table.entry(table).or_default().insert(column);
        }
        Self {
            tables: tables.into_iter().collect(),
            columns: by_table,
        }
    }

    /// Exclusions named by the migration settings.
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(config.exclude_tables.clone(), config.excluded_columns())
    }

    /// Whether the whole table is excluded.
    pub fn excludes_table(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    /// Whether `table.column` is excluded.
    pub fn excludes_column(&self, table: &str, column: &str) -> bool {
        self.columns
            .get(table)
            .is_some_and(|cols| cols.contains(column))
    }

    /// Excluded table names.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }
}

/// Constraints and indexes created after data load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeferredObjects {
    pub unique_constraints: Vec<UniqueConstraint>,
    pub check_constraints: Vec<CheckConstraint>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<Index>,
}

impl DeferredObjects {
    /// Number of deferred constraints (indexes not included).
    pub fn constraint_count(&self) -> usize {
        self.unique_constraints.len() + self.check_constraints.len() + self.foreign_keys.len()
    }
}

/// One table after normalization.
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    /// Origin descriptor, after exclusions. Used to read rows.
    pub source: Table,
    /// Destination descriptor: mapped types, reconciled names, and only the
    /// constraints created together with the table.
    pub target: Table,
    /// Objects left for the constraint and index phases.
    pub deferred: DeferredObjects,
}

/// Maps origin descriptors onto a destination dialect.
pub struct SchemaNormalizer {
    mapper: Arc<dyn TypeMapper>,
    destination: DialectKind,
    identifier_limit: usize,
    exclusions: Exclusions,
}

impl SchemaNormalizer {
    /// Create a normalizer for the mapper's (origin, destination) pair.
    pub fn new(mapper: Arc<dyn TypeMapper>, exclusions: Exclusions) -> Self {
        let origin = mapper.source_dialect();
        let destination = mapper.target_dialect();
        let identifier_limit = origin
            .max_identifier_length()
            .min(destination.max_identifier_length());
        Self {
            mapper,
            destination,
            identifier_limit,
            exclusions,
        }
    }

    /// Effective identifier length limit for this pair.
    pub fn identifier_limit(&self) -> usize {
        self.identifier_limit
    }

    /// Reconcile a name to the pair's identifier limit.
    pub fn target_name(&self, name: &str) -> String {
        truncate_identifier(name, self.identifier_limit)
    }

    /// Filter and normalize a whole schema.
    ///
    /// Excluded tables are dropped, as are tables without a primary key
    /// (they cannot be copied resumably) and tables that lose a key column
    /// to a column exclusion. Foreign keys into dropped tables go with them.
    pub fn normalize_all(&self, tables: Vec<Table>) -> Result<Vec<NormalizedTable>> {
        let mut kept = Vec::with_capacity(tables.len());
        for table in tables {
            if self.exclusions.excludes_table(&table.name) {
                info!("Excluding table {}", table.name);
                continue;
            }
            if !table.has_pk() {
                warn!(
                    "Table {} has no primary key and is excluded from the migration",
                    table.name
                );
                continue;
            }
            if let Some(col) = table
                .primary_key
                .iter()
                .find(|c| self.exclusions.excludes_column(&table.name, c))
            {
                warn!(
                    "Table {} is excluded: primary key column {} is excluded",
                    table.name, col
                );
                continue;
            }
            kept.push(table);
        }

        let included: HashSet<String> = kept.iter().map(|t| t.name.clone()).collect();
        let normalized = kept
            .into_iter()
            .map(|table| {
                let source = self.apply_exclusions(table, &included);
                self.normalize(source)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut seen = HashSet::new();
        for t in &normalized {
            if !seen.insert(t.target.name.as_str()) {
                return Err(MigrateError::Config(format!(
                    "Table name {} is not unique after truncation to {} characters",
                    t.target.name, self.identifier_limit
                )));
            }
        }
        Ok(normalized)
    }

    /// Remove excluded columns and everything that references them or a
    /// table outside `included`.
    fn apply_exclusions(&self, mut table: Table, included: &HashSet<String>) -> Table {
        let name = table.name.clone();
        let dropped = |col: &String| self.exclusions.excludes_column(&name, col);

        table.columns.retain(|c| !dropped(&c.name));
        table
            .unique_constraints
            .retain(|uc| !uc.columns.iter().any(|c| dropped(c)));
        table.indexes.retain(|idx| !idx.columns.iter().any(|c| dropped(c)));
        table.foreign_keys.retain(|fk| {
            let keep = included.contains(&fk.ref_table)
                && !fk.columns.iter().any(|c| dropped(c))
                && !fk
                    .ref_columns
                    .iter()
                    .any(|c| self.exclusions.excludes_column(&fk.ref_table, c));
            if !keep {
                debug!("{}: dropping foreign key {} with excluded references", name, fk.name);
            }
            keep
        });
        table.check_constraints.retain(|chk| {
            !table_columns_mentioned(&chk.definition)
                .iter()
                .any(|word| self.exclusions.excludes_column(&name, word))
        });
        table
    }

    /// Normalize a single origin table whose exclusions were already applied.
    pub fn normalize(&self, source: Table) -> Result<NormalizedTable> {
        let mut target = Table::new(self.target_name(&source.name));
        target.row_count = source.row_count;

        for col in &source.columns {
            let mapping = self.mapper.map_column(col);
            if let Some(warning) = &mapping.warning {
                warn!("{}.{}: {}", source.name, col.name, warning);
            }
            target.columns.push(Column {
                name: self.target_name(&col.name),
                data_type: mapping.target_type,
                is_nullable: mapping.is_nullable,
                ordinal_pos: col.ordinal_pos,
                ..Default::default()
            });
        }
        self.ensure_unique(&source.name, "column", target.columns.iter().map(|c| &c.name))?;

        target.primary_key = self.target_names(&source.primary_key);

        let unique_constraints: Vec<UniqueConstraint> = source
            .unique_constraints
            .iter()
            .map(|uc| UniqueConstraint {
                name: self.target_name(&uc.name),
                columns: self.target_names(&uc.columns),
            })
            .collect();

        let check_constraints: Vec<CheckConstraint> = source
            .check_constraints
            .iter()
            .filter_map(|chk| {
                let definition = chk.definition.replace('"', "");
                match validate_check_constraint(&definition) {
                    Ok(()) => Some(CheckConstraint {
                        name: self.target_name(&chk.name),
                        definition,
                    }),
                    Err(e) => {
                        warn!("{}: skipping check constraint {}: {}", source.name, chk.name, e);
                        None
                    }
                }
            })
            .collect();

        let foreign_keys: Vec<ForeignKey> = source
            .foreign_keys
            .iter()
            .map(|fk| ForeignKey {
                name: self.target_name(&fk.name),
                columns: self.target_names(&fk.columns),
                ref_table: self.target_name(&fk.ref_table),
                ref_columns: self.target_names(&fk.ref_columns),
                on_delete: fk.on_delete.clone(),
                on_update: fk.on_update.clone(),
            })
            .collect();

        // Unique constraints already exist as unique indexes once created
        let indexes: Vec<Index> = source
            .indexes
            .iter()
            .filter(|idx| {
                !source.unique_constraints.iter().any(|uc| {
                    uc.name == idx.name || (idx.is_unique && uc.columns == idx.columns)
                })
            })
            .map(|idx| Index {
                name: self.target_name(&idx.name),
                columns: self.target_names(&idx.columns),
                is_unique: idx.is_unique,
            })
            .collect();

        let constraint_names = unique_constraints
            .iter()
            .map(|c| &c.name)
            .chain(check_constraints.iter().map(|c| &c.name))
            .chain(foreign_keys.iter().map(|c| &c.name));
        self.ensure_unique(&source.name, "constraint", constraint_names)?;
        self.ensure_unique(&source.name, "index", indexes.iter().map(|i| &i.name))?;

        let deferred = if self.destination.supports_post_hoc_constraints() {
            DeferredObjects {
                unique_constraints,
                check_constraints,
                foreign_keys,
                indexes,
            }
        } else {
            target.unique_constraints = unique_constraints;
            target.check_constraints = check_constraints;
            target.foreign_keys = foreign_keys;
            DeferredObjects {
                indexes,
                ..Default::default()
            }
        };

        Ok(NormalizedTable {
            source,
            target,
            deferred,
        })
    }

    fn target_names(&self, names: &[String]) -> Vec<String> {
        names.iter().map(|n| self.target_name(n)).collect()
    }

    fn ensure_unique<'a>(
        &self,
        table: &str,
        what: &str,
        names: impl Iterator<Item = &'a String>,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                return Err(MigrateError::Config(format!(
                    "{}: {} name {} is not unique after truncation to {} characters",
                    table, what, name, self.identifier_limit
                )));
            }
        }
        Ok(())
    }
}

/// Identifier-like words of a check expression, with quotes removed.
fn table_columns_mentioned(definition: &str) -> Vec<String> {
    definition
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DriverCatalog;

    fn mapper(origin: DialectKind, destination: DialectKind) -> Arc<dyn TypeMapper> {
        DriverCatalog::with_builtins()
            .require_mapper(origin, destination)
            .unwrap()
    }

    fn number_column(name: &str, precision: u32) -> Column {
        let mut col = Column::new(name, "NUMBER");
        col.precision = Some(precision);
        col.scale = Some(0);
        col.is_nullable = false;
        col.is_autoincrement = true;
        col.default = Some("seq.nextval".to_string());
        col.comment = Some("surrogate key".to_string());
        col
    }

    fn molecule() -> Table {
        let mut table = Table::new("molecule_dictionary");
        let mut pref = Column::new("pref_name", "VARCHAR2");
        pref.max_length = Some(255);
        table.columns = vec![number_column("molregno", 9), pref, number_column("max_phase", 2)];
        table.primary_key = vec!["molregno".to_string()];
        table.unique_constraints = vec![UniqueConstraint {
            name: "uk_moldict_pref".to_string(),
            columns: vec!["pref_name".to_string()],
        }];
        table.check_constraints = vec![CheckConstraint {
            name: "ck_moldict_phase".to_string(),
            definition: "\"max_phase\" IN (0,1,2,3,4)".to_string(),
        }];
        table.indexes = vec![
            Index {
                name: "uk_moldict_pref".to_string(),
                columns: vec!["pref_name".to_string()],
                is_unique: true,
            },
            Index {
                name: "idx_moldict_phase".to_string(),
                columns: vec!["max_phase".to_string()],
                is_unique: false,
            },
        ];
        table
    }

    fn compound() -> Table {
        let mut table = Table::new("compound_records");
        table.columns = vec![number_column("record_id", 9), number_column("molregno", 9)];
        table.primary_key = vec!["record_id".to_string()];
        table.foreign_keys = vec![ForeignKey {
            name: "fk_cmpdrec_molregno".to_string(),
            columns: vec!["molregno".to_string()],
            ref_table: "molecule_dictionary".to_string(),
            ref_columns: vec!["molregno".to_string()],
            on_delete: Some("CASCADE".to_string()),
            on_update: None,
        }];
        table
    }

    #[test]
    fn test_maps_types_and_strips_origin_metadata() {
        let normalizer = SchemaNormalizer::new(
            mapper(DialectKind::Oracle, DialectKind::Postgres),
            Exclusions::default(),
        );
        let result = normalizer.normalize(molecule()).unwrap();
        let types: Vec<&str> = result.target.columns.iter().map(|c| c.data_type.as_str()).collect();
        assert_eq!(types, vec!["BIGINT", "VARCHAR(255)", "SMALLINT"]);
        let key = &result.target.columns[0];
        assert!(!key.is_nullable);
        assert!(!key.is_autoincrement);
        assert!(key.default.is_none());
        assert!(key.comment.is_none());
    }

    #[test]
    fn test_post_hoc_destination_defers_constraints() {
        let normalizer = SchemaNormalizer::new(
            mapper(DialectKind::Oracle, DialectKind::Postgres),
            Exclusions::default(),
        );
        let result = normalizer.normalize(molecule()).unwrap();
        assert_eq!(result.target.primary_key, vec!["molregno"]);
        assert!(result.target.unique_constraints.is_empty());
        assert!(result.target.check_constraints.is_empty());
        assert_eq!(result.deferred.unique_constraints.len(), 1);
        assert_eq!(result.deferred.check_constraints.len(), 1);
        assert_eq!(
            result.deferred.check_constraints[0].definition,
            "max_phase IN (0,1,2,3,4)"
        );
        // The unique constraint's backing index is not created twice
        let index_names: Vec<&str> = result.deferred.indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(index_names, vec!["idx_moldict_phase"]);
    }

    #[test]
    fn test_inline_destination_keeps_constraints() {
        let normalizer = SchemaNormalizer::new(
            mapper(DialectKind::Mysql, DialectKind::Sqlite),
            Exclusions::default(),
        );
        let mut table = compound();
        table.columns[0].data_type = "int".to_string();
        table.columns[1].data_type = "int".to_string();
        let result = normalizer.normalize(table).unwrap();
        assert_eq!(result.target.foreign_keys.len(), 1);
        assert_eq!(result.deferred.constraint_count(), 0);
        assert_eq!(result.target.columns[0].data_type, "INTEGER");
    }

    #[test]
    fn test_excluded_tables_and_foreign_keys() {
        let normalizer = SchemaNormalizer::new(
            mapper(DialectKind::Oracle, DialectKind::Postgres),
            Exclusions::new(vec!["molecule_dictionary".to_string()], vec![]),
        );
        let result = normalizer.normalize_all(vec![molecule(), compound()]).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].source.name, "compound_records");
        assert!(result[0].deferred.foreign_keys.is_empty());
    }

    #[test]
    fn test_tables_without_primary_key_are_dropped() {
        let normalizer = SchemaNormalizer::new(
            mapper(DialectKind::Sqlite, DialectKind::Postgres),
            Exclusions::default(),
        );
        let mut heap = Table::new("heap");
        heap.columns = vec![Column::new("v", "TEXT")];
        let result = normalizer.normalize_all(vec![heap]).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_excluded_column_drops_dependent_objects() {
        let normalizer = SchemaNormalizer::new(
            mapper(DialectKind::Oracle, DialectKind::Postgres),
            Exclusions::new(
                vec![],
                vec![("molecule_dictionary".to_string(), "max_phase".to_string())],
            ),
        );
        let result = normalizer.normalize_all(vec![molecule()]).unwrap();
        let table = &result[0];
        assert_eq!(table.source.column_names(), vec!["molregno", "pref_name"]);
        assert_eq!(table.target.columns.len(), 2);
        assert!(table.deferred.check_constraints.is_empty());
        assert!(table.deferred.indexes.is_empty());
        assert_eq!(table.deferred.unique_constraints.len(), 1);
    }

    #[test]
    fn test_excluded_key_column_drops_table() {
        let normalizer = SchemaNormalizer::new(
            mapper(DialectKind::Oracle, DialectKind::Postgres),
            Exclusions::new(
                vec![],
                vec![("molecule_dictionary".to_string(), "molregno".to_string())],
            ),
        );
        assert!(normalizer.normalize_all(vec![molecule()]).unwrap().is_empty());
    }

    #[test]
    fn test_identifier_truncation_to_narrower_dialect() {
        let normalizer = SchemaNormalizer::new(
            mapper(DialectKind::Postgres, DialectKind::Oracle),
            Exclusions::default(),
        );
        assert_eq!(normalizer.identifier_limit(), 30);
        let mut table = Table::new("component_class_relationship_mapping");
        table.columns = vec![Column::new("id", "int8")];
        table.primary_key = vec!["id".to_string()];
        let result = normalizer.normalize(table).unwrap();
        assert_eq!(result.source.name, "component_class_relationship_mapping");
        assert_eq!(result.target.name, "component_class_relationship_m");
        assert_eq!(result.target.columns[0].data_type, "NUMBER(19,0)");
    }

    #[test]
    fn test_truncation_collision_is_config_error() {
        let normalizer = SchemaNormalizer::new(
            mapper(DialectKind::Postgres, DialectKind::Oracle),
            Exclusions::default(),
        );
        let mut table = Table::new("t");
        table.columns = vec![
            Column::new("a_very_long_column_name_shared_prefix_1", "int4"),
            Column::new("a_very_long_column_name_shared_prefix_2", "int4"),
        ];
        table.primary_key = vec!["a_very_long_column_name_shared_prefix_1".to_string()];
        let err = normalizer.normalize(table).unwrap_err();
        assert!(matches!(err, MigrateError::Config(_)));
    }

    #[test]
    fn test_suspicious_check_is_skipped() {
        let normalizer = SchemaNormalizer::new(
            mapper(DialectKind::Sqlite, DialectKind::Postgres),
            Exclusions::default(),
        );
        let mut table = Table::new("t");
        table.columns = vec![Column::new("id", "INTEGER")];
        table.primary_key = vec!["id".to_string()];
        table.check_constraints = vec![CheckConstraint {
            name: "ck_t".to_string(),
            definition: "id > 0; DROP TABLE t".to_string(),
        }];
        let result = normalizer.normalize(table).unwrap();
        assert!(result.deferred.check_constraints.is_empty());
    }
}
