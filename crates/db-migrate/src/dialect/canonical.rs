//! Hub-and-spoke canonical type system for database type mapping.
//!
//! Instead of one mapper per (origin, destination) pair, each dialect
//! implements two conversions:
//! - `ToCanonical`: native type → canonical type (widening)
//! - `FromCanonical`: canonical type → native type (narrowing)
//!
//! ```text
//! Origin      →  CanonicalType                    →  Destination
//!   NUMBER(2,0) →  SizedInteger { precision: 2 }  →  SMALLINT
//!   VARCHAR2(60) → Varchar(Some(60))              →  VARCHAR(60)
//! ```
//!
//! Both halves are pure lookups, so a given (type, precision, scale) always
//! maps to the same destination type.

use std::sync::Arc;

use crate::core::schema::Column;
use crate::core::traits::{ColumnMapping, TypeMapper, TypeMapping};

use super::DialectKind;

/// Canonical type representation for cross-database type mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalType {
    // ===== Boolean =====
    /// Boolean/bit type.
    Boolean,

    // ===== Fixed-width integers =====
    /// 8-bit signed integer (TINYINT).
    Int8,
    /// 16-bit signed integer (SMALLINT).
    Int16,
    /// 24-bit signed integer (MySQL MEDIUMINT).
    Int24,
    /// 32-bit signed integer (INT/INTEGER).
    Int32,
    /// 64-bit signed integer (BIGINT).
    Int64,

    /// Exact numeric with scale 0, sized by decimal digits rather than bytes.
    /// Each destination picks the smallest integer type for the precision.
    SizedInteger {
        /// Number of decimal digits; `None` when the origin left it unset.
        precision: Option<u32>,
    },

    // ===== Floating Point =====
    /// 32-bit floating point.
    Float32,
    /// 64-bit floating point.
    Float64,

    /// Exact decimal with non-zero or unknown scale.
    Decimal {
        precision: Option<u32>,
        scale: Option<u32>,
    },

    // ===== String Types =====
    /// Fixed-length character string.
    Char(Option<u32>),
    /// Variable-length character string; `None` means no declared limit.
    Varchar(Option<u32>),
    /// Unlimited text.
    Text,

    // ===== Binary Types =====
    /// Fixed-length binary data.
    Binary(Option<u32>),
    /// Variable-length binary data.
    Varbinary(Option<u32>),
    /// Unlimited binary data.
    Blob,

    // ===== Date/Time Types =====
    Date,
    Time,
    /// Date and time without timezone.
    DateTime,
    /// Date and time with timezone.
    DateTimeTz,
    /// Time interval/duration.
    Interval,

    // ===== Special Types =====
    Uuid,
    Json,
    Xml,

    /// Unknown type that couldn't be mapped; holds the original name.
    Unknown(String),
}

impl std::fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn opt(v: &Option<u32>) -> String {
            v.map_or_else(|| "*".to_string(), |n| n.to_string())
        }
        match self {
            CanonicalType::Boolean => write!(f, "Boolean"),
            CanonicalType::Int8 => write!(f, "Int8"),
            CanonicalType::Int16 => write!(f, "Int16"),
            CanonicalType::Int24 => write!(f, "Int24"),
            CanonicalType::Int32 => write!(f, "Int32"),
            CanonicalType::Int64 => write!(f, "Int64"),
            CanonicalType::SizedInteger { precision } => {
                write!(f, "SizedInteger({})", opt(precision))
            }
            CanonicalType::Float32 => write!(f, "Float32"),
            CanonicalType::Float64 => write!(f, "Float64"),
            CanonicalType::Decimal { precision, scale } => {
                write!(f, "Decimal({},{})", opt(precision), opt(scale))
            }
            CanonicalType::Char(n) => write!(f, "Char({})", opt(n)),
            CanonicalType::Varchar(n) => write!(f, "Varchar({})", opt(n)),
            CanonicalType::Text => write!(f, "Text"),
            CanonicalType::Binary(n) => write!(f, "Binary({})", opt(n)),
            CanonicalType::Varbinary(n) => write!(f, "Varbinary({})", opt(n)),
            CanonicalType::Blob => write!(f, "Blob"),
            CanonicalType::Date => write!(f, "Date"),
            CanonicalType::Time => write!(f, "Time"),
            CanonicalType::DateTime => write!(f, "DateTime"),
            CanonicalType::DateTimeTz => write!(f, "DateTimeTz"),
            CanonicalType::Interval => write!(f, "Interval"),
            CanonicalType::Uuid => write!(f, "Uuid"),
            CanonicalType::Json => write!(f, "Json"),
            CanonicalType::Xml => write!(f, "Xml"),
            CanonicalType::Unknown(name) => write!(f, "Unknown({})", name),
        }
    }
}

/// Exact numerics widen to an integer family member when the scale is
/// explicitly zero, otherwise to a decimal.
pub(crate) fn widen_numeric(precision: Option<u32>, scale: Option<u32>) -> CanonicalType {
    match scale {
        Some(0) => CanonicalType::SizedInteger { precision },
        _ => CanonicalType::Decimal { precision, scale },
    }
}

/// Result of converting a native type to canonical form.
#[derive(Debug, Clone)]
pub struct CanonicalTypeInfo {
    /// The canonical type representation.
    pub canonical_type: CanonicalType,
    /// Whether information was lost in the conversion to canonical.
    pub is_lossy: bool,
    /// Warning message if the conversion is lossy.
    pub warning: Option<String>,
}

impl CanonicalTypeInfo {
    /// Create a lossless canonical type conversion.
    pub fn lossless(canonical_type: CanonicalType) -> Self {
        Self {
            canonical_type,
            is_lossy: false,
            warning: None,
        }
    }

    /// Create a lossy canonical type conversion with a warning.
    pub fn lossy(canonical_type: CanonicalType, warning: impl Into<String>) -> Self {
        Self {
            canonical_type,
            is_lossy: true,
            warning: Some(warning.into()),
        }
    }
}

/// Convert native database types to canonical types.
pub trait ToCanonical: Send + Sync {
    /// The dialect this converter reads.
    fn dialect(&self) -> DialectKind;

    /// Convert a native type to canonical form.
    ///
    /// `data_type` is the bare native name ("varchar", "number"); length,
    /// precision and scale are `None` when the origin did not declare them.
    fn to_canonical(
        &self,
        data_type: &str,
        max_length: Option<u32>,
        precision: Option<u32>,
        scale: Option<u32>,
    ) -> CanonicalTypeInfo;
}

/// Convert canonical types to native database types.
#[allow(clippy::wrong_self_convention)]
pub trait FromCanonical: Send + Sync {
    /// The dialect this converter writes.
    fn dialect(&self) -> DialectKind;

    /// Convert a canonical type to a complete native type expression.
    fn from_canonical(&self, canonical: &CanonicalType) -> TypeMapping;
}

/// Composed type mapper that chains ToCanonical and FromCanonical conversions.
///
/// # Example
///
/// ```rust,ignore
/// let mapper = ComposedMapper::new(
///     Arc::new(OracleToCanonical),
///     Arc::new(MysqlFromCanonical),
/// );
/// let mapping = mapper.map_type("number", None, Some(2), Some(0));
/// assert_eq!(mapping.target_type, "SMALLINT");
/// ```
pub struct ComposedMapper {
    source_converter: Arc<dyn ToCanonical>,
    target_converter: Arc<dyn FromCanonical>,
}

impl ComposedMapper {
    /// Create a new composed mapper.
    pub fn new(
        source_converter: Arc<dyn ToCanonical>,
        target_converter: Arc<dyn FromCanonical>,
    ) -> Self {
        Self {
            source_converter,
            target_converter,
        }
    }
}

impl std::fmt::Debug for ComposedMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedMapper")
            .field("source", &self.source_converter.dialect())
            .field("target", &self.target_converter.dialect())
            .finish()
    }
}

impl TypeMapper for ComposedMapper {
    fn source_dialect(&self) -> DialectKind {
        self.source_converter.dialect()
    }

    fn target_dialect(&self) -> DialectKind {
        self.target_converter.dialect()
    }

    fn map_column(&self, col: &Column) -> ColumnMapping {
        let type_mapping = self.map_type(&col.data_type, col.max_length, col.precision, col.scale);

        ColumnMapping {
            name: col.name.clone(),
            target_type: type_mapping.target_type,
            is_nullable: col.is_nullable,
            warning: type_mapping.warning,
        }
    }

    fn map_type(
        &self,
        data_type: &str,
        max_length: Option<u32>,
        precision: Option<u32>,
        scale: Option<u32>,
    ) -> TypeMapping {
        let canonical_info = self
            .source_converter
            .to_canonical(data_type, max_length, precision, scale);

        let mut target_mapping = self
            .target_converter
            .from_canonical(&canonical_info.canonical_type);

        if canonical_info.is_lossy {
            target_mapping.is_lossy = true;
            target_mapping.warning = match (canonical_info.warning, target_mapping.warning.take()) {
                (Some(src_warn), Some(tgt_warn)) => Some(format!("{} {}", src_warn, tgt_warn)),
                (src_warn, tgt_warn) => src_warn.or(tgt_warn),
            };
        }

        target_mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_type_display() {
        assert_eq!(format!("{}", CanonicalType::Int32), "Int32");
        assert_eq!(
            format!(
                "{}",
                CanonicalType::Decimal {
                    precision: Some(10),
                    scale: None
                }
            ),
            "Decimal(10,*)"
        );
        assert_eq!(format!("{}", CanonicalType::Varchar(Some(255))), "Varchar(255)");
    }

    #[test]
    fn test_widen_numeric() {
        assert_eq!(
            widen_numeric(Some(2), Some(0)),
            CanonicalType::SizedInteger { precision: Some(2) }
        );
        assert_eq!(
            widen_numeric(None, None),
            CanonicalType::Decimal {
                precision: None,
                scale: None
            }
        );
        assert_eq!(
            widen_numeric(Some(10), Some(2)),
            CanonicalType::Decimal {
                precision: Some(10),
                scale: Some(2)
            }
        );
    }

    struct MockToCanonical;
    impl ToCanonical for MockToCanonical {
        fn dialect(&self) -> DialectKind {
            DialectKind::Oracle
        }

        fn to_canonical(
            &self,
            data_type: &str,
            _max_length: Option<u32>,
            precision: Option<u32>,
            scale: Option<u32>,
        ) -> CanonicalTypeInfo {
            match data_type {
                "number" => CanonicalTypeInfo::lossless(widen_numeric(precision, scale)),
                "xmltype" => CanonicalTypeInfo::lossy(CanonicalType::Xml, "XML stored as text."),
                _ => CanonicalTypeInfo::lossless(CanonicalType::Text),
            }
        }
    }

    struct MockFromCanonical;
    impl FromCanonical for MockFromCanonical {
        fn dialect(&self) -> DialectKind {
            DialectKind::Sqlite
        }

        fn from_canonical(&self, canonical: &CanonicalType) -> TypeMapping {
            match canonical {
                CanonicalType::SizedInteger { .. } => TypeMapping::lossless("INTEGER"),
                CanonicalType::Xml => TypeMapping::lossless("TEXT"),
                _ => TypeMapping::lossless("TEXT"),
            }
        }
    }

    #[test]
    fn test_composed_mapper_lossless() {
        let mapper = ComposedMapper::new(Arc::new(MockToCanonical), Arc::new(MockFromCanonical));

        assert_eq!(mapper.source_dialect(), DialectKind::Oracle);
        assert_eq!(mapper.target_dialect(), DialectKind::Sqlite);

        let mapping = mapper.map_type("number", None, Some(4), Some(0));
        assert_eq!(mapping.target_type, "INTEGER");
        assert!(!mapping.is_lossy);
    }

    #[test]
    fn test_composed_mapper_carries_source_warning() {
        let mapper = ComposedMapper::new(Arc::new(MockToCanonical), Arc::new(MockFromCanonical));

        let mapping = mapper.map_type("xmltype", None, None, None);
        assert!(mapping.is_lossy);
        assert_eq!(mapping.warning.as_deref(), Some("XML stored as text."));
    }

    #[test]
    fn test_composed_mapper_map_column() {
        let mapper = ComposedMapper::new(Arc::new(MockToCanonical), Arc::new(MockFromCanonical));

        let mut col = Column::new("molregno", "number");
        col.precision = Some(9);
        col.scale = Some(0);
        col.is_nullable = false;

        let mapping = mapper.map_column(&col);
        assert_eq!(mapping.name, "molregno");
        assert_eq!(mapping.target_type, "INTEGER");
        assert!(!mapping.is_nullable);
    }
}
