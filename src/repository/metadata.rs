//! Mapping metadata registry and primary key predicate builder
//!
//! The registry is built once at startup and keyed by entity type identity.
//! For every registered entity it records the single primary key column and
//! the kind of value that column holds, so that a key supplied as a loosely
//! typed [`Value`] (a string from a URL, an `i64` from JSON, a `Uuid`) can be
//! converted to the declared type and turned into an equality predicate
//! without the caller knowing which column is the key.
//!
//! ```rust,ignore
//! let metadata = EntityMetadata::builder()
//!     .register::<author::Entity>()?
//!     .register::<publisher::Entity>()?
//!     .build();
//!
//! let by_id = metadata.key_predicate::<author::Entity>("0b6b4b3e-…")?;
//! let author = author::Entity::find().filter(by_id).one(&db).await?;
//! ```

use sea_orm::sea_query::IntoCondition;
use sea_orm::{
    ColumnTrait, ColumnType, Condition, EntityName, EntityTrait, IdenStatic, Iterable,
    ModelTrait, PrimaryKeyToColumn, PrimaryKeyTrait, Value,
};
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use super::traits::IdentityKey;
use crate::errors::{RepositoryError, RepositoryResult};

/// Declared value kind of a primary key column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum KeyKind {
    Uuid,
    /// 32-bit (or narrower) signed integer
    Integer,
    BigInteger,
    Text,
}

impl KeyKind {
    fn from_column_type(column_type: &ColumnType) -> Option<Self> {
        match column_type {
            ColumnType::Uuid => Some(Self::Uuid),
            ColumnType::TinyInteger | ColumnType::SmallInteger | ColumnType::Integer => {
                Some(Self::Integer)
            }
            ColumnType::BigInteger => Some(Self::BigInteger),
            ColumnType::String(_) | ColumnType::Char(_) | ColumnType::Text => Some(Self::Text),
            _ => None,
        }
    }
}

/// Primary key facts recorded for one entity
pub struct KeyDescriptor {
    pub table: String,
    pub column_name: String,
    pub kind: KeyKind,
    pub auto_increment: bool,
    column: Box<dyn Any + Send + Sync>,
}

impl fmt::Debug for KeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDescriptor")
            .field("table", &self.table)
            .field("column_name", &self.column_name)
            .field("kind", &self.kind)
            .field("auto_increment", &self.auto_increment)
            .finish()
    }
}

/// Builder collecting entity registrations
#[derive(Debug, Default)]
pub struct EntityMetadataBuilder {
    entries: HashMap<TypeId, KeyDescriptor>,
}

impl EntityMetadataBuilder {
    /// Register an entity, validating that it has exactly one key column of a supported type
    pub fn register<E: EntityTrait>(mut self) -> RepositoryResult<Self> {
        let table = E::default().table_name().to_string();
        let keys: Vec<E::Column> = E::PrimaryKey::iter().map(|k| k.into_column()).collect();

        let column = match keys.as_slice() {
            [] => return Err(RepositoryError::MissingPrimaryKey { entity: table }),
            [column] => *column,
            many => {
                return Err(RepositoryError::CompositeKey {
                    entity: table,
                    columns: many.len(),
                });
            }
        };

        let column_type = column.def().get_column_type().clone();
        let kind = KeyKind::from_column_type(&column_type).ok_or_else(|| {
            RepositoryError::UnsupportedKeyType {
                entity: table.clone(),
                column: column.as_str().to_string(),
                column_type: format!("{column_type:?}"),
            }
        })?;

        debug!(
            "Registered entity {} with key {} ({})",
            table,
            column.as_str(),
            kind
        );

        self.entries.insert(
            TypeId::of::<E>(),
            KeyDescriptor {
                table,
                column_name: column.as_str().to_string(),
                kind,
                auto_increment: <E::PrimaryKey as PrimaryKeyTrait>::auto_increment(),
                column: Box::new(column),
            },
        );
        Ok(self)
    }

    pub fn build(self) -> EntityMetadata {
        EntityMetadata {
            entries: self.entries,
        }
    }
}

/// Registry of primary key descriptors keyed by entity type
#[derive(Debug, Default)]
pub struct EntityMetadata {
    entries: HashMap<TypeId, KeyDescriptor>,
}

impl EntityMetadata {
    pub fn builder() -> EntityMetadataBuilder {
        EntityMetadataBuilder::default()
    }

    pub fn is_registered<E: EntityTrait>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<E>())
    }

    /// All registered descriptors, ordered by table name
    pub fn descriptors(&self) -> Vec<&KeyDescriptor> {
        let mut all: Vec<&KeyDescriptor> = self.entries.values().collect();
        all.sort_by(|a, b| a.table.cmp(&b.table));
        all
    }

    pub fn descriptor<E: EntityTrait>(&self) -> RepositoryResult<&KeyDescriptor> {
        self.entries
            .get(&TypeId::of::<E>())
            .ok_or_else(|| RepositoryError::unmapped(E::default().table_name()))
    }

    pub fn key_column<E: EntityTrait>(&self) -> RepositoryResult<E::Column> {
        let descriptor = self.descriptor::<E>()?;
        descriptor
            .column
            .downcast_ref::<E::Column>()
            .copied()
            .ok_or_else(|| RepositoryError::unmapped(descriptor.table.as_str()))
    }

    /// Build `entity.<key> == id` with `id` converted to the declared key type
    pub fn key_predicate<E: EntityTrait>(
        &self,
        id: impl Into<Value>,
    ) -> RepositoryResult<KeyPredicate<E>> {
        let descriptor = self.descriptor::<E>()?;
        let column = self.key_column::<E>()?;
        let supplied = id.into();

        let value = convert_key(descriptor.kind, &supplied).ok_or_else(|| {
            RepositoryError::KeyConversion {
                entity: descriptor.table.clone(),
                column: descriptor.column_name.clone(),
                expected: descriptor.kind.to_string(),
                value: render_key(&supplied),
            }
        })?;

        Ok(KeyPredicate {
            column,
            kind: descriptor.kind,
            value,
        })
    }

    /// Key value of a model, normalized to the declared key kind
    pub fn identity_of<E: EntityTrait>(&self, model: &E::Model) -> RepositoryResult<Value> {
        let descriptor = self.descriptor::<E>()?;
        let column = self.key_column::<E>()?;
        let raw = model.get(column);

        convert_key(descriptor.kind, &raw).ok_or_else(|| RepositoryError::KeyConversion {
            entity: descriptor.table.clone(),
            column: descriptor.column_name.clone(),
            expected: descriptor.kind.to_string(),
            value: render_key(&raw),
        })
    }

    pub fn identity_key<E: EntityTrait>(&self, model: &E::Model) -> RepositoryResult<IdentityKey> {
        self.identity_of::<E>(model)
            .map(|value| IdentityKey::of::<E>(&value))
    }
}

/// Reusable equality predicate on an entity's primary key
pub struct KeyPredicate<E: EntityTrait> {
    column: E::Column,
    kind: KeyKind,
    value: Value,
}

impl<E: EntityTrait> KeyPredicate<E> {
    /// The converted key value
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn condition(&self) -> Condition {
        Condition::all().add(self.column.eq(self.value.clone()))
    }

    /// Evaluate the predicate against an in-memory model
    pub fn matches(&self, model: &E::Model) -> bool {
        convert_key(self.kind, &model.get(self.column)).is_some_and(|v| v == self.value)
    }

    pub fn identity(&self) -> IdentityKey {
        IdentityKey::of::<E>(&self.value)
    }
}

impl<E: EntityTrait> IntoCondition for KeyPredicate<E> {
    fn into_condition(self) -> Condition {
        self.condition()
    }
}

/// Convert a loosely typed key to the declared kind, culture-invariantly.
///
/// Returns `None` for NULLs, byte strings, out-of-range or non-integral
/// numbers and unparsable text.
pub(crate) fn convert_key(kind: KeyKind, value: &Value) -> Option<Value> {
    match kind {
        KeyKind::Uuid => match value {
            Value::Uuid(Some(uuid)) => Some(Value::from(**uuid)),
            Value::String(Some(text)) => Uuid::parse_str(text.trim()).ok().map(Value::from),
            _ => None,
        },
        KeyKind::Integer => integral(value)
            .and_then(|n| i32::try_from(n).ok())
            .map(Value::from),
        KeyKind::BigInteger => integral(value)
            .and_then(|n| i64::try_from(n).ok())
            .map(Value::from),
        KeyKind::Text => textual(value).map(Value::from),
    }
}

fn integral(value: &Value) -> Option<i128> {
    match value {
        Value::TinyInt(Some(n)) => Some(i128::from(*n)),
        Value::SmallInt(Some(n)) => Some(i128::from(*n)),
        Value::Int(Some(n)) => Some(i128::from(*n)),
        Value::BigInt(Some(n)) => Some(i128::from(*n)),
        Value::TinyUnsigned(Some(n)) => Some(i128::from(*n)),
        Value::SmallUnsigned(Some(n)) => Some(i128::from(*n)),
        Value::Unsigned(Some(n)) => Some(i128::from(*n)),
        Value::BigUnsigned(Some(n)) => Some(i128::from(*n)),
        Value::Float(Some(n)) => whole(f64::from(*n)),
        Value::Double(Some(n)) => whole(*n),
        Value::String(Some(text)) => text.trim().parse::<i128>().ok(),
        Value::Char(Some(c)) => c.to_digit(10).map(i128::from),
        _ => None,
    }
}

/// Human-readable form of a key value for messages
pub(crate) fn render_key(value: &Value) -> String {
    textual(value).unwrap_or_else(|| format!("{value:?}"))
}

fn whole(n: f64) -> Option<i128> {
    (n.is_finite() && n.fract() == 0.0 && n.abs() < 1e30).then_some(n as i128)
}

fn textual(value: &Value) -> Option<String> {
    match value {
        Value::String(Some(text)) => Some(text.to_string()),
        Value::Char(Some(c)) => Some(c.to_string()),
        Value::Uuid(Some(uuid)) => Some(uuid.hyphenated().to_string()),
        Value::Bool(Some(b)) => Some(b.to_string()),
        Value::TinyInt(Some(n)) => Some(n.to_string()),
        Value::SmallInt(Some(n)) => Some(n.to_string()),
        Value::Int(Some(n)) => Some(n.to_string()),
        Value::BigInt(Some(n)) => Some(n.to_string()),
        Value::TinyUnsigned(Some(n)) => Some(n.to_string()),
        Value::SmallUnsigned(Some(n)) => Some(n.to_string()),
        Value::Unsigned(Some(n)) => Some(n.to_string()),
        Value::BigUnsigned(Some(n)) => Some(n.to_string()),
        Value::Float(Some(n)) => Some(n.to_string()),
        Value::Double(Some(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{author, book, publisher};
    use chrono::Utc;
    use rstest::rstest;
    use sea_orm::{DbBackend, QueryFilter, QueryTrait};

    mod membership {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "memberships")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub group_id: i32,
            #[sea_orm(primary_key, auto_increment = false)]
            pub user_id: i32,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    fn metadata() -> EntityMetadata {
        EntityMetadata::builder()
            .register::<author::Entity>()
            .unwrap()
            .register::<publisher::Entity>()
            .unwrap()
            .build()
    }

    fn author_with_id(id: Uuid) -> author::Model {
        author::Model {
            id,
            name: "Ursula".to_string(),
            surname: "Le Guin".to_string(),
            creation_date: Utc::now(),
            modification_date: None,
            deletion_date: None,
            is_deleted: false,
        }
    }

    #[test]
    fn test_register_records_key_column_and_kind() {
        let metadata = metadata();

        let author_key = metadata.descriptor::<author::Entity>().unwrap();
        assert_eq!(author_key.table, "authors");
        assert_eq!(author_key.column_name, "id");
        assert_eq!(author_key.kind, KeyKind::Uuid);
        assert!(!author_key.auto_increment);

        let publisher_key = metadata.descriptor::<publisher::Entity>().unwrap();
        assert_eq!(publisher_key.kind, KeyKind::Integer);

        assert_eq!(metadata.descriptors().len(), 2);
        assert_eq!(metadata.descriptors()[0].table, "authors");
    }

    #[test]
    fn test_composite_key_is_rejected() {
        let err = EntityMetadata::builder()
            .register::<membership::Entity>()
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::CompositeKey { columns: 2, .. }
        ));
    }

    #[test]
    fn test_unregistered_entity_fails_loudly() {
        let err = metadata()
            .key_predicate::<book::Entity>(Uuid::new_v4())
            .err()
            .unwrap();
        assert!(matches!(err, RepositoryError::UnmappedEntity { ref entity } if entity == "books"));
    }

    #[test]
    fn test_uuid_predicate_matches_only_its_row() {
        let metadata = metadata();
        let target = Uuid::new_v4();

        let predicate = metadata
            .key_predicate::<author::Entity>(target.to_string())
            .unwrap();

        assert_eq!(predicate.value(), &Value::from(target));
        assert!(predicate.matches(&author_with_id(target)));
        assert!(!predicate.matches(&author_with_id(Uuid::new_v4())));
    }

    #[test]
    fn test_integer_predicate_matches_only_its_row() {
        let metadata = metadata();
        let predicate = metadata.key_predicate::<publisher::Entity>("42").unwrap();

        let row = |id| publisher::Model {
            id,
            name: "Tor".to_string(),
            creation_date: Utc::now(),
        };
        assert!(predicate.matches(&row(42)));
        assert!(!predicate.matches(&row(43)));
    }

    #[test]
    fn test_predicate_renders_key_equality() {
        let target = Uuid::new_v4();
        let predicate = metadata().key_predicate::<author::Entity>(target).unwrap();

        let sql = author::Entity::find()
            .filter(predicate)
            .build(DbBackend::Postgres)
            .to_string();
        assert!(sql.contains(r#"WHERE "authors"."id" = "#), "{sql}");
        assert!(sql.contains(&target.to_string()), "{sql}");
    }

    #[test]
    fn test_conversion_failure_names_the_key() {
        let err = metadata()
            .key_predicate::<author::Entity>("not-a-uuid")
            .err()
            .unwrap();
        match err {
            RepositoryError::KeyConversion {
                entity,
                column,
                expected,
                ..
            } => {
                assert_eq!(entity, "authors");
                assert_eq!(column, "id");
                assert_eq!(expected, "uuid");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_identity_of_model() {
        let metadata = metadata();
        let id = Uuid::new_v4();
        let model = author_with_id(id);

        assert_eq!(
            metadata.identity_of::<author::Entity>(&model).unwrap(),
            Value::from(id)
        );
        assert_eq!(
            metadata.identity_key::<author::Entity>(&model).unwrap(),
            metadata
                .key_predicate::<author::Entity>(id.to_string())
                .unwrap()
                .identity()
        );
    }

    #[rstest]
    #[case::int(Value::from(7i32), Some(Value::from(7i32)))]
    #[case::widened_from_bigint(Value::from(7i64), Some(Value::from(7i32)))]
    #[case::unsigned(Value::from(7u8), Some(Value::from(7i32)))]
    #[case::decimal_text(Value::from(" 12 "), Some(Value::from(12i32)))]
    #[case::negative_text(Value::from("-3"), Some(Value::from(-3i32)))]
    #[case::integral_double(Value::from(3.0f64), Some(Value::from(3i32)))]
    #[case::fractional_double(Value::from(3.5f64), None)]
    #[case::out_of_range(Value::from(i64::MAX), None)]
    #[case::text(Value::from("seven"), None)]
    #[case::null(Value::Int(None), None)]
    #[case::uuid(Value::from(Uuid::nil()), None)]
    fn test_integer_conversion(#[case] input: Value, #[case] expected: Option<Value>) {
        assert_eq!(convert_key(KeyKind::Integer, &input), expected);
    }

    #[rstest]
    #[case::bigint(Value::from(i64::MAX), Some(Value::from(i64::MAX)))]
    #[case::text(Value::from("9000000000"), Some(Value::from(9_000_000_000i64)))]
    #[case::overflow(Value::from(u64::MAX), None)]
    fn test_big_integer_conversion(#[case] input: Value, #[case] expected: Option<Value>) {
        assert_eq!(convert_key(KeyKind::BigInteger, &input), expected);
    }

    #[rstest]
    #[case::hyphenated("67e55044-10b1-426f-9247-bb680e5fe0c8")]
    #[case::simple("67e5504410b1426f9247bb680e5fe0c8")]
    #[case::braced("{67e55044-10b1-426f-9247-bb680e5fe0c8}")]
    #[case::urn("urn:uuid:67e55044-10b1-426f-9247-bb680e5fe0c8")]
    fn test_uuid_conversion_accepts_textual_forms(#[case] input: &str) {
        let expected = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            convert_key(KeyKind::Uuid, &Value::from(input)),
            Some(Value::from(expected))
        );
    }

    #[rstest]
    #[case::int(Value::from(42i32), "42")]
    #[case::double(Value::from(1.5f64), "1.5")]
    #[case::uuid(Value::from(Uuid::nil()), "00000000-0000-0000-0000-000000000000")]
    #[case::flag(Value::from(true), "true")]
    fn test_text_conversion_is_invariant(#[case] input: Value, #[case] expected: &str) {
        assert_eq!(
            convert_key(KeyKind::Text, &input),
            Some(Value::from(expected.to_string()))
        );
    }

    #[test]
    fn test_bytes_are_rejected() {
        assert_eq!(
            convert_key(KeyKind::Text, &Value::from(vec![1u8, 2, 3])),
            None
        );
    }
}
