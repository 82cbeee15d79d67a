//! Bidirectional codec dispatch between typed values and the wire format.
//!
//! This module provides the converter registry used by the expression,
//! update, and aggregation compilers to turn typed literals into wire values
//! and back. Lookup follows a fixed order: exact runtime type, then the
//! declared type supplied by the caller, then failure naming the offending
//! type. Container codecs (sequences, maps, options) encode their elements
//! recursively through the registry, so registering a scalar once makes its
//! container forms available as well.
//!
//! Codecs are side-effect free and safe to call reentrantly for nested
//! structures. Cyclic object graphs are not supported.

use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    any::{Any, TypeId, type_name},
    collections::HashMap,
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use crate::error::{MappingError, MappingResult};

/// Names a wire value's type for error messages.
pub(crate) fn bson_type_name(bson: &Bson) -> &'static str {
    match bson {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "document",
        Bson::Boolean(_) => "boolean",
        Bson::Null => "null",
        Bson::Int32(_) => "int32",
        Bson::Int64(_) => "int64",
        Bson::Binary(_) => "binary",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "dateTime",
        Bson::Timestamp(_) => "timestamp",
        Bson::Decimal128(_) => "decimal128",
        _ => "unsupported",
    }
}

fn mismatch<T>(found: &Bson) -> MappingError {
    MappingError::DecodeMismatch {
        type_name: type_name::<T>(),
        found: bson_type_name(found),
    }
}

/// A bidirectional converter between one value type and the wire format.
///
/// Implementations must be reentrant: container codecs call back into the
/// registry for their elements.
pub trait Codec: Send + Sync {
    /// The fully qualified name of the handled type, for diagnostics.
    fn type_name(&self) -> &'static str;

    /// Encodes a value of the handled type into a wire value.
    fn encode(&self, value: &dyn Any, registry: &CodecRegistry) -> MappingResult<Bson>;

    /// Decodes a wire value into a boxed value of the handled type.
    fn decode(&self, value: &Bson, registry: &CodecRegistry) -> MappingResult<Box<dyn Any>>;
}

struct ScalarCodec<T: Any> {
    encode: fn(&T) -> MappingResult<Bson>,
    decode: fn(&Bson) -> MappingResult<T>,
}

impl<T: Any + Send + Sync> Codec for ScalarCodec<T> {
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn encode(&self, value: &dyn Any, _registry: &CodecRegistry) -> MappingResult<Bson> {
        let typed = value
            .downcast_ref::<T>()
            .ok_or_else(|| MappingError::CodecNotFound { type_name: type_name::<T>().to_string() })?;
        (self.encode)(typed)
    }

    fn decode(&self, value: &Bson, _registry: &CodecRegistry) -> MappingResult<Box<dyn Any>> {
        Ok(Box::new((self.decode)(value)?))
    }
}

struct SerdeCodec<T>(PhantomData<fn() -> T>);

impl<T> Codec for SerdeCodec<T>
where
    T: Any + Send + Sync + Serialize + DeserializeOwned,
{
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn encode(&self, value: &dyn Any, _registry: &CodecRegistry) -> MappingResult<Bson> {
        let typed = value
            .downcast_ref::<T>()
            .ok_or_else(|| MappingError::CodecNotFound { type_name: type_name::<T>().to_string() })?;
        Ok(bson::ser::serialize_to_bson(typed)?)
    }

    fn decode(&self, value: &Bson, _registry: &CodecRegistry) -> MappingResult<Box<dyn Any>> {
        let typed: T = bson::de::deserialize_from_bson(value.clone())?;
        Ok(Box::new(typed))
    }
}

struct OptionCodec<T>(PhantomData<fn() -> T>);

impl<T: Any + Send + Sync> Codec for OptionCodec<T> {
    fn type_name(&self) -> &'static str {
        type_name::<Option<T>>()
    }

    fn encode(&self, value: &dyn Any, registry: &CodecRegistry) -> MappingResult<Bson> {
        let typed = value
            .downcast_ref::<Option<T>>()
            .ok_or_else(|| MappingError::CodecNotFound { type_name: type_name::<Option<T>>().to_string() })?;
        match typed {
            Some(inner) => registry.encode(inner),
            None => Ok(Bson::Null),
        }
    }

    fn decode(&self, value: &Bson, registry: &CodecRegistry) -> MappingResult<Box<dyn Any>> {
        let decoded: Option<T> = match value {
            Bson::Null => None,
            other => Some(registry.decode::<T>(other)?),
        };
        Ok(Box::new(decoded))
    }
}

struct VecCodec<T>(PhantomData<fn() -> T>);

impl<T: Any + Send + Sync> Codec for VecCodec<T> {
    fn type_name(&self) -> &'static str {
        type_name::<Vec<T>>()
    }

    fn encode(&self, value: &dyn Any, registry: &CodecRegistry) -> MappingResult<Bson> {
        let items = value
            .downcast_ref::<Vec<T>>()
            .ok_or_else(|| MappingError::CodecNotFound { type_name: type_name::<Vec<T>>().to_string() })?;
        let mut array = Vec::with_capacity(items.len());
        for item in items {
            array.push(registry.encode(item)?);
        }
        Ok(Bson::Array(array))
    }

    fn decode(&self, value: &Bson, registry: &CodecRegistry) -> MappingResult<Box<dyn Any>> {
        match value {
            Bson::Array(items) => {
                let mut decoded = Vec::with_capacity(items.len());
                for item in items {
                    decoded.push(registry.decode::<T>(item)?);
                }
                Ok(Box::new(decoded))
            }
            other => Err(mismatch::<Vec<T>>(other)),
        }
    }
}

struct MapCodec<T>(PhantomData<fn() -> T>);

impl<T: Any + Send + Sync> Codec for MapCodec<T> {
    fn type_name(&self) -> &'static str {
        type_name::<HashMap<String, T>>()
    }

    fn encode(&self, value: &dyn Any, registry: &CodecRegistry) -> MappingResult<Bson> {
        let entries = value.downcast_ref::<HashMap<String, T>>().ok_or_else(|| {
            MappingError::CodecNotFound { type_name: type_name::<HashMap<String, T>>().to_string() }
        })?;
        let mut document = Document::new();
        for (key, item) in entries {
            document.insert(key.clone(), registry.encode(item)?);
        }
        Ok(Bson::Document(document))
    }

    fn decode(&self, value: &Bson, registry: &CodecRegistry) -> MappingResult<Box<dyn Any>> {
        match value {
            Bson::Document(document) => {
                let mut decoded: HashMap<String, T> = HashMap::with_capacity(document.len());
                for (key, item) in document {
                    decoded.insert(key.clone(), registry.decode::<T>(item)?);
                }
                Ok(Box::new(decoded))
            }
            other => Err(mismatch::<HashMap<String, T>>(other)),
        }
    }
}

/// Registry of codecs keyed by value type.
///
/// The registry is populated during setup (a `&mut` phase) and read-only
/// afterwards, so shared lookups need no locking.
pub struct CodecRegistry {
    by_type: HashMap<TypeId, Arc<dyn Codec>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CodecRegistry {
    /// Creates an empty registry with no converters.
    pub fn new() -> Self {
        Self { by_type: HashMap::new() }
    }

    /// Creates a registry pre-populated with the standard scalar set and
    /// their container forms.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_scalar::<bool>(
            |v| Ok(Bson::Boolean(*v)),
            |b| match b {
                Bson::Boolean(v) => Ok(*v),
                other => Err(mismatch::<bool>(other)),
            },
        );
        registry.register_scalar::<i32>(
            |v| Ok(Bson::Int32(*v)),
            |b| match b {
                Bson::Int32(v) => Ok(*v),
                Bson::Int64(v) => i32::try_from(*v).map_err(|_| mismatch::<i32>(b)),
                other => Err(mismatch::<i32>(other)),
            },
        );
        registry.register_scalar::<i64>(
            |v| Ok(Bson::Int64(*v)),
            |b| match b {
                Bson::Int64(v) => Ok(*v),
                Bson::Int32(v) => Ok(i64::from(*v)),
                other => Err(mismatch::<i64>(other)),
            },
        );
        registry.register_scalar::<u32>(
            |v| Ok(Bson::Int64(i64::from(*v))),
            |b| match b {
                Bson::Int32(v) => u32::try_from(*v).map_err(|_| mismatch::<u32>(b)),
                Bson::Int64(v) => u32::try_from(*v).map_err(|_| mismatch::<u32>(b)),
                other => Err(mismatch::<u32>(other)),
            },
        );
        registry.register_scalar::<f32>(
            |v| Ok(Bson::Double(f64::from(*v))),
            |b| match b {
                Bson::Double(v) => Ok(*v as f32),
                other => Err(mismatch::<f32>(other)),
            },
        );
        registry.register_scalar::<f64>(
            |v| Ok(Bson::Double(*v)),
            |b| match b {
                Bson::Double(v) => Ok(*v),
                Bson::Int32(v) => Ok(f64::from(*v)),
                Bson::Int64(v) => Ok(*v as f64),
                other => Err(mismatch::<f64>(other)),
            },
        );
        registry.register_scalar::<String>(
            |v| Ok(Bson::String(v.clone())),
            |b| match b {
                Bson::String(v) => Ok(v.clone()),
                other => Err(mismatch::<String>(other)),
            },
        );
        registry.register_scalar::<bson::DateTime>(
            |v| Ok(Bson::DateTime(*v)),
            |b| match b {
                Bson::DateTime(v) => Ok(*v),
                other => Err(mismatch::<bson::DateTime>(other)),
            },
        );
        registry.register_scalar::<DateTime<Utc>>(
            |v| Ok(Bson::DateTime(bson::DateTime::from_chrono(*v))),
            |b| match b {
                Bson::DateTime(v) => Ok(v.to_chrono()),
                other => Err(mismatch::<DateTime<Utc>>(other)),
            },
        );
        registry.register_scalar::<Bson>(|v| Ok(v.clone()), |b| Ok(b.clone()));
        registry.register_scalar::<Document>(
            |v| Ok(Bson::Document(v.clone())),
            |b| match b {
                Bson::Document(v) => Ok(v.clone()),
                other => Err(mismatch::<Document>(other)),
            },
        );
        registry.register_serde::<bson::Uuid>();
        registry.register_serde::<uuid::Uuid>();
        registry
    }

    /// Registers a custom codec for `T`, replacing any existing one.
    pub fn register<T: Any>(&mut self, codec: impl Codec + 'static) {
        self.by_type.insert(TypeId::of::<T>(), Arc::new(codec));
    }

    /// Registers a scalar codec for `T` along with its `Option`, `Vec`, and
    /// string-keyed map container forms.
    pub fn register_scalar<T: Any + Send + Sync>(
        &mut self,
        encode: fn(&T) -> MappingResult<Bson>,
        decode: fn(&Bson) -> MappingResult<T>,
    ) {
        self.register::<T>(ScalarCodec { encode, decode });
        self.register_containers::<T>();
    }

    /// Registers a serde-backed codec for `T` along with its container
    /// forms. Useful for custom value types that already round-trip cleanly
    /// through the wire format.
    pub fn register_serde<T>(&mut self)
    where
        T: Any + Send + Sync + Serialize + DeserializeOwned,
    {
        self.register::<T>(SerdeCodec::<T>(PhantomData));
        self.register_containers::<T>();
    }

    fn register_containers<T: Any + Send + Sync>(&mut self) {
        self.register::<Option<T>>(OptionCodec::<T>(PhantomData));
        self.register::<Vec<T>>(VecCodec::<T>(PhantomData));
        self.register::<HashMap<String, T>>(MapCodec::<T>(PhantomData));
    }

    /// Encodes a value by its runtime type.
    pub fn encode<T: Any>(&self, value: &T) -> MappingResult<Bson> {
        self.encode_any(value, type_name::<T>())
    }

    /// Encodes a type-erased value by its runtime type identity.
    pub fn encode_any(&self, value: &dyn Any, type_name: &str) -> MappingResult<Bson> {
        match self.by_type.get(&value.type_id()) {
            Some(codec) => codec.encode(value, self),
            None => Err(MappingError::CodecNotFound { type_name: type_name.to_string() }),
        }
    }

    /// Encodes a type-erased value, falling back to the declared type when
    /// the runtime type has no converter of its own.
    pub fn encode_declared(
        &self,
        value: &dyn Any,
        declared: TypeId,
        type_name: &str,
    ) -> MappingResult<Bson> {
        let codec = self
            .by_type
            .get(&value.type_id())
            .or_else(|| self.by_type.get(&declared))
            .ok_or_else(|| MappingError::CodecNotFound { type_name: type_name.to_string() })?;
        codec.encode(value, self)
    }

    /// Decodes a wire value into `T`.
    pub fn decode<T: Any>(&self, value: &Bson) -> MappingResult<T> {
        let codec = self
            .by_type
            .get(&TypeId::of::<T>())
            .ok_or_else(|| MappingError::CodecNotFound { type_name: type_name::<T>().to_string() })?;
        let decoded = codec.decode(value, self)?;
        decoded
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| mismatch::<T>(value))
    }

    /// Returns true when a codec is registered for `T`.
    pub fn contains<T: Any>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }
}

/// A typed literal captured by a fluent builder and encoded lazily at
/// render time through the codec registry.
///
/// A literal carries both the value's runtime type and a declared type,
/// which start out identical. Lookup prefers the runtime type and falls
/// back to the declared one, so a custom codec registered under a declared
/// type can take over values whose own type has no converter.
pub struct Literal {
    value: Box<dyn Any + Send + Sync>,
    declared: TypeId,
    type_name: &'static str,
}

impl Literal {
    /// Wraps a typed value for deferred encoding.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Box::new(value),
            declared: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Overrides the declared type consulted when the runtime type has no
    /// codec of its own. The codec registered for `D` must be able to
    /// handle the wrapped runtime value.
    pub fn declared_as<D: Any>(mut self) -> Self {
        self.declared = TypeId::of::<D>();
        self
    }

    /// The fully qualified name of the wrapped type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Encodes the wrapped value through the given registry, runtime type
    /// first, declared type as fallback.
    pub fn encode_with(&self, registry: &CodecRegistry) -> MappingResult<Bson> {
        let value: &dyn Any = &*self.value;
        registry.encode_declared(value, self.declared, self.type_name)
    }
}

impl fmt::Debug for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Literal({})", self.type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trips() {
        let registry = CodecRegistry::with_defaults();

        let encoded = registry.encode(&42i64).unwrap();
        assert_eq!(encoded, Bson::Int64(42));
        assert_eq!(registry.decode::<i64>(&encoded).unwrap(), 42);

        let encoded = registry.encode(&"hi".to_string()).unwrap();
        assert_eq!(registry.decode::<String>(&encoded).unwrap(), "hi");

        let encoded = registry.encode(&true).unwrap();
        assert!(registry.decode::<bool>(&encoded).unwrap());
    }

    #[test]
    fn container_round_trips() {
        let registry = CodecRegistry::with_defaults();

        let values = vec![1i32, 2, 3];
        let encoded = registry.encode(&values).unwrap();
        assert_eq!(
            encoded,
            Bson::Array(vec![Bson::Int32(1), Bson::Int32(2), Bson::Int32(3)])
        );
        assert_eq!(registry.decode::<Vec<i32>>(&encoded).unwrap(), values);

        let mut map = HashMap::new();
        map.insert("a".to_string(), 1.5f64);
        let encoded = registry.encode(&map).unwrap();
        assert_eq!(registry.decode::<HashMap<String, f64>>(&encoded).unwrap(), map);
    }

    #[test]
    fn option_encodes_null() {
        let registry = CodecRegistry::with_defaults();
        let none: Option<i32> = None;
        assert_eq!(registry.encode(&none).unwrap(), Bson::Null);
        assert_eq!(registry.decode::<Option<i32>>(&Bson::Null).unwrap(), None);
        assert_eq!(
            registry.decode::<Option<i32>>(&Bson::Int32(7)).unwrap(),
            Some(7)
        );
    }

    #[test]
    fn unknown_type_fails_with_type_identity() {
        struct Opaque;
        let registry = CodecRegistry::with_defaults();
        let err = registry.encode(&Opaque).unwrap_err();
        match err {
            MappingError::CodecNotFound { type_name } => {
                assert!(type_name.contains("Opaque"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn literal_defers_encoding() {
        let registry = CodecRegistry::with_defaults();
        let literal = Literal::new(13i32);
        assert_eq!(literal.encode_with(&registry).unwrap(), Bson::Int32(13));
    }

    #[test]
    fn declared_type_fallback_covers_unregistered_runtime_types() {
        struct Celsius(f64);
        struct Temperature;
        struct TemperatureCodec;

        impl Codec for TemperatureCodec {
            fn type_name(&self) -> &'static str {
                type_name::<Temperature>()
            }

            fn encode(&self, value: &dyn Any, _registry: &CodecRegistry) -> MappingResult<Bson> {
                let celsius = value.downcast_ref::<Celsius>().ok_or_else(|| {
                    MappingError::CodecNotFound { type_name: type_name::<Temperature>().to_string() }
                })?;
                Ok(Bson::Double(celsius.0))
            }

            fn decode(&self, value: &Bson, _registry: &CodecRegistry) -> MappingResult<Box<dyn Any>> {
                match value {
                    Bson::Double(degrees) => Ok(Box::new(Celsius(*degrees))),
                    other => Err(mismatch::<Celsius>(other)),
                }
            }
        }

        let mut registry = CodecRegistry::with_defaults();
        registry.register::<Temperature>(TemperatureCodec);

        // Celsius has no codec of its own; lookup falls back to the
        // declared type.
        let literal = Literal::new(Celsius(21.5)).declared_as::<Temperature>();
        assert_eq!(literal.encode_with(&registry).unwrap(), Bson::Double(21.5));

        // without the declared override the runtime type still fails
        let err = Literal::new(Celsius(21.5)).encode_with(&registry).unwrap_err();
        assert!(matches!(err, MappingError::CodecNotFound { .. }));
    }

    #[test]
    fn runtime_type_wins_over_declared_type() {
        let registry = CodecRegistry::with_defaults();
        // both i32 and i64 are registered; the runtime type decides
        let literal = Literal::new(5i32).declared_as::<i64>();
        assert_eq!(literal.encode_with(&registry).unwrap(), Bson::Int32(5));
    }

    #[test]
    fn decode_mismatch_names_wire_type() {
        let registry = CodecRegistry::with_defaults();
        let err = registry.decode::<bool>(&Bson::String("no".into())).unwrap_err();
        assert!(matches!(err, MappingError::DecodeMismatch { found: "string", .. }));
    }
}
