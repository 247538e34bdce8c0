//! Translation between typed entities and flat properties.

use crate::error::{CoreError, CoreResult};
use entiscope_store::{Properties, Value};

/// Trait for types that can be stored as entities.
///
/// Implementors convert their non-identity fields to and from a flat
/// property map. Identity fields (id and parent) are handled by the
/// type's [`crate::KeyMetadata`] and must not appear in the map.
///
/// # Example
///
/// ```rust
/// use entiscope_core::{translate, CoreResult, Translate};
/// use entiscope_store::Properties;
///
/// #[derive(Default)]
/// struct Note {
///     id: Option<i64>,
///     text: String,
/// }
///
/// impl Translate for Note {
///     fn to_properties(&self) -> CoreResult<Properties> {
///         let mut props = Properties::new();
///         props.insert("text".into(), self.text.clone().into());
///         Ok(props)
///     }
///
///     fn from_properties(props: &Properties) -> CoreResult<Self> {
///         Ok(Note {
///             id: None,
///             text: translate::text(props, "text")?.unwrap_or_default(),
///         })
///     }
/// }
/// ```
pub trait Translate: Sized + 'static {
    /// Converts the entity's non-identity fields to properties.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be represented.
    fn to_properties(&self) -> CoreResult<Properties>;

    /// Builds an entity from properties. Identity fields are set afterwards.
    ///
    /// Projection queries pass only the projected properties, so missing
    /// properties should not be fatal unless the type cannot exist without
    /// them.
    ///
    /// # Errors
    ///
    /// Returns an error if a property has an unexpected type.
    fn from_properties(properties: &Properties) -> CoreResult<Self>;
}

fn mismatch(name: &str, expected: &str, found: &Value) -> CoreError {
    CoreError::translation(format!(
        "property {name} should be {expected}, found {found:?}"
    ))
}

/// Reads an optional text property.
///
/// # Errors
///
/// Returns a translation error if the property is not text.
pub fn text(properties: &Properties, name: &str) -> CoreResult<Option<String>> {
    match properties.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(v)) => Ok(Some(v.clone())),
        Some(other) => Err(mismatch(name, "text", other)),
    }
}

/// Reads an optional integer property.
///
/// # Errors
///
/// Returns a translation error if the property is not an integer.
pub fn integer(properties: &Properties, name: &str) -> CoreResult<Option<i64>> {
    match properties.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Integer(v)) => Ok(Some(*v)),
        Some(other) => Err(mismatch(name, "an integer", other)),
    }
}

/// Reads an optional boolean property.
///
/// # Errors
///
/// Returns a translation error if the property is not a boolean.
pub fn boolean(properties: &Properties, name: &str) -> CoreResult<Option<bool>> {
    match properties.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(v)) => Ok(Some(*v)),
        Some(other) => Err(mismatch(name, "a boolean", other)),
    }
}
