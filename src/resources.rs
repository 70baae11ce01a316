//! Shared resources owned by a top level [`Graph`](crate::graph::Graph): the
//! registry of operation constructors used by
//! [`Graph::push_named`](crate::graph::Graph::push_named) and any user data
//! operations need to share.

use core::fmt::Debug;
use std::collections::HashMap;

use downcast_rs::{impl_downcast, Downcast};

use crate::operation::Operation;
use crate::ops;

#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
/// Settings used to initialise [`Resources`].
pub struct ResourcesSettings {
    /// The maximum number of user data objects that can be added.
    pub max_user_data: usize,
}
impl Default for ResourcesSettings {
    fn default() -> Self {
        Self { max_user_data: 16 }
    }
}

/// Trait for any data
pub trait AnyData: Downcast + Send + Debug {}
impl_downcast!(AnyData);

/// Error from changing a [`Resources`]
#[derive(thiserror::Error, Debug)]
pub enum ResourcesError {
    /// No space for more user data. Increase the `max_user_data` setting if you need to hold more.
    #[error("There is not enough space to insert the user data `{0}`. You can create a Resources with more space or remove old entries")]
    UserDataFull(String),
}

/// Creates a fresh boxed operation with default properties.
pub type OperationConstructor = fn() -> Box<dyn Operation>;

/// Operation constructors by registry name, plus user data.
pub struct Resources {
    operations: HashMap<String, OperationConstructor>,
    /// Strings are used as keys for simplicity.
    user_data: HashMap<String, Box<dyn AnyData>>,
    max_user_data: usize,
}

impl Resources {
    /// A registry holding every built in operation.
    pub fn new(settings: ResourcesSettings) -> Self {
        let mut r = Self {
            operations: HashMap::new(),
            user_data: HashMap::with_capacity(settings.max_user_data),
            max_user_data: settings.max_user_data,
        };
        ops::register_builtin(&mut r);
        r
    }
    /// Register `Op` under `name`, replacing any earlier registration.
    pub fn register<Op: Operation + Default>(&mut self, name: &str) {
        self.register_operation(name, || -> Box<dyn Operation> { Box::new(Op::default()) });
    }
    pub fn register_operation(&mut self, name: &str, constructor: OperationConstructor) {
        if self.operations.insert(name.to_owned(), constructor).is_some() {
            log::debug!("Replaced the registration of `{name}`");
        }
    }
    /// A new instance of the operation registered as `name`.
    pub fn create_operation(&self, name: &str) -> Option<Box<dyn Operation>> {
        self.operations.get(name).map(|constructor| constructor())
    }
    /// Registered names, sorted.
    pub fn operation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Inserts user data under `key`. Replacing an existing key always succeeds.
    ///
    /// # Errors
    /// Fails if `max_user_data` entries are already held.
    pub fn insert_user_data(
        &mut self,
        key: impl Into<String>,
        data: Box<dyn AnyData>,
    ) -> Result<(), ResourcesError> {
        let key = key.into();
        if self.user_data.len() < self.max_user_data || self.user_data.contains_key(&key) {
            self.user_data.insert(key, data);
            Ok(())
        } else {
            Err(ResourcesError::UserDataFull(key))
        }
    }
    /// The user data stored under `key`, if it has type `T`.
    pub fn user_data<T: AnyData>(&self, key: &str) -> Option<&T> {
        self.user_data.get(key)?.downcast_ref::<T>()
    }
    pub fn user_data_mut<T: AnyData>(&mut self, key: &str) -> Option<&mut T> {
        self.user_data.get_mut(key)?.downcast_mut::<T>()
    }
    pub fn remove_user_data(&mut self, key: &str) -> Option<Box<dyn AnyData>> {
        self.user_data.remove(key)
    }
}

impl Default for Resources {
    fn default() -> Self {
        Self::new(ResourcesSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Palette(Vec<u32>);
    impl AnyData for Palette {}

    #[test]
    fn builtins_are_registered() {
        let r = Resources::default();
        for name in ["nop", "color", "crop", "box-blur", "over", "dropshadow"] {
            assert!(r.create_operation(name).is_some(), "{name} missing");
        }
        assert_eq!(r.create_operation("crop").map(|op| op.name()), Some("crop"));
        assert!(r.create_operation("no-such-op").is_none());
    }

    #[test]
    fn user_data_is_bounded() {
        let mut r = Resources::new(ResourcesSettings { max_user_data: 1 });
        r.insert_user_data("palette", Box::new(Palette(vec![1, 2])))
            .unwrap();
        assert!(matches!(
            r.insert_user_data("other", Box::new(Palette(vec![]))),
            Err(ResourcesError::UserDataFull(_))
        ));
        // Replacing is fine
        r.insert_user_data("palette", Box::new(Palette(vec![3])))
            .unwrap();
        assert_eq!(r.user_data::<Palette>("palette"), Some(&Palette(vec![3])));
        assert!(r.remove_user_data("palette").is_some());
        assert!(r.user_data::<Palette>("palette").is_none());
    }
}
