//! Opaque result values
//!
//! The engine does not care about what an asynchronous operation computes, so
//! results travel as type-erased values which only the code that produced them
//! and the code that consumes them know how to interpret.

use std::any::Any;
use std::fmt;
use std::rc::Rc;


/// Type-erased, possibly empty, cheaply cloneable result value
#[derive(Clone, Default)]
pub struct AsyncValue {
    holder: Option<Rc<dyn Any>>,
}
//
impl AsyncValue {
    /// Wrap a value
    pub fn new<T: Any>(value: T) -> Self {
        AsyncValue { holder: Some(Rc::new(value)) }
    }

    /// The empty value
    pub fn empty() -> Self {
        AsyncValue { holder: None }
    }

    /// Check if there is no value at all
    pub fn is_empty(&self) -> bool {
        self.holder.is_none()
    }

    /// Check if the value has a certain type
    pub fn is<T: Any>(&self) -> bool {
        self.holder.as_ref().is_some_and(|holder| holder.is::<T>())
    }

    /// Access the value, if it has the expected type
    pub fn get<T: Any>(&self) -> Option<&T> {
        self.holder.as_ref().and_then(|holder| holder.downcast_ref::<T>())
    }

    /// Check whether two values share the same storage
    pub fn ptr_eq(&self, other: &AsyncValue) -> bool {
        match (&self.holder, &other.holder) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}
//
impl fmt::Debug for AsyncValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            f.write_str("AsyncValue(<empty>)")
        } else {
            f.write_str("AsyncValue(<opaque>)")
        }
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty() {
        let value = AsyncValue::default();
        assert!(value.is_empty());
        assert!(!value.is::<u32>());
        assert_eq!(value.get::<u32>(), None);
        assert!(value.ptr_eq(&AsyncValue::empty()));
    }

    /// Values can only be read back with the type they were stored with
    #[test]
    fn typed_access() {
        let value = AsyncValue::new(42u32);
        assert!(value.is::<u32>());
        assert!(!value.is::<i64>());
        assert_eq!(value.get::<u32>(), Some(&42));
        assert_eq!(value.get::<String>(), None);
    }

    /// Clones share storage
    #[test]
    fn clones_share() {
        let value = AsyncValue::new(String::from("page 1"));
        let copy = value.clone();
        assert!(value.ptr_eq(&copy));
        assert!(!value.ptr_eq(&AsyncValue::new(String::from("page 1"))));
    }
}
