use std::marker::PhantomData;

use crate::ExecutionContext;

const DEFAULT_NAME: &str = "default";

/// Creates instances of [`ExecutionContext`].
///
/// Use `ExecutionContext::builder()` to create a new instance of this builder.
///
/// # Example
///
/// ```rust
/// use async_event::ExecutionContext;
///
/// let context = ExecutionContext::builder().name("network").build();
/// assert_eq!(context.name(), "network");
/// ```
#[derive(Debug)]
#[must_use]
pub struct ContextBuilder {
    name: String,

    _single_threaded: PhantomData<*const ()>,
}

impl ContextBuilder {
    pub(crate) fn new() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            _single_threaded: PhantomData,
        }
    }

    /// Sets the name of the context, used to identify it in log output and errors.
    ///
    /// Defaults to `"default"`.
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    /// Creates the execution context.
    #[must_use]
    pub fn build(self) -> ExecutionContext {
        ExecutionContext::from_builder(self.name)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(ContextBuilder: Send, Sync);

    #[test]
    fn default_name_is_used_when_unset() {
        let context = ContextBuilder::new().build();
        assert_eq!(context.name(), DEFAULT_NAME);
    }

    #[test]
    fn last_name_wins() {
        let context = ContextBuilder::new().name("first").name("second").build();
        assert_eq!(context.name(), "second");
    }
}
