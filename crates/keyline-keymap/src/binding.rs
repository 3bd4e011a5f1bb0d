//! Values a key sequence can resolve to.

use std::fmt;
use std::sync::Arc;

/// What a key press means to the embedding application.
#[derive(Clone)]
pub enum Binding {
    /// Replay a string of code points through the reader's push-back queue.
    Macro(String),
    /// Reference to a named operation, resolved by the application.
    Reference(String),
    /// Callback fired directly when the sequence resolves.
    Widget(Arc<dyn Fn() + Send + Sync>),
}

impl Binding {
    pub fn widget<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Binding::Widget(Arc::new(f))
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Macro(m) => f.debug_tuple("Macro").field(m).finish(),
            Binding::Reference(r) => f.debug_tuple("Reference").field(r).finish(),
            Binding::Widget(_) => f.write_str("Widget(..)"),
        }
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Binding::Macro(a), Binding::Macro(b)) => a == b,
            (Binding::Reference(a), Binding::Reference(b)) => a == b,
            (Binding::Widget(a), Binding::Widget(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_by_variant() {
        assert_eq!(
            Binding::Reference("up".into()),
            Binding::Reference("up".into())
        );
        assert_ne!(
            Binding::Reference("up".into()),
            Binding::Macro("up".into())
        );
    }

    #[test]
    fn test_widget_equality_is_by_pointer() {
        let w = Binding::widget(|| {});
        assert_eq!(w.clone(), w);
        assert_ne!(Binding::widget(|| {}), Binding::widget(|| {}));
    }
}
