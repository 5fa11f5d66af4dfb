//! Utility macros for reducing boilerplate

/// Implement `FromRef<AppState>` for a cloneable field of the state.
///
/// ```ignore
/// impl_from_ref!(SharedRelational, relational);
/// // Expands to:
/// impl axum::extract::FromRef<AppState> for SharedRelational {
///     fn from_ref(state: &AppState) -> Self {
///         state.relational.clone()
///     }
/// }
/// ```
#[macro_export]
macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<$crate::state::AppState> for $type {
            fn from_ref(state: &$crate::state::AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}
