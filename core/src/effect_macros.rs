//! Declarative macros for ergonomic effect construction

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```
/// use async_lifecycle_core::{async_effect, Effect};
///
/// #[derive(Debug)]
/// enum Action {
///     Loaded { value: u32 },
/// }
///
/// let effect: Effect<Action> = async_effect! {
///     Some(Action::Loaded { value: 42 })
/// };
/// assert!(matches!(effect, Effect::Future(_)));
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}
