/// Lifecycle of a value that has to be fetched from somewhere else.
///
/// `Loading` may keep the last successful value around so observers can keep
/// showing it while a refresh is in flight. It is never reported as fresh:
/// [`AsyncValue::is_success`] stays `false` until the new result lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncValue<T, E> {
    NotAsked,
    Loading(Option<T>),
    Success(T),
    Failed(E),
}

impl<T, E> Default for AsyncValue<T, E> {
    fn default() -> Self {
        AsyncValue::NotAsked
    }
}

impl<T, E> AsyncValue<T, E> {
    pub fn initial() -> Self {
        AsyncValue::NotAsked
    }

    /// Moves into `Loading`, retaining the value only when `self` is `Success`.
    pub fn to_loading(self) -> Self {
        match self {
            AsyncValue::Success(value) => AsyncValue::Loading(Some(value)),
            _ => AsyncValue::Loading(None),
        }
    }

    pub fn succeed(value: T) -> Self {
        AsyncValue::Success(value)
    }

    pub fn fail(error: E) -> Self {
        AsyncValue::Failed(error)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AsyncValue::Success(_))
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, AsyncValue::Loading(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AsyncValue::Failed(_))
    }

    pub fn is_not_asked(&self) -> bool {
        matches!(self, AsyncValue::NotAsked)
    }

    /// Last known good value: the current success or the one retained while loading.
    pub fn last_value(&self) -> Option<&T> {
        match self {
            AsyncValue::Success(value) => Some(value),
            AsyncValue::Loading(previous) => previous.as_ref(),
            AsyncValue::NotAsked | AsyncValue::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            AsyncValue::Failed(error) => Some(error),
            _ => None,
        }
    }
}
