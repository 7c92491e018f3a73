//! Units of work submitted to the [`RetryClassifier`](crate::RetryClassifier).

use crate::poller::{ConditionPoller, ConditionResult, Probe};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type BoxedOperation<T, E> = Box<dyn FnMut() -> BoxFuture<'static, Result<T, E>> + Send>;
type BoxedCheck<E> = Box<dyn FnMut() -> BoxFuture<'static, Result<bool, E>> + Send>;

/// Identifier correlating every execution and signal of one attempt sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttemptId(String);

impl AttemptId {
    /// A fresh random (UUID v4) identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttemptId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AttemptId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A readiness check plus the poller that bounds it.
///
/// The check returns `Ok(true)` when ready and `Ok(false)` when not yet; errors go through the
/// poller's `ignoring` filter.
pub struct Condition<E> {
    check: BoxedCheck<E>,
    poller: ConditionPoller<E>,
}

impl<E: Send + 'static> Condition<E> {
    pub fn new<F, Fut>(poller: ConditionPoller<E>, mut check: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<bool, E>> + Send + 'static,
    {
        let check: BoxedCheck<E> =
            Box::new(move || -> BoxFuture<'static, Result<bool, E>> { Box::pin(check()) });
        Self { check, poller }
    }

    pub fn poller(&self) -> &ConditionPoller<E> {
        &self.poller
    }

    pub(crate) async fn wait(
        &mut self,
        outer: Option<&CancellationToken>,
    ) -> ConditionResult<(), (), E> {
        let check = &mut self.check;
        self.poller
            .wait_with(
                || {
                    let probe = check();
                    async move { probe.await.map(Probe::from_bool) }
                },
                outer,
            )
            .await
    }
}

impl<E> fmt::Debug for Condition<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition").field("poller", &self.poller).finish_non_exhaustive()
    }
}

/// One unit of caller-supplied work: an id, the operation, and optional readiness checks.
///
/// The operation is invoked once per execution. A precondition is re-verified before every
/// execution, not just the first; a stabilization check runs after each successful execution.
pub struct Attempt<T, E> {
    id: AttemptId,
    pub(crate) operation: BoxedOperation<T, E>,
    pub(crate) precondition: Option<Condition<E>>,
    pub(crate) stabilization: Option<Condition<E>>,
}

impl<T, E> Attempt<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Wrap an operation with a random id.
    pub fn new<F, Fut>(operation: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::with_id(AttemptId::random(), operation)
    }

    /// Wrap an operation with a caller-chosen id (a test name, a step label).
    pub fn with_id<I, F, Fut>(id: I, mut operation: F) -> Self
    where
        I: Into<AttemptId>,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let operation: BoxedOperation<T, E> =
            Box::new(move || -> BoxFuture<'static, Result<T, E>> { Box::pin(operation()) });
        Self {
            id: id.into(),
            operation,
            precondition: None,
            stabilization: None,
        }
    }

    /// Wait for `condition` before each execution.
    pub fn precondition(mut self, condition: Condition<E>) -> Self {
        self.precondition = Some(condition);
        self
    }

    /// Wait for `condition` after each successful execution before declaring success.
    pub fn stabilization(mut self, condition: Condition<E>) -> Self {
        self.stabilization = Some(condition);
        self
    }
}

impl<T, E> Attempt<T, E> {
    pub fn id(&self) -> &AttemptId {
        &self.id
    }

    pub fn has_precondition(&self) -> bool {
        self.precondition.is_some()
    }
}

impl<T, E> fmt::Debug for Attempt<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attempt")
            .field("id", &self.id)
            .field("operation", &"<operation>")
            .field("precondition", &self.precondition)
            .field("stabilization", &self.stabilization)
            .finish()
    }
}
