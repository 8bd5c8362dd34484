use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::errors::Result;
use super::transaction::Transaction;
use super::unit_of_work::UnitOfWork;

// ============================================================================
// Interceptor Chain
// ============================================================================
//
// A flat, ordered list of interceptors in front of one terminal handler.
// Dispatch walks the list by slicing: each interceptor receives `Next`, which
// is the remainder of the list plus the handler.
//
// `Next::proceed` takes `self` by value, so an interceptor can invoke the
// rest of the chain at most once. Dropping `Next` without proceeding is a
// short-circuit: the handler never runs.
//
// ============================================================================

/// Terminal handler: the business operation executed inside the unit of work.
#[async_trait]
pub trait MessageHandler<T: Transaction, R>: Send + Sync {
    async fn handle(&self, uow: &mut UnitOfWork<T>) -> Result<R>;
}

/// A link in the chain. Runs code before/after `next`, or refuses to call it.
#[async_trait]
pub trait Interceptor<T: Transaction, R: Send + 'static>: Send + Sync {
    async fn intercept(&self, uow: &mut UnitOfWork<T>, next: Next<'_, T, R>) -> Result<R>;
}

/// The rest of the chain, as seen from one interceptor
pub struct Next<'a, T: Transaction, R: Send + 'static> {
    interceptors: &'a [Arc<dyn Interceptor<T, R>>],
    handler: &'a dyn MessageHandler<T, R>,
}

impl<'a, T: Transaction, R: Send + 'static> Next<'a, T, R> {
    /// Invoke the remainder of the chain. Consumes the continuation.
    pub fn proceed<'u>(self, uow: &'u mut UnitOfWork<T>) -> BoxFuture<'u, Result<R>>
    where
        'a: 'u,
    {
        Box::pin(async move {
            match self.interceptors.split_first() {
                Some((interceptor, rest)) => {
                    let next = Next {
                        interceptors: rest,
                        handler: self.handler,
                    };
                    interceptor.intercept(uow, next).await
                }
                None => self.handler.handle(uow).await,
            }
        })
    }

    /// Interceptors still ahead of the handler
    pub fn remaining(&self) -> usize {
        self.interceptors.len()
    }
}

pub struct InterceptorChain<'h, T: Transaction, R: Send + 'static> {
    interceptors: Vec<Arc<dyn Interceptor<T, R>>>,
    handler: &'h dyn MessageHandler<T, R>,
}

impl<'h, T: Transaction, R: Send + 'static> InterceptorChain<'h, T, R> {
    pub fn new(
        interceptors: Vec<Arc<dyn Interceptor<T, R>>>,
        handler: &'h dyn MessageHandler<T, R>,
    ) -> Self {
        Self { interceptors, handler }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run the chain once. Errors come back exactly as raised.
    pub async fn proceed(self, uow: &mut UnitOfWork<T>) -> Result<R> {
        let next = Next {
            interceptors: &self.interceptors,
            handler: self.handler,
        };
        next.proceed(uow).await
    }
}

// ============================================================================
// Closure Handlers
// ============================================================================

pub struct HandlerFn<F, T, R> {
    f: F,
    _phantom: PhantomData<fn() -> (T, R)>,
}

/// Wrap a closure returning a boxed future as a `MessageHandler`
pub fn handler_fn<T, R, F>(f: F) -> HandlerFn<F, T, R>
where
    T: Transaction,
    R: Send + 'static,
    F: for<'u> Fn(&'u mut UnitOfWork<T>) -> BoxFuture<'u, Result<R>> + Send + Sync,
{
    HandlerFn {
        f,
        _phantom: PhantomData,
    }
}

#[async_trait]
impl<F, T, R> MessageHandler<T, R> for HandlerFn<F, T, R>
where
    T: Transaction,
    R: Send + 'static,
    F: for<'u> Fn(&'u mut UnitOfWork<T>) -> BoxFuture<'u, Result<R>> + Send + Sync,
{
    async fn handle(&self, uow: &mut UnitOfWork<T>) -> Result<R> {
        (self.f)(uow).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::messaging::message::Message;
    use crate::messaging::testing::{Journal, RecordingTransaction};

    type Tx = RecordingTransaction;

    struct Recording {
        name: &'static str,
        journal: Journal,
    }

    #[async_trait]
    impl Interceptor<Tx, u32> for Recording {
        async fn intercept(&self, uow: &mut UnitOfWork<Tx>, next: Next<'_, Tx, u32>) -> Result<u32> {
            self.journal.record(format!("before:{}", self.name));
            let result = next.proceed(uow).await;
            self.journal.record(format!("after:{}", self.name));
            result
        }
    }

    struct Rejecting;

    #[async_trait]
    impl Interceptor<Tx, u32> for Rejecting {
        async fn intercept(&self, _uow: &mut UnitOfWork<Tx>, _next: Next<'_, Tx, u32>) -> Result<u32> {
            Err(Error::InvalidArgument("rejected".to_string()))
        }
    }

    struct Answer {
        journal: Journal,
        fail: bool,
    }

    #[async_trait]
    impl MessageHandler<Tx, u32> for Answer {
        async fn handle(&self, _uow: &mut UnitOfWork<Tx>) -> Result<u32> {
            self.journal.record("handler");
            if self.fail {
                return Err(Error::ChainAbort(anyhow::anyhow!("handler exploded")));
            }
            Ok(42)
        }
    }

    fn recording(name: &'static str, journal: &Journal) -> Arc<dyn Interceptor<Tx, u32>> {
        Arc::new(Recording {
            name,
            journal: journal.clone(),
        })
    }

    #[tokio::test]
    async fn test_interceptors_run_in_supplied_order() {
        let journal = Journal::default();
        let handler = Answer { journal: journal.clone(), fail: false };
        let chain = InterceptorChain::new(
            vec![recording("a", &journal), recording("b", &journal), recording("c", &journal)],
            &handler,
        );
        let mut uow = UnitOfWork::<Tx>::new(Message::new("test"));

        let value = chain.proceed(&mut uow).await.unwrap();

        assert_eq!(value, 42);
        assert_eq!(
            journal.entries(),
            vec!["before:a", "before:b", "before:c", "handler", "after:c", "after:b", "after:a"]
        );
    }

    #[tokio::test]
    async fn test_empty_chain_runs_handler_once() {
        let journal = Journal::default();
        let handler = Answer { journal: journal.clone(), fail: false };
        let chain = InterceptorChain::new(vec![], &handler);
        assert!(chain.is_empty());

        let mut uow = UnitOfWork::<Tx>::new(Message::new("test"));
        assert_eq!(chain.proceed(&mut uow).await.unwrap(), 42);
        assert_eq!(journal.count("handler"), 1);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler_and_later_interceptors() {
        let journal = Journal::default();
        let handler = Answer { journal: journal.clone(), fail: false };
        let chain = InterceptorChain::new(
            vec![
                recording("a", &journal),
                Arc::new(Rejecting) as Arc<dyn Interceptor<Tx, u32>>,
                recording("c", &journal),
            ],
            &handler,
        );
        let mut uow = UnitOfWork::<Tx>::new(Message::new("test"));

        let result = chain.proceed(&mut uow).await;

        assert!(matches!(result, Err(Error::InvalidArgument(ref msg)) if msg == "rejected"));
        assert_eq!(journal.entries(), vec!["before:a", "after:a"]);
    }

    #[tokio::test]
    async fn test_handler_error_propagates_unmodified() {
        let journal = Journal::default();
        let handler = Answer { journal: journal.clone(), fail: true };
        let chain = InterceptorChain::new(vec![recording("a", &journal)], &handler);
        let mut uow = UnitOfWork::<Tx>::new(Message::new("test"));

        let err = chain.proceed(&mut uow).await.unwrap_err();

        match err {
            Error::ChainAbort(inner) => assert_eq!(inner.to_string(), "handler exploded"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(journal.entries(), vec!["before:a", "handler", "after:a"]);
    }

    #[tokio::test]
    async fn test_closure_handler() {
        let handler: HandlerFn<_, Tx, u32> =
            handler_fn(|uow| Box::pin(async move { Ok::<_, Error>(uow.message().name().len() as u32) }));
        let chain = InterceptorChain::new(vec![], &handler);
        let mut uow = UnitOfWork::<Tx>::new(Message::new("four"));

        assert_eq!(chain.proceed(&mut uow).await.unwrap(), 4);
    }
}
