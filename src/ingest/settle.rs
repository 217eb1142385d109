use std::future::Future;

use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};

/// Per-item result of [`settle_all`].
#[derive(Debug)]
pub enum Outcome<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Outcome<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected(_))
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Outcome::Fulfilled(v),
            Err(e) => Outcome::Rejected(e),
        }
    }
}

/// Await every future and collect its outcome; one failure never short-circuits
/// the rest. Outcomes keep the input order.
pub async fn settle_all<I, F, T, E>(futures: I) -> Vec<Outcome<T, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    join_all(futures)
        .await
        .into_iter()
        .map(Outcome::from)
        .collect()
}

/// [`settle_all`] with at most `limit` futures in flight. A slot is refilled as
/// soon as any future finishes; outcomes are still returned in input order.
pub async fn settle_bounded<I, F, T, E>(futures: I, limit: usize) -> Vec<Outcome<T, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>>,
{
    let tagged: Vec<_> = futures
        .into_iter()
        .enumerate()
        .map(|(index, fut)| async move { (index, Outcome::from(fut.await)) })
        .collect();
    let mut settled: Vec<(usize, Outcome<T, E>)> = stream::iter(tagged)
        .buffer_unordered(limit.max(1))
        .collect()
        .await;
    settled.sort_by_key(|(index, _)| *index);
    settled.into_iter().map(|(_, outcome)| outcome).collect()
}
