use {
    crate::{
        client::Client,
        error::{code, Error, TransportError},
        node::KeyResponse,
        options::RequestOptions,
    },
    retry::delay::Exponential,
    std::{future::Future, time::Duration},
    tracing::{debug, warn},
};

///
/// True for errors caused by "outside" forces, such as an unreachable member or a leader election,
/// where issuing the same request again may succeed.
///
pub fn is_transient(err: &Error) -> bool {
    match err {
        Error::Transport(TransportError::Timeout) => true,
        Error::Transport(TransportError::Http(e)) => e.is_connect() || e.is_request(),
        Error::Service(e) => matches!(e.error_code, code::RAFT_INTERNAL | code::LEADER_ELECT),
        Error::BadStatus(status) => status.is_server_error(),
        Error::Decode(_) => false,
        Error::MissingRedirectLocation => false,
        Error::TooManyRedirects(_) => false,
    }
}

pub async fn retry_get(
    client: Client,
    key: String,
    opts: Option<RequestOptions>,
) -> Result<Option<KeyResponse>, Error> {
    retry_kv(client, (key, opts), move |client, (key, opts)| async move {
        client.get(&key, opts).await
    })
    .await
}

///
/// Retry a key operation by capturing reusable args and a closure that computes the future to try.
///
/// Only transient errors (see [`is_transient`]) are retried. A failed precondition, for example,
/// is returned right away.
///
/// The client never retries on its own, this is an opt-in for callers whose operation is safe to repeat.
///
/// Examples
///
/// ```no_run
/// use rust_etcd_v2::{client::{Client, ClientConfig}, retry::retry_kv};
///
/// # async fn run() -> Result<(), rust_etcd_v2::error::Error> {
/// let client = Client::new("http://localhost:2379", ClientConfig::default())?;
///
/// let result = retry_kv(
///     client.clone(),
///     ("my_key",),
///     move |client, (my_key,)| {
///         async move {
///             client.get(my_key, None).await
///         }
///     }
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
pub async fn retry_kv<A, T, F, Fut>(client: Client, reusable_args: A, f: F) -> Result<T, Error>
where
    A: Clone + Send + 'static,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
    F: FnMut(Client, A) -> Fut,
    T: Send + 'static,
{
    let retry_strategy = Exponential::from_millis_with_factor(10, 10.0).take(3);
    retry_kv_with_strategy(client, reusable_args, retry_strategy, f).await
}

pub async fn retry_kv_with_strategy<A, T, F, Fut>(
    client: Client,
    reusable_args: A,
    retry_strategy: impl IntoIterator<Item = Duration>,
    mut f: F,
) -> Result<T, Error>
where
    A: Clone + Send + 'static,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
    F: FnMut(Client, A) -> Fut,
    T: Send + 'static,
{
    let mut retry_strategy = retry_strategy.into_iter();
    loop {
        match f(client.clone(), reusable_args.clone()).await {
            Ok(o) => return Ok(o),
            Err(e) => {
                if is_transient(&e) {
                    warn!("failed due to transient state {:?}", e);
                    match retry_strategy.next() {
                        Some(duration) => {
                            tokio::time::sleep(duration).await;
                        }
                        None => return Err(e),
                    }
                } else {
                    debug!("failed due to non-transient state: {:?}", e);
                    return Err(e);
                }
            }
        }
    }
}
