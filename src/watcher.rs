use {
    crate::{
        client::Client,
        error::Error,
        node::{Action, KeyResponse},
        options::RequestOptions,
        Index,
    },
    futures::Stream,
    retry::delay::Exponential,
    serde::de::DeserializeOwned,
    std::time::Duration,
    tokio::sync::mpsc,
    tokio_stream::wrappers::ReceiverStream,
    tracing::{debug, trace},
};

const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(5);

///
/// Resumable cursor over the changes of a key.
///
/// Every call to [`Waiter::next`] issues one long-poll read with `wait=true` and returns the next change at or after
/// the current wait index. After each change the wait index moves to the change's modified index + 1.
///
/// Transport timeouts are routine during a long-poll: they are retried at the same wait index and never returned.
/// Any other error is returned as-is and leaves the cursor untouched, so calling `next` again resumes waiting.
/// The exception is a change whose value fails to decode in JSON mode: the error is returned but the cursor
/// still moves past that change.
/// Dropping the cursor ends the sequence.
///
pub struct Waiter {
    client: Client,
    key: String,
    opts: RequestOptions,
}

impl Waiter {
    pub(crate) fn new(client: Client, key: &str, opts: RequestOptions) -> Self {
        Self {
            client,
            key: key.to_string(),
            opts: opts.with_wait(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    ///
    /// Wait index the next request will be issued with, `None` means "the next change from now".
    ///
    pub fn wait_index(&self) -> Option<Index> {
        self.opts.wait_index
    }

    pub async fn next(&mut self) -> Result<Option<KeyResponse>, Error> {
        loop {
            match self.client.get_undecoded(&self.key, Some(self.opts.clone())).await {
                Err(e) if e.is_timeout() => {
                    debug!(
                        "long-poll on {} timed out at wait index {:?}, retrying",
                        self.key, self.opts.wait_index
                    );
                }
                Ok(Some(resp)) => {
                    // Advance before decoding, an undecodable change must not be replayed.
                    self.opts.wait_index = Some(resp.node.modified_index + 1);
                    return self.client.decode_values(resp).map(Some);
                }
                other => return other,
            }
        }
    }

    ///
    /// Turns the cursor into an endless stream. Errors are yielded and the stream keeps going afterwards.
    ///
    pub fn into_stream(self) -> impl Stream<Item = Result<Option<KeyResponse>, Error>> {
        futures::stream::unfold(self, |mut waiter| async move {
            let item = waiter.next().await;
            Some((item, waiter))
        })
    }
}

pub enum WaitEvent<V> {
    Put {
        key: String,
        value: V,
        index: Index,
    },
    Delete {
        key: String,
        prev_value: Option<V>,
        index: Index,
    },
    Expire {
        key: String,
        prev_value: Option<V>,
        index: Index,
    },
}

impl<V> WaitEvent<V> {
    pub fn index(&self) -> Index {
        match self {
            WaitEvent::Put { index, .. }
            | WaitEvent::Delete { index, .. }
            | WaitEvent::Expire { index, .. } => *index,
        }
    }
}

///
/// Maps a change notification onto a typed event. Changes without a value (directories) map to `None`.
///
fn to_wait_event<V>(resp: KeyResponse) -> Result<Option<WaitEvent<V>>, serde_json::Error>
where
    V: DeserializeOwned,
{
    let KeyResponse {
        action,
        node,
        prev_node,
        ..
    } = resp;
    let key = node.key.unwrap_or_default();
    let index = node.modified_index;
    let prev_value = prev_node
        .and_then(|prev| prev.value)
        .map(serde_json::from_value::<V>)
        .transpose()?;

    let event = match action {
        Action::Delete | Action::CompareAndDelete => Some(WaitEvent::Delete {
            key,
            prev_value,
            index,
        }),
        Action::Expire => Some(WaitEvent::Expire {
            key,
            prev_value,
            index,
        }),
        _ => node
            .value
            .map(serde_json::from_value::<V>)
            .transpose()?
            .map(|value| WaitEvent::Put { key, value, index }),
    };
    Ok(event)
}

fn error_backoff() -> impl Iterator<Item = Duration> {
    Exponential::from_millis_with_factor(10, 10.0).map(|d| d.min(MAX_ERROR_BACKOFF))
}

pub trait WaitClientExt {
    fn get_client(&self) -> Client;

    ///
    /// Spawns a task waiting on `key` and forwarding every change, deserialized as `V`, into the returned channel.
    ///
    /// Errors are forwarded too, after which the task keeps waiting with an increasing delay. The task stops
    /// once the receiver is dropped.
    ///
    fn json_wait_channel<V>(
        &self,
        key: impl AsRef<str>,
        opts: Option<RequestOptions>,
    ) -> mpsc::Receiver<Result<WaitEvent<V>, Error>>
    where
        V: DeserializeOwned + Send + 'static,
    {
        let mut waiter = self.get_client().wait(key.as_ref(), opts);
        let (tx, rx) = mpsc::channel(10);
        tokio::spawn(async move {
            let mut error_delays = error_backoff();
            loop {
                let next = tokio::select! {
                    _ = tx.closed() => break,
                    next = waiter.next() => next,
                };
                let (item, delay) = match next {
                    Ok(Some(resp)) => {
                        error_delays = error_backoff();
                        match to_wait_event::<V>(resp) {
                            Ok(Some(event)) => (Ok(event), None),
                            Ok(None) => continue,
                            Err(e) => (Err(Error::Decode(e)), None),
                        }
                    }
                    Ok(None) => {
                        trace!("nothing to wait on at {}", waiter.key());
                        tokio::time::sleep(error_delays.next().unwrap_or(MAX_ERROR_BACKOFF)).await;
                        continue;
                    }
                    Err(e) => (Err(e), error_delays.next()),
                };
                if tx.send(item).await.is_err() {
                    trace!("closed wait event receiver for {}", waiter.key());
                    break;
                }
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
            }
        });
        rx
    }

    fn json_wait_stream<V>(
        &self,
        key: impl AsRef<str>,
        opts: Option<RequestOptions>,
    ) -> ReceiverStream<Result<WaitEvent<V>, Error>>
    where
        V: DeserializeOwned + Send + 'static,
    {
        ReceiverStream::new(self.json_wait_channel(key, opts))
    }
}

impl WaitClientExt for Client {
    fn get_client(&self) -> Client {
        self.clone()
    }
}
