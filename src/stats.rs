use {
    crate::{
        client::{Client, API_PREFIX},
        error::Error,
    },
    serde_json::Value,
};

///
/// Read-only diagnostic endpoints, see [`Client::stats`].
///
pub struct Stats<'a> {
    client: &'a Client,
}

impl<'a> Stats<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    ///
    /// Statistics of a single member. `machine` is the member's client URL, the configured host is used when `None`.
    ///
    pub async fn self_stats(&self, machine: Option<&str>) -> Result<Option<Value>, Error> {
        let path = format!("{API_PREFIX}/stats/self");
        let uri = match machine {
            Some(machine) => format!("{}{path}", machine.trim_end_matches('/')),
            None => path,
        };
        self.client.get_json(&uri).await
    }

    pub async fn store(&self) -> Result<Option<Value>, Error> {
        self.client
            .get_json(&format!("{API_PREFIX}/stats/store"))
            .await
    }

    pub async fn leader(&self) -> Result<Option<Value>, Error> {
        self.client
            .get_json(&format!("{API_PREFIX}/stats/leader"))
            .await
    }
}
