use {
    crate::{
        error::{ClientError, Error},
        node::KeyResponse,
        options::RequestOptions,
        stats::Stats,
        transport::{HttpTransport, RawResponse, Request, Transport},
        watcher::Waiter,
    },
    reqwest::{Method, StatusCode},
    serde::Deserialize,
    serde_json::Value,
    std::{sync::Arc, time::Duration},
    tracing::trace,
};

pub(crate) const API_PREFIX: &str = "/v2";
const KEYS_PREFIX: &str = "/v2/keys/";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const MAX_REDIRECTS: usize = 5;

///
/// Construction-time settings of a [`Client`].
///
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Encode written values and decode read values as JSON documents.
    pub json: bool,
    /// Per-request timeout, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            json: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

struct Inner {
    host: String,
    json: bool,
    timeout: Duration,
    transport: Arc<dyn Transport>,
}

///
/// Client of the v2 keys API.
///
/// Cloning is cheap, clones share the same transport and connection pool.
///
/// Examples
///
/// ```no_run
/// use rust_etcd_v2::{client::{Client, ClientConfig}, options::RequestOptions};
///
/// # async fn run() -> Result<(), rust_etcd_v2::error::Error> {
/// let client = Client::new("http://localhost:2379", ClientConfig::default().with_json(true))?;
///
/// client.set("/config/mode", "active", Some(RequestOptions::new().with_prev_exist(false))).await?;
/// let resp = client.get("/config/mode", None).await?.expect("key exists");
/// assert_eq!(resp.node.value_str(), Some("active"));
/// # Ok(())
/// # }
/// ```
///
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    ///
    /// Creates a client talking to `host` (for example `http://127.0.0.1:2379`) over `reqwest`.
    ///
    pub fn new(host: impl Into<String>, config: ClientConfig) -> Result<Self, Error> {
        let transport = HttpTransport::new()?;
        Ok(Self::with_transport(host, config, Arc::new(transport)))
    }

    pub fn with_transport(
        host: impl Into<String>,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let host = host.into().trim_end_matches('/').to_string();
        Self {
            inner: Arc::new(Inner {
                host,
                json: config.json,
                timeout: config.timeout(),
                transport,
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn is_json(&self) -> bool {
        self.inner.json
    }

    pub fn stats(&self) -> Stats<'_> {
        Stats::new(self)
    }

    ///
    /// Writes `value` at `key`.
    ///
    /// `prev_exist`, `prev_value` and `prev_index` options turn the write into a guarded one, a failed guard
    /// is reported as [`Error::Service`] carrying the service error code.
    ///
    pub async fn set(
        &self,
        key: &str,
        value: impl Into<Value>,
        opts: Option<RequestOptions>,
    ) -> Result<KeyResponse, Error> {
        let opts = opts.unwrap_or_default();
        let value = value.into();
        let mut form = Vec::new();

        if let Some(value) = self.encode_value(&value, opts.dir) {
            form.push(("value", value));
        }
        if let Some(ttl) = opts.ttl {
            form.push(("ttl", ttl.to_string()));
        }
        if opts.dir {
            form.push(("dir", "true".to_string()));
        }
        self.push_guards(&mut form, &opts);

        let request = self.request(Method::PUT, &key_path(key)).with_form(form);
        self.expect_key_response(request).await
    }

    ///
    /// Same as [`Client::set`] but fails unless the key already exists.
    ///
    pub async fn update(
        &self,
        key: &str,
        value: impl Into<Value>,
        opts: Option<RequestOptions>,
    ) -> Result<KeyResponse, Error> {
        let opts = opts.unwrap_or_default().with_prev_exist(true);
        self.set(key, value, Some(opts)).await
    }

    ///
    /// Reads `key`. A key that does not exist yields `Ok(None)`.
    ///
    pub async fn get(
        &self,
        key: &str,
        opts: Option<RequestOptions>,
    ) -> Result<Option<KeyResponse>, Error> {
        let resp = self.get_undecoded(key, opts).await?;
        resp.map(|resp| self.decode_values(resp)).transpose()
    }

    ///
    /// Same as [`Client::get`] but leaves the values as the service sent them, even in JSON mode.
    ///
    pub(crate) async fn get_undecoded(
        &self,
        key: &str,
        opts: Option<RequestOptions>,
    ) -> Result<Option<KeyResponse>, Error> {
        let opts = opts.unwrap_or_default();
        let mut query = Vec::new();

        if opts.wait {
            query.push(("wait", "true".to_string()));
        }
        if let Some(wait_index) = opts.wait_index {
            query.push(("waitIndex", wait_index.to_string()));
        }
        if opts.recursive {
            query.push(("recursive", "true".to_string()));
        }
        if opts.sorted {
            query.push(("sorted", "true".to_string()));
        }
        if opts.consistent {
            query.push(("consistent", "true".to_string()));
        }

        let mut request = self.request(Method::GET, &key_path(key)).with_query(query);
        request.pooled = !opts.wait;
        self.raw_key_response(request).await
    }

    ///
    /// Returns a cursor over the changes of `key`, see [`Waiter`].
    ///
    pub fn wait(&self, key: &str, opts: Option<RequestOptions>) -> Waiter {
        Waiter::new(self.clone(), key, opts.unwrap_or_default())
    }

    ///
    /// Deletes `key`. Deleting a missing key is an error (code 100).
    ///
    pub async fn del(&self, key: &str, opts: Option<RequestOptions>) -> Result<KeyResponse, Error> {
        let opts = opts.unwrap_or_default();
        let mut query = Vec::new();

        self.push_guards(&mut query, &opts);
        if opts.recursive {
            query.push(("recursive", "true".to_string()));
        }
        if opts.dir {
            query.push(("dir", "true".to_string()));
        }

        let request = self.request(Method::DELETE, &key_path(key)).with_query(query);
        self.expect_key_response(request).await
    }

    /// Alias of [`Client::del`].
    pub async fn delete(
        &self,
        key: &str,
        opts: Option<RequestOptions>,
    ) -> Result<KeyResponse, Error> {
        self.del(key, opts).await
    }

    pub async fn compare_and_swap(
        &self,
        key: &str,
        value: impl Into<Value>,
        prev_value: impl Into<Value>,
        opts: Option<RequestOptions>,
    ) -> Result<KeyResponse, Error> {
        let opts = opts.unwrap_or_default().with_prev_value(prev_value);
        self.set(key, value, Some(opts)).await
    }

    pub async fn compare_and_delete(
        &self,
        key: &str,
        prev_value: impl Into<Value>,
        opts: Option<RequestOptions>,
    ) -> Result<KeyResponse, Error> {
        let opts = opts.unwrap_or_default().with_prev_value(prev_value);
        self.del(key, Some(opts)).await
    }

    ///
    /// Creates a new key with an increasing name inside the `key` directory.
    ///
    pub async fn push(
        &self,
        key: &str,
        value: impl Into<Value>,
        opts: Option<RequestOptions>,
    ) -> Result<KeyResponse, Error> {
        let opts = opts.unwrap_or_default();
        let mut form = Vec::new();
        if let Some(value) = self.encode_value(&value.into(), false) {
            form.push(("value", value));
        }
        if let Some(ttl) = opts.ttl {
            form.push(("ttl", ttl.to_string()));
        }

        let request = self.request(Method::POST, &key_path(key)).with_form(form);
        self.expect_key_response(request).await
    }

    pub async fn mkdir(
        &self,
        key: &str,
        opts: Option<RequestOptions>,
    ) -> Result<KeyResponse, Error> {
        let opts = opts.unwrap_or_default().with_dir();
        self.set(key, Value::Null, Some(opts)).await
    }

    pub async fn rmdir(
        &self,
        key: &str,
        opts: Option<RequestOptions>,
    ) -> Result<KeyResponse, Error> {
        let opts = opts.unwrap_or_default().with_dir();
        self.del(key, Some(opts)).await
    }

    ///
    /// Lists the client URLs of the cluster members, in the order the service reports them.
    ///
    pub async fn machines(&self) -> Result<Vec<String>, Error> {
        let request = self.request(Method::GET, &format!("{API_PREFIX}/machines"));
        let machines = match self.send(request).await? {
            Some(resp) => parse_machines(&resp.body),
            None => Vec::new(),
        };
        Ok(machines)
    }

    pub async fn leader(&self) -> Result<Option<String>, Error> {
        let request = self.request(Method::GET, &format!("{API_PREFIX}/leader"));
        Ok(self.send(request).await?.map(|resp| resp.body))
    }

    pub(crate) async fn get_json(&self, uri: &str) -> Result<Option<Value>, Error> {
        let request = self.request(Method::GET, uri);
        match self.send(request).await? {
            Some(resp) => Ok(Some(serde_json::from_str(&resp.body)?)),
            None => Ok(None),
        }
    }

    fn request(&self, method: Method, uri: &str) -> Request {
        Request {
            method,
            uri: self.resolve(uri),
            query: Vec::new(),
            form: None,
            timeout: self.inner.timeout,
            pooled: true,
        }
    }

    fn resolve(&self, uri: &str) -> String {
        if uri.starts_with('/') {
            format!("{}{}", self.inner.host, uri)
        } else {
            uri.to_string()
        }
    }

    ///
    /// Form encoding of a written value, `None` when the `value` field is left out.
    ///
    /// Directories never carry a value. In plain mode `null` and `""` mean "no value", in JSON mode they are
    /// sent as their JSON text so they read back unchanged.
    ///
    fn encode_value(&self, value: &Value, dir: bool) -> Option<String> {
        match value {
            _ if dir => None,
            Value::Null if !self.inner.json => None,
            Value::String(s) if s.is_empty() && !self.inner.json => None,
            _ => Some(self.encode_guard(value)),
        }
    }

    fn encode_guard(&self, value: &Value) -> String {
        match value {
            _ if self.inner.json => value.to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn push_guards(&self, params: &mut Vec<(&'static str, String)>, opts: &RequestOptions) {
        if let Some(prev_exist) = opts.prev_exist {
            params.push(("prevExist", prev_exist.to_string()));
        }
        if let Some(prev_value) = &opts.prev_value {
            params.push(("prevValue", self.encode_guard(prev_value)));
        }
        if let Some(prev_index) = opts.prev_index {
            params.push(("prevIndex", prev_index.to_string()));
        }
    }

    async fn expect_key_response(&self, request: Request) -> Result<KeyResponse, Error> {
        // Only GET requests map a 404 to `None`.
        self.key_response(request)
            .await?
            .ok_or(Error::BadStatus(StatusCode::NOT_FOUND))
    }

    async fn key_response(&self, request: Request) -> Result<Option<KeyResponse>, Error> {
        let resp = self.raw_key_response(request).await?;
        resp.map(|resp| self.decode_values(resp)).transpose()
    }

    async fn raw_key_response(&self, request: Request) -> Result<Option<KeyResponse>, Error> {
        let Some(raw) = self.send(request).await? else {
            return Ok(None);
        };
        let mut resp: KeyResponse = serde_json::from_str(&raw.body)?;
        resp.etcd_index = raw.etcd_index;
        Ok(Some(resp))
    }

    pub(crate) fn decode_values(&self, mut resp: KeyResponse) -> Result<KeyResponse, Error> {
        if self.inner.json {
            resp.decode_json_values()?;
        }
        Ok(resp)
    }

    ///
    /// Issues `request`, following `307` redirects, and sorts the response into success, absence or error.
    ///
    async fn send(&self, mut request: Request) -> Result<Option<RawResponse>, Error> {
        let mut redirects = 0;
        loop {
            trace!("{} {}", request.method, request.uri);
            let resp = self.inner.transport.execute(&request).await?;

            if resp.status == StatusCode::TEMPORARY_REDIRECT {
                let location = resp.location.ok_or(Error::MissingRedirectLocation)?;
                let location = self.resolve(&location);
                if redirects == MAX_REDIRECTS {
                    return Err(Error::TooManyRedirects(location));
                }
                redirects += 1;
                trace!("following redirect from {} to {location}", request.uri);
                request.uri = location;
                continue;
            }
            if resp.status == StatusCode::NOT_FOUND && request.method == Method::GET {
                return Ok(None);
            }
            if resp.status.as_u16() > 299 {
                return Err(to_error(&resp));
            }
            return Ok(Some(resp));
        }
    }
}

impl Request {
    fn with_query(mut self, query: Vec<(&'static str, String)>) -> Self {
        self.query = query;
        self
    }

    fn with_form(mut self, form: Vec<(&'static str, String)>) -> Self {
        self.form = Some(form);
        self
    }
}

fn to_error(resp: &RawResponse) -> Error {
    match serde_json::from_str::<ClientError>(&resp.body) {
        Ok(err) if !err.message.is_empty() => Error::Service(err),
        _ => Error::BadStatus(resp.status),
    }
}

///
/// Resource path of `key`. Leading separators are dropped so the path never holds a doubled separator.
///
pub(crate) fn key_path(key: &str) -> String {
    let key = key.trim_start_matches('/');
    format!("{KEYS_PREFIX}{key}")
}

fn parse_machines(body: &str) -> Vec<String> {
    body.trim()
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
        .collect()
}
