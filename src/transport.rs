use {
    crate::{error::TransportError, Index},
    reqwest::{header::LOCATION, redirect, Method, StatusCode},
    std::time::Duration,
};

pub(crate) const ETCD_INDEX_HEADER: &str = "x-etcd-index";

///
/// Everything a transport needs to issue one HTTP call.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Absolute URI, already resolved against the client host.
    pub uri: String,
    pub query: Vec<(&'static str, String)>,
    /// Form-encoded body, if any.
    pub form: Option<Vec<(&'static str, String)>>,
    pub timeout: Duration,
    /// Long-poll requests set this to false so they never sit in the idle pool.
    pub pooled: bool,
}

///
/// The parts of an HTTP response the client interprets.
///
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: StatusCode,
    pub location: Option<String>,
    pub etcd_index: Option<Index>,
    pub body: String,
}

///
/// Narrow HTTP contract the client is written against.
///
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &Request) -> Result<RawResponse, TransportError>;
}

///
/// Default [`Transport`] backed by `reqwest`.
///
/// Redirects are never followed by `reqwest` itself, the client handles `307` responses.
///
#[derive(Clone)]
pub struct HttpTransport {
    pooled: reqwest::Client,
    unpooled: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let pooled = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        let unpooled = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self { pooled, unpooled })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &Request) -> Result<RawResponse, TransportError> {
        let http = if request.pooled {
            &self.pooled
        } else {
            &self.unpooled
        };
        let mut builder = http
            .request(request.method.clone(), request.uri.as_str())
            .timeout(request.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let etcd_index = resp
            .headers()
            .get(ETCD_INDEX_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = resp.text().await?;

        Ok(RawResponse {
            status,
            location,
            etcd_index,
            body,
        })
    }
}
