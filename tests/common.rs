#![allow(dead_code)]

use {
    axum::{
        body::Bytes,
        extract::State,
        http::{Method, StatusCode, Uri},
        response::{IntoResponse, Response},
        Router,
    },
    rust_etcd_v2::client::{Client, ClientConfig},
    serde_json::{json, Map, Value},
    std::{
        collections::{BTreeMap, BTreeSet, HashMap},
        net::SocketAddr,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    },
    tokio::{net::TcpListener, sync::watch, task::JoinHandle},
};

pub fn random_str(len: usize) -> String {
    use rand::{distributions::Alphanumeric, thread_rng, Rng};
    let mut rng = thread_rng();
    (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn random_key() -> String {
    format!("/{}", random_str(10))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
struct Entry {
    value: Option<String>,
    dir: bool,
    created_index: u64,
    modified_index: u64,
    ttl: Option<u64>,
}

struct Event {
    index: u64,
    key: String,
    body: Value,
}

#[derive(Default)]
struct Store {
    index: u64,
    entries: BTreeMap<String, Entry>,
    events: Vec<Event>,
    gets: u64,
    sets: u64,
}

fn child_prefix(key: &str) -> String {
    if key == "/" {
        "/".to_string()
    } else {
        format!("{key}/")
    }
}

impl Store {
    fn has_children(&self, key: &str) -> bool {
        let prefix = child_prefix(key);
        self.entries
            .keys()
            .any(|k| k.len() > prefix.len() && k.starts_with(&prefix))
    }

    fn exists(&self, key: &str) -> bool {
        key == "/" || self.entries.contains_key(key) || self.has_children(key)
    }

    fn is_dir(&self, key: &str) -> bool {
        key == "/" || self.entries.get(key).is_some_and(|e| e.dir) || self.has_children(key)
    }

    fn children(&self, key: &str) -> Vec<String> {
        let prefix = child_prefix(key);
        let mut out = BTreeSet::new();
        for k in self.entries.keys() {
            if let Some(rest) = k.strip_prefix(&prefix) {
                if let Some(name) = rest.split('/').next().filter(|n| !n.is_empty()) {
                    out.insert(format!("{prefix}{name}"));
                }
            }
        }
        out.into_iter().collect()
    }

    fn node(&self, key: &str, expand: bool, recursive: bool) -> Value {
        let mut node = Map::new();
        if key != "/" {
            node.insert("key".into(), json!(key));
        }
        let entry = self.entries.get(key);
        if let Some(e) = entry {
            node.insert("createdIndex".into(), json!(e.created_index));
            node.insert("modifiedIndex".into(), json!(e.modified_index));
            if let Some(ttl) = e.ttl {
                node.insert("ttl".into(), json!(ttl));
            }
        }
        if self.is_dir(key) {
            node.insert("dir".into(), json!(true));
            if expand {
                let nodes: Vec<Value> = self
                    .children(key)
                    .iter()
                    .map(|child| self.node(child, recursive, recursive))
                    .collect();
                if !nodes.is_empty() {
                    node.insert("nodes".into(), Value::Array(nodes));
                }
            }
        } else if let Some(value) = entry.and_then(|e| e.value.as_ref()) {
            node.insert("value".into(), json!(value));
        }
        Value::Object(node)
    }

    fn find_event(&self, key: &str, wait_index: u64, recursive: bool) -> Option<Value> {
        let prefix = child_prefix(key);
        self.events
            .iter()
            .find(|ev| {
                ev.index >= wait_index
                    && (ev.key == key || (recursive && ev.key.starts_with(&prefix)))
            })
            .map(|ev| ev.body.clone())
    }

    fn record(&mut self, index: u64, key: &str, body: &Value) {
        self.events.push(Event {
            index,
            key: key.to_string(),
            body: body.clone(),
        });
    }
}

struct FakeState {
    store: Mutex<Store>,
    changes: watch::Sender<u64>,
    redirect_to: Option<String>,
    url: String,
    hits: AtomicU64,
}

fn reply(status: StatusCode, body: Value, index: u64) -> Response {
    (
        status,
        [
            ("content-type", "application/json".to_string()),
            ("x-etcd-index", index.to_string()),
        ],
        body.to_string(),
    )
        .into_response()
}

fn service_error(status: StatusCode, code: u64, message: &str, cause: &str, index: u64) -> Response {
    reply(
        status,
        json!({"errorCode": code, "message": message, "cause": cause, "index": index}),
        index,
    )
}

fn flag(params: &HashMap<String, String>, name: &str) -> bool {
    params.get(name).is_some_and(|v| v == "true")
}

/// Checks `prevValue` / `prevIndex` against the current entry.
fn check_guards(
    key: &str,
    current: Option<&Entry>,
    params: &HashMap<String, String>,
    index: u64,
) -> Result<(), Response> {
    let prev_value = params.get("prevValue");
    let prev_index = params.get("prevIndex");
    if prev_value.is_none() && prev_index.is_none() {
        return Ok(());
    }
    let Some(current) = current else {
        return Err(service_error(StatusCode::NOT_FOUND, 100, "Key not found", key, index));
    };
    if let Some(pv) = prev_value {
        let cur = current.value.clone().unwrap_or_default();
        if *pv != cur {
            return Err(service_error(
                StatusCode::PRECONDITION_FAILED,
                101,
                "Compare failed",
                &format!("[{pv} != {cur}]"),
                index,
            ));
        }
    }
    if let Some(pi) = prev_index {
        if *pi != current.modified_index.to_string() {
            return Err(service_error(
                StatusCode::PRECONDITION_FAILED,
                101,
                "Compare failed",
                &format!("[{pi} != {}]", current.modified_index),
                index,
            ));
        }
    }
    Ok(())
}

impl FakeState {
    async fn get(&self, key: String, query: HashMap<String, String>) -> Response {
        let recursive = flag(&query, "recursive");
        if flag(&query, "wait") {
            let mut rx = self.changes.subscribe();
            let wait_index = match query.get("waitIndex") {
                Some(i) => i.parse().expect("waitIndex is a number"),
                None => self.store.lock().expect("lock").index + 1,
            };
            loop {
                let (found, index) = {
                    let store = self.store.lock().expect("lock");
                    (store.find_event(&key, wait_index, recursive), store.index)
                };
                if let Some(body) = found {
                    return reply(StatusCode::OK, body, index);
                }
                if rx.changed().await.is_err() {
                    return StatusCode::SERVICE_UNAVAILABLE.into_response();
                }
            }
        }

        let mut store = self.store.lock().expect("lock");
        store.gets += 1;
        let index = store.index;
        if !store.exists(&key) {
            return service_error(StatusCode::NOT_FOUND, 100, "Key not found", &key, index);
        }
        let node = store.node(&key, true, recursive);
        reply(StatusCode::OK, json!({"action": "get", "node": node}), index)
    }

    fn put(&self, key: String, form: HashMap<String, String>) -> Response {
        let mut store = self.store.lock().expect("lock");
        let index = store.index;
        let exists = store.exists(&key);
        let current = store.entries.get(&key).cloned();
        let prev_exist = form.get("prevExist").map(String::as_str);

        match prev_exist {
            Some("false") if exists => {
                return service_error(StatusCode::PRECONDITION_FAILED, 105, "Key already exists", &key, index)
            }
            Some("true") if !exists => {
                return service_error(StatusCode::NOT_FOUND, 100, "Key not found", &key, index)
            }
            _ => {}
        }
        if let Err(resp) = check_guards(&key, current.as_ref(), &form, index) {
            return resp;
        }
        let dir = flag(&form, "dir");
        if !dir && store.is_dir(&key) {
            return service_error(StatusCode::FORBIDDEN, 102, "Not a file", &key, index);
        }

        let action = if form.contains_key("prevValue") || form.contains_key("prevIndex") {
            "compareAndSwap"
        } else {
            match prev_exist {
                Some("true") => "update",
                Some("false") => "create",
                _ => "set",
            }
        };
        let prev_node = current.as_ref().map(|_| store.node(&key, false, false));
        store.index += 1;
        store.sets += 1;
        let index = store.index;
        let entry = Entry {
            value: if dir {
                None
            } else {
                Some(form.get("value").cloned().unwrap_or_default())
            },
            dir,
            created_index: current.as_ref().map_or(index, |e| e.created_index),
            modified_index: index,
            ttl: form.get("ttl").map(|t| t.parse().expect("ttl is a number")),
        };
        store.entries.insert(key.clone(), entry);

        let mut body = json!({"action": action, "node": store.node(&key, false, false)});
        if let Some(prev) = prev_node {
            body["prevNode"] = prev;
        }
        store.record(index, &key, &body);
        drop(store);
        self.changes.send_replace(index);

        let status = if current.is_some() {
            StatusCode::OK
        } else {
            StatusCode::CREATED
        };
        reply(status, body, index)
    }

    fn post(&self, dir: String, form: HashMap<String, String>) -> Response {
        let mut store = self.store.lock().expect("lock");
        store.index += 1;
        store.sets += 1;
        let index = store.index;
        let key = format!("{}{:020}", child_prefix(&dir), index);
        store.entries.insert(
            key.clone(),
            Entry {
                value: Some(form.get("value").cloned().unwrap_or_default()),
                dir: false,
                created_index: index,
                modified_index: index,
                ttl: form.get("ttl").map(|t| t.parse().expect("ttl is a number")),
            },
        );
        let body = json!({"action": "create", "node": store.node(&key, false, false)});
        store.record(index, &key, &body);
        drop(store);
        self.changes.send_replace(index);
        reply(StatusCode::CREATED, body, index)
    }

    fn delete(&self, key: String, query: HashMap<String, String>) -> Response {
        let mut store = self.store.lock().expect("lock");
        let index = store.index;
        if key == "/" {
            return service_error(StatusCode::FORBIDDEN, 107, "Root is read only", &key, index);
        }
        if !store.exists(&key) {
            return service_error(StatusCode::NOT_FOUND, 100, "Key not found", &key, index);
        }
        if query.get("prevExist").map(String::as_str) == Some("false") {
            return service_error(StatusCode::PRECONDITION_FAILED, 105, "Key already exists", &key, index);
        }
        let is_dir = store.is_dir(&key);
        let recursive = flag(&query, "recursive");
        if is_dir && !(flag(&query, "dir") || recursive) {
            return service_error(StatusCode::FORBIDDEN, 102, "Not a file", &key, index);
        }
        if is_dir && store.has_children(&key) && !recursive {
            return service_error(StatusCode::FORBIDDEN, 108, "Directory not empty", &key, index);
        }
        let current = store.entries.get(&key).cloned();
        if let Err(resp) = check_guards(&key, current.as_ref(), &query, index) {
            return resp;
        }

        let action = if query.contains_key("prevValue") || query.contains_key("prevIndex") {
            "compareAndDelete"
        } else {
            "delete"
        };
        let prev_node = store.node(&key, false, false);
        store.index += 1;
        let index = store.index;
        let prefix = child_prefix(&key);
        store
            .entries
            .retain(|k, _| *k != key && !k.starts_with(&prefix));

        let mut node = json!({
            "key": key,
            "modifiedIndex": index,
            "createdIndex": current.as_ref().map_or(0, |e| e.created_index),
        });
        if is_dir {
            node["dir"] = json!(true);
        }
        let body = json!({"action": action, "node": node, "prevNode": prev_node});
        store.record(index, &key, &body);
        drop(store);
        self.changes.send_replace(index);
        reply(StatusCode::OK, body, index)
    }
}

fn key_of(path: &str) -> String {
    let key = path.trim_end_matches('/');
    if key.is_empty() {
        "/".to_string()
    } else {
        key.to_string()
    }
}

async fn serve_request(
    State(state): State<Arc<FakeState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if let Some(leader) = &state.redirect_to {
        let target = format!(
            "{leader}{}",
            uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
        );
        return (StatusCode::TEMPORARY_REDIRECT, [("location", target)]).into_response();
    }

    let query: HashMap<String, String> =
        serde_urlencoded::from_str(uri.query().unwrap_or("")).expect("malformed query");
    let form: HashMap<String, String> =
        serde_urlencoded::from_bytes(&body).expect("malformed form");
    let path = uri.path();

    if let Some(key) = path.strip_prefix("/v2/keys") {
        let key = key_of(key);
        return if method == Method::GET {
            state.get(key, query).await
        } else if method == Method::PUT {
            state.put(key, form)
        } else if method == Method::POST {
            state.post(key, form)
        } else if method == Method::DELETE {
            state.delete(key, query)
        } else {
            StatusCode::METHOD_NOT_ALLOWED.into_response()
        };
    }

    let index = state.store.lock().expect("lock").index;
    match path {
        "/v2/machines" => format!("{}, http://127.0.0.1:22379", state.url).into_response(),
        "/v2/leader" => state.url.clone().into_response(),
        "/v2/stats/self" => reply(
            StatusCode::OK,
            json!({"name": "fake", "state": "StateLeader", "leaderInfo": {"leader": "fake"}}),
            index,
        ),
        "/v2/stats/store" => {
            let store = state.store.lock().expect("lock");
            reply(
                StatusCode::OK,
                json!({"getsSuccess": store.gets, "setsSuccess": store.sets}),
                index,
            )
        }
        "/v2/stats/leader" => reply(
            StatusCode::OK,
            json!({"leader": "fake", "followers": {}}),
            index,
        ),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

///
/// In-process stand-in for a v2 member, serving on an ephemeral port until dropped.
///
pub struct FakeEtcd {
    pub addr: SocketAddr,
    state: Arc<FakeState>,
    handle: JoinHandle<()>,
}

impl Drop for FakeEtcd {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakeEtcd {
    pub async fn spawn() -> Self {
        Self::spawn_with(None).await
    }

    ///
    /// A member that answers every request with a `307` pointing at `leader`.
    ///
    pub async fn spawn_redirecting_to(leader: &FakeEtcd) -> Self {
        Self::spawn_with(Some(leader.url())).await
    }

    async fn spawn_with(redirect_to: Option<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind fake etcd");
        let addr = listener.local_addr().expect("no local addr");
        let (changes, _) = watch::channel(0);
        let state = Arc::new(FakeState {
            store: Mutex::new(Store::default()),
            changes,
            redirect_to,
            url: format!("http://{addr}"),
            hits: AtomicU64::new(0),
        });
        let app = Router::new().fallback(serve_request).with_state(state.clone());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("fake etcd server failed");
        });
        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        self.state.url.clone()
    }

    /// Number of HTTP requests received so far.
    pub fn hits(&self) -> u64 {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn client(&self, json: bool) -> Client {
        self.client_with(ClientConfig::default().with_json(json))
    }

    pub fn client_with(&self, config: ClientConfig) -> Client {
        Client::new(self.url(), config).expect("failed to build client")
    }

    pub fn client_with_timeout(&self, json: bool, timeout: Duration) -> Client {
        self.client_with(
            ClientConfig::default()
                .with_json(json)
                .with_timeout(timeout),
        )
    }
}
