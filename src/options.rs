use {crate::Index, serde_json::Value};

///
/// Per-call options for key operations.
///
/// Each operation only reads the options that make sense for it: writes use `ttl`, `dir` and the `prev*` guards,
/// reads use `wait`, `wait_index`, `recursive`, `sorted` and `consistent`, deletes use the `prev*` guards,
/// `recursive` and `dir`.
///
/// Examples
///
/// ```
/// use rust_etcd_v2::options::RequestOptions;
///
/// let opts = RequestOptions::new().with_prev_exist(false).with_ttl(30);
/// assert_eq!(opts.ttl, Some(30));
/// ```
///
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub ttl: Option<u64>,
    pub dir: bool,
    pub prev_exist: Option<bool>,
    pub prev_value: Option<Value>,
    pub prev_index: Option<Index>,
    pub recursive: bool,
    pub sorted: bool,
    pub consistent: bool,
    pub wait: bool,
    pub wait_index: Option<Index>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time to live of the key, in seconds.
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl = Some(ttl_secs);
        self
    }

    pub fn with_dir(mut self) -> Self {
        self.dir = true;
        self
    }

    pub fn with_prev_exist(mut self, prev_exist: bool) -> Self {
        self.prev_exist = Some(prev_exist);
        self
    }

    pub fn with_prev_value(mut self, prev_value: impl Into<Value>) -> Self {
        self.prev_value = Some(prev_value.into());
        self
    }

    pub fn with_prev_index(mut self, prev_index: Index) -> Self {
        self.prev_index = Some(prev_index);
        self
    }

    pub fn with_recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    pub fn with_sorted(mut self) -> Self {
        self.sorted = true;
        self
    }

    pub fn with_consistent(mut self) -> Self {
        self.consistent = true;
        self
    }

    pub fn with_wait(mut self) -> Self {
        self.wait = true;
        self
    }

    pub fn with_wait_index(mut self, wait_index: Index) -> Self {
        self.wait_index = Some(wait_index);
        self
    }
}
