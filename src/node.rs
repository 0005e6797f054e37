use {
    crate::Index,
    serde::Deserialize,
    serde_json::Value,
};

///
/// Action reported by the service for a key operation.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Get,
    Set,
    Create,
    Update,
    Delete,
    Expire,
    CompareAndSwap,
    CompareAndDelete,
    #[serde(other)]
    Unknown,
}

///
/// A key/value entry or a directory.
///
/// The root directory has no key. In plain mode `value` holds the raw string stored by the service,
/// in JSON mode it holds the decoded JSON document.
///
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub dir: bool,
    #[serde(default)]
    pub created_index: Index,
    #[serde(default)]
    pub modified_index: Index,
    #[serde(default)]
    pub ttl: Option<i64>,
    #[serde(default)]
    pub expiration: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Node {
    ///
    /// Returns the value as a string slice when it is a JSON string, which is always the case in plain mode.
    ///
    pub fn value_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(Value::as_str)
    }

    ///
    /// Parses every string value of this node and its descendants as JSON, in place.
    ///
    pub(crate) fn decode_json_values(&mut self) -> Result<(), serde_json::Error> {
        for child in self.nodes.iter_mut() {
            child.decode_json_values()?;
        }
        if let Some(Value::String(raw)) = &self.value {
            let decoded = serde_json::from_str(raw)?;
            self.value = Some(decoded);
        }
        Ok(())
    }
}

///
/// Outcome of a key operation: the action performed, the resulting node and, for writes and deletes
/// of existing keys, the node as it was before.
///
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResponse {
    pub action: Action,
    pub node: Node,
    #[serde(default)]
    pub prev_node: Option<Node>,
    /// Value of the `X-Etcd-Index` header, when the service sent one.
    #[serde(skip)]
    pub etcd_index: Option<Index>,
}

impl KeyResponse {
    pub(crate) fn decode_json_values(&mut self) -> Result<(), serde_json::Error> {
        self.node.decode_json_values()?;
        if let Some(prev) = self.prev_node.as_mut() {
            prev.decode_json_values()?;
        }
        Ok(())
    }
}
