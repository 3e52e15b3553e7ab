use serde_json::Value;

use crate::transport::Method;

/// A request as endpoints describe it, before headers and base URL are
/// applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base, starting with `/`.
    pub path: String,
    pub body: Option<Value>,
    pub params: Vec<(String, String)>,
    /// Background requests do not toggle the global loading flag.
    pub background: bool,
    /// When false, a 401/403 is returned without tearing the session down.
    pub logout_on_auth_failure: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            params: Vec::new(),
            background: false,
            logout_on_auth_failure: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }

    /// Leave auth failures to the caller instead of the logout latch.
    pub fn without_auth_logout(mut self) -> Self {
        self.logout_on_auth_failure = false;
        self
    }
}
