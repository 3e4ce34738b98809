//! REST client for the field-data backend.
//!
//! One method per endpoint, no retries, no caching. Read endpoints answer
//! either with a bare value or with an object wrapping it (`{ "nests": [...] }`),
//! so every response is unwrapped per endpoint before decoding.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::{Credentials, Nest, NestEvent, Turtle, TurtleEvent, TurtleId, User};
use crate::text::sanitize_server_text;

pub mod unwrap;

use unwrap::{error_message, merge_created, unwrap_list, unwrap_one};

/// Every backend operation the forms and screens use. [`ApiClient`] talks
/// HTTP; tests substitute an in-memory implementation.
pub trait Backend {
    fn register(&self, creds: &Credentials) -> Result<User>;
    fn login(&self, creds: &Credentials) -> Result<User>;
    fn list_users(&self) -> Result<Vec<User>>;

    fn create_turtle(&self, turtle: &Turtle) -> Result<Turtle>;
    fn update_turtle(&self, id: TurtleId, turtle: &Turtle) -> Result<Turtle>;
    fn list_turtles(&self) -> Result<Vec<Turtle>>;
    fn get_turtle(&self, id: TurtleId) -> Result<Turtle>;
    fn turtle_survey_events(&self, id: TurtleId) -> Result<Vec<TurtleEvent>>;
    fn create_turtle_event(&self, event: &TurtleEvent) -> Result<TurtleEvent>;

    fn create_nest(&self, nest: &Nest) -> Result<Nest>;
    fn update_nest(&self, nest: &Nest) -> Result<Nest>;
    fn list_nests(&self) -> Result<Vec<Nest>>;
    fn get_nest(&self, code: &str) -> Result<Nest>;
    fn create_nest_event(&self, event: &NestEvent) -> Result<NestEvent>;
    fn nest_events(&self, code: &str) -> Result<Vec<NestEvent>>;
}

/// Events of every given nest, one request per nest, in nest order.
pub fn events_for_nests(backend: &dyn Backend, nests: &[Nest]) -> Result<Vec<NestEvent>> {
    let mut out = Vec::new();
    for n in nests {
        out.extend(backend.nest_events(&n.code)?);
    }
    Ok(out)
}

const NEST_KEYS: &[&str] = &["nest", "data"];
const NESTS_KEYS: &[&str] = &["nests", "data"];
const TURTLE_KEYS: &[&str] = &["turtle", "data"];
const TURTLES_KEYS: &[&str] = &["turtles", "data"];
const NEST_EVENT_KEYS: &[&str] = &["event", "nest_event", "data"];
const NEST_EVENTS_KEYS: &[&str] = &["events", "nest_events", "data"];
const TURTLE_EVENT_KEYS: &[&str] = &["event", "survey_event", "data"];
const TURTLE_EVENTS_KEYS: &[&str] = &["survey_events", "events", "data"];
const USER_KEYS: &[&str] = &["user", "data"];
const USERS_KEYS: &[&str] = &["users", "data"];

#[derive(Debug, Clone)]
pub struct ApiClient {
    base: String,
    client: Client,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(cfg: &AppConfig, api_override: Option<&str>) -> Result<Self> {
        let base = cfg.resolve_base_url(api_override)?;
        Self::new(&base, Duration::from_secs(cfg.api.timeout_secs.max(1)))
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    fn get_value(&self, path: &str) -> Result<Value> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let res = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::transport(format!("GET {url} failed: {e}")))?;
        read_json(res)
    }

    fn send_value<B: Serialize>(&self, method: reqwest::Method, path: &str, body: &B) -> Result<Value> {
        let url = self.url(path);
        tracing::debug!(%url, %method, "send");
        let res = self
            .client
            .request(method.clone(), &url)
            .json(body)
            .send()
            .map_err(|e| Error::transport(format!("{method} {url} failed: {e}")))?;
        read_json(res)
    }

    fn get_list<T: DeserializeOwned>(&self, path: &str, keys: &[&str]) -> Result<Vec<T>> {
        let v = self.get_value(path)?;
        decode(unwrap_list(v, keys), path)
    }

    fn get_one<T: DeserializeOwned>(&self, path: &str, keys: &[&str]) -> Result<T> {
        let v = self.get_value(path)?;
        decode(unwrap_one(v, keys), path)
    }

    /// POST/PUT a full record and decode the answer layered over what was sent,
    /// so a terse `{ "id": 9 }` reply still yields a complete record.
    fn write_record<T>(&self, method: reqwest::Method, path: &str, record: &T, keys: &[&str]) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let reply = self.send_value(method, path, record)?;
        let merged = merge_created(serde_json::to_value(record)?, unwrap_one(reply, keys));
        decode(merged, path)
    }
}

fn decode<T: DeserializeOwned>(v: Value, path: &str) -> Result<T> {
    serde_json::from_value(v)
        .map_err(|e| Error::msg(format!("unexpected response shape from {path}: {e}")))
}

fn read_json(res: Response) -> Result<Value> {
    let status = res.status();
    let body = res
        .text()
        .map_err(|e| Error::transport(format!("failed to read response body: {e}")))?;
    let parsed: Option<Value> = if body.trim().is_empty() {
        None
    } else {
        serde_json::from_str(&body).ok()
    };

    if !status.is_success() {
        let msg = parsed
            .as_ref()
            .and_then(error_message)
            .map(|m| sanitize_server_text(&m))
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        tracing::debug!(status = status.as_u16(), "request rejected: {msg}");
        return Err(Error::api(status.as_u16(), msg));
    }

    match parsed {
        Some(v) => Ok(v),
        None if body.trim().is_empty() => Ok(Value::Null),
        None => Err(Error::msg("response body is not JSON")),
    }
}

fn seg(raw: &str) -> String {
    urlencoding::encode(raw.trim()).into_owned()
}

impl Backend for ApiClient {
    fn register(&self, creds: &Credentials) -> Result<User> {
        let v = self.send_value(reqwest::Method::POST, "register", creds)?;
        decode(unwrap_one(v, USER_KEYS), "register")
    }

    fn login(&self, creds: &Credentials) -> Result<User> {
        let v = self.send_value(reqwest::Method::POST, "login", creds)?;
        decode(unwrap_one(v, USER_KEYS), "login")
    }

    fn list_users(&self) -> Result<Vec<User>> {
        self.get_list("users", USERS_KEYS)
    }

    fn create_turtle(&self, turtle: &Turtle) -> Result<Turtle> {
        self.write_record(reqwest::Method::POST, "turtles/create", turtle, TURTLE_KEYS)
    }

    fn update_turtle(&self, id: TurtleId, turtle: &Turtle) -> Result<Turtle> {
        self.write_record(
            reqwest::Method::PUT,
            &format!("turtles/{id}/update"),
            turtle,
            TURTLE_KEYS,
        )
    }

    fn list_turtles(&self) -> Result<Vec<Turtle>> {
        self.get_list("turtles", TURTLES_KEYS)
    }

    fn get_turtle(&self, id: TurtleId) -> Result<Turtle> {
        self.get_one(&format!("turtles/{id}"), TURTLE_KEYS)
    }

    fn turtle_survey_events(&self, id: TurtleId) -> Result<Vec<TurtleEvent>> {
        self.get_list(&format!("turtles/{id}/survey_events"), TURTLE_EVENTS_KEYS)
    }

    fn create_turtle_event(&self, event: &TurtleEvent) -> Result<TurtleEvent> {
        self.write_record(
            reqwest::Method::POST,
            "turtle_survey_events/create",
            event,
            TURTLE_EVENT_KEYS,
        )
    }

    fn create_nest(&self, nest: &Nest) -> Result<Nest> {
        self.write_record(reqwest::Method::POST, "nests/create", nest, NEST_KEYS)
    }

    fn update_nest(&self, nest: &Nest) -> Result<Nest> {
        self.write_record(
            reqwest::Method::PUT,
            &format!("nests/{}/update", seg(&nest.update_key())),
            nest,
            NEST_KEYS,
        )
    }

    fn list_nests(&self) -> Result<Vec<Nest>> {
        self.get_list("nests", NESTS_KEYS)
    }

    fn get_nest(&self, code: &str) -> Result<Nest> {
        self.get_one(&format!("nests/{}", seg(code)), NEST_KEYS)
    }

    fn create_nest_event(&self, event: &NestEvent) -> Result<NestEvent> {
        self.write_record(
            reqwest::Method::POST,
            "nest-events/create",
            event,
            NEST_EVENT_KEYS,
        )
    }

    fn nest_events(&self, code: &str) -> Result<Vec<NestEvent>> {
        self.get_list(&format!("nest-events/{}", seg(code)), NEST_EVENTS_KEYS)
    }
}
