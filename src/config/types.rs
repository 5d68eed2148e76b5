use crate::rpc::KeyValue;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

/// Main configuration structure, as loaded from a TOML job file
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerAddr,
    #[serde(default)]
    pub client: ClientOptions,
    pub job: JobConfig,
}

/// Address of the crawl server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
}

impl ServerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// URI used to dial the server (plaintext HTTP/2)
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Client-side tuning of a job's session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientOptions {
    /// Capacity of the buffer between the network receive loop and the sink
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Largest message accepted from the server, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            max_message_size: default_max_message_size(),
        }
    }
}

fn default_buffer_capacity() -> usize {
    1000
}

fn default_max_message_size() -> usize {
    (2 * 1024 * 1024 * 1024) - 1
}

/// Parameters of one crawl, as submitted to the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobConfig {
    /// URL the crawl starts from
    pub seed_url: String,

    /// Minimum politeness delay between requests
    #[serde(default = "default_min_delay")]
    pub min_delay: i32,

    /// Maximum politeness delay; 0 lets the server pick
    #[serde(default)]
    pub max_delay: i32,

    /// Whether discovered links are followed
    #[serde(default = "default_follow")]
    pub follow: bool,

    /// Only pages whose URL matches are delivered
    #[serde(default)]
    pub callback_url_regexp: String,

    /// Only links whose URL matches are followed
    #[serde(default)]
    pub follow_url_regexp: String,

    /// Xpath → exact value rules a page must satisfy to be delivered
    #[serde(default)]
    pub callback_xpath_match: Vec<KeyValue>,

    /// Xpath → regexp rules a page must satisfy to be delivered
    #[serde(default)]
    pub callback_xpath_regexp: Vec<KeyValue>,

    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: i32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Ignore robots.txt and politeness rules
    #[serde(default)]
    pub impolite: bool,

    /// Maximum link depth; -1 is unbounded
    #[serde(default = "default_depth")]
    pub depth: i32,

    /// Re-run the crawl every `frequency_secs`
    #[serde(default)]
    pub repeat: bool,

    #[serde(default)]
    pub frequency_secs: Option<u64>,

    /// When the first run of a repeated crawl happens
    #[serde(default)]
    pub first_run: Option<DateTime<Utc>>,

    #[serde(default)]
    pub unsafe_normalize_url: bool,

    #[serde(default)]
    pub login: Option<LoginConfig>,

    #[serde(default)]
    pub chrome: ChromeConfig,

    /// Network interface the server should fetch through
    #[serde(default)]
    pub network_iface: String,

    /// Ask the server to cancel the job when this client disconnects
    #[serde(default)]
    pub cancel_on_disconnect: bool,

    #[serde(default)]
    pub check_content: bool,

    #[serde(default)]
    pub prefetch: bool,

    #[serde(default)]
    pub use_anchor_text: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            seed_url: String::new(),
            min_delay: default_min_delay(),
            max_delay: 0,
            follow: default_follow(),
            callback_url_regexp: String::new(),
            follow_url_regexp: String::new(),
            callback_xpath_match: Vec::new(),
            callback_xpath_regexp: Vec::new(),
            max_concurrent_requests: default_max_concurrent_requests(),
            user_agent: default_user_agent(),
            impolite: false,
            depth: default_depth(),
            repeat: false,
            frequency_secs: None,
            first_run: None,
            unsafe_normalize_url: false,
            login: None,
            chrome: ChromeConfig::default(),
            network_iface: String::new(),
            cancel_on_disconnect: false,
            check_content: false,
            prefetch: false,
            use_anchor_text: false,
        }
    }
}

fn default_min_delay() -> i32 {
    5
}

fn default_follow() -> bool {
    true
}

fn default_max_concurrent_requests() -> i32 {
    5
}

fn default_user_agent() -> String {
    String::from("Fetchbot")
}

fn default_depth() -> i32 {
    -1
}

fn default_dom_load_time() -> i32 {
    5
}

/// Login sequence the server runs before crawling
///
/// Either `js` (browser login) or `payload` (form login) is used, never both.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoginConfig {
    pub url: String,

    /// Script run in the browser to log in
    #[serde(default)]
    pub js: Option<String>,

    /// Form fields posted to `url`
    #[serde(default)]
    pub payload: Vec<KeyValue>,

    /// Fields scraped from the login page and merged into the payload
    #[serde(default)]
    pub parse_xpath: Vec<KeyValue>,

    /// Xpath → value that must hold once logged in
    #[serde(default)]
    pub success_check: Option<KeyValue>,

    #[serde(default)]
    pub check_after_each_page: bool,
}

/// Browser automation settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChromeConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Path of the browser binary; empty uses the server default
    #[serde(default)]
    pub binary: String,

    /// Seconds to let the DOM settle after load
    #[serde(default = "default_dom_load_time")]
    pub dom_load_time: i32,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            binary: String::new(),
            dom_load_time: default_dom_load_time(),
        }
    }
}

impl JobConfig {
    /// Creates a configuration for `seed_url` with default settings
    pub fn new(seed_url: impl Into<String>) -> Self {
        Self {
            seed_url: seed_url.into(),
            ..Self::default()
        }
    }

    /// Enables form login
    ///
    /// Pairs are appended in the iteration order of the inputs. A `HashMap`
    /// gives an unspecified order; pass a `BTreeMap` or a `Vec` when the order
    /// matters. When `success_check` yields several pairs the last one wins.
    pub fn set_login<P, X, S>(
        &mut self,
        url: impl Into<String>,
        payload: P,
        parse_xpath: X,
        success_check: S,
    ) where
        P: IntoIterator,
        P::Item: Into<KeyValue>,
        X: IntoIterator,
        X::Item: Into<KeyValue>,
        S: IntoIterator,
        S::Item: Into<KeyValue>,
    {
        let login = self.login.get_or_insert_with(LoginConfig::default);
        login.url = url.into();
        login.payload.extend(payload.into_iter().map(Into::into));
        login
            .parse_xpath
            .extend(parse_xpath.into_iter().map(Into::into));
        if let Some(check) = success_check.into_iter().last() {
            login.success_check = Some(check.into());
        }
    }

    /// Enables browser login driven by `js`
    pub fn set_login_chrome<S>(
        &mut self,
        url: impl Into<String>,
        js: impl Into<String>,
        success_check: S,
    ) where
        S: IntoIterator,
        S::Item: Into<KeyValue>,
    {
        let login = self.login.get_or_insert_with(LoginConfig::default);
        login.url = url.into();
        login.js = Some(js.into());
        if let Some(check) = success_check.into_iter().last() {
            login.success_check = Some(check.into());
        }
    }

    /// Appends xpath → exact value delivery rules
    pub fn set_callback_xpath_match<I>(&mut self, rules: I)
    where
        I: IntoIterator,
        I::Item: Into<KeyValue>,
    {
        self.callback_xpath_match
            .extend(rules.into_iter().map(Into::into));
    }

    /// Appends xpath → regexp delivery rules
    pub fn set_callback_xpath_regexp<I>(&mut self, rules: I)
    where
        I: IntoIterator,
        I::Item: Into<KeyValue>,
    {
        self.callback_xpath_regexp
            .extend(rules.into_iter().map(Into::into));
    }
}

impl<K, V> From<(K, V)> for KeyValue
where
    K: Into<String>,
    V: Into<String>,
{
    fn from((key, value): (K, V)) -> Self {
        KeyValue::new(key, value)
    }
}
