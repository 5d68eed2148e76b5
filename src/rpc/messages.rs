//! Wire messages of the crawl service
//!
//! These mirror the server's protobuf contract. Field tags follow the
//! declaration order of the service's `.proto` file.

/// A single key/value pair, used for xpath rules and login payloads
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message, serde::Deserialize, serde::Serialize)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub key: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub value: ::prost::alloc::string::String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Server-issued token identifying a running job
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Subscription {
    #[prost(string, tag = "1")]
    pub subcode: ::prost::alloc::string::String,
    #[prost(int32, tag = "2")]
    pub seqnum: i32,
    #[prost(message, optional, tag = "3")]
    pub datetime: ::core::option::Option<::prost_types::Timestamp>,
}

/// The job submission request
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DomainOpt {
    #[prost(string, tag = "1")]
    pub seed_url: ::prost::alloc::string::String,
    #[prost(int32, tag = "2")]
    pub min_delay: i32,
    #[prost(int32, tag = "3")]
    pub max_delay: i32,
    #[prost(bool, tag = "4")]
    pub no_follow: bool,
    #[prost(string, tag = "5")]
    pub callback_url_regexp: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub follow_url_regexp: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "7")]
    pub callback_xpath_match: ::prost::alloc::vec::Vec<KeyValue>,
    #[prost(message, repeated, tag = "8")]
    pub callback_xpath_regexp: ::prost::alloc::vec::Vec<KeyValue>,
    #[prost(int32, tag = "9")]
    pub max_concurrent_requests: i32,
    #[prost(string, tag = "10")]
    pub useragent: ::prost::alloc::string::String,
    #[prost(bool, tag = "11")]
    pub impolite: bool,
    #[prost(int32, tag = "12")]
    pub depth: i32,
    #[prost(bool, tag = "13")]
    pub repeat: bool,
    #[prost(message, optional, tag = "14")]
    pub frequency: ::core::option::Option<::prost_types::Duration>,
    #[prost(message, optional, tag = "15")]
    pub firstrun: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(bool, tag = "16")]
    pub unsafe_normalize_url: bool,
    #[prost(bool, tag = "17")]
    pub login: bool,
    #[prost(string, tag = "18")]
    pub login_url: ::prost::alloc::string::String,
    #[prost(string, tag = "19")]
    pub login_js: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "20")]
    pub login_payload: ::prost::alloc::vec::Vec<KeyValue>,
    #[prost(bool, tag = "21")]
    pub login_parse_fields: bool,
    #[prost(message, repeated, tag = "22")]
    pub login_parse_xpath: ::prost::alloc::vec::Vec<KeyValue>,
    #[prost(message, optional, tag = "23")]
    pub login_success_check: ::core::option::Option<KeyValue>,
    #[prost(bool, tag = "24")]
    pub check_login_after_each_page: bool,
    #[prost(bool, tag = "25")]
    pub chrome: bool,
    #[prost(string, tag = "26")]
    pub chrome_binary: ::prost::alloc::string::String,
    #[prost(int32, tag = "27")]
    pub dom_load_time: i32,
    #[prost(string, tag = "28")]
    pub network_iface: ::prost::alloc::string::String,
    #[prost(bool, tag = "29")]
    pub cancel_on_disconnect: bool,
    #[prost(bool, tag = "30")]
    pub check_content: bool,
    #[prost(bool, tag = "31")]
    pub prefetch: bool,
    #[prost(bool, tag = "32")]
    pub use_anchor_text: bool,
}

/// One fetched page pushed by the server
///
/// The first message of a result stream only carries `sub`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PageHtml {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub error: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "3")]
    pub sub: ::core::option::Option<Subscription>,
    #[prost(string, tag = "4")]
    pub url: ::prost::alloc::string::String,
    #[prost(int32, tag = "5")]
    pub httpstatuscode: i32,
    #[prost(bytes = "vec", tag = "6")]
    pub content: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "7")]
    pub meta_str: ::prost::alloc::string::String,
    #[prost(int32, tag = "8")]
    pub url_depth: i32,
    #[prost(string, tag = "9")]
    pub anchor_text: ::prost::alloc::string::String,
}

/// Kind of work injected into a running job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PageReqType {
    Get = 0,
    Head = 1,
    BuiltinJs = 2,
    Jscript = 3,
}

/// A page or JS request sent on the injection stream
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PageRequest {
    #[prost(message, optional, tag = "1")]
    pub sub: ::core::option::Option<Subscription>,
    #[prost(enumeration = "PageReqType", tag = "2")]
    pub reqtype: i32,
    #[prost(string, tag = "3")]
    pub url: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub js: ::prost::alloc::string::String,
    #[prost(bool, tag = "5")]
    pub no_callback: bool,
    #[prost(string, tag = "6")]
    pub meta_str: ::prost::alloc::string::String,
}

/// A batch of analyzed URLs from the side stream
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UrlList {
    #[prost(string, repeated, tag = "1")]
    pub url: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    #[prost(string, tag = "2")]
    pub meta_str: ::prost::alloc::string::String,
    #[prost(int32, tag = "3")]
    pub url_depth: i32,
}

/// Acknowledgement returned by cancel and by the injection stream
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ack {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub error: ::prost::alloc::string::String,
}
