//! Assembly of a job configuration into the submission request

use crate::config::types::JobConfig;
use crate::rpc::DomainOpt;

impl JobConfig {
    /// Builds the request submitted to the server
    ///
    /// Rule lists are copied in their stored order.
    pub fn to_domain_opt(&self) -> DomainOpt {
        let mut opt = DomainOpt {
            seed_url: self.seed_url.clone(),
            min_delay: self.min_delay,
            max_delay: self.max_delay,
            no_follow: !self.follow,
            callback_url_regexp: self.callback_url_regexp.clone(),
            follow_url_regexp: self.follow_url_regexp.clone(),
            callback_xpath_match: self.callback_xpath_match.clone(),
            callback_xpath_regexp: self.callback_xpath_regexp.clone(),
            max_concurrent_requests: self.max_concurrent_requests,
            useragent: self.user_agent.clone(),
            impolite: self.impolite,
            depth: self.depth,
            repeat: self.repeat,
            frequency: self.frequency_secs.map(|secs| prost_types::Duration {
                seconds: i64::try_from(secs).unwrap_or(i64::MAX),
                nanos: 0,
            }),
            firstrun: self.first_run.map(|at| prost_types::Timestamp {
                seconds: at.timestamp(),
                nanos: i32::try_from(at.timestamp_subsec_nanos()).unwrap_or(0),
            }),
            unsafe_normalize_url: self.unsafe_normalize_url,
            chrome: self.chrome.enabled,
            chrome_binary: self.chrome.binary.clone(),
            dom_load_time: self.chrome.dom_load_time,
            network_iface: self.network_iface.clone(),
            cancel_on_disconnect: self.cancel_on_disconnect,
            check_content: self.check_content,
            prefetch: self.prefetch,
            use_anchor_text: self.use_anchor_text,
            ..Default::default()
        };

        if let Some(login) = &self.login {
            opt.login = true;
            opt.login_url = login.url.clone();
            opt.login_js = login.js.clone().unwrap_or_default();
            opt.login_payload = login.payload.clone();
            opt.login_parse_fields = !login.parse_xpath.is_empty();
            opt.login_parse_xpath = login.parse_xpath.clone();
            opt.login_success_check = login.success_check.clone();
            opt.check_login_after_each_page = login.check_after_each_page;
        }

        opt
    }
}
