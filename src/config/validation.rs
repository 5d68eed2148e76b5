use crate::config::types::{ClientOptions, Config, JobConfig, LoginConfig, ServerAddr};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_server(&config.server)?;
    validate_client_options(&config.client)?;
    validate_job(&config.job)?;
    Ok(())
}

/// Replaces the server address with command-line overrides and re-checks it
pub fn apply_server_overrides(
    config: &mut Config,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), ConfigError> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    validate_server(&config.server)
}

/// Validates the server address
fn validate_server(server: &ServerAddr) -> Result<(), ConfigError> {
    if server.host.is_empty() {
        return Err(ConfigError::Validation(
            "server host cannot be empty".to_string(),
        ));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server port must be non-zero".to_string(),
        ));
    }

    Ok(())
}

/// Validates client-side session options
pub fn validate_client_options(options: &ClientOptions) -> Result<(), ConfigError> {
    if options.buffer_capacity < 1 {
        return Err(ConfigError::Validation(format!(
            "buffer_capacity must be >= 1, got {}",
            options.buffer_capacity
        )));
    }

    if options.max_message_size < 1 {
        return Err(ConfigError::Validation(format!(
            "max_message_size must be >= 1, got {}",
            options.max_message_size
        )));
    }

    Ok(())
}

/// Validates a job before it is submitted
pub fn validate_job(job: &JobConfig) -> Result<(), ConfigError> {
    let seed = Url::parse(&job.seed_url).map_err(|e| {
        ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", job.seed_url, e))
    })?;

    if seed.scheme() != "http" && seed.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "Seed URL '{}' must use http or https",
            job.seed_url
        )));
    }

    if job.min_delay < 0 {
        return Err(ConfigError::Validation(format!(
            "min_delay must be >= 0, got {}",
            job.min_delay
        )));
    }

    if job.max_delay != 0 && job.max_delay < job.min_delay {
        return Err(ConfigError::Validation(format!(
            "max_delay ({}) must be 0 or >= min_delay ({})",
            job.max_delay, job.min_delay
        )));
    }

    if job.max_concurrent_requests < 1 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be >= 1, got {}",
            job.max_concurrent_requests
        )));
    }

    if job.depth < -1 {
        return Err(ConfigError::Validation(format!(
            "depth must be -1 (unbounded) or >= 0, got {}",
            job.depth
        )));
    }

    if job.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if job.repeat && job.frequency_secs.unwrap_or(0) == 0 {
        return Err(ConfigError::Validation(
            "repeat requires a non-zero frequency_secs".to_string(),
        ));
    }

    if job.chrome.dom_load_time < 0 {
        return Err(ConfigError::Validation(format!(
            "dom_load_time must be >= 0, got {}",
            job.chrome.dom_load_time
        )));
    }

    if let Some(login) = &job.login {
        validate_login(login)?;
    }

    Ok(())
}

/// Validates the login sequence
fn validate_login(login: &LoginConfig) -> Result<(), ConfigError> {
    if login.url.is_empty() {
        return Err(ConfigError::Validation(
            "login url cannot be empty when login is enabled".to_string(),
        ));
    }

    Url::parse(&login.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid login URL '{}': {}", login.url, e)))?;

    // Browser login and form login are mutually exclusive
    if login.js.is_some() && !login.payload.is_empty() {
        return Err(ConfigError::Validation(
            "login js and login payload cannot both be set".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_job() -> JobConfig {
        JobConfig::new("https://example.com")
    }

    #[test]
    fn test_validate_defaults() {
        assert!(validate_job(&valid_job()).is_ok());
        assert!(validate_client_options(&ClientOptions::default()).is_ok());
    }

    #[test]
    fn test_validate_seed_url() {
        let mut job = valid_job();
        job.seed_url = String::new();
        assert!(matches!(validate_job(&job), Err(ConfigError::InvalidUrl(_))));

        job.seed_url = "ftp://example.com".to_string();
        assert!(matches!(validate_job(&job), Err(ConfigError::Validation(_))));

        job.seed_url = "http://example.com/start".to_string();
        assert!(validate_job(&job).is_ok());
    }

    #[test]
    fn test_validate_delays() {
        let mut job = valid_job();
        job.min_delay = 10;
        job.max_delay = 5;
        assert!(validate_job(&job).is_err());

        job.max_delay = 0;
        assert!(validate_job(&job).is_ok());

        job.max_delay = 20;
        assert!(validate_job(&job).is_ok());
    }

    #[test]
    fn test_validate_depth_and_concurrency() {
        let mut job = valid_job();
        job.depth = -2;
        assert!(validate_job(&job).is_err());

        job.depth = 0;
        job.max_concurrent_requests = 0;
        assert!(validate_job(&job).is_err());
    }

    #[test]
    fn test_validate_repeat_needs_frequency() {
        let mut job = valid_job();
        job.repeat = true;
        assert!(validate_job(&job).is_err());

        job.frequency_secs = Some(3600);
        assert!(validate_job(&job).is_ok());
    }

    #[test]
    fn test_validate_login_exclusive() {
        let mut job = valid_job();
        job.set_login_chrome("https://example.com/login", "doLogin()", [("//h1", "Hi")]);
        assert!(validate_job(&job).is_ok());

        job.set_login(
            "https://example.com/login",
            [("user", "me")],
            Vec::<(String, String)>::new(),
            Vec::<(String, String)>::new(),
        );
        assert!(matches!(validate_job(&job), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_login_url() {
        let mut job = valid_job();
        job.login = Some(LoginConfig::default());
        assert!(validate_job(&job).is_err());
    }

    #[test]
    fn test_validate_buffer_capacity() {
        let options = ClientOptions {
            buffer_capacity: 0,
            ..ClientOptions::default()
        };
        assert!(validate_client_options(&options).is_err());
    }

    #[test]
    fn test_validate_server() {
        assert!(validate_server(&ServerAddr::new("localhost", 10000)).is_ok());
        assert!(validate_server(&ServerAddr::new("", 10000)).is_err());
        assert!(validate_server(&ServerAddr::new("localhost", 0)).is_err());
    }

    #[test]
    fn test_server_overrides_are_validated() {
        let mut config = Config {
            server: ServerAddr::new("localhost", 10000),
            client: ClientOptions::default(),
            job: valid_job(),
        };

        apply_server_overrides(&mut config, Some("crawler.internal".to_string()), None).unwrap();
        assert_eq!(config.server, ServerAddr::new("crawler.internal", 10000));

        let err = apply_server_overrides(&mut config, None, Some(0)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let mut config = Config {
            server: ServerAddr::new("localhost", 10000),
            client: ClientOptions::default(),
            job: valid_job(),
        };
        assert!(apply_server_overrides(&mut config, Some(String::new()), None).is_err());
    }
}
