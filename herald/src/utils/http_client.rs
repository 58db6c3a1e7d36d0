use std::{sync::OnceLock, time::Duration};

use tracing::{debug, warn};

/// Per-request timeout applied by every HTTP channel unless overridden.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Explicit HTTP proxy for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy URL, e.g. `http://127.0.0.1:7890`.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Build a proxy from host, port and an optional `user:password` pair.
    ///
    /// Credentials already embedded in `host` (`user:pass@host`) take precedence.
    pub fn from_parts(host: &str, port: u16, auth: Option<&str>) -> Self {
        let (username, password) = match auth {
            Some(auth) if !host.contains('@') => match auth.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(auth.to_string()), None),
            },
            _ => (None, None),
        };

        Self {
            url: format!("http://{}:{}", host, port),
            username,
            password,
        }
    }
}

/// Apply `proxy_config` to an existing `reqwest::ClientBuilder`.
///
/// - `None` => reqwest defaults (system/env proxy)
/// - `Some(..)` with a valid URL => use that proxy for all schemes
/// - `Some(..)` with an invalid URL => disable all proxies
pub fn apply_proxy_config(
    mut builder: reqwest::ClientBuilder,
    proxy_config: Option<&ProxyConfig>,
) -> reqwest::ClientBuilder {
    let Some(proxy_config) = proxy_config else {
        return builder;
    };

    match reqwest::Proxy::all(&proxy_config.url) {
        Ok(mut proxy) => {
            if let Some(username) = proxy_config.username.as_ref() {
                proxy = proxy.basic_auth(username, proxy_config.password.as_deref().unwrap_or(""));
            }
            builder = builder.proxy(proxy);
        }
        Err(error) => {
            warn!(
                proxy_url = %proxy_config.url,
                error = %error,
                "Invalid proxy URL; disabling proxy"
            );
            builder = builder.no_proxy();
        }
    }
    builder
}

/// Build the `reqwest::Client` shared by one channel instance.
pub fn build_client(request_timeout: Duration, proxy_config: Option<&ProxyConfig>) -> reqwest::Client {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder().user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ));

    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    builder = apply_proxy_config(builder, proxy_config);

    builder.build().unwrap_or_else(|error| {
        warn!(
            error = %error,
            "Failed to create HTTP client; falling back to reqwest defaults"
        );
        reqwest::Client::new()
    })
}
