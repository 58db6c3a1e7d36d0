//! Per-channel settings loaders.
//!
//! Each loader reads the service's conventional variables and applies the
//! enable rule. Problems that should not stop startup (malformed keys,
//! unexpected flag values) are pushed to `issues` instead of failing.

use super::ConfigIssue;
use super::env::{Env, parse_bool};
use crate::channels::*;
use crate::error::Result;
use crate::utils::http_client::ProxyConfig;

/// Load the settings of every channel.
pub fn load(env: &mut Env<'_>, issues: &mut Vec<ConfigIssue>) -> Result<ChannelSettings> {
    Ok(ChannelSettings {
        console: console(env)?,
        bark: bark(env)?,
        dingtalk: dingtalk(env)?,
        discord: discord(env)?,
        feishu: feishu(env)?,
        gotify: gotify(env)?,
        igot: igot(env, issues)?,
        pushdeer: pushdeer(env)?,
        pushplus: pushplus(env)?,
        qmsg: qmsg(env)?,
        serverchan: serverchan(env, issues)?,
        smtp: smtp(env, issues)?,
        telegram: telegram(env, issues)?,
        webhook: webhook(env)?,
        wecom_app: wecom_app(env, issues)?,
        wecom_bot: wecom_bot(env)?,
    })
}

fn console(env: &Env<'_>) -> Result<ConsoleConfig> {
    let enabled = match env.flag("ENABLE_CONSOLE")? {
        Some(enabled) => enabled,
        None => env.flag("CONSOLE")?.unwrap_or(true),
    };
    Ok(ConsoleConfig { enabled })
}

fn bark(env: &mut Env<'_>) -> Result<BarkConfig> {
    let push = env.secret("BARK_PUSH").unwrap_or_default();
    Ok(BarkConfig {
        enabled: env.enabled("BARK", !push.is_empty())?,
        push,
        archive: env.get("BARK_ARCHIVE"),
        group: env.get("BARK_GROUP"),
        sound: env.get("BARK_SOUND"),
        icon: env.get("BARK_ICON"),
    })
}

fn dingtalk(env: &mut Env<'_>) -> Result<DingTalkConfig> {
    let token = env.secret("DD_BOT_TOKEN").unwrap_or_default();
    let secret = env.secret("DD_BOT_SECRET");
    Ok(DingTalkConfig {
        enabled: env.enabled("DINGTALK", !token.is_empty() || secret.is_some())?,
        token,
        secret,
    })
}

fn discord(env: &mut Env<'_>) -> Result<DiscordConfig> {
    let webhook_url = env.secret("DISCORD_WEBHOOK_URL").unwrap_or_default();
    Ok(DiscordConfig {
        enabled: env.enabled("DISCORD", !webhook_url.is_empty())?,
        webhook_url,
        username: env.get("DISCORD_USERNAME"),
        avatar_url: env.get("DISCORD_AVATAR_URL"),
    })
}

fn feishu(env: &mut Env<'_>) -> Result<FeishuConfig> {
    let key = env.secret("FSKEY").unwrap_or_default();
    Ok(FeishuConfig {
        enabled: env.enabled("FEISHU", !key.is_empty())?,
        key,
    })
}

fn gotify(env: &mut Env<'_>) -> Result<GotifyConfig> {
    let url = env.get("GOTIFY_URL").unwrap_or_default();
    let token = env.secret("GOTIFY_TOKEN").unwrap_or_default();
    Ok(GotifyConfig {
        enabled: env.enabled("GOTIFY", !url.is_empty() || !token.is_empty())?,
        url,
        token,
        priority: env.parse("GOTIFY_PRIORITY")?.unwrap_or(0),
    })
}

fn igot(env: &mut Env<'_>, issues: &mut Vec<ConfigIssue>) -> Result<IgotConfig> {
    let key = env.secret("IGOT_PUSH_KEY").unwrap_or_default();
    let config = IgotConfig {
        enabled: env.enabled("IGOT", !key.is_empty())?,
        key,
    };
    if !config.key.is_empty() && !config.key_is_well_formed() {
        issues.push(ConfigIssue::new(
            "IGOT_PUSH_KEY",
            "expected 24 alphanumeric characters",
        ));
    }
    Ok(config)
}

fn pushdeer(env: &mut Env<'_>) -> Result<PushDeerConfig> {
    let key = env.secret("DEER_KEY").unwrap_or_default();
    Ok(PushDeerConfig {
        enabled: env.enabled("PUSHDEER", !key.is_empty())?,
        key,
        url: env.get_or("DEER_URL", DEFAULT_PUSHDEER_URL),
    })
}

fn pushplus(env: &mut Env<'_>) -> Result<PushPlusConfig> {
    let token = env.secret("PUSH_PLUS_TOKEN").unwrap_or_default();
    Ok(PushPlusConfig {
        enabled: env.enabled("PUSHPLUS", !token.is_empty())?,
        token,
        topic: env.get("PUSH_PLUS_USER"),
    })
}

fn qmsg(env: &mut Env<'_>) -> Result<QmsgConfig> {
    let key = env.secret("QMSG_KEY").unwrap_or_default();
    let kind = env.get("QMSG_TYPE").unwrap_or_default();
    Ok(QmsgConfig {
        enabled: env.enabled("QMSG", !key.is_empty())?,
        key,
        kind,
    })
}

fn serverchan(env: &mut Env<'_>, issues: &mut Vec<ConfigIssue>) -> Result<ServerChanConfig> {
    let (key_name, key) = match env.secret("PUSH_KEY") {
        Some(key) => ("PUSH_KEY", key),
        None => ("SCKEY", env.secret("SCKEY").unwrap_or_default()),
    };
    if !key.is_empty()
        && let Err(problem) = validate_serverchan_key(&key)
    {
        issues.push(ConfigIssue::new(key_name, problem));
    }
    Ok(ServerChanConfig {
        enabled: env.enabled("SERVERCHAN", !key.is_empty())?,
        key,
    })
}

fn smtp(env: &mut Env<'_>, issues: &mut Vec<ConfigIssue>) -> Result<SmtpConfig> {
    let server = env.get("SMTP_SERVER").unwrap_or_default();
    let email = env.get("SMTP_EMAIL").unwrap_or_default();
    let password = env.secret("SMTP_PASSWORD").unwrap_or_default();

    let ssl = match env.get("SMTP_SSL") {
        None => false,
        Some(raw) => parse_bool(&raw).unwrap_or_else(|| {
            issues.push(ConfigIssue::new(
                "SMTP_SSL",
                format!("expected true or false, got {raw:?}; using STARTTLS"),
            ));
            false
        }),
    };

    let (host, port) = SmtpConfig::split_server(&server);
    let present = !server.is_empty() || !email.is_empty() || !password.is_empty();
    Ok(SmtpConfig {
        enabled: env.enabled("SMTP", present)?,
        host,
        port,
        ssl,
        name: env.get("SMTP_NAME").unwrap_or_else(|| email.clone()),
        email,
        password,
    })
}

fn telegram(env: &mut Env<'_>, issues: &mut Vec<ConfigIssue>) -> Result<TelegramConfig> {
    let bot_token = env.secret("TG_BOT_TOKEN").unwrap_or_default();
    let chat_id = env.get("TG_USER_ID").unwrap_or_default();

    let proxy = match (env.get("TG_PROXY_HOST"), env.get("TG_PROXY_PORT")) {
        (Some(host), Some(port)) => match port.parse::<u16>() {
            Ok(port) => {
                let auth = env.secret("TG_PROXY_AUTH");
                Some(ProxyConfig::from_parts(&host, port, auth.as_deref()))
            }
            Err(_) => {
                issues.push(ConfigIssue::new(
                    "TG_PROXY_PORT",
                    format!("invalid port {port:?}; proxy disabled"),
                ));
                None
            }
        },
        (Some(_), None) => {
            issues.push(ConfigIssue::new("TG_PROXY_PORT", "TG_PROXY_HOST is set without a port"));
            None
        }
        _ => None,
    };

    Ok(TelegramConfig {
        enabled: env.enabled("TELEGRAM", !bot_token.is_empty() || !chat_id.is_empty())?,
        bot_token,
        chat_id,
        api_host: env.get("TG_API_HOST"),
        proxy,
    })
}

fn webhook(env: &mut Env<'_>) -> Result<WebhookConfig> {
    let url = env.get("WEBHOOK_URL").unwrap_or_default();

    let auth = if let Some(token) = env.secret("WEBHOOK_TOKEN") {
        Some(WebhookAuth::Bearer { token })
    } else if let Some(username) = env.get("WEBHOOK_USERNAME") {
        Some(WebhookAuth::Basic {
            username,
            password: env.secret("WEBHOOK_PASSWORD").unwrap_or_default(),
        })
    } else {
        env.secret("WEBHOOK_AUTH_HEADER").and_then(|raw| {
            let (name, value) = raw.split_once(':')?;
            Some(WebhookAuth::Header {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            })
        })
    };

    Ok(WebhookConfig {
        enabled: env.enabled("WEBHOOK", !url.is_empty())?,
        url,
        method: env.get_or("WEBHOOK_METHOD", "POST"),
        headers: env
            .get("WEBHOOK_HEADERS")
            .map(|raw| parse_header_list(&raw))
            .unwrap_or_default(),
        auth,
    })
}

fn wecom_app(env: &mut Env<'_>, issues: &mut Vec<ConfigIssue>) -> Result<WeComAppConfig> {
    let Some(raw) = env.secret("QYWX_AM") else {
        return Ok(WeComAppConfig {
            enabled: env.enabled("WECOM_APP", false)?,
            ..Default::default()
        });
    };

    let mut config = WeComAppConfig::parse(&raw).unwrap_or_else(|e| {
        issues.push(ConfigIssue::new("QYWX_AM", e.to_string()));
        WeComAppConfig::default()
    });
    config.enabled = env.enabled("WECOM_APP", true)?;
    Ok(config)
}

fn wecom_bot(env: &mut Env<'_>) -> Result<WeComBotConfig> {
    let key = env.secret("QYWX_KEY").unwrap_or_default();
    Ok(WeComBotConfig {
        enabled: env.enabled("WECOM_BOT", !key.is_empty())?,
        key,
    })
}
