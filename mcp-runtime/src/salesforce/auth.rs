use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::{Url, header};
use tracing::{debug, info};

use super::client::SalesforceClient;
use crate::error::SalesforceError;
use crate::util::{client, xml_escape};

const DEFAULT_LOGIN_DOMAIN: &str = "login";

static SESSION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<sessionId>([^<]+)</sessionId>").expect("valid regex"));
static SERVER_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<serverUrl>([^<]+)</serverUrl>").expect("valid regex"));
static FAULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<faultstring>([^<]*)</faultstring>").expect("valid regex"));

/// How the server authenticates against the org.
#[derive(Clone)]
pub enum Credentials {
    AccessToken {
        instance_url: String,
        access_token: String,
    },
    Password {
        username: String,
        password: String,
        security_token: String,
        domain: Option<String>,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::AccessToken { instance_url, .. } => f
                .debug_struct("AccessToken")
                .field("instance_url", instance_url)
                .field("access_token", &"<redacted>")
                .finish(),
            Credentials::Password {
                username, domain, ..
            } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .field("security_token", &"<redacted>")
                .field("domain", domain)
                .finish(),
        }
    }
}

impl Credentials {
    /// Pick the auth path from whatever the environment supplied. A token plus
    /// instance URL wins over username/password when both are present.
    pub fn from_parts(
        access_token: Option<String>,
        instance_url: Option<String>,
        username: Option<String>,
        password: Option<String>,
        security_token: Option<String>,
        domain: Option<String>,
    ) -> Option<Self> {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        if let (Some(access_token), Some(instance_url)) =
            (present(access_token), present(instance_url))
        {
            return Some(Credentials::AccessToken {
                instance_url,
                access_token,
            });
        }
        let username = present(username)?;
        Some(Credentials::Password {
            username,
            password: password.unwrap_or_default(),
            security_token: security_token.unwrap_or_default(),
            domain: present(domain),
        })
    }

    pub fn auth_mode(&self) -> &'static str {
        match self {
            Credentials::AccessToken { .. } => "access_token",
            Credentials::Password { .. } => "password",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub credentials: Option<Credentials>,
    pub api_version: String,
    pub connect_timeout: Duration,
}

/// Establish a session. The token path performs no network call; the
/// password path runs a SOAP `login`.
pub async fn connect(config: &ConnectionConfig) -> Result<SalesforceClient, SalesforceError> {
    let credentials = config.credentials.as_ref().ok_or_else(|| {
        SalesforceError::Login(
            "no credentials configured (set SALESFORCE_ACCESS_TOKEN + SALESFORCE_INSTANCE_URL or SALESFORCE_USERNAME)"
                .to_string(),
        )
    })?;
    let http = client(config.connect_timeout).map_err(|source| SalesforceError::Transport {
        url: "<client builder>".to_string(),
        source,
    })?;

    match credentials {
        Credentials::AccessToken {
            instance_url,
            access_token,
        } => {
            Url::parse(instance_url)
                .map_err(|e| SalesforceError::InvalidUrl(format!("{instance_url}: {e}")))?;
            info!(instance_url = %instance_url, "using Salesforce access token");
            Ok(SalesforceClient::new(
                http,
                instance_url.clone(),
                access_token.clone(),
                config.api_version.clone(),
            ))
        }
        Credentials::Password {
            username,
            password,
            security_token,
            domain,
        } => {
            let domain = domain.as_deref().unwrap_or(DEFAULT_LOGIN_DOMAIN);
            let login_url = format!(
                "https://{domain}.salesforce.com/services/Soap/u/{}",
                config.api_version.trim_start_matches(['v', 'V'])
            );
            debug!(login_url = %login_url, username = %username, "SOAP login");

            let envelope = soap_login_envelope(username, &format!("{password}{security_token}"));
            let response = http
                .post(&login_url)
                .header(header::CONTENT_TYPE, "text/xml; charset=UTF-8")
                .header("SOAPAction", "login")
                .body(envelope)
                .send()
                .await
                .map_err(|source| SalesforceError::Transport {
                    url: login_url.clone(),
                    source,
                })?;
            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|source| SalesforceError::Transport {
                    url: login_url.clone(),
                    source,
                })?;
            if !status.is_success() {
                let fault = capture(&FAULT_RE, &text)
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
                return Err(SalesforceError::Login(fault));
            }

            let (session_id, instance_url) = parse_login_response(&text)?;
            info!(instance_url = %instance_url, "Salesforce SOAP login succeeded");
            Ok(SalesforceClient::new(
                http,
                instance_url,
                session_id,
                config.api_version.clone(),
            ))
        }
    }
}

fn soap_login_envelope(username: &str, password: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<env:Envelope
        xmlns:xsd="http://www.w3.org/2001/XMLSchema"
        xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
        xmlns:env="http://schemas.xmlsoap.org/soap/envelope/"
        xmlns:urn="urn:partner.soap.sforce.com">
    <env:Header>
        <urn:CallOptions>
            <urn:client>sforce-mcp</urn:client>
            <urn:defaultNamespace>sf</urn:defaultNamespace>
        </urn:CallOptions>
    </env:Header>
    <env:Body>
        <n1:login xmlns:n1="urn:partner.soap.sforce.com">
            <n1:username>{}</n1:username>
            <n1:password>{}</n1:password>
        </n1:login>
    </env:Body>
</env:Envelope>"#,
        xml_escape(username),
        xml_escape(password)
    )
}

/// Returns `(session_id, instance_url)`; the instance URL is the origin of
/// the returned `serverUrl`.
fn parse_login_response(body: &str) -> Result<(String, String), SalesforceError> {
    let session_id = capture(&SESSION_ID_RE, body).ok_or_else(|| {
        SalesforceError::UnexpectedResponse("login response has no sessionId".to_string())
    })?;
    let server_url = capture(&SERVER_URL_RE, body).ok_or_else(|| {
        SalesforceError::UnexpectedResponse("login response has no serverUrl".to_string())
    })?;
    let parsed = Url::parse(&server_url)
        .map_err(|e| SalesforceError::InvalidUrl(format!("{server_url}: {e}")))?;
    Ok((session_id, parsed.origin().ascii_serialization()))
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}
