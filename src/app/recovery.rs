//! Account-recovery lookup for free-webmail contact addresses.
//!
//! The reset page embeds its state as `var ServerData = {...};` in a script
//! block. Its proof list names the masked recovery channels of the account.

use std::sync::Arc;

use scraper::Html;
use serde::Deserialize;
use tracing::debug;

use super::config::CrawlConfig;
use super::html::selector;
use super::net::{HttpRequest, HttpTransport};
use super::types::{EmailResolution, RecoveryEmailResolution};

const SERVER_DATA_PREFIX: &str = "var ServerData = ";
const SERVER_DATA_TERMINATOR: char = ';';
const EMAIL_PROOF: &str = "Email";

#[derive(Debug, Deserialize)]
struct ServerData {
    #[serde(rename = "oProofList", default)]
    proofs: Vec<RecoveryProof>,
}

#[derive(Debug, Deserialize)]
struct RecoveryProof {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    name: String,
}

#[derive(Clone)]
pub struct RecoveryResolver {
    transport: Arc<dyn HttpTransport>,
    config: Arc<CrawlConfig>,
}

impl RecoveryResolver {
    pub fn new(transport: Arc<dyn HttpTransport>, config: Arc<CrawlConfig>) -> Self {
        Self { transport, config }
    }

    /// Looks up only `Found` addresses on allow-listed webmail domains; every
    /// other input returns `NotAttempted` without touching the network.
    pub async fn resolve_recovery(&self, email: &EmailResolution) -> RecoveryEmailResolution {
        if !self.config.recovery_enabled {
            return RecoveryEmailResolution::NotAttempted;
        }
        let Some(address) = email.address() else {
            return RecoveryEmailResolution::NotAttempted;
        };
        if !self.config.is_recovery_domain(address) {
            return RecoveryEmailResolution::NotAttempted;
        }

        // Single attempt, no retry.
        let response = match self.transport.send(&self.request(address)).await {
            Ok(response) => response,
            Err(err) => {
                debug!(email = address, error = %err, "recovery lookup failed");
                return RecoveryEmailResolution::NotFound;
            }
        };
        if response.status != 200 {
            debug!(email = address, status = response.status, "recovery lookup rejected");
            return RecoveryEmailResolution::NotFound;
        }

        match proof_email_from_page(&response.body) {
            Some(proof) => RecoveryEmailResolution::Found(proof),
            None => RecoveryEmailResolution::NotFound,
        }
    }

    fn request(&self, address: &str) -> HttpRequest {
        HttpRequest::get(self.config.recovery_url(address))
            .header("User-Agent", self.config.user_agent.as_str())
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Referer", self.config.endpoints.recovery_referer.as_str())
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "same-origin")
            .header("Sec-Fetch-User", "?1")
            .header("Upgrade-Insecure-Requests", "1")
    }
}

/// Email proof from the embedded `ServerData` payload, if any.
pub fn proof_email_from_page(html: &str) -> Option<String> {
    let payload = server_data_payload(html)?;
    let data = match serde_json::from_str::<ServerData>(&payload) {
        Ok(data) => data,
        Err(err) => {
            debug!(error = %err, "recovery payload is not valid json");
            return None;
        }
    };

    data.proofs
        .into_iter()
        .find(|proof| proof.kind == EMAIL_PROOF && !proof.name.trim().is_empty())
        .map(|proof| proof.name.trim().to_string())
}

fn server_data_payload(html: &str) -> Option<String> {
    let scripts = selector("script")?;
    let doc = Html::parse_document(html);

    doc.select(&scripts).find_map(|script| {
        let text = script.text().collect::<String>();
        let body = text.trim().strip_prefix(SERVER_DATA_PREFIX)?;
        let json = body.trim_end().strip_suffix(SERVER_DATA_TERMINATOR)?;
        Some(json.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::ScriptedTransport;

    const RESET_PAGE: &str = r#"<html><head>
<script type="text/javascript">window.$Config = {"lang":"en"};</script>
<script type="text/javascript">var ServerData = {"sUsername":"hr@outlook.com","oProofList":[{"type":"Sms","name":"*******42"},{"type":"Email","name":"ma*****@gmail.com"}]};</script>
</head><body></body></html>"#;

    fn found(address: &str) -> EmailResolution {
        EmailResolution::Found(address.to_string())
    }

    #[test]
    fn extracts_email_proof() {
        assert_eq!(
            proof_email_from_page(RESET_PAGE).as_deref(),
            Some("ma*****@gmail.com")
        );
    }

    #[test]
    fn misses_resolve_to_none() {
        let no_marker = "<script>var Other = {};</script>";
        let no_email = r#"<script>var ServerData = {"oProofList":[{"type":"Sms","name":"***42"}]};</script>"#;
        let broken = r#"<script>var ServerData = {"oProofList":[{"type":;</script>"#;
        assert_eq!(proof_email_from_page(no_marker), None);
        assert_eq!(proof_email_from_page(no_email), None);
        assert_eq!(proof_email_from_page(broken), None);
    }

    #[tokio::test]
    async fn other_domains_are_never_looked_up() {
        let transport = Arc::new(ScriptedTransport::new());
        let resolver = RecoveryResolver::new(transport.clone(), Arc::new(CrawlConfig::default()));

        assert_eq!(
            resolver.resolve_recovery(&found("hr@maple-foods.ca")).await,
            RecoveryEmailResolution::NotAttempted
        );
        assert_eq!(
            resolver.resolve_recovery(&EmailResolution::NotFound).await,
            RecoveryEmailResolution::NotAttempted
        );
        assert_eq!(
            resolver.resolve_recovery(&EmailResolution::NetworkError).await,
            RecoveryEmailResolution::NotAttempted
        );
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn disabled_lookup_makes_no_calls() {
        let transport = Arc::new(ScriptedTransport::new());
        let config = CrawlConfig {
            recovery_enabled: false,
            ..CrawlConfig::default()
        };
        let resolver = RecoveryResolver::new(transport.clone(), Arc::new(config));

        assert_eq!(
            resolver.resolve_recovery(&found("hr@outlook.com")).await,
            RecoveryEmailResolution::NotAttempted
        );
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn allow_listed_domain_is_looked_up_once() {
        let config = Arc::new(CrawlConfig::default());
        let url = config.recovery_url("hr@outlook.com");
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(&url, 200, RESET_PAGE);
        let resolver = RecoveryResolver::new(transport.clone(), config);

        assert_eq!(
            resolver.resolve_recovery(&found("hr@outlook.com")).await,
            RecoveryEmailResolution::Found("ma*****@gmail.com".to_string())
        );
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header_value("sec-fetch-mode"), Some("navigate"));
        assert_eq!(requests[0].header_value("accept-language"), Some("en-US,en;q=0.9"));
    }

    #[tokio::test]
    async fn unavailable_lookup_is_not_retried() {
        let config = Arc::new(CrawlConfig::default());
        let url = config.recovery_url("hr@hotmail.com");
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(&url, 503, "");
        let resolver = RecoveryResolver::new(transport.clone(), config);

        assert_eq!(
            resolver.resolve_recovery(&found("hr@hotmail.com")).await,
            RecoveryEmailResolution::NotFound
        );
        assert_eq!(transport.calls_to(&url), 1);
    }
}
