use anyhow::{anyhow, Result};
use desk_core::config::DeliveryConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing;
use uuid::Uuid;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

fn html_escape(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '&' => "&amp;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#x27;".to_string(),
            _ => c.to_string(),
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct ResendEmailRequest {
    from: String,
    to: Vec<String>,
    subject: String,
    html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResendEmailResponse {
    id: String,
}

/// Outbound acknowledgment sender over the Resend HTTP API. Disabled
/// (all sends become no-ops) when the Resend credentials are missing.
pub struct EmailDelivery {
    client: Option<Arc<reqwest::Client>>,
    api_key: Option<String>,
    from_email: Option<String>,
}

impl EmailDelivery {
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        let (client, api_key, from_email) = if let (Some(api_key), Some(from_email)) =
            (&config.resend_api_key, &config.resend_from_email)
        {
            tracing::info!("Initializing Resend email client");

            let client = reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

            (
                Some(Arc::new(client)),
                Some(api_key.clone()),
                Some(from_email.clone()),
            )
        } else {
            tracing::warn!("Email delivery disabled (missing Resend configuration)");
            (None, None, None)
        };

        Ok(Self {
            client,
            api_key,
            from_email,
        })
    }

    /// Send the "we received your ticket" acknowledgment to the customer.
    pub async fn send_ticket_acknowledgment(
        &self,
        to_email: &str,
        customer_name: &str,
        ticket_id: Uuid,
        ticket_subject: &str,
    ) -> Result<()> {
        let (client, api_key, from_email) = match (&self.client, &self.api_key, &self.from_email) {
            (Some(c), Some(k), Some(f)) => (c, k, f),
            _ => {
                tracing::debug!("Email not configured, skipping acknowledgment");
                return Ok(());
            }
        };

        let subject = format!("We received your request: {}", ticket_subject);
        let body = format!(
            "Hi {}, your support request \"{}\" has been received. \
             Reference: {}. Our team will get back to you shortly.",
            customer_name, ticket_subject, ticket_id
        );

        let html_content = format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
</head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <div style="background-color: #f8f9fa; border-radius: 8px; padding: 24px; margin-bottom: 20px;">
        <h1 style="margin: 0 0 16px 0; font-size: 24px; color: #212529;">{}</h1>
        <p style="margin: 0; font-size: 16px; color: #495057;">{}</p>
    </div>
    <p style="font-size: 14px; color: #6c757d; margin-top: 20px;">
        This is an automated acknowledgment of your support request.
    </p>
</body>
</html>"#,
            html_escape(&subject),
            html_escape(&body)
        );

        let email_request = ResendEmailRequest {
            from: from_email.clone(),
            to: vec![to_email.to_string()],
            subject,
            html: html_content,
            text: Some(body),
        };

        let response = client
            .post(RESEND_API_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&email_request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send HTTP request to Resend: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Resend API returned error status {}: {}",
                status,
                error_text
            ));
        }

        let email_response: ResendEmailResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse Resend API response: {}", e))?;

        tracing::debug!(
            "Acknowledgment sent to {} for ticket {} (email_id: {})",
            to_email,
            ticket_id,
            email_response.id
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_in_user_controlled_fields() {
        assert_eq!(
            html_escape(r#"<script>"x" & 'y'</script>"#),
            "&lt;script&gt;&quot;x&quot; &amp; &#x27;y&#x27;&lt;/script&gt;"
        );
    }

    #[test]
    fn unconfigured_delivery_is_a_noop() {
        let delivery = EmailDelivery::new(&DeliveryConfig {
            resend_api_key: None,
            resend_from_email: None,
        })
        .unwrap();
        assert!(delivery.client.is_none());
    }
}
