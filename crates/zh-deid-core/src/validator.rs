//! Post-hoc LLM validation of anonymized text
//!
//! Asks an Ollama-compatible model whether any PII survived anonymization.
//! The verdict is advisory: it is recorded for review and never changes
//! what the engine returned.

use crate::config::LlmConfig;
use crate::prompt_loader::PromptLoader;
use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

/// The model's answer about residual PII.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub contains_pii: bool,
    #[serde(default)]
    pub identified_pii: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PiiValidator {
    client: Client,
    config: LlmConfig,
    prompt_loader: PromptLoader,
    prompt_template: String,
}

impl PiiValidator {
    pub fn new(config: LlmConfig, prompt_loader: PromptLoader) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        let prompt_template = prompt_loader.load_prompt(config.prompt_template.as_deref());

        Ok(Self {
            client,
            config,
            prompt_loader,
            prompt_template,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// `Ok(None)` when the validator is disabled.
    pub async fn validate(&self, anonymized_text: &str) -> Result<Option<ValidationVerdict>> {
        if !self.config.enabled {
            debug!("Validator is disabled, skipping residual PII check");
            return Ok(None);
        }

        debug!(
            "Validating anonymized text: {} characters",
            anonymized_text.chars().count()
        );

        let prompt = self
            .prompt_loader
            .format_prompt(&self.prompt_template, anonymized_text);
        let response = self.generate(&prompt).await?;
        let verdict = parse_verdict(&response)?;

        if verdict.contains_pii {
            warn!(
                "Validator reported {} residual PII values",
                verdict.identified_pii.len()
            );
        } else {
            info!("Validator found no residual PII");
        }

        Ok(Some(verdict))
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: GenerateOptions {
                temperature: 0.0,
                top_p: 0.1,
                num_predict: 300,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));
        debug!("Making request to {}", url);

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Validation request failed with status {}: {}", status, error_text);
            return Err(anyhow::anyhow!(
                "Validation request failed: {} - {}",
                status,
                error_text
            ));
        }

        let body: GenerateResponse = response.json().await?;
        if !body.done {
            warn!("Received incomplete response from the model");
        }

        Ok(body.response)
    }

    pub async fn health_check(&self) -> Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }

        let url = format!("{}/api/tags", self.config.endpoint.trim_end_matches('/'));
        let response = self.client.get(&url).send().await?;

        let is_healthy = response.status().is_success();
        if is_healthy {
            info!("Validator health check passed");
        } else {
            warn!("Validator health check failed: {}", response.status());
        }

        Ok(is_healthy)
    }
}

fn parse_verdict(response: &str) -> Result<ValidationVerdict> {
    let json_str = extract_json_from_response(response)?;
    serde_json::from_str(&json_str)
        .map_err(|e| anyhow::anyhow!("Failed to parse validation verdict: {}", e))
}

/// First balanced JSON object in a free-form model reply.
fn extract_json_from_response(response: &str) -> Result<String> {
    // some models echo the template's escaped braces
    let fixed = response.replace("{{", "{").replace("}}", "}");

    if let Some(start) = fixed.find('{') {
        let mut depth = 0usize;
        for (offset, ch) in fixed[start..].char_indices() {
            match ch {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &fixed[start..start + offset + 1];
                        if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                            return Ok(candidate.to_string());
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    let trimmed = fixed.trim();
    if trimmed.starts_with('{')
        && trimmed.ends_with('}')
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    {
        return Ok(trimmed.to_string());
    }

    Err(anyhow::anyhow!("No valid JSON found in model response: {}", response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn validator(endpoint: &str, enabled: bool) -> (TempDir, PiiValidator) {
        let temp_dir = TempDir::new().unwrap();
        let loader = PromptLoader::with_dir(temp_dir.path()).unwrap();
        let config = LlmConfig {
            enabled,
            endpoint: endpoint.to_string(),
            timeout_seconds: 5,
            ..LlmConfig::default()
        };
        (temp_dir, PiiValidator::new(config, loader).unwrap())
    }

    /// Serve one canned JSON body to the first HTTP request.
    async fn serve_once(body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_extract_json_from_response() {
        let embedded = r#"Result: {"contains_pii": true, "identified_pii": ["张三"]} done."#;
        let json = extract_json_from_response(embedded).unwrap();
        assert!(json.starts_with('{') && json.ends_with('}'));
        assert!(json.contains("张三"));

        let pure = r#"{"contains_pii": false, "identified_pii": []}"#;
        assert_eq!(extract_json_from_response(pure).unwrap(), pure);

        let first_of_two = "{\"contains_pii\": true}\n\n{\"contains_pii\": false}";
        assert_eq!(
            extract_json_from_response(first_of_two).unwrap(),
            "{\"contains_pii\": true}"
        );

        let doubled = r#"{{"contains_pii": false, "identified_pii": []}}"#;
        assert!(!extract_json_from_response(doubled).unwrap().contains("{{"));

        assert!(extract_json_from_response("没有JSON").is_err());
    }

    #[test]
    fn test_parse_verdict() {
        let verdict =
            parse_verdict(r#"{"contains_pii": true, "identified_pii": ["13800138000"]}"#).unwrap();
        assert!(verdict.contains_pii);
        assert_eq!(verdict.identified_pii, vec!["13800138000"]);

        let verdict = parse_verdict(r#"{"contains_pii": false}"#).unwrap();
        assert!(verdict.identified_pii.is_empty());

        assert!(parse_verdict(r#"{"entities": []}"#).is_err());
    }

    #[test]
    fn test_disabled_validator() {
        let (_dir, validator) = validator("http://localhost:11434", false);
        assert!(!validator.is_enabled());

        tokio_test::block_on(async {
            assert!(validator.validate("<NAME>").await.unwrap().is_none());
            assert!(!validator.health_check().await.unwrap());
        });
    }

    #[tokio::test]
    async fn test_validate_against_stub_server() {
        let reply = serde_json::json!({
            "response": "{\"contains_pii\": true, \"identified_pii\": [\"李四\"]}",
            "done": true
        });
        let endpoint = serve_once(reply.to_string()).await;
        let (_dir, validator) = validator(&endpoint, true);

        let verdict = validator.validate("<NAME>与李四同行").await.unwrap().unwrap();
        assert!(verdict.contains_pii);
        assert_eq!(verdict.identified_pii, vec!["李四"]);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_errors() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (_dir, validator) = validator(&format!("http://{}", addr), true);
        assert!(validator.validate("<NAME>").await.is_err());
    }
}
