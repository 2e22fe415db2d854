use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

use crate::models::{CampaignGoal, MinorUnits};
use crate::retry::{RetryEligibility, RetryPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub access_token: String,
    pub app_secret: Option<String>,
    pub ad_account_id: String,
    pub api_base_url: String,
    pub api_version: String,
    pub retry_max_attempts: usize,
    pub retry_delay_ms: u64,
    pub retry_on: RetryEligibility,
    pub pipeline_timeout_secs: Option<u64>,
    pub daily_budget_minor: i64,
    pub bid_amount_minor: i64,
    pub campaign_goal: CampaignGoal,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            access_token: std::env::var("META_ACCESS_TOKEN")
                .map_err(|_| anyhow::anyhow!("META_ACCESS_TOKEN environment variable required"))
                .and_then(|token| {
                    if token.trim().is_empty() {
                        anyhow::bail!("META_ACCESS_TOKEN cannot be empty");
                    }
                    Ok(token)
                })?,
            app_secret: match std::env::var("META_APP_SECRET") {
                Ok(secret) if secret.trim().is_empty() => {
                    anyhow::bail!("META_APP_SECRET cannot be empty when set")
                }
                Ok(secret) => Some(secret),
                Err(_) => None,
            },
            ad_account_id: std::env::var("META_AD_ACCOUNT_ID")
                .map_err(|_| anyhow::anyhow!("META_AD_ACCOUNT_ID environment variable required"))?,
            api_base_url: std::env::var("META_API_BASE_URL")
                .unwrap_or_else(|_| "https://graph.facebook.com".to_string()),
            api_version: std::env::var("META_API_VERSION")
                .unwrap_or_else(|_| "v19.0".to_string()),
            retry_max_attempts: std::env::var("RETRY_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_MAX_ATTEMPTS must be a positive integer"))?,
            retry_delay_ms: std::env::var("RETRY_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_DELAY_MS must be a non-negative integer"))?,
            retry_on: std::env::var("RETRY_ON")
                .unwrap_or_else(|_| "transient".to_string())
                .parse()?,
            pipeline_timeout_secs: std::env::var("PIPELINE_TIMEOUT_SECS")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    s.parse().map_err(|_| {
                        anyhow::anyhow!("PIPELINE_TIMEOUT_SECS must be a positive integer")
                    })
                })
                .transpose()?,
            daily_budget_minor: std::env::var("DAILY_BUDGET_MINOR")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DAILY_BUDGET_MINOR must be an integer"))?,
            bid_amount_minor: std::env::var("BID_AMOUNT_MINOR")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BID_AMOUNT_MINOR must be an integer"))?,
            campaign_goal: std::env::var("CAMPAIGN_GOAL")
                .unwrap_or_else(|_| "traffic".to_string())
                .parse()?,
        };

        config.validate()?;

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Ad account: {}", config.ad_account_id);
        tracing::debug!(
            "Graph API: {}/{}",
            config.api_base_url,
            config.api_version
        );
        tracing::debug!(
            "Retry policy: {} attempts, {}ms delay, retry on {:?}",
            config.retry_max_attempts,
            config.retry_delay_ms,
            config.retry_on
        );
        if config.app_secret.is_some() {
            tracing::info!("App secret configured, appsecret_proof enabled");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Checks every rule `from_env` enforces. Also used on hand-built configs.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.access_token.trim().is_empty() {
            anyhow::bail!("META_ACCESS_TOKEN cannot be empty");
        }
        validate_ad_account_id(&self.ad_account_id)?;

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            anyhow::bail!("META_API_BASE_URL must start with http:// or https://");
        }
        let version_re = Regex::new(r"^v\d+\.\d+$")?;
        if !version_re.is_match(&self.api_version) {
            anyhow::bail!(
                "META_API_VERSION must look like v19.0, got '{}'",
                self.api_version
            );
        }

        if !(1..=10).contains(&self.retry_max_attempts) {
            anyhow::bail!("RETRY_MAX_ATTEMPTS must be between 1 and 10");
        }
        if self.pipeline_timeout_secs == Some(0) {
            anyhow::bail!("PIPELINE_TIMEOUT_SECS must be greater than zero");
        }

        MinorUnits::new(self.daily_budget_minor)
            .map_err(|e| anyhow::anyhow!("DAILY_BUDGET_MINOR: {}", e))?;
        MinorUnits::new(self.bid_amount_minor)
            .map_err(|e| anyhow::anyhow!("BID_AMOUNT_MINOR: {}", e))?;

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        // A single attempt never waits, whatever RETRY_DELAY_MS says
        if self.retry_max_attempts <= 1 {
            return RetryPolicy::no_retry();
        }
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
        .with_eligibility(self.retry_on)
    }

    pub fn pipeline_timeout(&self) -> Option<Duration> {
        self.pipeline_timeout_secs.map(Duration::from_secs)
    }

    /// Graph API root for the configured version, e.g. `https://graph.facebook.com/v19.0`.
    pub fn graph_root(&self) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.api_version
        )
    }
}

/// Ad account ids are `act_` followed by the numeric account id.
pub fn validate_ad_account_id(account_id: &str) -> anyhow::Result<()> {
    let account_re = Regex::new(r"^act_\d+$")?;
    if !account_re.is_match(account_id) {
        anyhow::bail!(
            "META_AD_ACCOUNT_ID must have the form act_<digits>, got '{}'",
            account_id
        );
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        port: 3000,
        access_token: "test_token".to_string(),
        app_secret: None,
        ad_account_id: "act_1234567890".to_string(),
        api_base_url: "https://graph.example.com".to_string(),
        api_version: "v19.0".to_string(),
        retry_max_attempts: 3,
        retry_delay_ms: 1,
        retry_on: RetryEligibility::TransientOnly,
        pipeline_timeout_secs: None,
        daily_budget_minor: 1000,
        bid_amount_minor: 100,
        campaign_goal: CampaignGoal::Traffic,
    }
}
