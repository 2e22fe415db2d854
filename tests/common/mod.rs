//! Shared test doubles for the provisioning pipeline.
#![allow(dead_code)]

use ad_provisioning_api::config::Config;
use ad_provisioning_api::errors::RemoteApiError;
use ad_provisioning_api::graph_client::RemoteResourceClient;
use ad_provisioning_api::models::{
    AdPayload, AdSetPayload, CampaignGoal, CampaignPayload, CreativePayload, ProvisioningRequest,
    RemoteResourceRef,
};
use ad_provisioning_api::pipeline::PipelineStep;
use ad_provisioning_api::retry::RetryEligibility;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One recorded call against the stub.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub step: PipelineStep,
    pub fields: Vec<String>,
    pub payload: Value,
}

/// `RemoteResourceClient` that records every call and answers from a script.
///
/// Unscripted calls succeed with sequential ids per operation: `img_1`,
/// `cmp_1`, `set_1`, `cre_1`, `ad_1`, then `_2` on the next success.
#[derive(Default)]
pub struct StubClient {
    calls: Mutex<Vec<RecordedCall>>,
    script: Mutex<HashMap<PipelineStep, VecDeque<Result<(), RemoteApiError>>>>,
    successes: Mutex<HashMap<PipelineStep, usize>>,
}

impl StubClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error for the next call of `step`.
    pub fn fail_next(&self, step: PipelineStep, error: RemoteApiError) {
        self.script
            .lock()
            .unwrap()
            .entry(step)
            .or_default()
            .push_back(Err(error));
    }

    /// Makes every call of `step` fail with `error`, `times` times.
    pub fn fail_times(&self, step: PipelineStep, error: RemoteApiError, times: usize) {
        for _ in 0..times {
            self.fail_next(step, error.clone());
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, step: PipelineStep) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.step == step)
            .collect()
    }

    pub fn count(&self, step: PipelineStep) -> usize {
        self.calls_for(step).len()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn respond(
        &self,
        step: PipelineStep,
        fields: &[&str],
        payload: Value,
        name: &str,
    ) -> Result<RemoteResourceRef, RemoteApiError> {
        self.calls.lock().unwrap().push(RecordedCall {
            step,
            fields: fields.iter().map(|f| f.to_string()).collect(),
            payload,
        });

        if let Some(Err(e)) = self
            .script
            .lock()
            .unwrap()
            .get_mut(&step)
            .and_then(|queue| queue.pop_front())
        {
            return Err(e);
        }

        let mut successes = self.successes.lock().unwrap();
        let n = successes.entry(step).or_insert(0);
        *n += 1;
        let prefix = match step {
            PipelineStep::UploadImage => "img",
            PipelineStep::CreateCampaign => "cmp",
            PipelineStep::CreateAdSet => "set",
            PipelineStep::CreateAdCreative => "cre",
            PipelineStep::CreateAd => "ad",
        };
        Ok(RemoteResourceRef::new(format!("{}_{}", prefix, n), name))
    }
}

#[async_trait]
impl RemoteResourceClient for StubClient {
    async fn create_campaign(
        &self,
        fields: &[&str],
        payload: &CampaignPayload,
    ) -> Result<RemoteResourceRef, RemoteApiError> {
        self.respond(
            PipelineStep::CreateCampaign,
            fields,
            serde_json::to_value(payload).unwrap(),
            &payload.name,
        )
    }

    async fn create_ad_set(
        &self,
        fields: &[&str],
        payload: &AdSetPayload,
    ) -> Result<RemoteResourceRef, RemoteApiError> {
        self.respond(
            PipelineStep::CreateAdSet,
            fields,
            serde_json::to_value(payload).unwrap(),
            &payload.name,
        )
    }

    async fn create_ad_creative(
        &self,
        fields: &[&str],
        payload: &CreativePayload,
    ) -> Result<RemoteResourceRef, RemoteApiError> {
        self.respond(
            PipelineStep::CreateAdCreative,
            fields,
            serde_json::to_value(payload).unwrap(),
            &payload.name,
        )
    }

    async fn create_ad(
        &self,
        fields: &[&str],
        payload: &AdPayload,
    ) -> Result<RemoteResourceRef, RemoteApiError> {
        self.respond(
            PipelineStep::CreateAd,
            fields,
            serde_json::to_value(payload).unwrap(),
            &payload.name,
        )
    }

    async fn upload_image(&self, source_url: &str) -> Result<RemoteResourceRef, RemoteApiError> {
        self.respond(
            PipelineStep::UploadImage,
            &[],
            json!({ "source_url": source_url }),
            "image",
        )
    }
}

/// The request from the documented example scenario.
pub fn spring_sale_request() -> ProvisioningRequest {
    ProvisioningRequest {
        campaign_name: "Spring Sale".to_string(),
        ad_set_name: "US-18-65".to_string(),
        ad_name: "Launch".to_string(),
        creative_title: "Hello".to_string(),
        creative_body: "Buy now".to_string(),
        page_id: "123456".to_string(),
        link: "https://example.com".to_string(),
        image_url: None,
    }
}

pub const TEST_ACCOUNT: &str = "act_1234567890";

/// Valid config pointed at `api_base_url`, with a 1ms retry delay.
pub fn test_config(api_base_url: impl Into<String>) -> Config {
    Config {
        port: 3000,
        access_token: "test_token".to_string(),
        app_secret: None,
        ad_account_id: TEST_ACCOUNT.to_string(),
        api_base_url: api_base_url.into(),
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
