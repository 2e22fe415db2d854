//! The provisioning chain: image (optional) → campaign → ad set → creative → ad.
//!
//! Steps run strictly in order, each consuming identifiers produced by earlier
//! steps. The first failure stops the chain. Nothing already created is rolled
//! back; every object is created paused, so leftovers never spend.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::Config;
use crate::errors::{ProvisioningFailure, RemoteApiError};
use crate::graph_client::{RemoteResourceClient, DEFAULT_FIELDS};
use crate::models::{
    AdPayload, AdSetPayload, BidStrategy, CallToAction, CallToActionType, CallToActionValue,
    CampaignGoal, CampaignPayload, CreativePayload, CreativeSpec, LinkData, MinorUnits,
    ObjectStatus, ObjectStorySpec, ProvisionedResources, ProvisioningRequest, RemoteResourceRef,
    Targeting,
};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    UploadImage,
    CreateCampaign,
    CreateAdSet,
    CreateAdCreative,
    CreateAd,
}

impl PipelineStep {
    /// Execution order.
    pub const ORDER: [PipelineStep; 5] = [
        PipelineStep::UploadImage,
        PipelineStep::CreateCampaign,
        PipelineStep::CreateAdSet,
        PipelineStep::CreateAdCreative,
        PipelineStep::CreateAd,
    ];

    pub fn description(self) -> &'static str {
        match self {
            PipelineStep::UploadImage => "upload image",
            PipelineStep::CreateCampaign => "create campaign",
            PipelineStep::CreateAdSet => "create ad set",
            PipelineStep::CreateAdCreative => "create ad creative",
            PipelineStep::CreateAd => "create ad",
        }
    }
}

/// Fixed objective, budget, bid and targeting applied to every request.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryPolicy {
    pub goal: CampaignGoal,
    pub daily_budget: MinorUnits,
    pub bid_amount: MinorUnits,
    pub targeting: Targeting,
}

impl DeliveryPolicy {
    pub fn new(goal: CampaignGoal, daily_budget: i64, bid_amount: i64) -> Result<Self, String> {
        Ok(Self {
            goal,
            daily_budget: MinorUnits::new(daily_budget).map_err(|e| format!("daily budget: {}", e))?,
            bid_amount: MinorUnits::new(bid_amount).map_err(|e| format!("bid amount: {}", e))?,
            targeting: Targeting::default(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            config.campaign_goal,
            config.daily_budget_minor,
            config.bid_amount_minor,
        )
        .map_err(|e| anyhow::anyhow!("Invalid delivery policy: {}", e))
    }
}

// ============ Payload builders ============

pub fn campaign_payload(request: &ProvisioningRequest, policy: &DeliveryPolicy) -> CampaignPayload {
    CampaignPayload {
        name: request.campaign_name.trim().to_string(),
        objective: policy.goal.objective(),
        status: ObjectStatus::Paused,
        special_ad_categories: Vec::new(),
    }
}

pub fn ad_set_payload(
    request: &ProvisioningRequest,
    policy: &DeliveryPolicy,
    campaign: &RemoteResourceRef,
) -> AdSetPayload {
    AdSetPayload {
        name: request.ad_set_name.trim().to_string(),
        campaign_id: campaign.id.clone(),
        daily_budget: policy.daily_budget,
        bid_amount: policy.bid_amount,
        bid_strategy: BidStrategy::LowestCostWithBidCap,
        billing_event: policy.goal.billing_event(),
        optimization_goal: policy.goal.optimization_goal(),
        targeting: policy.targeting.clone(),
        status: ObjectStatus::Paused,
    }
}

/// The caller's link is used for both the story and the call to action.
pub fn creative_payload(
    request: &ProvisioningRequest,
    image: Option<&RemoteResourceRef>,
) -> CreativePayload {
    let link = request.link.trim().to_string();
    CreativePayload {
        name: format!("{} creative", request.ad_name.trim()),
        object_story_spec: ObjectStorySpec {
            page_id: request.page_id.trim().to_string(),
            link_data: LinkData {
                link: link.clone(),
                message: request.creative_body.trim().to_string(),
                name: request.creative_title.trim().to_string(),
                image_hash: image.map(|img| img.id.clone()),
                call_to_action: CallToAction {
                    action_type: CallToActionType::LearnMore,
                    value: CallToActionValue { link },
                },
            },
        },
    }
}

pub fn ad_payload(
    request: &ProvisioningRequest,
    ad_set: &RemoteResourceRef,
    creative: &RemoteResourceRef,
) -> AdPayload {
    AdPayload {
        name: request.ad_name.trim().to_string(),
        adset_id: ad_set.id.clone(),
        creative: CreativeSpec {
            creative_id: creative.id.clone(),
        },
        status: ObjectStatus::Paused,
    }
}

// ============ Pipeline ============

/// References collected so far in one run.
#[derive(Debug, Default)]
struct ProvisioningState {
    image: Option<RemoteResourceRef>,
    campaign: Option<RemoteResourceRef>,
    ad_set: Option<RemoteResourceRef>,
    creative: Option<RemoteResourceRef>,
    ad: Option<RemoteResourceRef>,
}

impl ProvisioningState {
    fn record(&mut self, step: PipelineStep, created: RemoteResourceRef) {
        let slot = match step {
            PipelineStep::UploadImage => &mut self.image,
            PipelineStep::CreateCampaign => &mut self.campaign,
            PipelineStep::CreateAdSet => &mut self.ad_set,
            PipelineStep::CreateAdCreative => &mut self.creative,
            PipelineStep::CreateAd => &mut self.ad,
        };
        *slot = Some(created);
    }

    /// Ids created so far, for the partial-failure log line.
    fn created_ids(&self) -> Vec<String> {
        [
            &self.image,
            &self.campaign,
            &self.ad_set,
            &self.creative,
            &self.ad,
        ]
        .into_iter()
        .flatten()
        .map(|r| r.id.clone())
        .collect()
    }

    fn finish(self) -> Result<ProvisionedResources, ProvisioningFailure> {
        Ok(ProvisionedResources {
            image: self.image,
            campaign: require(self.campaign, PipelineStep::CreateCampaign)?,
            ad_set: require(self.ad_set, PipelineStep::CreateAdSet)?,
            creative: require(self.creative, PipelineStep::CreateAdCreative)?,
            ad: require(self.ad, PipelineStep::CreateAd)?,
        })
    }
}

fn require(
    slot: Option<RemoteResourceRef>,
    step: PipelineStep,
) -> Result<RemoteResourceRef, ProvisioningFailure> {
    slot.ok_or_else(|| {
        ProvisioningFailure::new(
            step,
            RemoteApiError::permanent(format!("{} produced no reference", step.description())),
        )
    })
}

/// Runs the creation chain against a `RemoteResourceClient`.
///
/// Holds no per-request state, so one instance serves concurrent requests.
#[derive(Clone)]
pub struct ProvisioningPipeline {
    client: Arc<dyn RemoteResourceClient>,
    retry: RetryPolicy,
    delivery: DeliveryPolicy,
    timeout: Option<Duration>,
}

impl ProvisioningPipeline {
    pub fn new(
        client: Arc<dyn RemoteResourceClient>,
        retry: RetryPolicy,
        delivery: DeliveryPolicy,
    ) -> Self {
        Self {
            client,
            retry,
            delivery,
            timeout: None,
        }
    }

    pub fn from_config(
        client: Arc<dyn RemoteResourceClient>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(client, config.retry_policy(), DeliveryPolicy::from_config(config)?)
            .with_timeout(config.pipeline_timeout()))
    }

    /// Deadline for a whole run. Each step only gets the time that is left.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executes every step in order and returns all created references, or the
    /// first failure. Callers must validate `request` first.
    pub async fn run(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<ProvisionedResources, ProvisioningFailure> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut state = ProvisioningState::default();

        tracing::info!(
            "Starting provisioning for campaign '{}'",
            request.campaign_name.trim()
        );

        for step in PipelineStep::ORDER {
            if step == PipelineStep::UploadImage && request.image_url().is_none() {
                tracing::debug!("No image URL supplied, skipping image upload");
                continue;
            }

            match self.execute(step, request, &state, deadline).await {
                Ok(created) => {
                    tracing::debug!("Step '{}' produced {}", step.description(), created.id);
                    state.record(step, created);
                }
                Err(error) => {
                    let created = state.created_ids();
                    if !created.is_empty() {
                        tracing::warn!(
                            "⚠️  Pipeline stopped at '{}'; leaving paused resources for manual cleanup: {}",
                            step.description(),
                            created.join(", ")
                        );
                    }
                    return Err(ProvisioningFailure::new(step, error));
                }
            }
        }

        let resources = state.finish()?;
        tracing::info!(
            "✅ Provisioned campaign={} ad_set={} creative={} ad={}",
            resources.campaign.id,
            resources.ad_set.id,
            resources.creative.id,
            resources.ad.id
        );
        Ok(resources)
    }

    async fn execute(
        &self,
        step: PipelineStep,
        request: &ProvisioningRequest,
        state: &ProvisioningState,
        deadline: Option<Instant>,
    ) -> Result<RemoteResourceRef, RemoteApiError> {
        let client = self.client.as_ref();

        match step {
            PipelineStep::UploadImage => {
                let source_url = request
                    .image_url()
                    .ok_or_else(|| RemoteApiError::permanent("No image URL to upload"))?;
                self.invoke(step, deadline, || client.upload_image(source_url))
                    .await
            }
            PipelineStep::CreateCampaign => {
                let payload = campaign_payload(request, &self.delivery);
                self.invoke(step, deadline, || {
                    client.create_campaign(DEFAULT_FIELDS, &payload)
                })
                .await
            }
            PipelineStep::CreateAdSet => {
                let campaign = prerequisite(&state.campaign, "campaign")?;
                let payload = ad_set_payload(request, &self.delivery, campaign);
                self.invoke(step, deadline, || client.create_ad_set(DEFAULT_FIELDS, &payload))
                    .await
            }
            PipelineStep::CreateAdCreative => {
                let payload = creative_payload(request, state.image.as_ref());
                self.invoke(step, deadline, || {
                    client.create_ad_creative(DEFAULT_FIELDS, &payload)
                })
                .await
            }
            PipelineStep::CreateAd => {
                let ad_set = prerequisite(&state.ad_set, "ad set")?;
                let creative = prerequisite(&state.creative, "creative")?;
                let payload = ad_payload(request, ad_set, creative);
                self.invoke(step, deadline, || client.create_ad(DEFAULT_FIELDS, &payload))
                    .await
            }
        }
    }

    /// One step's remote call under the retry policy, bounded by the deadline.
    async fn invoke<F, Fut>(
        &self,
        step: PipelineStep,
        deadline: Option<Instant>,
        operation: F,
    ) -> Result<RemoteResourceRef, RemoteApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RemoteResourceRef, RemoteApiError>>,
    {
        let attempts = self.retry.invoke(step.description(), operation);
        match deadline {
            None => attempts.await,
            Some(deadline) => tokio::time::timeout_at(deadline, attempts)
                .await
                .unwrap_or_else(|_| {
                    Err(RemoteApiError::deadline_exceeded(format!(
                        "Deadline exceeded during {}",
                        step.description()
                    )))
                }),
        }
    }
}

fn prerequisite<'a>(
    slot: &'a Option<RemoteResourceRef>,
    what: &str,
) -> Result<&'a RemoteResourceRef, RemoteApiError> {
    slot.as_ref()
        .ok_or_else(|| RemoteApiError::permanent(format!("No {} id available", what)))
}
