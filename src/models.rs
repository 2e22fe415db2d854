use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============ Inbound request ============

/// Body of `POST /create-ad`.
///
/// The endpoint builds this from raw JSON with
/// [`request_from_json`](crate::validation::request_from_json), so that null or
/// mistyped fields are reported with every other violation. Missing fields
/// default to empty here too.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvisioningRequest {
    pub campaign_name: String,
    pub ad_set_name: String,
    pub ad_name: String,
    pub creative_title: String,
    pub creative_body: String,
    pub page_id: String,
    pub link: String,
    pub image_url: Option<String>,
}

impl ProvisioningRequest {
    /// The image URL if one was supplied and is not blank.
    pub fn image_url(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

// ============ Remote references ============

/// Identifier and display name of an object created on the remote API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteResourceRef {
    pub id: String,
    pub name: String,
}

impl RemoteResourceRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Everything created by one successful pipeline run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProvisionedResources {
    /// Present only when an image URL was supplied. `id` holds the image hash.
    pub image: Option<RemoteResourceRef>,
    pub campaign: RemoteResourceRef,
    pub ad_set: RemoteResourceRef,
    pub creative: RemoteResourceRef,
    pub ad: RemoteResourceRef,
}

// ============ Delivery policy ============

/// Campaign goal. Each goal fixes a compatible objective, optimization goal and
/// billing event, so the three can never be chosen independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignGoal {
    Traffic,
    Awareness,
}

impl CampaignGoal {
    pub fn objective(self) -> Objective {
        match self {
            CampaignGoal::Traffic => Objective::OutcomeTraffic,
            CampaignGoal::Awareness => Objective::OutcomeAwareness,
        }
    }

    pub fn optimization_goal(self) -> OptimizationGoal {
        match self {
            CampaignGoal::Traffic => OptimizationGoal::LinkClicks,
            CampaignGoal::Awareness => OptimizationGoal::Reach,
        }
    }

    pub fn billing_event(self) -> BillingEvent {
        match self {
            CampaignGoal::Traffic | CampaignGoal::Awareness => BillingEvent::Impressions,
        }
    }
}

impl FromStr for CampaignGoal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "traffic" => Ok(CampaignGoal::Traffic),
            "awareness" => Ok(CampaignGoal::Awareness),
            other => anyhow::bail!("CAMPAIGN_GOAL must be 'traffic' or 'awareness', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Objective {
    OutcomeTraffic,
    OutcomeAwareness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OptimizationGoal {
    LinkClicks,
    Reach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingEvent {
    Impressions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidStrategy {
    LowestCostWithBidCap,
}

/// Initial status of every created object. Nothing is ever created live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectStatus {
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallToActionType {
    LearnMore,
}

/// Money amount in minor currency units (cents). Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MinorUnits(i64);

impl MinorUnits {
    pub fn new(amount: i64) -> Result<Self, String> {
        if amount <= 0 {
            return Err(format!(
                "amount must be a positive integer in minor units, got {}",
                amount
            ));
        }
        Ok(Self(amount))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============ Creation payloads ============

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GeoLocations {
    pub countries: Vec<String>,
}

/// Targeting spec sent with every ad set.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Targeting {
    pub geo_locations: GeoLocations,
    pub age_min: u8,
    pub age_max: u8,
    pub publisher_platforms: Vec<String>,
}

impl Default for Targeting {
    /// United States, ages 18-65, Facebook and Instagram.
    fn default() -> Self {
        Self {
            geo_locations: GeoLocations {
                countries: vec!["US".to_string()],
            },
            age_min: 18,
            age_max: 65,
            publisher_platforms: vec!["facebook".to_string(), "instagram".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CampaignPayload {
    pub name: String,
    pub objective: Objective,
    pub status: ObjectStatus,
    pub special_ad_categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdSetPayload {
    pub name: String,
    pub campaign_id: String,
    pub daily_budget: MinorUnits,
    pub bid_amount: MinorUnits,
    pub bid_strategy: BidStrategy,
    pub billing_event: BillingEvent,
    pub optimization_goal: OptimizationGoal,
    pub targeting: Targeting,
    pub status: ObjectStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CallToActionValue {
    pub link: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CallToAction {
    #[serde(rename = "type")]
    pub action_type: CallToActionType,
    pub value: CallToActionValue,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LinkData {
    pub link: String,
    pub message: String,
    /// Headline shown on the creative.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_hash: Option<String>,
    pub call_to_action: CallToAction,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ObjectStorySpec {
    pub page_id: String,
    pub link_data: LinkData,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreativePayload {
    pub name: String,
    pub object_story_spec: ObjectStorySpec,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreativeSpec {
    pub creative_id: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdPayload {
    pub name: String,
    pub adset_id: String,
    pub creative: CreativeSpec,
    pub status: ObjectStatus,
}
