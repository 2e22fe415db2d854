/// Pipeline behaviour against a recording stub client
/// Covers ordering, id threading, short-circuiting and retry per step
mod common;

use ad_provisioning_api::core::errors::{RemoteApiError, RemoteErrorKind};
use ad_provisioning_api::core::models::{CampaignGoal, ProvisioningRequest};
use ad_provisioning_api::core::pipeline::{DeliveryPolicy, PipelineStep, ProvisioningPipeline};
use ad_provisioning_api::core::retry::{RetryEligibility, RetryPolicy};
use ad_provisioning_api::integrations::graph_client::DEFAULT_FIELDS;
use common::{spring_sale_request, StubClient};
use std::sync::Arc;
use std::time::Duration;

fn pipeline_with(client: Arc<StubClient>, retry: RetryPolicy) -> ProvisioningPipeline {
    ProvisioningPipeline::new(
        client,
        retry,
        DeliveryPolicy::new(CampaignGoal::Traffic, 1000, 100).unwrap(),
    )
}

fn fast_retry(max_attempts: usize) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1))
}

fn with_image(url: &str) -> ProvisioningRequest {
    ProvisioningRequest {
        image_url: Some(url.to_string()),
        ..spring_sale_request()
    }
}

#[tokio::test]
async fn test_success_threads_ids_through_every_step() {
    let client = Arc::new(StubClient::new());
    let pipeline = pipeline_with(client.clone(), fast_retry(3));

    let resources = pipeline.run(&spring_sale_request()).await.unwrap();

    assert_eq!(resources.campaign.id, "cmp_1");
    assert_eq!(resources.ad_set.id, "set_1");
    assert_eq!(resources.creative.id, "cre_1");
    assert_eq!(resources.ad.id, "ad_1");
    assert!(resources.image.is_none());

    // Exactly one of each, in order
    let steps: Vec<PipelineStep> = client.calls().iter().map(|c| c.step).collect();
    assert_eq!(
        steps,
        vec![
            PipelineStep::CreateCampaign,
            PipelineStep::CreateAdSet,
            PipelineStep::CreateAdCreative,
            PipelineStep::CreateAd,
        ]
    );

    let ad_set = &client.calls_for(PipelineStep::CreateAdSet)[0];
    assert_eq!(ad_set.payload["campaign_id"], resources.campaign.id.as_str());

    let ad = &client.calls_for(PipelineStep::CreateAd)[0];
    assert_eq!(ad.payload["adset_id"], resources.ad_set.id.as_str());
    assert_eq!(ad.payload["creative"]["creative_id"], resources.creative.id.as_str());
}

#[tokio::test]
async fn test_every_object_is_created_paused() {
    let client = Arc::new(StubClient::new());
    pipeline_with(client.clone(), fast_retry(1))
        .run(&spring_sale_request())
        .await
        .unwrap();

    assert_eq!(
        client.calls_for(PipelineStep::CreateCampaign)[0].payload["status"],
        "PAUSED"
    );
    assert_eq!(
        client.calls_for(PipelineStep::CreateAdSet)[0].payload["status"],
        "PAUSED"
    );
    assert_eq!(
        client.calls_for(PipelineStep::CreateAd)[0].payload["status"],
        "PAUSED"
    );
}

#[tokio::test]
async fn test_requests_default_fields_on_creation_calls() {
    let client = Arc::new(StubClient::new());
    pipeline_with(client.clone(), fast_retry(1))
        .run(&spring_sale_request())
        .await
        .unwrap();

    let expected: Vec<String> = DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect();
    for call in client.calls() {
        assert_eq!(call.fields, expected);
    }
}

#[tokio::test]
async fn test_image_url_uploads_first_and_feeds_creative() {
    let client = Arc::new(StubClient::new());
    let pipeline = pipeline_with(client.clone(), fast_retry(3));

    let resources = pipeline
        .run(&with_image("https://cdn.example.com/banner.jpg"))
        .await
        .unwrap();

    assert_eq!(resources.image.as_ref().map(|i| i.id.as_str()), Some("img_1"));

    let calls = client.calls();
    assert_eq!(calls[0].step, PipelineStep::UploadImage);
    assert_eq!(calls[0].payload["source_url"], "https://cdn.example.com/banner.jpg");

    let creative = &client.calls_for(PipelineStep::CreateAdCreative)[0];
    assert_eq!(
        creative.payload["object_story_spec"]["link_data"]["image_hash"],
        "img_1"
    );
}

#[tokio::test]
async fn test_no_image_url_skips_upload_and_omits_hash() {
    let client = Arc::new(StubClient::new());
    pipeline_with(client.clone(), fast_retry(3))
        .run(&spring_sale_request())
        .await
        .unwrap();

    assert_eq!(client.count(PipelineStep::UploadImage), 0);

    let creative = &client.calls_for(PipelineStep::CreateAdCreative)[0];
    let link_data = &creative.payload["object_story_spec"]["link_data"];
    assert!(link_data.get("image_hash").is_none());
    assert_eq!(link_data["link"], "https://example.com");
}

#[tokio::test]
async fn test_campaign_failure_stops_before_downstream_steps() {
    let client = Arc::new(StubClient::new());
    client.fail_next(
        PipelineStep::CreateCampaign,
        RemoteApiError::permanent("Permissions error"),
    );

    let failure = pipeline_with(client.clone(), fast_retry(3))
        .run(&spring_sale_request())
        .await
        .unwrap_err();

    assert_eq!(failure.step, PipelineStep::CreateCampaign);
    assert_eq!(failure.error.message, "Permissions error");
    assert_eq!(client.count(PipelineStep::CreateCampaign), 1);
    assert_eq!(client.count(PipelineStep::CreateAdSet), 0);
    assert_eq!(client.count(PipelineStep::CreateAdCreative), 0);
    assert_eq!(client.count(PipelineStep::CreateAd), 0);
}

#[tokio::test]
async fn test_ad_set_failure_carries_message_and_trace_id() {
    let client = Arc::new(StubClient::new());
    client.fail_next(
        PipelineStep::CreateAdSet,
        RemoteApiError::permanent("Invalid targeting spec").with_trace_id("TRC99"),
    );

    let failure = pipeline_with(client.clone(), fast_retry(3))
        .run(&spring_sale_request())
        .await
        .unwrap_err();

    assert_eq!(failure.step, PipelineStep::CreateAdSet);
    assert_eq!(failure.error.message, "Invalid targeting spec");
    assert_eq!(failure.error.fbtrace_id.as_deref(), Some("TRC99"));
    // Permanent errors are not retried
    assert_eq!(client.count(PipelineStep::CreateAdSet), 1);
    assert_eq!(client.count(PipelineStep::CreateAdCreative), 0);
    assert_eq!(client.count(PipelineStep::CreateAd), 0);
}

#[tokio::test]
async fn test_image_failure_stops_before_campaign() {
    let client = Arc::new(StubClient::new());
    client.fail_next(
        PipelineStep::UploadImage,
        RemoteApiError::permanent("Image download returned status 404 Not Found"),
    );

    let failure = pipeline_with(client.clone(), fast_retry(3))
        .run(&with_image("https://cdn.example.com/missing.jpg"))
        .await
        .unwrap_err();

    assert_eq!(failure.step, PipelineStep::UploadImage);
    assert_eq!(client.total_calls(), 1);
}

#[tokio::test]
async fn test_rate_limited_step_is_retried_then_succeeds() {
    let client = Arc::new(StubClient::new());
    client.fail_times(
        PipelineStep::CreateAdCreative,
        RemoteApiError::rate_limited("User request limit reached"),
        2,
    );

    let resources = pipeline_with(client.clone(), fast_retry(3))
        .run(&spring_sale_request())
        .await
        .unwrap();

    assert_eq!(resources.creative.id, "cre_1");
    assert_eq!(client.count(PipelineStep::CreateAdCreative), 3);
    assert_eq!(client.count(PipelineStep::CreateAd), 1);
}

#[tokio::test]
async fn test_exhausted_retries_surface_last_error() {
    let client = Arc::new(StubClient::new());
    client.fail_times(
        PipelineStep::CreateAd,
        RemoteApiError::network("connection reset"),
        5,
    );

    let failure = pipeline_with(client.clone(), fast_retry(3))
        .run(&spring_sale_request())
        .await
        .unwrap_err();

    assert_eq!(failure.step, PipelineStep::CreateAd);
    assert_eq!(failure.error.kind, RemoteErrorKind::Network);
    assert_eq!(failure.error.message, "connection reset");
    assert_eq!(client.count(PipelineStep::CreateAd), 3);
}

#[tokio::test]
async fn test_retry_all_retries_permanent_errors() {
    let client = Arc::new(StubClient::new());
    client.fail_next(
        PipelineStep::CreateCampaign,
        RemoteApiError::permanent("Unexpected error"),
    );

    let retry = fast_retry(2).with_eligibility(RetryEligibility::All);
    let resources = pipeline_with(client.clone(), retry)
        .run(&spring_sale_request())
        .await
        .unwrap();

    assert_eq!(resources.campaign.id, "cmp_1");
    assert_eq!(client.count(PipelineStep::CreateCampaign), 2);
}

#[tokio::test]
async fn test_pipeline_is_not_idempotent() {
    // No dedup key: identical input creates a second, independent set of objects
    let client = Arc::new(StubClient::new());
    let pipeline = pipeline_with(client.clone(), fast_retry(1));
    let request = spring_sale_request();

    let first = pipeline.run(&request).await.unwrap();
    let second = pipeline.run(&request).await.unwrap();

    assert_ne!(first.campaign.id, second.campaign.id);
    assert_ne!(first.ad_set.id, second.ad_set.id);
    assert_ne!(first.creative.id, second.creative.id);
    assert_ne!(first.ad.id, second.ad.id);
    assert_eq!(client.count(PipelineStep::CreateCampaign), 2);
    assert_eq!(client.count(PipelineStep::CreateAd), 2);
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let client = Arc::new(StubClient::new());
    let pipeline = pipeline_with(client.clone(), fast_retry(1));

    let mut handles = vec![];
    for _ in 0..8 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline.run(&spring_sale_request()).await
        }));
    }

    let mut ad_ids = vec![];
    for handle in handles {
        let resources = handle.await.unwrap().unwrap();
        ad_ids.push(resources.ad.id);
    }
    ad_ids.sort();
    ad_ids.dedup();

    assert_eq!(ad_ids.len(), 8);
    assert_eq!(client.count(PipelineStep::CreateCampaign), 8);
}

#[tokio::test]
async fn test_deadline_fails_current_step_without_retry() {
    let client = Arc::new(StubClient::new());
    client.fail_times(
        PipelineStep::CreateCampaign,
        RemoteApiError::transient("Service temporarily unavailable"),
        10,
    );

    // Retries would take ~10s; the deadline cuts the step off first
    let pipeline = pipeline_with(client.clone(), RetryPolicy::new(10, Duration::from_secs(1)))
        .with_timeout(Some(Duration::from_millis(50)));

    let failure = pipeline.run(&spring_sale_request()).await.unwrap_err();

    assert_eq!(failure.step, PipelineStep::CreateCampaign);
    assert_eq!(failure.error.kind, RemoteErrorKind::DeadlineExceeded);
    assert_eq!(client.count(PipelineStep::CreateAdSet), 0);
}
