//! Builds the shared AWS SDK configuration and the service clients
//! derived from it.

use crate::conf::AwsSettings;
use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Normalizes an endpoint override, defaulting to https when no
/// scheme is given.
fn endpoint_url(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        String::from(endpoint)
    } else {
        format!("https://{}", endpoint)
    }
}

/// Loads the SDK configuration. In local mode the region, profile and
/// endpoint from the settings take precedence; otherwise the default
/// provider chain decides everything.
pub async fn sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if settings.is_local() {
        if let Some(region) = &settings.aws_region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = &settings.aws_profile {
            loader = loader.profile_name(profile);
        }
        if let Some(endpoint) = &settings.aws_endpoint {
            loader = loader.endpoint_url(endpoint_url(endpoint));
        }
    }
    loader.load().await
}

/// Builds an S3 client. Local endpoints rarely support virtual-hosted
/// buckets, so path-style addressing is forced in local mode.
pub fn s3(config: &SdkConfig, settings: &AwsSettings) -> aws_sdk_s3::Client {
    let s3_config = aws_sdk_s3::config::Builder::from(config)
        .force_path_style(settings.is_local())
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

/// Builds a CloudFront client.
pub fn cloudfront(config: &SdkConfig) -> aws_sdk_cloudfront::Client {
    aws_sdk_cloudfront::Client::new(config)
}

/// Builds an SQS client.
pub fn sqs(config: &SdkConfig) -> aws_sdk_sqs::Client {
    aws_sdk_sqs::Client::new(config)
}
