//! Defines the CloudFront operations used to serve a private bucket
//! through a distribution restricted to signed URLs.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_cloudfront::types::{
    AllowedMethods, CookiePreference, DefaultCacheBehavior, DistributionConfig, ForwardedValues,
    HttpVersion, ItemSelection, KeyGroupConfig, Method, Origin, OriginAccessControlConfig,
    OriginAccessControlOriginTypes, OriginAccessControlSigningBehaviors,
    OriginAccessControlSigningProtocols, Origins, PriceClass, PublicKeyConfig, S3OriginConfig,
    TrustedKeyGroups, ViewerProtocolPolicy,
};
use aws_sdk_cloudfront::Client;
use uuid::Uuid;

/// The parts of a freshly created distribution worth keeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedDistribution {
    pub id: String,
    pub arn: String,
    pub domain_name: String,
    pub status: String,
}

/// The content delivery operations needed by the provisioner.
#[async_trait]
pub trait ContentDelivery: Send + Sync {
    /// Uploads a PEM public key and returns its id.
    async fn create_public_key(&self, name: &str, comment: &str, encoded_key: &str)
        -> Result<String>;

    /// Groups public keys and returns the group id.
    async fn create_key_group(&self, name: &str, comment: &str, keys: &[String])
        -> Result<String>;

    /// Creates an origin access control for an S3 origin and returns
    /// its id.
    async fn create_origin_access_control(&self, name: &str) -> Result<String>;

    /// Creates a distribution in front of `origin_domain`, trusting
    /// the given key groups for signed URLs.
    async fn create_distribution(
        &self,
        comment: &str,
        origin_domain: &str,
        origin_access_control_id: &str,
        trusted_key_groups: &[String],
    ) -> Result<CreatedDistribution>;
}

/// [`ContentDelivery`] backed by CloudFront.
#[derive(Debug, Clone)]
pub struct CloudFront {
    client: Client,
}

impl CloudFront {
    pub fn new(client: Client) -> Self {
        CloudFront { client }
    }
}

/// Builds the distribution configuration: a single S3 origin, served
/// over HTTPS only, readable through signed URLs only.
fn distribution_config(
    comment: &str,
    origin_domain: &str,
    origin_access_control_id: &str,
    trusted_key_groups: &[String],
) -> Result<DistributionConfig> {
    let origin_id = Uuid::new_v4().to_string();
    let cache_behavior = DefaultCacheBehavior::builder()
        .target_origin_id(&origin_id)
        .viewer_protocol_policy(ViewerProtocolPolicy::HttpsOnly)
        .allowed_methods(
            AllowedMethods::builder()
                .quantity(2)
                .items(Method::Get)
                .items(Method::Head)
                .build()?,
        )
        .compress(true)
        .trusted_key_groups(
            TrustedKeyGroups::builder()
                .enabled(true)
                .quantity(trusted_key_groups.len() as i32)
                .set_items(Some(trusted_key_groups.to_vec()))
                .build()?,
        )
        .min_ttl(0)
        .forwarded_values(
            ForwardedValues::builder()
                .query_string(false)
                .cookies(
                    CookiePreference::builder()
                        .forward(ItemSelection::None)
                        .build()?,
                )
                .build()?,
        )
        .build()?;
    let origin = Origin::builder()
        .id(&origin_id)
        .domain_name(origin_domain)
        .origin_access_control_id(origin_access_control_id)
        // with an origin access control the legacy identity stays empty
        .s3_origin_config(S3OriginConfig::builder().origin_access_identity("").build())
        .build()?;
    let config = DistributionConfig::builder()
        .caller_reference(Uuid::new_v4().to_string())
        .comment(comment)
        .default_cache_behavior(cache_behavior)
        .enabled(true)
        .origins(Origins::builder().quantity(1).items(origin).build()?)
        .http_version(HttpVersion::Http2)
        .is_ipv6_enabled(true)
        .price_class(PriceClass::PriceClassAll)
        .build()?;
    Ok(config)
}

#[async_trait]
impl ContentDelivery for CloudFront {
    async fn create_public_key(
        &self,
        name: &str,
        comment: &str,
        encoded_key: &str,
    ) -> Result<String> {
        let config = PublicKeyConfig::builder()
            .caller_reference(Uuid::new_v4().to_string())
            .name(name)
            .encoded_key(encoded_key)
            .comment(comment)
            .build()?;
        let response = self
            .client
            .create_public_key()
            .public_key_config(config)
            .send()
            .await
            .with_context(|| format!("Failed to upload public key {:?}", name))?;
        response
            .public_key()
            .map(|key| String::from(key.id()))
            .ok_or_else(|| anyhow!("Public key {:?} was created without an id", name))
    }

    async fn create_key_group(
        &self,
        name: &str,
        comment: &str,
        keys: &[String],
    ) -> Result<String> {
        let config = KeyGroupConfig::builder()
            .name(name)
            .set_items(Some(keys.to_vec()))
            .comment(comment)
            .build()?;
        let response = self
            .client
            .create_key_group()
            .key_group_config(config)
            .send()
            .await
            .with_context(|| format!("Failed to create key group {:?} for keys {:?}", name, keys))?;
        response
            .key_group()
            .map(|group| String::from(group.id()))
            .ok_or_else(|| anyhow!("Key group {:?} was created without an id", name))
    }

    async fn create_origin_access_control(&self, name: &str) -> Result<String> {
        let config = OriginAccessControlConfig::builder()
            .name(name)
            .description(format!("create origin access control for {}", name))
            .origin_access_control_origin_type(OriginAccessControlOriginTypes::S3)
            .signing_behavior(OriginAccessControlSigningBehaviors::Always)
            .signing_protocol(OriginAccessControlSigningProtocols::Sigv4)
            .build()?;
        let response = self
            .client
            .create_origin_access_control()
            .origin_access_control_config(config)
            .send()
            .await
            .with_context(|| format!("Failed to create origin access control {:?}", name))?;
        response
            .origin_access_control()
            .map(|control| String::from(control.id()))
            .ok_or_else(|| anyhow!("Origin access control {:?} was created without an id", name))
    }

    async fn create_distribution(
        &self,
        comment: &str,
        origin_domain: &str,
        origin_access_control_id: &str,
        trusted_key_groups: &[String],
    ) -> Result<CreatedDistribution> {
        let config = distribution_config(
            comment,
            origin_domain,
            origin_access_control_id,
            trusted_key_groups,
        )?;
        let response = self
            .client
            .create_distribution()
            .distribution_config(config)
            .send()
            .await
            .with_context(|| format!("Failed to create a distribution for {:?}", origin_domain))?;
        let distribution = response
            .distribution()
            .ok_or_else(|| anyhow!("No distribution returned for {:?}", origin_domain))?;
        Ok(CreatedDistribution {
            id: String::from(distribution.id()),
            arn: String::from(distribution.arn()),
            domain_name: String::from(distribution.domain_name()),
            status: String::from(distribution.status()),
        })
    }
}
