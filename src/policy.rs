//! Defines the bucket policy granting a CloudFront distribution read
//! access to a private bucket.

use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Principal {
    pub service: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StringEquals {
    #[serde(rename = "AWS:SourceArn")]
    pub aws_source_arn: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Condition {
    pub string_equals: StringEquals,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub sid: String,
    pub effect: String,
    pub principal: Principal,
    pub action: String,
    pub resource: String,
    pub condition: Condition,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub id: String,
    pub statement: Statement,
}

impl PolicyDocument {
    /// Allows the CloudFront service to get any object in `bucket`,
    /// but only on behalf of the distribution `distribution_arn`.
    pub fn cloudfront_read_only(bucket: &str, distribution_arn: &str) -> Self {
        PolicyDocument {
            version: String::from("2012-10-17"),
            id: String::from("PolicyForCloudFrontPrivateContent"),
            statement: Statement {
                sid: String::from("AllowCloudFrontServicePrincipalReadOnly"),
                effect: String::from("Allow"),
                principal: Principal {
                    service: String::from("cloudfront.amazonaws.com"),
                },
                action: String::from("s3:GetObject"),
                resource: format!("arn:aws:s3:::{}/*", bucket),
                condition: Condition {
                    string_equals: StringEquals {
                        aws_source_arn: String::from(distribution_arn),
                    },
                },
            },
        }
    }
}
