//! Extracts the objects named by an S3 event notification, as
//! delivered in the body of an SQS message.

use anyhow::{anyhow, Context, Result};
use aws_lambda_events::event::s3::{S3Event, S3EventRecord};

/// An object referenced by an event record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    fn from_record(record: &S3EventRecord) -> Result<Self> {
        let bucket = record
            .s3
            .bucket
            .name
            .clone()
            .ok_or_else(|| anyhow!("Event record has no bucket name"))?;
        let key = record
            .s3
            .object
            .key
            .clone()
            .ok_or_else(|| anyhow!("Event record for bucket {:?} has no object key", bucket))?;
        Ok(ObjectRef { bucket, key })
    }
}

/// Lists the objects referenced by an event. Fails if any record is
/// incomplete.
pub fn objects(event: &S3Event) -> Result<Vec<ObjectRef>> {
    event.records.iter().map(ObjectRef::from_record).collect()
}

/// Parses a message body as an S3 event and lists its objects. The
/// test notification S3 sends when configuring a queue has no
/// records and yields nothing.
pub fn parse_body(body: &str) -> Result<Vec<ObjectRef>> {
    let value: serde_json::Value =
        serde_json::from_str(body).context("Message body is not JSON")?;
    if value.get("Event").and_then(|e| e.as_str()) == Some("s3:TestEvent") {
        return Ok(Vec::new());
    }
    let event: S3Event =
        serde_json::from_value(value).context("Message body is not an S3 event notification")?;
    objects(&event)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// An S3 put notification for `key` in `bucket`.
    pub(crate) fn put_event(bucket: &str, key: &str) -> String {
        format!(
            r#"{{
  "Records": [
    {{
      "eventVersion": "2.1",
      "eventSource": "aws:s3",
      "awsRegion": "us-east-1",
      "eventTime": "2023-11-14T22:13:20.000Z",
      "eventName": "ObjectCreated:Put",
      "userIdentity": {{ "principalId": "AWS:AIDAJDPLRKLG7UEXAMPLE" }},
      "requestParameters": {{ "sourceIPAddress": "127.0.0.1" }},
      "responseElements": {{
        "x-amz-request-id": "C3D13FE58DE4C810",
        "x-amz-id-2": "FMyUVURIY8/IgAtTv8xRjskZQpcIZ9KG4V5Wp6S7S/JRWeUWerMUE5JgHvANOjpD"
      }},
      "s3": {{
        "s3SchemaVersion": "1.0",
        "configurationId": "testConfigRule",
        "bucket": {{
          "name": "{}",
          "ownerIdentity": {{ "principalId": "A3NL1KOZZKExample" }},
          "arn": "arn:aws:s3:::{}"
        }},
        "object": {{
          "key": "{}",
          "size": 1024,
          "eTag": "d41d8cd98f00b204e9800998ecf8427e",
          "versionId": "096fKKXTRTtl3on89fVO.nfljtsv6qko",
          "sequencer": "0055AED6DCD90281E5"
        }}
      }}
    }}
  ]
}}"#,
            bucket, bucket, key
        )
    }

    #[test]
    fn extracts_bucket_and_key() {
        let objects = parse_body(&put_event("reports", "merchant-42.csv")).unwrap();
        assert_eq!(
            objects,
            vec![ObjectRef {
                bucket: String::from("reports"),
                key: String::from("merchant-42.csv"),
            }]
        );
    }

    #[test]
    fn test_event_has_no_objects() {
        let body = r#"{"Service":"Amazon S3","Event":"s3:TestEvent","Time":"2023-11-14T22:13:20.000Z","Bucket":"reports","RequestId":"5582815E1AEA5ADF","HostId":"8cLeGAmw098X5cv4Zkwcmo8vvZa3eH3eKxsPzbB9wrR+YstdA6Knx4Ip8EXAMPLE"}"#;
        assert!(parse_body(body).unwrap().is_empty());
    }

    #[test]
    fn malformed_bodies_fail() {
        assert!(parse_body("not json").is_err());
        assert!(parse_body(r#"{"Records": "nope"}"#).is_err());
    }
}
