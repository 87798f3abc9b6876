//! Provisions a private S3 bucket behind a CloudFront distribution
//! serving signed URLs, and consumes S3 event notifications from an
//! SQS queue.

pub mod cdn;
pub mod checkpoint;
pub mod client;
pub mod conf;
pub mod event;
pub mod policy;
pub mod provision;
pub mod report;
pub mod sign;
pub mod storage;
pub mod worker;

#[cfg(test)]
mod fakes;
