use anyhow::Result;
use aws_examples::cdn::CloudFront;
use aws_examples::provision::Provisioner;
use aws_examples::storage::S3Store;
use aws_examples::{client, conf};
use clap::Parser;
use std::path::PathBuf;
use tracing::error;

/// Provision a private S3 bucket served through CloudFront, and
/// publish CSV files with signed URLs. Without any flag, signs every
/// matching file already in the bucket.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Upload the matching files found in this directory.
    #[clap(long, env)]
    dir_name: Option<PathBuf>,

    /// Create a new bucket with this name.
    #[clap(long, env)]
    new_bucket: Option<String>,

    /// Upload the public key to CloudFront and create its key group.
    #[clap(long, env)]
    upload_cert: bool,

    /// Create the distribution and grant it access to the bucket.
    #[clap(long, env)]
    create_distribution: bool,

    /// Forget the provisioning progress.
    #[clap(long, env)]
    clean: bool,
}

async fn run(args: Args) -> Result<()> {
    let aws_settings = conf::aws()?;
    let settings = conf::provision()?;
    let sdk_config = client::sdk_config(&aws_settings).await;
    let provisioner = Provisioner::new(
        S3Store::new(client::s3(&sdk_config, &aws_settings)),
        CloudFront::new(client::cloudfront(&sdk_config)),
        settings,
    );

    if let Some(dir) = &args.dir_name {
        provisioner.publish_directory(dir).await?;
    } else if let Some(bucket) = &args.new_bucket {
        provisioner.create_bucket(bucket).await?;
    } else if args.upload_cert {
        provisioner.upload_certificate().await?;
    } else if args.create_distribution {
        provisioner.create_distribution().await?;
        provisioner.update_bucket_policy().await?;
    } else if args.clean {
        provisioner.clean()?;
    } else {
        provisioner.publish_bucket().await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    let args = Args::parse();

    run(args).await.map_err(|e| {
        error!("{:?}", e);
        e
    })
}
